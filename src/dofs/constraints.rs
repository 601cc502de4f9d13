//! Linear constraints between degrees of freedom.

use std::collections::BTreeMap;

use crate::prelude::*;

/// Constraints `x[c] = sum_k w_k * x[k]` for hanging degrees of freedom
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffineConstraints {
    lines: BTreeMap<usize, Vec<(usize, f64)>>,
}

impl AffineConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_line(&mut self, dof: usize, entries: Vec<(usize, f64)>) {
        self.lines.insert(dof, entries);
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.lines.contains_key(&dof)
    }

    pub fn n_constraints(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, dof: usize) -> Option<&[(usize, f64)]> {
        self.lines.get(&dof).map(|v| v.as_slice())
    }

    /// Resolve chains so every line only references unconstrained dofs
    pub fn close(&mut self) -> Result<()> {
        let max_depth = self.lines.len() + 1;
        let dofs = self.lines.keys().copied().collect_vec();
        for dof in dofs {
            let mut entries = self.lines[&dof].clone();
            let mut depth = 0;
            while entries.iter().any(|(k, _)| self.lines.contains_key(k)) {
                depth += 1;
                if depth > max_depth {
                    return Err(Error::ConstraintCycle(dof));
                }
                entries = entries
                    .into_iter()
                    .flat_map(|(k, w)| match self.lines.get(&k) {
                        Some(line) => line.iter().map(|&(m, v)| (m, w * v)).collect_vec(),
                        None => vec![(k, w)],
                    })
                    .collect();
            }

            // Merge repeated entries
            let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
            for (k, w) in entries {
                *merged.entry(k).or_insert(0.) += w;
            }
            self.lines.insert(dof, merged.into_iter().collect());
        }
        Ok(())
    }

    /// Set constrained entries from the entries they depend on
    pub fn distribute(&self, v: &mut VectorD) {
        for (&dof, line) in self.lines.iter() {
            v[dof] = line.iter().map(|&(k, w)| w * v[k]).sum();
        }
    }

    /// Eliminate constrained dofs from a linear system.
    ///
    /// Returns `C^T K C` and `C^T b`, where `C` expands unconstrained values to
    /// all dofs. Constrained rows are left with a scaled identity and zero
    /// right-hand side so the condensed operator stays regular.
    pub fn condense(&self, op: &SparseMatrix, rhs: &VectorD) -> (SparseMatrix, VectorD) {
        let n = op.nrows();
        let expand = |i: usize| -> Vec<(usize, f64)> {
            match self.lines.get(&i) {
                Some(line) => line.clone(),
                None => vec![(i, 1.)],
            }
        };

        let mut coo = TripletMatrix::new(n, n);
        for (i, j, &a) in op.triplet_iter() {
            for (p, wp) in expand(i) {
                for (q, wq) in expand(j) {
                    coo.push(p, q, wp * wq * a);
                }
            }
        }
        let scale = op.mean_abs_diagonal();
        for &dof in self.lines.keys() {
            coo.push(dof, dof, scale);
        }

        let mut b = VectorD::zeros(n);
        for (i, &r) in rhs.iter().enumerate() {
            for (p, wp) in expand(i) {
                b[p] += wp * r;
            }
        }
        for &dof in self.lines.keys() {
            b[dof] = 0.;
        }
        (SparseMatrix::from(&coo), b)
    }
}
