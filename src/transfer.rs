//! Moving discrete fields across a mesh adaptation.
//!
//! The snapshot is taken cell by cell before the discretization is given up,
//! so the fields can be rebuilt on the new numbering without the old one.

use std::collections::BTreeMap;

use crate::dofs::Discretization;
use crate::mesh::CellId;
use crate::prelude::*;

/// Cell-local values of a set of fields on the mesh before adaptation
#[derive(Debug, Clone)]
pub struct SolutionTransfer {
    n_fields: usize,
    snapshot: BTreeMap<CellId, Vec<[f64; 4]>>,
}

impl SolutionTransfer {
    /// Record the vertex values of every field on every active cell
    pub fn prepare(disc: &Discretization, fields: &[&VectorD]) -> Result<Self> {
        for field in fields.iter() {
            if field.len() != disc.n_dofs() {
                return Err(Error::DimensionMismatch {
                    what: "transferred field",
                    expected: disc.n_dofs(),
                    found: field.len(),
                });
            }
        }
        let snapshot = disc
            .cells()
            .iter()
            .enumerate()
            .map(|(k, &cell)| {
                let values = fields.iter().map(|f| disc.cell_values(k, f)).collect();
                (cell, values)
            })
            .collect();
        Ok(SolutionTransfer {
            n_fields: fields.len(),
            snapshot,
        })
    }

    pub fn n_fields(&self) -> usize {
        self.n_fields
    }

    /// Closest recorded ancestor of a cell created by refinement
    fn recorded_ancestor(&self, cell: &CellId) -> Option<(CellId, &Vec<[f64; 4]>)> {
        let mut current = cell.parent();
        while let Some(c) = current {
            if let Some(values) = self.snapshot.get(&c) {
                return Some((c, values));
            }
            current = c.parent();
        }
        None
    }

    /// Vertex values of every field on a cell of the adapted mesh
    fn cell_values(&self, disc: &Discretization, cell: &CellId) -> Result<Vec<[f64; 4]>> {
        // Unchanged
        if let Some(values) = self.snapshot.get(cell) {
            return Ok(values.clone());
        }

        // Refined: evaluate the ancestor's field at the new vertices
        if let Some((ancestor, values)) = self.recorded_ancestor(cell) {
            let mesh = disc.mesh();
            let geometry = mesh.cell_geometry(&ancestor);
            let shape = cell
                .vertices()
                .map(|key| disc.fe().shape_values(&geometry.to_reference(&mesh.vertex_position(&key))));
            return Ok(values
                .iter()
                .map(|v| {
                    shape.each_ref().map(|phi| {
                        phi.iter().zip(v.iter()).map(|(p, x)| p * x).sum::<f64>()
                    })
                })
                .collect());
        }

        // Coarsened: child k carries the parent's vertex k
        let children = cell.children();
        let recorded = children
            .iter()
            .map(|c| self.snapshot.get(c))
            .collect::<Option<Vec<_>>>()
            .ok_or(Error::MissingTransferData(*cell))?;
        Ok((0..self.n_fields)
            .map(|f| [0, 1, 2, 3].map(|k| recorded[k][f][k]))
            .collect())
    }

    /// Rebuild the fields on the new discretization, with hanging node
    /// constraints applied
    pub fn interpolate(self, disc: &Discretization) -> Result<Vec<VectorD>> {
        let mut fields = vec![VectorD::zeros(disc.n_dofs()); self.n_fields];
        for (k, cell) in disc.cells().iter().enumerate() {
            let values = self.cell_values(disc, cell)?;
            let dofs = disc.cell_dofs(k);
            for (field, v) in fields.iter_mut().zip(values.iter()) {
                for (&dof, &x) in dofs.iter().zip(v.iter()) {
                    field[dof] = x;
                }
            }
        }
        for field in fields.iter_mut() {
            disc.constraints().distribute(field);
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::functions::interpolate;
    use crate::mesh::Mesh;
    use approx::assert_relative_eq;

    fn bilinear(p: &Point2, _t: f64) -> f64 {
        1. + 2. * p.x - p.y + 0.5 * p.x * p.y
    }

    #[test]
    fn test_refinement_preserves_bilinear_fields() {
        let mut mesh = Mesh::hyper_cube(-1., 1.);
        mesh.refine_global(1);
        let disc = Discretization::distribute(mesh, 1).unwrap();
        let u = interpolate(&disc, &bilinear, 0.);
        let v = u.map(|x| -x);

        let transfer = SolutionTransfer::prepare(&disc, &[&u, &v]).unwrap();
        let mut mesh = disc.into_mesh();
        mesh.set_refine_flag(CellId::new(1, 0, 1));
        mesh.prepare_coarsening_and_refinement();
        mesh.execute_coarsening_and_refinement();
        let disc = Discretization::distribute(mesh, 1).unwrap();

        let fields = transfer.interpolate(&disc).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].len(), disc.n_dofs());

        // Bilinear on each old cell, so the refined cells see it exactly
        for (dof, p) in disc.support_points().iter().enumerate() {
            if !disc.constraints().is_constrained(dof) {
                assert_relative_eq!(fields[0][dof], bilinear(p, 0.), epsilon = 1e-14);
                assert_relative_eq!(fields[1][dof], -bilinear(p, 0.), epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_coarsening_takes_corner_values() {
        let mut mesh = Mesh::hyper_cube(-1., 1.);
        mesh.refine_global(2);
        let disc = Discretization::distribute(mesh, 1).unwrap();
        let u = interpolate(&disc, &|p: &Point2, _t: f64| p.x * p.x + p.y, 0.);

        let transfer = SolutionTransfer::prepare(&disc, &[&u]).unwrap();
        let mut mesh = disc.into_mesh();
        for c in CellId::new(1, 0, 0).children() {
            mesh.set_coarsen_flag(c);
        }
        mesh.prepare_coarsening_and_refinement();
        mesh.execute_coarsening_and_refinement();
        let disc = Discretization::distribute(mesh, 1).unwrap();
        let fields = transfer.interpolate(&disc).unwrap();

        // Vertices that survive keep their values
        for (dof, p) in disc.support_points().iter().enumerate() {
            if !disc.constraints().is_constrained(dof) {
                assert_relative_eq!(fields[0][dof], p.x * p.x + p.y, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_missing_data() {
        let mut mesh = Mesh::hyper_cube(-1., 1.);
        mesh.refine_global(2);
        let disc = Discretization::distribute(mesh, 1).unwrap();
        let transfer = SolutionTransfer::prepare(&disc, &[]).unwrap();

        // Two levels of coarsening are not covered by the snapshot
        let disc = Discretization::distribute(Mesh::hyper_cube(-1., 1.), 1).unwrap();
        assert!(matches!(
            transfer.interpolate(&disc),
            Err(Error::MissingTransferData(CellId::ROOT))
        ));
    }
}
