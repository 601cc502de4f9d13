//! Degree of freedom numbering on an adapted mesh.

pub mod constraints;

use std::collections::{BTreeMap, BTreeSet};

use crate::fe::FeQ;
use crate::mesh::{CellId, Face, Mesh, Neighbor, VertexKey};
use crate::prelude::*;

pub use constraints::AffineConstraints;

/// Boundary indicator of the whole boundary of the square domain
pub const BOUNDARY_ID: u32 = 0;

/// Continuous Q1 space over the active cells of a mesh.
///
/// Owns the mesh it was distributed on; the mesh can only change after the
/// discretization is consumed with `into_mesh`, so a space and its mesh can
/// never disagree.
#[derive(Debug, Clone)]
pub struct Discretization {
    mesh: Mesh,
    fe: FeQ,
    cells: Vec<CellId>,
    cell_index: BTreeMap<CellId, usize>,
    cell_dofs: Vec<[usize; 4]>,
    vertex_dofs: BTreeMap<VertexKey, usize>,
    support_points: Vec<Point2>,
    boundary_dofs: BTreeSet<usize>,
    constraints: AffineConstraints,
}

impl Discretization {
    /// Number the vertices of all active cells and collect hanging node constraints
    pub fn distribute(mesh: Mesh, degree: usize) -> Result<Self> {
        if degree != 1 {
            return Err(Error::UnsupportedDegree(degree));
        }
        let fe = FeQ::new(degree);

        let cells = mesh.active_cells().collect_vec();
        let cell_index = cells.iter().enumerate().map(|(k, &c)| (c, k)).collect();

        // Dofs in order of first appearance over the sorted active cells
        let mut vertex_dofs: BTreeMap<VertexKey, usize> = BTreeMap::new();
        let mut support_points = vec![];
        let cell_dofs = cells
            .iter()
            .map(|cell| {
                cell.vertices().map(|key| {
                    let n = vertex_dofs.len();
                    *vertex_dofs.entry(key).or_insert_with(|| {
                        support_points.push(mesh.vertex_position(&key));
                        n
                    })
                })
            })
            .collect_vec();

        let boundary_dofs = vertex_dofs
            .iter()
            .filter(|(key, _)| mesh.is_boundary_vertex(key))
            .map(|(_, &dof)| dof)
            .collect();

        // Face midpoints of cells with finer neighbors are hanging
        let mut constraints = AffineConstraints::new();
        for cell in cells.iter() {
            for face in Face::ALL {
                if let Neighbor::Children(_) = mesh.neighbor(cell, face) {
                    let midpoint = cell.face_midpoint(face);
                    let Some(&hanging) = vertex_dofs.get(&midpoint) else {
                        continue;
                    };
                    let [a, b] = face.vertices().map(|k| vertex_dofs[&cell.vertex(k)]);
                    constraints.add_line(hanging, vec![(a, 0.5), (b, 0.5)]);
                }
            }
        }
        constraints.close()?;

        log::debug!(
            "distributed {} dofs on {} cells with {} hanging node constraints",
            vertex_dofs.len(),
            cells.len(),
            constraints.n_constraints()
        );

        Ok(Discretization {
            mesh,
            fe,
            cells,
            cell_index,
            cell_dofs,
            vertex_dofs,
            support_points,
            boundary_dofs,
            constraints,
        })
    }

    pub fn n_dofs(&self) -> usize {
        self.vertex_dofs.len()
    }

    pub fn n_active_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Give up the numbering to adapt the mesh
    pub fn into_mesh(self) -> Mesh {
        self.mesh
    }

    pub fn fe(&self) -> &FeQ {
        &self.fe
    }

    /// Active cells in the order used for per-cell quantities
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    pub fn cell_index(&self, cell: &CellId) -> Option<usize> {
        self.cell_index.get(cell).copied()
    }

    /// Global dofs of a cell's vertices in local vertex order
    pub fn cell_dofs(&self, k: usize) -> &[usize; 4] {
        &self.cell_dofs[k]
    }

    pub fn vertex_dof(&self, key: &VertexKey) -> Option<usize> {
        self.vertex_dofs.get(key).copied()
    }

    pub fn support_points(&self) -> &[Point2] {
        &self.support_points
    }

    /// Dofs on the boundary with the given indicator
    pub fn boundary_dofs(&self, boundary_id: u32) -> impl Iterator<Item = usize> + '_ {
        self.boundary_dofs
            .iter()
            .copied()
            .filter(move |_| boundary_id == BOUNDARY_ID)
    }

    pub fn constraints(&self) -> &AffineConstraints {
        &self.constraints
    }

    /// Local coefficients of a global vector on cell k
    pub fn cell_values(&self, k: usize, v: &VectorD) -> [f64; 4] {
        self.cell_dofs[k].map(|dof| v[dof])
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    fn locally_refined() -> Mesh {
        let mut mesh = Mesh::hyper_cube(0., 1.);
        mesh.refine_global(1);
        mesh.set_refine_flag(CellId::new(1, 0, 0));
        mesh.prepare_coarsening_and_refinement();
        mesh.execute_coarsening_and_refinement();
        mesh
    }

    #[test]
    fn test_uniform_numbering() {
        let mut mesh = Mesh::hyper_cube(-1., 1.);
        mesh.refine_global(2);
        let disc = Discretization::distribute(mesh, 1).unwrap();
        assert_eq!(disc.n_dofs(), 25);
        assert_eq!(disc.n_active_cells(), 16);
        assert_eq!(disc.boundary_dofs(BOUNDARY_ID).count(), 16);
        assert_eq!(disc.boundary_dofs(1).count(), 0);
        assert_eq!(disc.constraints().n_constraints(), 0);

        // Neighboring cells share the dofs of their common face
        let left = disc.cell_dofs(disc.cell_index(&CellId::new(2, 0, 0)).unwrap());
        let right = disc.cell_dofs(disc.cell_index(&CellId::new(2, 1, 0)).unwrap());
        assert_eq!(left[1], right[0]);
        assert_eq!(left[3], right[2]);
    }

    #[test]
    fn test_hanging_nodes() {
        let disc = Discretization::distribute(locally_refined(), 1).unwrap();
        assert_eq!(disc.n_active_cells(), 7);
        assert_eq!(disc.n_dofs(), 9 + 2 + 3);

        // Two hanging nodes on the faces shared with the coarse neighbors
        let c = disc.constraints();
        assert_eq!(c.n_constraints(), 2);
        let coarse = CellId::new(1, 1, 0);
        let hanging = disc.vertex_dof(&coarse.face_midpoint(Face::Left)).unwrap();
        let [a, b] = [0, 2].map(|k| disc.vertex_dof(&coarse.vertex(k)).unwrap());
        assert_eq!(c.line(hanging).unwrap(), &[(a.min(b), 0.5), (a.max(b), 0.5)]);

        // A linear function is reproduced on hanging nodes
        let mut v = VectorD::from_iterator(
            disc.n_dofs(),
            disc.support_points().iter().map(|p| 2. * p.x - p.y),
        );
        let exact = v.clone();
        v[hanging] = 100.;
        c.distribute(&mut v);
        assert_relative_eq!(v, exact, epsilon = 1e-14);
    }

    #[test]
    fn test_unsupported_degree() {
        let mesh = Mesh::hyper_cube(0., 1.);
        assert!(matches!(
            Discretization::distribute(mesh, 2),
            Err(Error::UnsupportedDegree(2))
        ));
    }

    #[test]
    fn test_into_mesh_roundtrip() {
        let disc = Discretization::distribute(locally_refined(), 1).unwrap();
        let mesh = disc.into_mesh();
        assert_eq!(mesh.n_active_cells(), 7);
    }
}
