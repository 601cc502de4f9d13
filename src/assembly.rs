//! Global mass and Laplace operators and load vectors.
#![allow(non_snake_case)]

use std::collections::BTreeMap;

use crate::dofs::Discretization;
use crate::fe::quadrature::QuadratureQuad;
use crate::fe::FeValues;
use crate::functions::Function;
use crate::prelude::*;

/// Gauss rule exact for the element's mass matrix
fn cell_quadrature(disc: &Discretization) -> QuadratureQuad {
    QuadratureQuad::gauss(disc.fe().degree() + 1)
}

/// Add local matrices of every cell into a global operator
fn assemble_matrix(
    disc: &Discretization,
    local: impl Fn(&FeValues, f64, f64) -> MatrixNxQ,
) -> SparseMatrix {
    let n = disc.n_dofs();
    let fv = disc.fe().values(&cell_quadrature(disc));
    let mut coo = TripletMatrix::new(n, n);
    for (k, cell) in disc.cells().iter().enumerate() {
        let geometry = disc.mesh().cell_geometry(cell);
        let Ke = local(&fv, geometry.jacobian(), geometry.gradient_scale());
        let dofs = disc.cell_dofs(k);
        for (i, &gi) in dofs.iter().enumerate() {
            for (j, &gj) in dofs.iter().enumerate() {
                coo.push(gi, gj, Ke[(i, j)]);
            }
        }
    }
    SparseMatrix::from(&coo)
}

/// Mass matrix `M_ij = (phi_i, phi_j)`
pub fn assemble_mass(disc: &Discretization) -> SparseMatrix {
    assemble_matrix(disc, |fv, jacobian, _| {
        let nn = fv.dofs_per_cell();
        let mut Me = MatrixNxQ::zeros(nn, nn);
        for q in 0..fv.n_quadrature_points() {
            let JxW = fv.weights[q] * jacobian;
            for i in 0..nn {
                for j in 0..nn {
                    Me[(i, j)] += fv.shape_values[(i, q)] * fv.shape_values[(j, q)] * JxW;
                }
            }
        }
        Me
    })
}

/// Laplace matrix `A_ij = (grad phi_i, grad phi_j)`
pub fn assemble_laplace(disc: &Discretization) -> SparseMatrix {
    assemble_matrix(disc, |fv, jacobian, scale| {
        let nn = fv.dofs_per_cell();
        let mut Ae = MatrixNxQ::zeros(nn, nn);
        for q in 0..fv.n_quadrature_points() {
            let JxW = fv.weights[q] * jacobian;
            for i in 0..nn {
                for j in 0..nn {
                    let grad_dot = fv.shape_grad_x[(i, q)] * fv.shape_grad_x[(j, q)]
                        + fv.shape_grad_y[(i, q)] * fv.shape_grad_y[(j, q)];
                    Ae[(i, j)] += grad_dot * scale * scale * JxW;
                }
            }
        }
        Ae
    })
}

/// Load vector `F_i = (f(t), phi_i)`
pub fn assemble_rhs(disc: &Discretization, f: &dyn Function, t: f64) -> VectorD {
    let fv = disc.fe().values(&cell_quadrature(disc));
    let mut F = VectorD::zeros(disc.n_dofs());
    for (k, cell) in disc.cells().iter().enumerate() {
        let geometry = disc.mesh().cell_geometry(cell);
        let dofs = disc.cell_dofs(k);
        for (q, xi) in fv.points.iter().enumerate() {
            let JxW = fv.weights[q] * geometry.jacobian();
            let value = f.value(&geometry.to_physical(xi), t);
            if value == 0. {
                continue;
            }
            for (i, &gi) in dofs.iter().enumerate() {
                F[gi] += fv.shape_values[(i, q)] * value * JxW;
            }
        }
    }
    F
}

/// Impose Dirichlet values on a linear system.
///
/// Rows and columns of constrained dofs are eliminated, keeping the diagonal,
/// so the returned operator stays symmetric. The solution vector receives the
/// boundary values, which also makes it a consistent initial guess.
pub fn apply_boundary_values(
    boundary_values: &BTreeMap<usize, f64>,
    matrix: &SparseMatrix,
    solution: &mut VectorD,
    rhs: &mut VectorD,
) -> SparseMatrix {
    let n = matrix.nrows();
    for (&dof, &value) in boundary_values.iter() {
        solution[dof] = value;
    }

    // Move known columns to the right hand side
    let mut coo = TripletMatrix::new(n, n);
    for (i, j, &a) in matrix.triplet_iter() {
        let fixed_i = boundary_values.contains_key(&i);
        match boundary_values.get(&j) {
            Some(&g) if i != j => {
                if !fixed_i {
                    rhs[i] -= a * g;
                }
            }
            _ if fixed_i && i != j => {}
            _ => coo.push(i, j, a),
        }
    }

    for (&dof, &value) in boundary_values.iter() {
        let mut d = matrix.diagonal_entry(dof);
        if d == 0. {
            d = matrix.mean_abs_diagonal();
            coo.push(dof, dof, d);
        }
        rhs[dof] = d * value;
    }
    SparseMatrix::from(&coo)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::dofs::BOUNDARY_ID;
    use crate::functions::interpolate;
    use crate::mesh::{CellId, Mesh};
    use approx::assert_relative_eq;

    fn discretization(level: usize) -> Discretization {
        let mut mesh = Mesh::hyper_cube(-1., 1.);
        mesh.refine_global(level);
        Discretization::distribute(mesh, 1).unwrap()
    }

    #[test]
    fn test_mass_integrates_area() {
        let disc = discretization(2);
        let M = assemble_mass(&disc);
        let ones = VectorD::from_element(disc.n_dofs(), 1.);
        assert_relative_eq!(M.matrix_norm_square(&ones), 4., epsilon = 1e-13);
    }

    #[test]
    fn test_laplace_energy_of_linear_function() {
        let disc = discretization(3);
        let A = assemble_laplace(&disc);

        // Constants are in the kernel
        let ones = VectorD::from_element(disc.n_dofs(), 1.);
        assert_relative_eq!((&A * &ones).norm(), 0., epsilon = 1e-12);

        // |grad (2x + y)|^2 over the square of area 4
        let u = interpolate(&disc, &|p: &Point2, _t: f64| 2. * p.x + p.y, 0.);
        assert_relative_eq!(A.matrix_norm_square(&u), 20., epsilon = 1e-12);
    }

    #[test]
    fn test_rhs_of_constant_load() {
        let disc = discretization(2);
        let F = assemble_rhs(&disc, &|_p: &Point2, t: f64| t, 3.);
        assert_relative_eq!(F.sum(), 12., epsilon = 1e-13);
    }

    #[test]
    fn test_locally_refined_mass() {
        let mut mesh = Mesh::hyper_cube(-1., 1.);
        mesh.refine_global(1);
        mesh.set_refine_flag(CellId::new(1, 0, 0));
        mesh.prepare_coarsening_and_refinement();
        mesh.execute_coarsening_and_refinement();
        let disc = Discretization::distribute(mesh, 1).unwrap();
        let M = assemble_mass(&disc);

        // Area is still exact after condensing out the hanging nodes
        let (Mc, _) = disc.constraints().condense(&M, &VectorD::zeros(disc.n_dofs()));
        let mut ones = VectorD::from_element(disc.n_dofs(), 1.);
        for dof in 0..disc.n_dofs() {
            if disc.constraints().is_constrained(dof) {
                ones[dof] = 0.;
            }
        }
        assert_eq!(disc.constraints().n_constraints(), 2);
        assert_relative_eq!(Mc.matrix_norm_square(&ones), 4., epsilon = 1e-13);
    }

    #[test]
    fn test_apply_boundary_values() {
        let disc = discretization(2);
        let A = assemble_laplace(&disc);
        let values = disc.boundary_dofs(BOUNDARY_ID).map(|dof| (dof, 1.)).collect();
        let mut u = VectorD::zeros(disc.n_dofs());
        let mut rhs = VectorD::zeros(disc.n_dofs());
        let K = apply_boundary_values(&values, &A, &mut u, &mut rhs);

        // Symmetric, and the constant 1 solves the modified system
        for (i, j, &a) in K.triplet_iter() {
            assert_relative_eq!(a, K.get_entry(j, i).unwrap().into_value(), epsilon = 1e-14);
        }
        let ones = VectorD::from_element(disc.n_dofs(), 1.);
        assert_relative_eq!(&K * &ones, rhs, epsilon = 1e-12);
        for dof in disc.boundary_dofs(BOUNDARY_ID) {
            assert_eq!(u[dof], 1.);
        }
    }
}
