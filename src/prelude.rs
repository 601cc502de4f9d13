pub use itertools::{izip, Itertools};

pub use crate::error::{Error, Result};

//------------------------------------------------------------------------------
// Types
//------------------------------------------------------------------------------

/// Point in the plane
pub type Point2 = nalgebra::Point2<f64>;

pub type Vector2 = nalgebra::Vector2<f64>;

/// Matrix (Shape functions x Quadrature points)
pub type MatrixNxQ = nalgebra::OMatrix<f64, nalgebra::Dyn, nalgebra::Dyn>;

/// Column vector (Degrees of Freedom)
pub type VectorD = nalgebra::DVector<f64>;

/// Column vector (Quadrature Points)
pub type VectorQ = nalgebra::DVector<f64>;

/// Sparse operator over the degrees of freedom
pub type SparseMatrix = nalgebra_sparse::CsrMatrix<f64>;

/// Sparse operator under construction
pub type TripletMatrix = nalgebra_sparse::CooMatrix<f64>;

//------------------------------------------------------------------------------
// Traits
//------------------------------------------------------------------------------

pub trait SparseMatrixExt {
    fn matrix_norm_square(&self, v: &VectorD) -> f64;
    fn diagonal_entry(&self, i: usize) -> f64;
    fn mean_abs_diagonal(&self) -> f64;
}

impl SparseMatrixExt for SparseMatrix {
    /// Quadratic form v^T A v
    fn matrix_norm_square(&self, v: &VectorD) -> f64 {
        v.dot(&(self * v))
    }

    fn diagonal_entry(&self, i: usize) -> f64 {
        let row = self.row(i);
        row.col_indices()
            .iter()
            .zip(row.values())
            .find(|(j, _)| **j == i)
            .map_or(0., |(_, &a)| a)
    }

    fn mean_abs_diagonal(&self) -> f64 {
        let n = self.nrows();
        if n == 0 {
            return 1.;
        }
        let mean = (0..n).map(|i| self.diagonal_entry(i).abs()).sum::<f64>() / n as f64;
        if mean == 0. {
            1.
        } else {
            mean
        }
    }
}

/// Linear combination `a + s * b` of two operators on the same index space
pub fn add_scaled(a: &SparseMatrix, s: f64, b: &SparseMatrix) -> SparseMatrix {
    a + &(b * s)
}
