//! Crate-wide error type.

use thiserror::Error;

use crate::mesh::CellId;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up or integrating a wave problem.
#[derive(Debug, Error)]
pub enum Error {
    /// Iterative solve did not reach the residual tolerance within its budget.
    #[error("{equation}-equation: no convergence after {iterations} CG iterations (residual {residual:e}, tolerance {tolerance:e})")]
    NoConvergence {
        equation: &'static str,
        iterations: usize,
        residual: f64,
        tolerance: f64,
    },
    /// Conjugate gradient search direction has vanishing curvature.
    #[error("{equation}-equation: CG breakdown at iteration {iteration}")]
    Breakdown {
        equation: &'static str,
        iteration: usize,
    },
    /// A vector or operator does not match the degree-of-freedom count.
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("finite element degree {0} is not supported (only degree 1)")]
    UnsupportedDegree(usize),
    /// No snapshot data covers a cell of the new mesh.
    #[error("no transferable data for cell {0:?}")]
    MissingTransferData(CellId),
    #[error("hanging node constraints on dof {0} form a cycle")]
    ConstraintCycle(usize),
    #[error("failed to write output: {0}")]
    Output(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
