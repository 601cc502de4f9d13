use crate::config::SolverConfig;
use crate::prelude::*;

/// An iterative solver for sparse symmetric systems.
pub trait LinearSolver {
    /// Solve `op * solution = rhs`, starting from the incoming solution.
    /// Returns the number of iterations taken.
    fn solve(
        &mut self,
        op: &SparseMatrix,
        rhs: &VectorD,
        solution: &mut VectorD,
    ) -> std::result::Result<usize, SolveError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveError {
    Breakdown {
        iteration: usize,
    },
    FailedToConverge {
        iterations: usize,
        residual: f64,
        tolerance: f64,
    },
}

impl SolveError {
    /// Attach the name of the equation being solved
    pub fn into_error(self, equation: &'static str) -> Error {
        match self {
            SolveError::Breakdown { iteration } => Error::Breakdown {
                equation,
                iteration,
            },
            SolveError::FailedToConverge {
                iterations,
                residual,
                tolerance,
            } => Error::NoConvergence {
                equation,
                iterations,
                residual,
                tolerance,
            },
        }
    }
}

/// Unpreconditioned conjugate gradient method.
pub struct ConjugateGradient {
    max_iterations: usize,
    relative_tolerance: f64,
}

impl ConjugateGradient {
    pub fn new(config: &SolverConfig) -> Self {
        ConjugateGradient {
            max_iterations: config.max_iterations,
            relative_tolerance: config.relative_tolerance,
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn relative_tolerance(&self) -> f64 {
        self.relative_tolerance
    }
}

impl LinearSolver for ConjugateGradient {
    fn solve(
        &mut self,
        op: &SparseMatrix,
        rhs: &VectorD,
        solution: &mut VectorD,
    ) -> std::result::Result<usize, SolveError> {
        let tolerance = self.relative_tolerance * rhs.norm();

        // Initial residual
        let mut r: VectorD = rhs - op * &*solution;
        let mut residual = r.norm();
        if residual <= tolerance {
            return Ok(0);
        }

        // Identity preconditioner
        let mut p: VectorD = r.clone();
        let mut rho = r.dot(&r);

        for iter in 1..=self.max_iterations {
            let q = op * &p;
            let curvature = p.dot(&q);
            if curvature <= 0. || !curvature.is_finite() {
                return Err(SolveError::Breakdown { iteration: iter });
            }
            let alpha = rho / curvature;

            solution.axpy(alpha, &p, 1.);
            r.axpy(-alpha, &q, 1.);

            residual = r.norm();
            if residual <= tolerance {
                return Ok(iter);
            }

            let rho_next = r.dot(&r);
            let beta = rho_next / rho;
            rho = rho_next;
            p.axpy(1., &r, beta);
        }

        Err(SolveError::FailedToConverge {
            iterations: self.max_iterations,
            residual,
            tolerance,
        })
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    fn laplace_1d(n: usize) -> SparseMatrix {
        let mut coo = TripletMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 2.);
            if i > 0 {
                coo.push(i, i - 1, -1.);
            }
            if i + 1 < n {
                coo.push(i, i + 1, -1.);
            }
        }
        SparseMatrix::from(&coo)
    }

    #[test]
    fn test_cg_solves_spd_system() {
        let a = laplace_1d(20);
        let exact = VectorD::from_fn(20, |i, _| (i as f64 * 0.3).sin());
        let rhs = &a * &exact;
        let mut x = VectorD::zeros(20);
        let mut cg = ConjugateGradient::new(&SolverConfig::default());
        let iterations = cg.solve(&a, &rhs, &mut x).unwrap();

        assert!(iterations > 0 && iterations < 40);
        assert_relative_eq!(x, exact, epsilon = 1e-6);
    }

    #[test]
    fn test_cg_warm_start() {
        let a = laplace_1d(10);
        let exact = VectorD::from_fn(10, |i, _| 1. + i as f64);
        let rhs = &a * &exact;
        let mut cg = ConjugateGradient::new(&SolverConfig::default());

        let mut x = exact.clone();
        assert_eq!(cg.solve(&a, &rhs, &mut x), Ok(0));
        assert_eq!(x, exact);

        // A perturbed start converges back
        x[4] += 1.;
        assert!(cg.solve(&a, &rhs, &mut x).unwrap() > 0);
        assert_relative_eq!(x, exact, epsilon = 1e-6);
    }

    #[test]
    fn test_cg_zero_rhs() {
        let a = laplace_1d(5);
        let mut x = VectorD::zeros(5);
        let mut cg = ConjugateGradient::new(&SolverConfig::default());
        assert_eq!(cg.solve(&a, &VectorD::zeros(5), &mut x), Ok(0));
    }

    #[test]
    fn test_cg_iteration_budget() {
        let a = laplace_1d(50);
        let rhs = VectorD::from_element(50, 1.);
        let mut x = VectorD::zeros(50);
        let mut cg = ConjugateGradient::new(&SolverConfig {
            max_iterations: 3,
            relative_tolerance: 1e-12,
        });
        let err = cg.solve(&a, &rhs, &mut x).unwrap_err();
        assert!(matches!(err, SolveError::FailedToConverge { iterations: 3, .. }));
        assert!(matches!(
            err.into_error("U"),
            Error::NoConvergence { equation: "U", .. }
        ));
    }

    #[test]
    fn test_cg_breakdown_on_indefinite() {
        let mut coo = TripletMatrix::new(2, 2);
        coo.push(0, 0, 1.);
        coo.push(1, 1, -1.);
        let a = SparseMatrix::from(&coo);
        let mut x = VectorD::zeros(2);
        let mut cg = ConjugateGradient::new(&SolverConfig::default());
        let rhs = VectorD::from_vec(vec![1., 1.]);
        assert_eq!(
            cg.solve(&a, &rhs, &mut x),
            Err(SolveError::Breakdown { iteration: 1 })
        );
    }
}
