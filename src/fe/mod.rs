pub mod basis;
pub mod quadrature;

use crate::prelude::*;

use basis::LagrangeBasis;
use quadrature::QuadratureQuad;

//------------------------------------------------------------------------------
// Element
//------------------------------------------------------------------------------

/// Tensor-product Lagrange element Q_p on the reference square [-1, 1]^2.
///
/// Local shape functions are numbered with the x index running fastest, so
/// for Q_1 the four functions belong to the corners (-1,-1), (1,-1), (-1,1)
/// and (1,1) in that order.
#[derive(Debug, Clone)]
pub struct FeQ {
    basis: LagrangeBasis,
}

impl FeQ {
    pub fn new(degree: usize) -> Self {
        FeQ {
            basis: LagrangeBasis::equidistant(degree),
        }
    }

    pub fn degree(&self) -> usize {
        self.basis.len() - 1
    }

    pub fn dofs_per_cell(&self) -> usize {
        self.basis.len() * self.basis.len()
    }

    /// Reference coordinates of the node carrying local shape function k
    pub fn unit_support_point(&self, k: usize) -> Point2 {
        let n = self.basis.len();
        Point2::new(self.basis.nodes[k % n], self.basis.nodes[k / n])
    }

    pub fn shape_values(&self, xi: &Point2) -> Vec<f64> {
        let vx = self.basis.values(xi.x);
        let vy = self.basis.values(xi.y);
        vy.iter()
            .cartesian_product(vx.iter())
            .map(|(&y, &x)| x * y)
            .collect()
    }

    /// Gradients with respect to the reference coordinates
    pub fn shape_gradients(&self, xi: &Point2) -> Vec<Vector2> {
        let vx = self.basis.values(xi.x);
        let vy = self.basis.values(xi.y);
        let dx = self.basis.derivatives(xi.x);
        let dy = self.basis.derivatives(xi.y);
        izip!(vy.iter(), dy.iter())
            .cartesian_product(izip!(vx.iter(), dx.iter()).collect_vec())
            .map(|((&y, &y_d), (&x, &x_d))| Vector2::new(x_d * y, x * y_d))
            .collect()
    }

    /// Tabulate shape functions at the points of a reference quadrature rule
    pub fn values(&self, quadrature: &QuadratureQuad) -> FeValues {
        let n = self.dofs_per_cell();
        let nq = quadrature.len();
        let mut shape_values = MatrixNxQ::zeros(n, nq);
        let mut shape_grad_x = MatrixNxQ::zeros(n, nq);
        let mut shape_grad_y = MatrixNxQ::zeros(n, nq);
        for (q, xi) in quadrature.points.iter().enumerate() {
            for (k, (v, g)) in self
                .shape_values(xi)
                .into_iter()
                .zip(self.shape_gradients(xi))
                .enumerate()
            {
                shape_values[(k, q)] = v;
                shape_grad_x[(k, q)] = g.x;
                shape_grad_y[(k, q)] = g.y;
            }
        }
        FeValues {
            points: quadrature.points.clone(),
            weights: VectorQ::from_column_slice(&quadrature.weights),
            shape_values,
            shape_grad_x,
            shape_grad_y,
        }
    }
}

/// Shape function values and reference gradients at quadrature points [nn x nq]
#[derive(Debug, Clone)]
pub struct FeValues {
    pub points: Vec<Point2>,
    pub weights: VectorQ,
    pub shape_values: MatrixNxQ,
    pub shape_grad_x: MatrixNxQ,
    pub shape_grad_y: MatrixNxQ,
}

impl FeValues {
    pub fn n_quadrature_points(&self) -> usize {
        self.weights.len()
    }

    pub fn dofs_per_cell(&self) -> usize {
        self.shape_values.nrows()
    }
}
