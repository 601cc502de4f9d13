use crate::prelude::*;

/// One-dimensional rule on the reference interval [-1, 1]
pub struct Quadrature {
    pub points: VectorQ,
    pub weights: VectorQ,
}

impl Quadrature {
    pub fn gauss(order: usize) -> Self {
        let gl_rule = gauss_quad::GaussLegendre::init(order);
        Quadrature {
            points: VectorQ::from_iterator(order, gl_rule.nodes.into_iter().rev()),
            weights: VectorQ::from_iterator(order, gl_rule.weights.into_iter().rev()),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Tensor product rule on the reference square [-1, 1]^2, x running fastest
    pub fn tensor(&self) -> QuadratureQuad {
        let (points, weights) = self
            .points
            .iter()
            .zip(self.weights.iter())
            .cartesian_product(self.points.iter().zip(self.weights.iter()))
            .map(|((&y, &wy), (&x, &wx))| (Point2::new(x, y), wx * wy))
            .unzip();
        QuadratureQuad { points, weights }
    }
}

/// Rule on the reference square [-1, 1]^2
pub struct QuadratureQuad {
    pub points: Vec<Point2>,
    pub weights: Vec<f64>,
}

impl QuadratureQuad {
    pub fn gauss(order: usize) -> Self {
        Quadrature::gauss(order).tensor()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
