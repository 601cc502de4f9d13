//------------------------------------------------------------------------------
// Lagrange Basis
//------------------------------------------------------------------------------

/// One-dimensional Lagrange basis over a set of distinct nodes
#[derive(Debug, Clone)]
pub struct LagrangeBasis {
    pub nodes: Vec<f64>,
}

impl LagrangeBasis {
    pub fn new(nodes: Vec<f64>) -> Self {
        LagrangeBasis { nodes }
    }

    /// Basis on equally spaced nodes over [-1, 1], endpoints included
    pub fn equidistant(degree: usize) -> Self {
        if degree == 0 {
            return Self::new(vec![0.]);
        }
        Self::new(
            (0..=degree)
                .map(|k| -1. + 2. * k as f64 / degree as f64)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Value of every basis polynomial at x
    pub fn values(&self, x: f64) -> Vec<f64> {
        (0..self.len())
            .map(|j| {
                self.others(j)
                    .map(|m| (x - self.nodes[m]) / (self.nodes[j] - self.nodes[m]))
                    .product()
            })
            .collect()
    }

    /// Derivative of every basis polynomial at x
    pub fn derivatives(&self, x: f64) -> Vec<f64> {
        (0..self.len())
            .map(|j| {
                self.others(j)
                    .map(|i| {
                        let inner: f64 = self
                            .others(j)
                            .filter(|&m| m != i)
                            .map(|m| (x - self.nodes[m]) / (self.nodes[j] - self.nodes[m]))
                            .product();
                        inner / (self.nodes[j] - self.nodes[i])
                    })
                    .sum()
            })
            .collect()
    }

    fn others(&self, j: usize) -> impl Iterator<Item = usize> {
        (0..self.nodes.len()).filter(move |&m| m != j)
    }
}
