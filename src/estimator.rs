//! Gradient jump error indicator.

use crate::dofs::Discretization;
use crate::fe::quadrature::Quadrature;
use crate::mesh::{CellId, Face, Neighbor};
use crate::prelude::*;

/// Physical gradient of the discrete field on a cell at a physical point
fn gradient(disc: &Discretization, cell: &CellId, u: &VectorD, p: &Point2) -> Vector2 {
    let Some(k) = disc.cell_index(cell) else {
        return Vector2::zeros();
    };
    let geometry = disc.mesh().cell_geometry(cell);
    let xi = geometry.to_reference(p);
    let values = disc.cell_values(k, u);
    disc.fe()
        .shape_gradients(&xi)
        .iter()
        .zip(values.iter())
        .fold(Vector2::zeros(), |acc, (g, &v)| acc + g * v)
        * geometry.gradient_scale()
}

/// Integral of the squared normal gradient jump over the part of a face
/// shared with one neighbor, running from `a` to `b`
fn face_jump(
    disc: &Discretization,
    quadrature: &Quadrature,
    (cell, neighbor): (&CellId, &CellId),
    face: Face,
    u: &VectorD,
    (a, b): (Point2, Point2),
) -> f64 {
    let normal = face.normal();
    let half_length = (b - a).norm() / 2.;
    izip!(quadrature.points.iter(), quadrature.weights.iter())
        .map(|(&s, &w)| {
            let p = a + (b - a) * ((s + 1.) / 2.);
            let jump = (gradient(disc, cell, u, &p) - gradient(disc, neighbor, u, &p)).dot(&normal);
            w * half_length * jump * jump
        })
        .sum()
}

/// Kelly error indicator per active cell, in the order of `Mesh::active_cells`.
///
/// `eta_K^2 = h_K / 24 * sum_F int_F [du/dn]^2` over the interior faces of K,
/// with `h_K` the cell diameter. Boundary faces contribute nothing.
pub fn kelly_error_estimate(disc: &Discretization, u: &VectorD) -> Result<Vec<f64>> {
    if u.len() != disc.n_dofs() {
        return Err(Error::DimensionMismatch {
            what: "estimated field",
            expected: disc.n_dofs(),
            found: u.len(),
        });
    }
    let quadrature = Quadrature::gauss(disc.fe().degree() + 1);
    let mesh = disc.mesh();

    let errors = disc
        .cells()
        .iter()
        .map(|cell| {
            let geometry = mesh.cell_geometry(cell);
            let face_points = |c: &CellId, face: Face| -> (Point2, Point2) {
                let [va, vb] = face.vertices().map(|k| mesh.vertex_position(&c.vertex(k)));
                (va, vb)
            };
            let sum: f64 = Face::ALL
                .iter()
                .map(|&face| match mesh.neighbor(cell, face) {
                    Neighbor::Boundary => 0.,
                    Neighbor::Cell(other) => {
                        // A coarser neighbor is evaluated over this cell's face only
                        face_jump(disc, &quadrature, (cell, &other), face, u, face_points(cell, face))
                    }
                    Neighbor::Children(children) => children
                        .iter()
                        .map(|child| {
                            let segment = face_points(child, face.opposite());
                            face_jump(disc, &quadrature, (cell, child), face, u, segment)
                        })
                        .sum::<f64>(),
                })
                .sum();
            (geometry.diameter() / 24. * sum).sqrt()
        })
        .collect_vec();

    log::trace!(
        "kelly estimate on {} cells, max indicator {:e}",
        errors.len(),
        errors.iter().copied().fold(0., f64::max)
    );
    Ok(errors)
}
