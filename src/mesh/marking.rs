//! Error-driven flagging of cells for refinement and coarsening.

use crate::mesh::{Mesh, RefinementFlag};
use crate::prelude::*;

/// Flag the cells carrying the largest `top_fraction` of the total error for
/// refinement and those carrying the smallest `bottom_fraction` for coarsening.
///
/// `criteria` holds one non-negative indicator per active cell, in the order
/// of `Mesh::active_cells`.
pub fn refine_and_coarsen_fixed_fraction(
    mesh: &mut Mesh,
    criteria: &[f64],
    top_fraction: f64,
    bottom_fraction: f64,
) -> Result<()> {
    if criteria.len() != mesh.n_active_cells() {
        return Err(Error::DimensionMismatch {
            what: "error indicators",
            expected: mesh.n_active_cells(),
            found: criteria.len(),
        });
    }
    let total: f64 = criteria.iter().sum();
    if !(total > 0.) {
        return Ok(());
    }

    // Cells by descending error
    let order = (0..criteria.len())
        .sorted_by(|&a, &b| criteria[b].total_cmp(&criteria[a]))
        .collect_vec();

    // Smallest error among the cells that make up the top fraction
    let mut sum = 0.;
    let mut refine_threshold = f64::INFINITY;
    for &k in order.iter() {
        if sum >= top_fraction * total {
            break;
        }
        sum += criteria[k];
        refine_threshold = criteria[k];
    }

    // Largest error among the cells that make up the bottom fraction
    let mut sum = 0.;
    let mut coarsen_threshold = f64::NEG_INFINITY;
    for &k in order.iter().rev() {
        if sum + criteria[k] > bottom_fraction * total {
            break;
        }
        sum += criteria[k];
        coarsen_threshold = criteria[k];
    }

    let cells = mesh.active_cells().collect_vec();
    for (cell, &error) in cells.into_iter().zip(criteria.iter()) {
        if error >= refine_threshold && error > 0. {
            mesh.set_refine_flag(cell);
        } else if error <= coarsen_threshold {
            mesh.set_coarsen_flag(cell);
        }
    }
    log::debug!(
        "fixed fraction marking: refine threshold {:e}, coarsen threshold {:e}, {} refine / {} coarsen flags",
        refine_threshold,
        coarsen_threshold,
        mesh.n_refine_flags(),
        mesh.n_coarsen_flags()
    );
    Ok(())
}

/// Keep adaptation within [min_level, max_level]
pub fn clamp_levels(mesh: &mut Mesh, min_level: usize, max_level: usize) {
    let cells = mesh.active_cells().collect_vec();
    for cell in cells {
        let level = cell.level as usize;
        match mesh.flag(&cell) {
            Some(RefinementFlag::Refine) if level >= max_level => mesh.clear_refine_flag(&cell),
            Some(RefinementFlag::Coarsen) if level <= min_level => mesh.clear_coarsen_flag(&cell),
            _ => {}
        }
    }
}

/// Mark by fixed fractions, clamp to the level bounds and adapt the mesh
pub fn mark_and_refine(
    mut mesh: Mesh,
    errors: &[f64],
    refine_fraction: f64,
    coarsen_fraction: f64,
    (min_level, max_level): (usize, usize),
) -> Result<Mesh> {
    refine_and_coarsen_fixed_fraction(&mut mesh, errors, refine_fraction, coarsen_fraction)?;
    clamp_levels(&mut mesh, min_level, max_level);
    mesh.prepare_coarsening_and_refinement();
    mesh.execute_coarsening_and_refinement();
    Ok(mesh)
}
