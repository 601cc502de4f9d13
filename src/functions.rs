//! Space-time functions for boundary data, initial values and forcing.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::dofs::Discretization;
use crate::prelude::*;

/// Scalar function of position and time
pub trait Function {
    fn value(&self, p: &Point2, t: f64) -> f64;
}

impl<F: Fn(&Point2, f64) -> f64> Function for F {
    fn value(&self, p: &Point2, t: f64) -> f64 {
        self(p, t)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroFunction;

impl Function for ZeroFunction {
    fn value(&self, _p: &Point2, _t: f64) -> f64 {
        0.
    }
}

//------------------------------------------------------------------------------
// Boundary pulse
//------------------------------------------------------------------------------

/// Duration of the boundary excitation
pub const PULSE_DURATION: f64 = 0.5;

/// The excitation acts on the part of the boundary with x < 0 and |y| < 1/3
fn pulse_active(p: &Point2, t: f64) -> bool {
    t <= PULSE_DURATION && p.x < 0. && p.y.abs() < 1. / 3.
}

/// Displacement `sin(4 pi t)` imposed on part of the boundary for the first half second
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryValuesU;

impl Function for BoundaryValuesU {
    fn value(&self, p: &Point2, t: f64) -> f64 {
        if pulse_active(p, t) {
            (4. * PI * t).sin()
        } else {
            0.
        }
    }
}

/// Time derivative of `BoundaryValuesU`
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryValuesV;

impl Function for BoundaryValuesV {
    fn value(&self, p: &Point2, t: f64) -> f64 {
        if pulse_active(p, t) {
            (4. * PI * t).cos() * 4. * PI
        } else {
            0.
        }
    }
}

/// Body force of the wave equation, zero for the boundary driven problem
#[derive(Debug, Clone, Copy, Default)]
pub struct RightHandSide;

impl Function for RightHandSide {
    fn value(&self, _p: &Point2, _t: f64) -> f64 {
        0.
    }
}

//------------------------------------------------------------------------------
// Interpolation
//------------------------------------------------------------------------------

/// Nodal interpolation of a function into the discrete space
pub fn interpolate(disc: &Discretization, f: &dyn Function, t: f64) -> VectorD {
    let mut v = VectorD::from_iterator(
        disc.n_dofs(),
        disc.support_points().iter().map(|p| f.value(p, t)),
    );
    disc.constraints().distribute(&mut v);
    v
}

/// Values of a function at the dofs on the given boundary
pub fn interpolate_boundary_values(
    disc: &Discretization,
    boundary_id: u32,
    f: &dyn Function,
    t: f64,
) -> BTreeMap<usize, f64> {
    let points = disc.support_points();
    disc.boundary_dofs(boundary_id)
        .map(|dof| (dof, f.value(&points[dof], t)))
        .collect()
}
