//! Run configuration, loadable from JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::mesh::MAX_LEVEL;
use crate::prelude::*;

/// Field whose error indicator drives mesh adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedField {
    Displacement,
    Velocity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Tolerance relative to the l2 norm of the right-hand side
    pub relative_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iterations: 1000,
            relative_tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            enabled: true,
            directory: PathBuf::from("solution"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time step size (fixed for the run)
    pub time_step: f64,
    /// Damping constant `c` in `theta = 0.5 + c * dt`
    pub theta_damping: f64,
    /// Simulation horizon
    pub final_time: f64,
    pub domain_lower: f64,
    pub domain_upper: f64,
    pub fe_degree: usize,
    pub initial_global_refinement: usize,
    pub n_adaptive_pre_refinement_steps: usize,
    /// Refine every n-th completed step after the pre-refinement phase (0 disables)
    pub refinement_interval: usize,
    pub refine_fraction: f64,
    pub coarsen_fraction: f64,
    pub estimated_field: EstimatedField,
    pub solver: SolverConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            time_step: 1. / 64.,
            theta_damping: 50.,
            final_time: 5.,
            domain_lower: -1.,
            domain_upper: 1.,
            fe_degree: 1,
            initial_global_refinement: 4,
            n_adaptive_pre_refinement_steps: 4,
            refinement_interval: 5,
            refine_fraction: 0.6,
            coarsen_fraction: 0.4,
            estimated_field: EstimatedField::Displacement,
            solver: SolverConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        if !(self.time_step > 0.) {
            return invalid(format!("time_step must be positive, got {}", self.time_step));
        }
        if !(self.theta_damping > 0.) {
            return invalid(format!(
                "theta_damping must be positive, got {}",
                self.theta_damping
            ));
        }
        if !(self.final_time > 0.) {
            return invalid(format!("final_time must be positive, got {}", self.final_time));
        }
        if !(self.domain_upper > self.domain_lower) {
            return invalid(format!(
                "empty domain [{}, {}]",
                self.domain_lower, self.domain_upper
            ));
        }
        if self.max_level() > MAX_LEVEL as usize {
            return invalid(format!(
                "initial_global_refinement {} plus {} pre-refinement steps exceeds the finest level {}",
                self.initial_global_refinement, self.n_adaptive_pre_refinement_steps, MAX_LEVEL
            ));
        }
        if self.fe_degree != 1 {
            return Err(Error::UnsupportedDegree(self.fe_degree));
        }
        let fraction = 0.0..=1.0;
        if !fraction.contains(&self.refine_fraction)
            || !fraction.contains(&self.coarsen_fraction)
            || self.refine_fraction + self.coarsen_fraction > 1.
        {
            return invalid(format!(
                "refine/coarsen fractions {}/{} must lie in [0, 1] and sum to at most 1",
                self.refine_fraction, self.coarsen_fraction
            ));
        }
        if self.solver.max_iterations == 0 || !(self.solver.relative_tolerance > 0.) {
            return invalid("solver needs a positive iteration budget and tolerance".to_string());
        }
        Ok(())
    }

    pub fn theta(&self) -> f64 {
        0.5 + self.theta_damping * self.time_step
    }

    /// Coarsest level adaptation may return to
    pub fn min_level(&self) -> usize {
        self.initial_global_refinement
    }

    /// Finest level adaptation may reach
    pub fn max_level(&self) -> usize {
        self.initial_global_refinement
            .saturating_add(self.n_adaptive_pre_refinement_steps)
    }
}
