#![allow(non_snake_case)]

pub mod cg;

use std::collections::BTreeMap;

use crate::assembly::{apply_boundary_values, assemble_laplace, assemble_mass, assemble_rhs};
use crate::config::{Config, EstimatedField, SolverConfig};
use crate::dofs::{Discretization, BOUNDARY_ID};
use crate::estimator::kelly_error_estimate;
use crate::functions::{
    interpolate, interpolate_boundary_values, BoundaryValuesU, BoundaryValuesV, Function,
    RightHandSide, ZeroFunction,
};
use crate::mesh::marking::mark_and_refine;
use crate::mesh::Mesh;
use crate::output::{NullOutput, OutputSink, VtkOutput};
use crate::prelude::*;
use crate::transfer::SolutionTransfer;

use cg::{ConjugateGradient, LinearSolver};

//------------------------------------------------------------------------------
// Time
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeState {
    pub time: f64,  // current time
    pub dt: f64,    // time step
    pub step: usize, // step index, 0 before the first step
    pub theta: f64, // implicitness
}

impl TimeState {
    pub fn new(dt: f64, theta: f64) -> Self {
        TimeState {
            time: 0.,
            dt,
            step: 0,
            theta,
        }
    }

    pub fn reset(&mut self) {
        self.time = 0.;
        self.step = 0;
    }

    pub fn advance(&mut self) {
        self.time += self.dt;
        self.step += 1;
    }
}

/// Diagnostics of one completed time step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub time: f64,
    pub iterations_u: usize,
    pub iterations_v: usize,
    pub energy: f64,
    pub n_active_cells: usize,
    pub n_dofs: usize,
}

//------------------------------------------------------------------------------
// Refinement policy
//------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementAction {
    None,
    Refine,
    /// Refine, then integrate again from t = 0 on the new mesh
    RefineAndRestart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinementPolicy {
    pub max_pre_refinement: usize,
    /// Refine every n-th completed step, 0 disables
    pub interval: usize,
}

impl RefinementPolicy {
    pub fn decide(&self, step: usize, pre_refinement_step: usize) -> RefinementAction {
        if step == 1 && pre_refinement_step < self.max_pre_refinement {
            RefinementAction::RefineAndRestart
        } else if self.interval > 0 && step > 0 && step % self.interval == 0 {
            RefinementAction::Refine
        } else {
            RefinementAction::None
        }
    }
}

/// How a pass of the time loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    Restart,
}

//------------------------------------------------------------------------------
// Solver
//------------------------------------------------------------------------------

pub struct WaveSolver {
    config: Config,
    policy: RefinementPolicy,
    pub time: TimeState,
    pre_refinement_step: usize,

    disc: Discretization,
    M: SparseMatrix, // mass matrix
    A: SparseMatrix, // Laplace matrix

    U: VectorD,      // displacement
    V: VectorD,      // velocity
    U_prev: VectorD, // displacement at the previous step
    V_prev: VectorD, // velocity at the previous step

    initial_u: Box<dyn Function>,
    initial_v: Box<dyn Function>,
    boundary_u: Box<dyn Function>,
    boundary_v: Box<dyn Function>,
    rhs: Box<dyn Function>,
    output: Box<dyn OutputSink>,

    history: Vec<StepReport>,
}

impl WaveSolver {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let theta = config.theta();
        if theta > 1. {
            log::warn!(
                "theta = {} lies outside (0.5, 1], the scheme is strongly damped",
                theta
            );
        }

        let mut mesh = Mesh::hyper_cube(config.domain_lower, config.domain_upper);
        mesh.refine_global(config.initial_global_refinement);
        let (disc, M, A) = setup_system(mesh, config.fe_degree)?;
        let n = disc.n_dofs();

        let output: Box<dyn OutputSink> = if config.output.enabled {
            Box::new(VtkOutput::new(&config.output.directory))
        } else {
            Box::new(NullOutput)
        };

        Ok(WaveSolver {
            policy: RefinementPolicy {
                max_pre_refinement: config.n_adaptive_pre_refinement_steps,
                interval: config.refinement_interval,
            },
            time: TimeState::new(config.time_step, theta),
            pre_refinement_step: 0,
            disc,
            M,
            A,
            U: VectorD::zeros(n),
            V: VectorD::zeros(n),
            U_prev: VectorD::zeros(n),
            V_prev: VectorD::zeros(n),
            initial_u: Box::new(ZeroFunction),
            initial_v: Box::new(ZeroFunction),
            boundary_u: Box::new(BoundaryValuesU),
            boundary_v: Box::new(BoundaryValuesV),
            rhs: Box::new(RightHandSide),
            output,
            history: vec![],
            config,
        })
    }

    pub fn with_output(mut self, output: impl OutputSink + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn with_initial_values(
        mut self,
        u: impl Function + 'static,
        v: impl Function + 'static,
    ) -> Self {
        self.initial_u = Box::new(u);
        self.initial_v = Box::new(v);
        self
    }

    pub fn with_boundary_values(
        mut self,
        u: impl Function + 'static,
        v: impl Function + 'static,
    ) -> Self {
        self.boundary_u = Box::new(u);
        self.boundary_v = Box::new(v);
        self
    }

    pub fn with_right_hand_side(mut self, f: impl Function + 'static) -> Self {
        self.rhs = Box::new(f);
        self
    }

    //--------------------------------------------------------------------------
    // Accessors
    //--------------------------------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn discretization(&self) -> &Discretization {
        &self.disc
    }

    pub fn mass_matrix(&self) -> &SparseMatrix {
        &self.M
    }

    pub fn laplace_matrix(&self) -> &SparseMatrix {
        &self.A
    }

    pub fn displacement(&self) -> &VectorD {
        &self.U
    }

    pub fn velocity(&self) -> &VectorD {
        &self.V
    }

    pub fn old_displacement(&self) -> &VectorD {
        &self.U_prev
    }

    pub fn old_velocity(&self) -> &VectorD {
        &self.V_prev
    }

    pub fn pre_refinement_step(&self) -> usize {
        self.pre_refinement_step
    }

    pub fn history(&self) -> &[StepReport] {
        &self.history
    }

    /// Discrete energy `(<V, M V> + <U, A U>) / 2` of the current fields
    pub fn energy(&self) -> f64 {
        0.5 * (self.M.matrix_norm_square(&self.V) + self.A.matrix_norm_square(&self.U))
    }

    //--------------------------------------------------------------------------
    // Time loop
    //--------------------------------------------------------------------------

    /// Integrate to the final time, restarting after each pre-refinement
    pub fn run(&mut self) -> Result<()> {
        log::info!(
            "theta = {}, dt = {}, refinement levels [{}, {}]",
            self.time.theta,
            self.time.dt,
            self.config.min_level(),
            self.config.max_level()
        );
        loop {
            self.restart()?;
            match self.integrate()? {
                Completion::Restart => continue,
                Completion::Finished => break,
            }
        }
        Ok(())
    }

    /// Return to t = 0 with the initial values on the current mesh
    pub fn restart(&mut self) -> Result<()> {
        self.time.reset();
        log::info!(
            "Starting at t = 0 (pre-refinement step {} of {}): {} active cells, {} degrees of freedom",
            self.pre_refinement_step,
            self.policy.max_pre_refinement,
            self.disc.n_active_cells(),
            self.disc.n_dofs()
        );

        self.U_prev = interpolate(&self.disc, self.initial_u.as_ref(), 0.);
        self.V_prev = interpolate(&self.disc, self.initial_v.as_ref(), 0.);
        self.U = self.U_prev.clone();
        self.V = self.V_prev.clone();
        self.write_output();
        Ok(())
    }

    /// Step until the final time, or until a pre-refinement asks for a restart
    pub fn integrate(&mut self) -> Result<Completion> {
        while self.time.time <= self.config.final_time {
            self.step()?;

            match self.policy.decide(self.time.step, self.pre_refinement_step) {
                RefinementAction::RefineAndRestart => {
                    self.refine_mesh()?;
                    self.pre_refinement_step += 1;
                    return Ok(Completion::Restart);
                }
                RefinementAction::Refine => self.refine_mesh()?,
                RefinementAction::None => {}
            }

            self.commit();
        }
        Ok(Completion::Finished)
    }

    /// Advance both fields by one theta-scheme step
    pub fn step(&mut self) -> Result<StepReport> {
        self.check_dimensions()?;
        self.time.advance();
        let TimeState { time, dt, step, theta } = self.time;
        log::info!("Time step {} at t={}", step, time);

        // Calculate source term combination over the step
        let F_now = assemble_rhs(&self.disc, self.rhs.as_ref(), time);
        let F_old = assemble_rhs(&self.disc, self.rhs.as_ref(), time - dt);
        let forcing: VectorD = F_now * (theta * dt) + F_old * ((1. - theta) * dt);

        // Calculate displacement right hand side
        let MU_prev = &self.M * &self.U_prev;
        let MV_prev = &self.M * &self.V_prev;
        let AU_prev = &self.A * &self.U_prev;
        let rhs_u: VectorD = &MU_prev + &MV_prev * dt - &AU_prev * (theta * (1. - theta) * dt * dt)
            + &forcing * (theta * dt);

        // Solve for displacement
        let op_u = add_scaled(&self.M, theta * theta * dt * dt, &self.A);
        let bv_u = interpolate_boundary_values(&self.disc, BOUNDARY_ID, self.boundary_u.as_ref(), time);
        let iterations_u = solve_constrained(
            &self.disc,
            &self.config.solver,
            "U",
            &op_u,
            rhs_u,
            &bv_u,
            &mut self.U,
        )?;
        log::info!("   u-equation: {} CG iterations.", iterations_u);

        // Calculate velocity right hand side
        let AU = &self.A * &self.U;
        let rhs_v: VectorD =
            -&AU * (theta * dt) + &MV_prev - &AU_prev * ((1. - theta) * dt) + &forcing;

        // Solve for velocity
        let bv_v = interpolate_boundary_values(&self.disc, BOUNDARY_ID, self.boundary_v.as_ref(), time);
        let iterations_v = solve_constrained(
            &self.disc,
            &self.config.solver,
            "V",
            &self.M,
            rhs_v,
            &bv_v,
            &mut self.V,
        )?;
        log::info!("   v-equation: {} CG iterations.", iterations_v);

        let energy = self.energy();
        log::info!("   Total energy: {}", energy);

        self.write_output();

        let report = StepReport {
            step,
            time,
            iterations_u,
            iterations_v,
            energy,
            n_active_cells: self.disc.n_active_cells(),
            n_dofs: self.disc.n_dofs(),
        };
        self.history.push(report);
        Ok(report)
    }

    /// Make the current fields the previous ones for the next step
    pub fn commit(&mut self) {
        self.U_prev.clone_from(&self.U);
        self.V_prev.clone_from(&self.V);
    }

    //--------------------------------------------------------------------------
    // Adaptation
    //--------------------------------------------------------------------------

    /// Adapt the mesh to the current solution and move all fields onto it
    pub fn refine_mesh(&mut self) -> Result<()> {
        // Estimate on the current discretization
        let field = match self.config.estimated_field {
            EstimatedField::Displacement => &self.U,
            EstimatedField::Velocity => &self.V,
        };
        let errors = kelly_error_estimate(&self.disc, field)?;

        // Snapshot before the mesh changes
        let transfer =
            SolutionTransfer::prepare(&self.disc, &[&self.U, &self.V, &self.U_prev, &self.V_prev])?;

        // Mark, clamp, balance and execute
        let mesh = mark_and_refine(
            self.disc.mesh().clone(),
            &errors,
            self.config.refine_fraction,
            self.config.coarsen_fraction,
            (self.config.min_level(), self.config.max_level()),
        )?;

        // Rebuild the space and operators
        let (disc, M, A) = setup_system(mesh, self.config.fe_degree)?;
        self.disc = disc;
        self.M = M;
        self.A = A;

        // Interpolate the snapshot, hanging nodes included
        let fields: [VectorD; 4] = transfer
            .interpolate(&self.disc)?
            .try_into()
            .map_err(|fields: Vec<VectorD>| Error::DimensionMismatch {
                what: "transferred fields",
                expected: 4,
                found: fields.len(),
            })?;
        let [U, V, U_prev, V_prev] = fields;
        self.U = U;
        self.V = V;
        self.U_prev = U_prev;
        self.V_prev = V_prev;

        self.check_dimensions()?;
        log::info!(
            "Refined mesh: {} active cells, {} degrees of freedom",
            self.disc.n_active_cells(),
            self.disc.n_dofs()
        );
        Ok(())
    }

    /// All fields and operators live on the current discretization
    pub fn check_dimensions(&self) -> Result<()> {
        let n = self.disc.n_dofs();
        let sizes = [
            ("U", self.U.len()),
            ("V", self.V.len()),
            ("U_prev", self.U_prev.len()),
            ("V_prev", self.V_prev.len()),
            ("mass matrix", self.M.nrows()),
            ("Laplace matrix", self.A.nrows()),
        ];
        for (what, found) in sizes {
            if found != n {
                return Err(Error::DimensionMismatch {
                    what,
                    expected: n,
                    found,
                });
            }
        }
        Ok(())
    }

    fn write_output(&mut self) {
        let fields = [("U", &self.U), ("V", &self.V)];
        if let Err(e) = self.output.write(self.time.step, &self.disc, &fields) {
            log::warn!("output for step {} failed: {}", self.time.step, e);
        }
    }
}

/// Discretization with its mass and Laplace operators
fn setup_system(mesh: Mesh, degree: usize) -> Result<(Discretization, SparseMatrix, SparseMatrix)> {
    let disc = Discretization::distribute(mesh, degree)?;
    log::info!("Number of active cells: {}", disc.n_active_cells());
    log::info!("Number of degrees of freedom: {}", disc.n_dofs());
    let M = assemble_mass(&disc);
    let A = assemble_laplace(&disc);
    Ok((disc, M, A))
}

/// Condense hanging nodes, impose boundary values, solve and distribute
fn solve_constrained(
    disc: &Discretization,
    config: &SolverConfig,
    equation: &'static str,
    op: &SparseMatrix,
    rhs: VectorD,
    boundary_values: &BTreeMap<usize, f64>,
    solution: &mut VectorD,
) -> Result<usize> {
    let (op, mut rhs) = disc.constraints().condense(op, &rhs);
    let K = apply_boundary_values(boundary_values, &op, solution, &mut rhs);
    let iterations = ConjugateGradient::new(config)
        .solve(&K, &rhs, solution)
        .map_err(|e| e.into_error(equation))?;
    disc.constraints().distribute(solution);
    Ok(iterations)
}

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    fn small_config() -> Config {
        Config {
            initial_global_refinement: 2,
            n_adaptive_pre_refinement_steps: 1,
            final_time: 0.1,
            output: crate::config::OutputConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_policy() {
        let policy = RefinementPolicy {
            max_pre_refinement: 2,
            interval: 5,
        };
        assert_eq!(policy.decide(1, 0), RefinementAction::RefineAndRestart);
        assert_eq!(policy.decide(1, 1), RefinementAction::RefineAndRestart);
        assert_eq!(policy.decide(1, 2), RefinementAction::None);
        assert_eq!(policy.decide(2, 0), RefinementAction::None);
        assert_eq!(policy.decide(5, 2), RefinementAction::Refine);
        assert_eq!(policy.decide(10, 2), RefinementAction::Refine);
        assert_eq!(policy.decide(0, 2), RefinementAction::None);

        let fixed = RefinementPolicy {
            max_pre_refinement: 0,
            interval: 0,
        };
        assert!((0..20).all(|step| fixed.decide(step, 0) == RefinementAction::None));
    }

    #[test]
    fn test_time_state() {
        let mut time = TimeState::new(0.25, 0.75);
        time.advance();
        time.advance();
        assert_eq!(time.step, 2);
        assert_relative_eq!(time.time, 0.5);
        time.reset();
        assert_eq!(time.step, 0);
        assert_eq!(time.time, 0.);
        assert_eq!(time.dt, 0.25);
    }

    #[test]
    fn test_first_step_is_driven_by_the_boundary() {
        let mut solver = WaveSolver::new(small_config()).unwrap();
        solver.restart().unwrap();
        assert_eq!(solver.energy(), 0.);

        let report = solver.step().unwrap();
        assert_eq!(report.step, 1);
        assert!(report.energy > 0.);
        assert!(report.iterations_u > 0);

        // Boundary values at t = dt are imposed exactly
        let t = solver.time.time;
        let points = solver.discretization().support_points();
        for dof in solver.discretization().boundary_dofs(BOUNDARY_ID) {
            assert_relative_eq!(solver.displacement()[dof], BoundaryValuesU.value(&points[dof], t));
            assert_relative_eq!(solver.velocity()[dof], BoundaryValuesV.value(&points[dof], t));
        }
    }

    #[test]
    fn test_run_restarts_once() {
        let mut solver = WaveSolver::new(small_config()).unwrap();
        solver.run().unwrap();
        assert_eq!(solver.pre_refinement_step(), 1);

        // One discarded step, then a full pass from t = 0
        let restarts = solver.history().iter().filter(|r| r.step == 1).count();
        assert_eq!(restarts, 2);
        let last = solver.history().last().unwrap();
        assert!(last.time > 0.1 && last.time < 0.1 + solver.time.dt + 1e-12);
        assert!(last.n_active_cells > 16);
    }

    #[test]
    fn test_solver_failure_is_fatal() {
        let mut config = small_config();
        config.solver.max_iterations = 1;
        config.solver.relative_tolerance = 1e-14;
        let mut solver = WaveSolver::new(config).unwrap();
        solver.restart().unwrap();
        assert!(matches!(
            solver.step(),
            Err(Error::NoConvergence { equation: "U", .. })
        ));
    }

    #[test]
    fn test_refinement_beyond_finest_level_is_rejected() {
        let mut config = small_config();
        config.initial_global_refinement = 30;
        assert!(matches!(WaveSolver::new(config), Err(Error::InvalidConfig(_))));
    }
}
