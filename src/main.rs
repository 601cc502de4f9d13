use std::time::Instant;

use wave_amr::{Config, WaveSolver};

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Optional JSON configuration as the only argument
    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Reading configuration from {}", path);
            Config::from_json_file(&path)?
        }
        None => Config::default(),
    };

    let start = Instant::now();
    let mut solver = WaveSolver::new(config)?;
    if let Err(e) = solver.run() {
        log::error!("Simulation aborted at t={}: {}", solver.time.time, e);
        return Err(e.into());
    }

    let history = solver.history();
    log::info!(
        "Completed {} time steps ({} pre-refinement restarts) in {:.2?}",
        history.len(),
        solver.pre_refinement_step(),
        start.elapsed()
    );
    if let Some(last) = history.last() {
        log::info!(
            "Final state at t={}: energy {}, {} active cells, {} degrees of freedom",
            last.time,
            last.energy,
            last.n_active_cells,
            last.n_dofs
        );
    }
    Ok(())
}
