pub mod assembly;
pub mod config;
pub mod dofs;
pub mod error;
pub mod estimator;
pub mod fe;
pub mod functions;
pub mod mesh;
pub mod output;
pub mod prelude;
pub mod solver;
pub mod transfer;

pub use config::Config;
pub use error::{Error, Result};
pub use solver::WaveSolver;
