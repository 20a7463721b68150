//! GPU terrain erosion library
//!
//! Re-exports the configuration, grid and simulation modules for use by
//! the binary and tools.

pub mod config;
pub mod grid;
pub mod sim;

pub use config::SimulationConfig;
pub use sim::{run, run_auto, run_cpu, SimulationError, SimulationOutput};
