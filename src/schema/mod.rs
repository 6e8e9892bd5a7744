//! Schema module - Configuration and result types for optimization runs.

mod config;
mod evolution;

pub use config::*;
pub use evolution::*;
