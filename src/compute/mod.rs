//! Compute module - Design representation, phenotype extraction and
//! structural analysis.

mod grid;
mod mesh;
mod phenotype;
mod solver;

pub mod evolution;

pub use grid::*;
pub use mesh::*;
pub use phenotype::*;
pub use solver::*;
