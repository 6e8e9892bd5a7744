//! Evolutionary search over occupancy-grid designs.
//!
//! # Overview
//!
//! - **Engine** (`engine`): the generational [`Environment`] (selection,
//!   fitness-proportionate reproduction, adaptive and topological mutation)
//! - **Problem** (`problem`): the [`Problem`] trait the engine is generic over
//! - **Cantilever** (`cantilever`): the structural design problem, scoring
//!   designs by plane-stress analysis of their connected region
//! - **Operators** (`operators`): convergence index, mutations and crossover
//! - **Caches** (`cache`): gene and phenotype fitness tables
//! - **Checkpoints** (`checkpoint`): JSON snapshots for resuming a run
//!
//! # Example
//!
//! ```rust,no_run
//! use evotopo::compute::evolution::{CantileverProblem, Environment};
//! use evotopo::schema::EvolutionConfig;
//!
//! let config = EvolutionConfig::default();
//! let problem = CantileverProblem::new(config.structure.clone()).unwrap();
//! let mut env = Environment::new(problem, &config).unwrap();
//!
//! let summary = env
//!     .run_with_callback(|stats| {
//!         println!("Generation {}: best = {:.4}", stats.generation, stats.best_fitness);
//!     })
//!     .unwrap();
//! println!("{} reached {:.4}", summary.best_name, summary.best_fitness);
//! println!("{}", env.population()[0].chromosome);
//! ```

mod cache;
mod cantilever;
pub mod checkpoint;
mod engine;
mod individual;
pub mod operators;
mod problem;

pub use cache::{
    CacheError, CacheSnapshot, CachedEvaluation, FitnessCache, GeneCache, PhenotypeCache,
    ScopeKey,
};
pub use cantilever::{
    CantileverProblem, distribute, holds_support_corners, slice_interval, slice_through_middle,
    walk_from_corner, walk_to_edge,
};
pub use checkpoint::CheckpointError;
pub use engine::{Environment, EnvironmentSnapshot, EvolutionError, evaluate_cached};
pub use individual::{Individual, StructuralResult, by_fitness_desc};
pub use problem::Problem;
