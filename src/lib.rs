//! evotopo - Evolutionary topology optimization of plane structures.
//!
//! A design is a binary occupancy grid over a 2n × n plate. Only the region
//! connected to the loaded cell carries load; it is meshed into bilinear
//! plane-stress elements, analysed, and scored so that light designs staying
//! within a displacement limit win. A genetic algorithm evolves a population
//! of such grids.
//!
//! # Architecture
//!
//! - `schema`: Configuration types and run summaries
//! - `compute`: Grids, phenotype extraction, meshing, the structural solver
//!   and the evolutionary engine (`compute::evolution`)
//!
//! # Example
//!
//! ```rust,no_run
//! use evotopo::{CantileverProblem, Environment, EvolutionConfig};
//!
//! let mut config = EvolutionConfig::default();
//! config.population.max_generations = 50;
//! config.random_seed = Some(1);
//!
//! let problem = CantileverProblem::new(config.structure.clone()).unwrap();
//! let mut env = Environment::new(problem, &config).unwrap();
//! let summary = env.run().unwrap();
//!
//! println!("Best fitness after {} generations: {}", summary.generations, summary.best_fitness);
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{CantileverProblem, Environment, EvolutionError, Problem};
pub use compute::{Chromosome, OccupancyGrid, PlaneStressSolver, extract};
pub use schema::{EvolutionConfig, StructuralConfig};
