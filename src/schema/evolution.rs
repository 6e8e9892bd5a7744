//! Evolution configuration types for the generational engine.
//!
//! This module provides the settings that drive an optimization run
//! (population, mutation, caching, evaluation and checkpointing) together
//! with the statistics and result types reported back to callers.

use serde::{Deserialize, Serialize};

use super::StructuralConfig;

/// Top-level configuration for an optimization run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvolutionConfig {
    /// Structural parameters of the plate being optimized.
    #[serde(default)]
    pub structure: StructuralConfig,
    /// Population and generation settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Mutation operator settings.
    #[serde(default)]
    pub mutation: MutationConfig,
    /// Fitness cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Evaluation settings (serial or fork/join parallel).
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Checkpoint settings.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

/// Population and generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of individuals in population.
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Maximum number of generations.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Stop as soon as the convergence index reaches `convergence_target`.
    #[serde(default)]
    pub stop_if_converged: bool,
    /// Convergence index considered as full convergence.
    #[serde(default = "default_convergence_target")]
    pub convergence_target: f64,
    /// Number of past generations kept in full.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            max_generations: default_max_generations(),
            stop_if_converged: false,
            convergence_target: default_convergence_target(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_population_size() -> usize {
    100
}
fn default_max_generations() -> usize {
    300
}
fn default_convergence_target() -> f64 {
    0.95
}
fn default_history_limit() -> usize {
    10
}

/// Mutation operator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Base probability of a bit flipping.
    #[serde(default = "default_base_probability")]
    pub base_probability: f64,
    /// Convergence index above which border-focused mutation is applied.
    #[serde(default = "default_topology_threshold")]
    pub topology_threshold: f64,
    /// Border flip probability as a multiple of the base probability.
    #[serde(default = "default_topology_factor")]
    pub topology_factor: f64,
    /// Probability that border mutation grows material rather than shrinking it.
    #[serde(default = "default_grow_probability")]
    pub grow_probability: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            base_probability: default_base_probability(),
            topology_threshold: default_topology_threshold(),
            topology_factor: default_topology_factor(),
            grow_probability: default_grow_probability(),
        }
    }
}

fn default_base_probability() -> f64 {
    1.0e-4
}
fn default_topology_threshold() -> f64 {
    0.75
}
fn default_topology_factor() -> f64 {
    10.0
}
fn default_grow_probability() -> f64 {
    0.5
}

/// Fitness cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of phenotypes kept by the LRU table.
    #[serde(default = "default_phenotype_capacity")]
    pub phenotype_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            phenotype_capacity: default_phenotype_capacity(),
        }
    }
}

fn default_phenotype_capacity() -> usize {
    300
}

/// Evaluation settings for fitness computation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvaluationConfig {
    /// Evaluate the selection backlog on a worker pool.
    #[serde(default)]
    pub parallel: bool,
    /// Number of parallel evaluations (0 = auto-detect).
    #[serde(default)]
    pub parallel_workers: usize,
}

/// Checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory receiving checkpoints. No checkpoints are written when unset.
    #[serde(default)]
    pub output_dir: Option<String>,
    /// Save a checkpoint every N generations.
    #[serde(default = "default_checkpoint_interval")]
    pub interval: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            interval: default_checkpoint_interval(),
        }
    }
}

fn default_checkpoint_interval() -> usize {
    100
}

// ============================================================================
// Statistics and Result Types
// ============================================================================

/// Summary of one generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationStats {
    /// Generation number this summary describes.
    pub generation: usize,
    /// Best fitness of the generation.
    pub best_fitness: f64,
    /// Mean fitness of the generation.
    pub mean_fitness: f64,
    /// Worst fitness of the generation.
    pub min_fitness: f64,
    /// Convergence index measured during mutation.
    pub convergence_index: f64,
    /// Gene-table hits accumulated so far.
    pub gene_hits: u64,
    /// Phenotype-table hits accumulated so far.
    pub phenotype_hits: u64,
}

/// Reason a run stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the requested number of generations.
    MaxGenerations,
    /// The population converged.
    Converged,
    /// Stopped through the cancel handle.
    Cancelled,
}

/// Final result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Generation counter at the end of the run.
    pub generations: usize,
    /// Name of the best individual.
    pub best_name: String,
    /// Fitness of the best individual.
    pub best_fitness: f64,
    /// Convergence index at the end of the run.
    pub convergence_index: f64,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
}

// ============================================================================
// Validation
// ============================================================================

/// Evolution configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionConfigError {
    #[error("Population size must be at least 4, got {0}")]
    PopulationTooSmall(usize),
    #[error("Invalid probability for {name}: {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("Topology factor must be non-negative")]
    InvalidTopologyFactor,
    #[error("Phenotype cache capacity must be positive")]
    InvalidCacheCapacity,
    #[error("Checkpoint interval must be positive")]
    InvalidCheckpointInterval,
    #[error("Structural config validation failed: {0}")]
    StructureError(#[from] super::ConfigError),
}

impl EvolutionConfig {
    /// Validate evolution configuration, including the structural part.
    pub fn validate(&self) -> Result<(), EvolutionConfigError> {
        self.structure.validate()?;
        self.validate_engine()
    }

    /// Validate only the settings consumed by the generational engine.
    pub fn validate_engine(&self) -> Result<(), EvolutionConfigError> {
        // Two distinct parents need at least two survivors.
        if self.population.size < 4 {
            return Err(EvolutionConfigError::PopulationTooSmall(
                self.population.size,
            ));
        }

        let check_probability = |value: f64, name: &'static str| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(EvolutionConfigError::InvalidProbability { name, value })
            }
        };

        check_probability(self.mutation.base_probability, "base_probability")?;
        check_probability(self.mutation.topology_threshold, "topology_threshold")?;
        check_probability(self.mutation.grow_probability, "grow_probability")?;
        check_probability(self.population.convergence_target, "convergence_target")?;

        if self.mutation.topology_factor < 0.0 {
            return Err(EvolutionConfigError::InvalidTopologyFactor);
        }
        if self.cache.phenotype_capacity == 0 {
            return Err(EvolutionConfigError::InvalidCacheCapacity);
        }
        if self.checkpoint.interval == 0 {
            return Err(EvolutionConfigError::InvalidCheckpointInterval);
        }

        Ok(())
    }
}
