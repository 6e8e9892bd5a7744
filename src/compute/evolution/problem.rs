//! The seam between the generational engine and a concrete design problem.

use rand_pcg::Pcg64;

use crate::compute::Chromosome;

use super::cache::{PhenotypeCache, ScopeKey};
use super::engine::EvolutionError;
use super::individual::Individual;
use super::operators::{adaptive_mutation, border_mutation, three_block_crossover};

/// A design problem driven by an [`Environment`](super::Environment).
///
/// The engine owns selection, reproduction and the mutation schedule; the
/// problem supplies the initial chromosomes, the fitness evaluation and the
/// genetic operators. Operators default to the grid operators of
/// [`operators`](super::operators).
pub trait Problem: Send + Sync {
    /// Key of the parameters fitness values depend on. Cached values are only
    /// reused under an identical key.
    fn scope(&self) -> ScopeKey;

    /// Generate `count` feasible chromosomes.
    fn initial_population(
        &self,
        count: usize,
        rng: &mut Pcg64,
    ) -> Result<Vec<Chromosome>, EvolutionError>;

    /// Evaluate an individual, consulting and filling the phenotype table.
    ///
    /// Must set `fitness` and `evaluated`, and attach structural results when
    /// they were computed or found in the table.
    fn evaluate(
        &self,
        individual: &mut Individual,
        generation: usize,
        phenotypes: &mut PhenotypeCache,
    ) -> Result<(), EvolutionError>;

    /// Produce one child chromosome from two parents.
    fn crossover(&self, first: &Individual, second: &Individual, rng: &mut Pcg64) -> Chromosome {
        three_block_crossover(&first.chromosome, &second.chromosome, rng)
    }

    /// Adaptive per-bit mutation. Returns the number of flipped cells.
    fn mutate(
        &self,
        individual: &mut Individual,
        mean: &[f64],
        base_probability: f64,
        rng: &mut Pcg64,
    ) -> usize {
        adaptive_mutation(&mut individual.chromosome, mean, base_probability, rng)
    }

    /// Border-focused mutation. Returns the number of flipped cells.
    fn mutate_borders(
        &self,
        individual: &mut Individual,
        flip_probability: f64,
        grow: bool,
        rng: &mut Pcg64,
    ) -> usize {
        border_mutation(&mut individual.chromosome, flip_probability, grow, rng)
    }
}
