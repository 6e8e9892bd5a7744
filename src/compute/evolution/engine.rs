//! Generational engine.
//!
//! [`Environment`] owns the population and drives the fixed cycle
//! selection → reproduction → mutation → re-sort, independently of what the
//! chromosomes mean. Everything problem-specific goes through [`Problem`].

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compute::SolverError;
use crate::schema::{
    ConfigError, EvolutionConfig, EvolutionConfigError, GenerationStats, RunSummary, StopReason,
};

use super::cache::{CacheError, CacheSnapshot, FitnessCache, PhenotypeCache};
use super::checkpoint::{self, CheckpointError};
use super::individual::{Individual, by_fitness_desc};
use super::operators::{convergence_index, mean_map};
use super::problem::Problem;

/// Stream offset separating the problem generator from the engine generator.
const PROBLEM_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

/// Errors raised while running an optimization.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    #[error("Invalid evolution config: {0}")]
    Config(#[from] EvolutionConfigError),
    #[error("Invalid structural config: {0}")]
    Structure(#[from] ConfigError),
    #[error("Structural analysis failed: {0}")]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Problem produced {found} initial designs, expected {expected}")]
    InitialPopulation { expected: usize, found: usize },
}

/// Serializable state sufficient to resume a run bit-for-bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub config: EvolutionConfig,
    pub seed: u64,
    pub generation: usize,
    pub convergence_index: f64,
    pub population: Vec<Individual>,
    /// Generator for parent sampling and mutation.
    pub rng: Pcg64,
    /// Generator handed to the problem (generation 0 and crossover).
    pub problem_rng: Pcg64,
    pub cache: CacheSnapshot,
    pub stats: Vec<GenerationStats>,
}

/// Evaluate through the gene table first, then the problem.
pub fn evaluate_cached<P: Problem>(
    problem: &P,
    cache: &mut FitnessCache,
    individual: &mut Individual,
    generation: usize,
) -> Result<(), EvolutionError> {
    if let Some(fitness) = cache.lookup_gene(&individual.chromosome) {
        log::debug!("{}: chromosome already known", individual.name);
        individual.fitness = fitness;
        individual.evaluated = true;
        return Ok(());
    }

    problem.evaluate(individual, generation, &mut cache.phenotypes)?;
    cache.genes.insert(&individual.chromosome, individual.fitness);
    Ok(())
}

/// Draw one index with probability proportional to `weights`, skipping
/// `exclude`. Falls back to a uniform draw when no weight is positive.
fn draw_weighted(rng: &mut Pcg64, weights: &[f64], exclude: Option<usize>) -> usize {
    let candidates: Vec<usize> = (0..weights.len())
        .filter(|&i| Some(i) != exclude)
        .collect();
    let candidate_weights = candidates.iter().map(|&i| weights[i].max(0.0));

    match WeightedIndex::new(candidate_weights) {
        Ok(dist) => candidates[dist.sample(rng)],
        Err(_) => candidates[rng.gen_range(0..candidates.len())],
    }
}

/// The generational engine.
pub struct Environment<P: Problem> {
    problem: P,
    config: EvolutionConfig,
    seed: u64,
    generation: usize,
    convergence_index: f64,
    population: Vec<Individual>,
    cache: FitnessCache,
    rng: Pcg64,
    problem_rng: Pcg64,
    history: VecDeque<Vec<Individual>>,
    stats: Vec<GenerationStats>,
    pool: Option<rayon::ThreadPool>,
    cancelled: Arc<AtomicBool>,
}

impl<P: Problem> Environment<P> {
    /// Build generation 0.
    ///
    /// Uses `config.random_seed`, or a random seed when unset.
    pub fn new(problem: P, config: &EvolutionConfig) -> Result<Self, EvolutionError> {
        config.validate_engine()?;

        let seed = config.random_seed.unwrap_or_else(rand::random);
        let rng = Pcg64::seed_from_u64(seed);
        let mut problem_rng = Pcg64::seed_from_u64(seed ^ PROBLEM_STREAM);

        let size = config.population.size;
        let chromosomes = problem.initial_population(size, &mut problem_rng)?;
        if chromosomes.len() != size {
            return Err(EvolutionError::InitialPopulation {
                expected: size,
                found: chromosomes.len(),
            });
        }

        let population = chromosomes
            .into_iter()
            .enumerate()
            .map(|(i, chromosome)| Individual::new(format!("G0_{}", i + 1), chromosome))
            .collect();

        let cache = FitnessCache::new(problem.scope(), config.cache.phenotype_capacity);
        let pool = Self::build_pool(config)?;

        log::info!("Generation 0 created: {size} individuals, seed {seed}");

        Ok(Self {
            problem,
            config: config.clone(),
            seed,
            generation: 0,
            convergence_index: 0.0,
            population,
            cache,
            rng,
            problem_rng,
            history: VecDeque::new(),
            stats: Vec::new(),
            pool,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Resume from a snapshot.
    ///
    /// Fails when the snapshot's cache was computed for a different problem
    /// scope.
    pub fn restore(problem: P, snapshot: EnvironmentSnapshot) -> Result<Self, EvolutionError> {
        snapshot.config.validate_engine()?;
        let cache = FitnessCache::restore(snapshot.cache, &problem.scope())?;
        let pool = Self::build_pool(&snapshot.config)?;

        log::info!(
            "Resumed seed {} at generation {}",
            snapshot.seed,
            snapshot.generation
        );

        Ok(Self {
            problem,
            config: snapshot.config,
            seed: snapshot.seed,
            generation: snapshot.generation,
            convergence_index: snapshot.convergence_index,
            population: snapshot.population,
            cache,
            rng: snapshot.rng,
            problem_rng: snapshot.problem_rng,
            history: VecDeque::new(),
            stats: snapshot.stats,
            pool,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Resume from the checkpoint of `generation` under `dir`, or start a new
    /// run from `config` when there is none.
    ///
    /// The checkpoint is looked up with `config.random_seed`; the run length
    /// is taken from `config`.
    pub fn resume_or_new<D: AsRef<Path>>(
        problem: P,
        config: &EvolutionConfig,
        dir: D,
        generation: usize,
    ) -> Result<Self, EvolutionError> {
        let snapshot = match config.random_seed {
            Some(seed) => checkpoint::load(dir, seed, generation)?,
            None => {
                log::warn!("No random_seed set, cannot locate a checkpoint");
                None
            }
        };

        match snapshot {
            Some(mut snapshot) => {
                snapshot.config.population.max_generations = config.population.max_generations;
                Self::restore(problem, snapshot)
            }
            None => {
                log::warn!("Starting a new run instead of resuming generation {generation}");
                Self::new(problem, config)
            }
        }
    }

    fn build_pool(config: &EvolutionConfig) -> Result<Option<rayon::ThreadPool>, EvolutionError> {
        if !config.evaluation.parallel || config.evaluation.parallel_workers == 0 {
            return Ok(None);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.evaluation.parallel_workers)
            .build()?;
        Ok(Some(pool))
    }

    /// Capture the full state of the run.
    pub fn snapshot(&self) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            config: self.config.clone(),
            seed: self.seed,
            generation: self.generation,
            convergence_index: self.convergence_index,
            population: self.population.clone(),
            rng: self.rng.clone(),
            problem_rng: self.problem_rng.clone(),
            cache: self.cache.snapshot(),
            stats: self.stats.clone(),
        }
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of generations advanced so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Current population, sorted by descending fitness after each generation.
    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Convergence index measured at the last mutation step (or refresh).
    pub fn convergence_index(&self) -> f64 {
        self.convergence_index
    }

    /// Recompute the convergence index over the current population.
    pub fn refresh_convergence_index(&mut self) -> f64 {
        self.convergence_index = convergence_index(&mean_map(&self.population));
        self.convergence_index
    }

    pub fn cache(&self) -> &FitnessCache {
        &self.cache
    }

    /// Statistics of every generation advanced so far.
    pub fn stats(&self) -> &[GenerationStats] {
        &self.stats
    }

    /// The most recent generations, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &[Individual]> {
        self.history.iter().map(Vec::as_slice)
    }

    /// Handle that stops a run between generations when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Advance one generation.
    ///
    /// On error the population and the generation counter are left as they
    /// were before the call. The generators and caches may have advanced.
    pub fn advance_one_generation(&mut self) -> Result<(), EvolutionError> {
        let next = self.generation + 1;
        let size = self.population.len();

        // Selection
        self.evaluate_pending()?;
        self.population.sort_by(by_fitness_desc);
        let survivors: Vec<Individual> = self.population[..size / 2].to_vec();

        // Reproduction
        let weights: Vec<f64> = survivors.iter().map(|s| s.fitness).collect();
        let mut children = Vec::with_capacity(size - survivors.len());
        while survivors.len() + children.len() < size {
            let first = draw_weighted(&mut self.rng, &weights, None);
            let second = draw_weighted(&mut self.rng, &weights, Some(first));

            let chromosome =
                self.problem
                    .crossover(&survivors[first], &survivors[second], &mut self.problem_rng);
            let mut child = Individual::new(format!("G{next}_{}", children.len() + 1), chromosome);
            evaluate_cached(&self.problem, &mut self.cache, &mut child, self.generation)?;
            children.push(child);
        }

        // Mutation
        let mut population: Vec<Individual> = survivors.into_iter().chain(children).collect();
        let mean = mean_map(&population);
        let index = convergence_index(&mean);
        let mutation = &self.config.mutation;

        for individual in &mut population {
            let flips = self.problem.mutate(
                individual,
                &mean,
                mutation.base_probability,
                &mut self.rng,
            );
            if flips > 0 {
                individual.invalidate();
            }
        }

        if index > mutation.topology_threshold {
            let flip_probability = mutation.topology_factor * mutation.base_probability;
            for individual in &mut population {
                let grow = self.rng.gen_bool(mutation.grow_probability);
                let flips =
                    self.problem
                        .mutate_borders(individual, flip_probability, grow, &mut self.rng);
                if flips > 0 {
                    individual.invalidate();
                }
            }
        }
        self.convergence_index = index;

        population.sort_by(by_fitness_desc);
        self.population = population;
        self.generation = next;
        self.record_generation();
        Ok(())
    }

    /// Advance up to `n` generations. With `stop_if_converged`, stops once
    /// the convergence index of the new population reaches the target.
    ///
    /// Returns the number of generations actually advanced.
    pub fn advance_generations(
        &mut self,
        n: usize,
        stop_if_converged: bool,
    ) -> Result<usize, EvolutionError> {
        for done in 0..n {
            if self.cancelled.load(Ordering::Relaxed) {
                return Ok(done);
            }
            self.advance_one_generation()?;
            if stop_if_converged
                && self.refresh_convergence_index() >= self.config.population.convergence_target
            {
                log::info!("Population converged at generation {}", self.generation);
                return Ok(done + 1);
            }
        }
        Ok(n)
    }

    /// Run until `population.max_generations`, convergence or cancellation,
    /// writing checkpoints as configured, then finalize the best design.
    pub fn run_with_callback<F>(&mut self, callback: F) -> Result<RunSummary, EvolutionError>
    where
        F: Fn(&GenerationStats),
    {
        let start_time = Instant::now();
        let max_generations = self.config.population.max_generations;
        let stop_if_converged = self.config.population.stop_if_converged;

        let stop_reason = loop {
            if self.cancelled.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }
            if self.generation >= max_generations {
                break StopReason::MaxGenerations;
            }

            self.advance_one_generation()?;
            if let Some(stats) = self.stats.last() {
                callback(stats);
            }
            self.maybe_checkpoint()?;

            if stop_if_converged
                && self.refresh_convergence_index() >= self.config.population.convergence_target
            {
                break StopReason::Converged;
            }
        };

        let best = self.finalize()?;
        let (best_name, best_fitness) = (best.name.clone(), best.fitness);
        let summary = RunSummary {
            generations: self.generation,
            best_name,
            best_fitness,
            convergence_index: self.convergence_index,
            elapsed_seconds: start_time.elapsed().as_secs_f64(),
            stop_reason,
        };
        log::info!(
            "Run finished after {} generations ({:?}): best {} = {:.6}",
            summary.generations,
            summary.stop_reason,
            summary.best_name,
            summary.best_fitness
        );
        Ok(summary)
    }

    /// Run without progress reporting.
    pub fn run(&mut self) -> Result<RunSummary, EvolutionError> {
        self.run_with_callback(|_| {})
    }

    /// Re-evaluate the best individual without consulting either cache, so
    /// its structural results are present, and return it.
    ///
    /// Re-evaluation uses the current generation and may lower the fitness;
    /// the population is re-sorted and the new leader re-evaluated until the
    /// leader is one that was re-evaluated here.
    pub fn finalize(&mut self) -> Result<&Individual, EvolutionError> {
        let generation = self.generation;
        let mut refreshed = HashSet::new();
        loop {
            self.population.sort_by(by_fitness_desc);
            let Some(best) = self.population.first_mut() else {
                break;
            };
            if !refreshed.insert(best.name.clone()) {
                break;
            }
            let mut scratch = PhenotypeCache::new(1);
            self.problem.evaluate(best, generation, &mut scratch)?;
        }

        let best = &self.population[0];
        log::info!("Best design {} re-evaluated: {:.6}", best.name, best.fitness);
        Ok(best)
    }

    fn maybe_checkpoint(&self) -> Result<(), EvolutionError> {
        let Some(dir) = &self.config.checkpoint.output_dir else {
            return Ok(());
        };
        if self.generation % self.config.checkpoint.interval == 0 {
            let path = checkpoint::save(dir, &self.snapshot())?;
            log::info!("Checkpoint written to {}", path.display());
        }
        Ok(())
    }

    /// Evaluate every individual whose fitness is stale.
    fn evaluate_pending(&mut self) -> Result<(), EvolutionError> {
        if self.config.evaluation.parallel {
            return self.evaluate_pending_parallel();
        }
        for individual in self.population.iter_mut().filter(|i| !i.evaluated) {
            evaluate_cached(&self.problem, &mut self.cache, individual, self.generation)?;
        }
        Ok(())
    }

    /// Fork/join evaluation: gene-table hits are resolved here, the rest is
    /// evaluated by workers with private phenotype tables, and every result
    /// is merged back into the caches afterwards.
    fn evaluate_pending_parallel(&mut self) -> Result<(), EvolutionError> {
        let generation = self.generation;

        // Gather
        let mut pending = Vec::new();
        for (idx, individual) in self.population.iter_mut().enumerate() {
            if individual.evaluated {
                continue;
            }
            if let Some(fitness) = self.cache.lookup_gene(&individual.chromosome) {
                individual.fitness = fitness;
                individual.evaluated = true;
            } else {
                pending.push((idx, individual.clone()));
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        // Compute
        let problem = &self.problem;
        let capacity = self.cache.phenotypes.capacity();
        let work = move || {
            pending
                .into_par_iter()
                .map(|(idx, mut individual)| {
                    let mut scratch = PhenotypeCache::new(capacity);
                    problem
                        .evaluate(&mut individual, generation, &mut scratch)
                        .map(|()| (idx, individual, scratch))
                })
                .collect::<Result<Vec<_>, EvolutionError>>()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        }?;

        // Merge
        for (idx, individual, scratch) in results {
            self.cache
                .genes
                .insert(&individual.chromosome, individual.fitness);
            self.cache.phenotypes.absorb(scratch);
            self.population[idx] = individual;
        }
        Ok(())
    }

    fn record_generation(&mut self) {
        let fitness: Vec<f64> = self.population.iter().map(|i| i.fitness).collect();
        let best = fitness.first().copied().unwrap_or(0.0);
        let min = fitness.iter().copied().fold(f64::INFINITY, f64::min);
        let mean = fitness.iter().sum::<f64>() / fitness.len().max(1) as f64;

        let stats = GenerationStats {
            generation: self.generation,
            best_fitness: best,
            mean_fitness: mean,
            min_fitness: if min.is_finite() { min } else { 0.0 },
            convergence_index: self.convergence_index,
            gene_hits: self.cache.gene_hits(),
            phenotype_hits: self.cache.phenotype_hits(),
        };
        log::info!(
            "Generation {}: best={:.6}, mean={:.6}, convergence={:.3}",
            stats.generation,
            stats.best_fitness,
            stats.mean_fitness,
            stats.convergence_index
        );
        self.stats.push(stats);

        self.history.push_back(self.population.clone());
        while self.history.len() > self.config.population.history_limit {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::ScopeKey;
    use crate::compute::{Chromosome, OccupancyGrid};
    use crate::schema::{EvaluationConfig, MutationConfig, PopulationConfig};

    /// Fixed fitness table on 1×4 chromosomes; anything else scores its
    /// material count.
    struct TableProblem;

    impl Problem for TableProblem {
        fn scope(&self) -> ScopeKey {
            ScopeKey("table".into())
        }

        fn initial_population(
            &self,
            count: usize,
            _rng: &mut Pcg64,
        ) -> Result<Vec<Chromosome>, EvolutionError> {
            Ok(["##..", "#.#.", "..##", ".#.#"]
                .iter()
                .cycle()
                .take(count)
                .map(|s| s.parse().unwrap())
                .collect())
        }

        fn evaluate(
            &self,
            individual: &mut Individual,
            _generation: usize,
            _phenotypes: &mut PhenotypeCache,
        ) -> Result<(), EvolutionError> {
            individual.fitness = match individual.chromosome.to_string().as_str() {
                "##.." => 12.0,
                "#.#." => 10.0,
                "..##" => 11.0,
                ".#.#" => 9.0,
                _ => individual.chromosome.count() as f64,
            };
            individual.evaluated = true;
            Ok(())
        }

        /// First two cells from the first parent, the rest from the second.
        fn crossover(&self, first: &Individual, second: &Individual, _rng: &mut Pcg64) -> Chromosome {
            let mut child = second.chromosome.clone();
            child.copy_block_from(&first.chromosome, 0..1, 0..2);
            child
        }
    }

    /// Random 6×6 grids scored by material count.
    struct CountProblem;

    impl Problem for CountProblem {
        fn scope(&self) -> ScopeKey {
            ScopeKey("count".into())
        }

        fn initial_population(
            &self,
            count: usize,
            rng: &mut Pcg64,
        ) -> Result<Vec<Chromosome>, EvolutionError> {
            Ok((0..count)
                .map(|_| {
                    let cells = (0..36).map(|_| rng.gen_bool(0.4)).collect();
                    OccupancyGrid::from_cells(6, 6, cells).unwrap()
                })
                .collect())
        }

        fn evaluate(
            &self,
            individual: &mut Individual,
            _generation: usize,
            _phenotypes: &mut PhenotypeCache,
        ) -> Result<(), EvolutionError> {
            individual.fitness = individual.chromosome.count() as f64 + 1.0;
            individual.evaluated = true;
            Ok(())
        }
    }

    fn config(size: usize, base_probability: f64) -> EvolutionConfig {
        EvolutionConfig {
            population: PopulationConfig {
                size,
                ..Default::default()
            },
            mutation: MutationConfig {
                base_probability,
                ..Default::default()
            },
            random_seed: Some(17),
            ..Default::default()
        }
    }

    #[test]
    fn test_generation_zero() {
        let env = Environment::new(TableProblem, &config(4, 0.0)).unwrap();
        assert_eq!(env.generation(), 0);
        assert_eq!(env.population().len(), 4);
        assert_eq!(env.population()[0].name, "G0_1");
        assert!(env.population().iter().all(|i| !i.evaluated));
    }

    #[test]
    fn test_one_generation_scenario() {
        let mut env = Environment::new(TableProblem, &config(4, 0.0)).unwrap();
        env.advance_one_generation().unwrap();

        assert_eq!(env.generation(), 1);
        let population = env.population();
        assert_eq!(population.len(), 4);
        assert_eq!(population[0].fitness, 12.0);
        assert_eq!(population[1].fitness, 11.0);
        assert!(population[2].fitness <= 4.0);
        assert!(population[3].fitness <= 4.0);
        assert!(population[2].name.starts_with("G1_"));
        assert!(population[3].name.starts_with("G1_"));
        assert!(population.iter().all(|i| i.evaluated));
    }

    #[test]
    fn test_population_size_constant() {
        let mut env = Environment::new(CountProblem, &config(9, 0.01)).unwrap();
        let advanced = env.advance_generations(5, false).unwrap();
        assert_eq!(advanced, 5);
        assert_eq!(env.generation(), 5);
        assert_eq!(env.population().len(), 9);
        assert_eq!(env.stats().len(), 5);
    }

    #[test]
    fn test_population_sorted_descending() {
        let mut env = Environment::new(CountProblem, &config(10, 0.0)).unwrap();
        env.advance_generations(3, false).unwrap();
        let fitness: Vec<f64> = env.population().iter().map(|i| i.fitness).collect();
        assert!(fitness.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_stops_when_converged() {
        let mut cfg = config(6, 0.0);
        cfg.population.convergence_target = 0.0;
        let mut env = Environment::new(CountProblem, &cfg).unwrap();
        assert_eq!(env.advance_generations(10, true).unwrap(), 1);
        assert_eq!(env.generation(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut cfg = config(4, 0.0);
        cfg.population.history_limit = 2;
        let mut env = Environment::new(CountProblem, &cfg).unwrap();
        env.advance_generations(4, false).unwrap();
        assert_eq!(env.history().count(), 2);
    }

    #[test]
    fn test_gene_table_reuses_fitness() {
        let mut cache = FitnessCache::new(ScopeKey("count".into()), 4);
        let grid: OccupancyGrid = "##.\n.#.".parse().unwrap();
        let mut a = Individual::new("a", grid.clone());
        let mut b = Individual::new("b", grid);

        evaluate_cached(&CountProblem, &mut cache, &mut a, 0).unwrap();
        evaluate_cached(&CountProblem, &mut cache, &mut b, 0).unwrap();
        assert_eq!(cache.gene_hits(), 1);
        assert_eq!(a.fitness, b.fitness);
    }

    #[test]
    fn test_draw_weighted() {
        let mut rng = Pcg64::seed_from_u64(0);
        for _ in 0..100 {
            // Zero weight is never drawn while a positive weight remains.
            assert_eq!(draw_weighted(&mut rng, &[0.0, 3.0], None), 1);
            // Exclusion is honoured even when only zero weights remain.
            assert_eq!(draw_weighted(&mut rng, &[0.0, 3.0], Some(1)), 0);
        }
    }

    #[test]
    fn test_parallel_matches_serial() {
        let serial_cfg = config(12, 0.02);
        let parallel_cfg = EvolutionConfig {
            evaluation: EvaluationConfig {
                parallel: true,
                parallel_workers: 2,
            },
            ..serial_cfg.clone()
        };

        let mut serial = Environment::new(CountProblem, &serial_cfg).unwrap();
        let mut parallel = Environment::new(CountProblem, &parallel_cfg).unwrap();
        serial.advance_generations(4, false).unwrap();
        parallel.advance_generations(4, false).unwrap();

        for (a, b) in serial.population().iter().zip(parallel.population()) {
            assert_eq!(a.chromosome, b.chromosome);
            assert_eq!(a.fitness, b.fitness);
        }
    }

    #[test]
    fn test_snapshot_resume_is_exact() {
        let cfg = config(8, 0.02);

        let mut straight = Environment::new(CountProblem, &cfg).unwrap();
        straight.advance_generations(4, false).unwrap();

        let mut first = Environment::new(CountProblem, &cfg).unwrap();
        first.advance_generations(2, false).unwrap();
        let json = serde_json::to_string(&first.snapshot()).unwrap();
        let snapshot: EnvironmentSnapshot = serde_json::from_str(&json).unwrap();

        let mut resumed = Environment::restore(CountProblem, snapshot).unwrap();
        resumed.advance_generations(2, false).unwrap();

        assert_eq!(resumed.generation(), 4);
        for (a, b) in straight.population().iter().zip(resumed.population()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.chromosome, b.chromosome);
            assert_eq!(a.fitness, b.fitness);
        }
    }

    /// Non-integer fitness that depends on the generation.
    struct FractionProblem;

    impl Problem for FractionProblem {
        fn scope(&self) -> ScopeKey {
            ScopeKey("fraction".into())
        }

        fn initial_population(
            &self,
            count: usize,
            rng: &mut Pcg64,
        ) -> Result<Vec<Chromosome>, EvolutionError> {
            CountProblem.initial_population(count, rng)
        }

        fn evaluate(
            &self,
            individual: &mut Individual,
            generation: usize,
            _phenotypes: &mut PhenotypeCache,
        ) -> Result<(), EvolutionError> {
            let count = individual.chromosome.count() as f64;
            individual.fitness = 1.0 / (0.0277 * count + 0.013 * 1.01f64.powi(generation as i32));
            individual.evaluated = true;
            Ok(())
        }
    }

    #[test]
    fn test_snapshot_json_keeps_floats_exact() {
        let mut env = Environment::new(FractionProblem, &config(20, 0.02)).unwrap();
        env.advance_generations(3, false).unwrap();

        let before = env.snapshot();
        let json = serde_json::to_string_pretty(&before).unwrap();
        let after: EnvironmentSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(
            before.convergence_index.to_bits(),
            after.convergence_index.to_bits()
        );
        assert_eq!(before.population.len(), after.population.len());
        for (a, b) in before.population.iter().zip(&after.population) {
            assert_eq!(a.fitness.to_bits(), b.fitness.to_bits(), "{}", a.name);
        }
        assert_eq!(before.cache.genes.len(), after.cache.genes.len());
        for ((ka, a), (kb, b)) in before.cache.genes.iter().zip(&after.cache.genes) {
            assert_eq!(ka, kb);
            assert_eq!(a.to_bits(), b.to_bits());
        }
        for (a, b) in before.stats.iter().zip(&after.stats) {
            assert_eq!(a.mean_fitness.to_bits(), b.mean_fitness.to_bits());
        }
    }

    /// Table problem whose evaluation fails on any chromosome outside the
    /// table.
    struct StrictTableProblem;

    impl Problem for StrictTableProblem {
        fn scope(&self) -> ScopeKey {
            TableProblem.scope()
        }

        fn initial_population(
            &self,
            count: usize,
            rng: &mut Pcg64,
        ) -> Result<Vec<Chromosome>, EvolutionError> {
            TableProblem.initial_population(count, rng)
        }

        fn evaluate(
            &self,
            individual: &mut Individual,
            generation: usize,
            phenotypes: &mut PhenotypeCache,
        ) -> Result<(), EvolutionError> {
            let known = ["##..", "#.#.", "..##", ".#.#"];
            if !known.contains(&individual.chromosome.to_string().as_str()) {
                return Err(EvolutionError::Solver(SolverError::EmptyMesh));
            }
            TableProblem.evaluate(individual, generation, phenotypes)
        }

        fn crossover(&self, first: &Individual, second: &Individual, rng: &mut Pcg64) -> Chromosome {
            TableProblem.crossover(first, second, rng)
        }
    }

    #[test]
    fn test_failed_generation_keeps_population() {
        let mut env = Environment::new(StrictTableProblem, &config(4, 0.0)).unwrap();
        let result = env.advance_one_generation();

        assert!(matches!(result, Err(EvolutionError::Solver(_))));
        assert_eq!(env.generation(), 0);
        assert_eq!(env.population().len(), 4);
        assert!(env.population().iter().all(|i| i.name.starts_with("G0_")));
        assert!(env.stats().is_empty());
    }

    /// Scores a tenth of the material count, whatever the stored fitness.
    struct TenthProblem;

    impl Problem for TenthProblem {
        fn scope(&self) -> ScopeKey {
            ScopeKey("tenth".into())
        }

        fn initial_population(
            &self,
            count: usize,
            _rng: &mut Pcg64,
        ) -> Result<Vec<Chromosome>, EvolutionError> {
            Ok(["####", "###.", "##..", "#..."]
                .iter()
                .cycle()
                .take(count)
                .map(|s| s.parse().unwrap())
                .collect())
        }

        fn evaluate(
            &self,
            individual: &mut Individual,
            _generation: usize,
            _phenotypes: &mut PhenotypeCache,
        ) -> Result<(), EvolutionError> {
            individual.fitness = individual.chromosome.count() as f64 / 10.0;
            individual.evaluated = true;
            Ok(())
        }
    }

    #[test]
    fn test_finalize_keeps_population_sorted() {
        let env = Environment::new(TenthProblem, &config(4, 0.0)).unwrap();
        let mut snapshot = env.snapshot();
        // Stale fitness values above what a fresh evaluation gives, with the
        // ranking reversed.
        for (individual, stale) in snapshot.population.iter_mut().zip([1.0, 2.0, 3.0, 4.0]) {
            individual.fitness = stale;
            individual.evaluated = true;
        }

        let mut env = Environment::restore(TenthProblem, snapshot).unwrap();
        let best = env.finalize().unwrap();
        assert_eq!(best.chromosome.to_string(), "####");
        assert!((best.fitness - 0.4).abs() < 1e-12);

        let fitness: Vec<f64> = env.population().iter().map(|i| i.fitness).collect();
        assert!(fitness.windows(2).all(|w| w[0] >= w[1]), "{fitness:?}");
    }

    #[test]
    fn test_resume_or_new() {
        let temp = tempfile::tempdir().unwrap();
        let mut cfg = config(6, 0.01);
        cfg.population.max_generations = 9;

        // Nothing saved yet: a fresh run.
        let env = Environment::resume_or_new(CountProblem, &cfg, temp.path(), 2).unwrap();
        assert_eq!(env.generation(), 0);

        let mut env = env;
        env.advance_generations(2, false).unwrap();
        checkpoint::save(temp.path(), &env.snapshot()).unwrap();

        let resumed = Environment::resume_or_new(CountProblem, &cfg, temp.path(), 2).unwrap();
        assert_eq!(resumed.generation(), 2);
        assert_eq!(resumed.config().population.max_generations, 9);
        for (a, b) in env.population().iter().zip(resumed.population()) {
            assert_eq!(a.chromosome, b.chromosome);
        }
    }

    #[test]
    fn test_restore_rejects_other_scope() {
        let env = Environment::new(CountProblem, &config(4, 0.0)).unwrap();
        let snapshot = env.snapshot();
        let result = Environment::restore(TableProblem, snapshot);
        assert!(matches!(
            result,
            Err(EvolutionError::Cache(CacheError::ScopeMismatch { .. }))
        ));
    }

    #[test]
    fn test_cancellation() {
        let mut cfg = config(4, 0.0);
        cfg.population.max_generations = 100;
        let mut env = Environment::new(CountProblem, &cfg).unwrap();
        env.cancel_handle().store(true, Ordering::Relaxed);

        let summary = env.run().unwrap();
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(summary.generations, 0);
    }

    #[test]
    fn test_run_reaches_max_generations() {
        let mut cfg = config(6, 0.01);
        cfg.population.max_generations = 3;
        let mut env = Environment::new(CountProblem, &cfg).unwrap();

        let seen = std::sync::Mutex::new(Vec::new());
        let summary = env
            .run_with_callback(|stats| seen.lock().unwrap().push(stats.generation))
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::MaxGenerations);
        assert_eq!(summary.generations, 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert!(env.population()[0].evaluated);
    }
}
