//! Cantilever plate loaded at the middle of its free edge.
//!
//! The design domain is a `2 × 1` plate discretized into `n × 2n` square
//! membrane elements. The left edge is clamped and a downward load acts on
//! the corner node at the middle of the right edge. A design is feasible when
//! the material reachable from the loaded element touches the left edge, and
//! with `fixed_corners` also holds both corners of that edge.
//!
//! Generation 0 is built from a coarse block graph: the rows and columns of
//! the grid are cut into slices no thinner than the minimum internal
//! thickness, every block is filled at random, and random walks guarantee a
//! load path. On a clamped edge the walk runs from the loaded block to the
//! left edge; with fixed corners two walks run from the support corners to
//! the loaded block, pulled toward the straight line joining them.

use std::sync::Arc;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand_pcg::Pcg64;

use crate::compute::{
    BoundaryConditions, Chromosome, ElementParameters, NodalLoad, OccupancyGrid,
    PlaneStressSolver, StructuralSolver, extract,
};
use crate::schema::{ConfigError, StructuralConfig};

use super::cache::{CachedEvaluation, PhenotypeCache, ScopeKey};
use super::engine::EvolutionError;
use super::individual::{Individual, StructuralResult};
use super::problem::Problem;

/// Growth of the displacement penalty weight per generation.
const PENALTY_GROWTH: f64 = 1.01;

/// Probability of a filled block in generation 0, clamped edge.
const EDGE_BLOCK_DENSITY: f64 = 0.5;

/// Probability of a filled block in generation 0, fixed corners.
const CORNER_BLOCK_DENSITY: f64 = 0.15;

/// Probability of a corner walk stepping toward the load when free to turn.
const CORNER_WALK_FORWARD: f64 = 0.5;

/// Cantilever plate problem.
#[derive(Debug, Clone)]
pub struct CantileverProblem<S: StructuralSolver = PlaneStressSolver> {
    config: StructuralConfig,
    solver: S,
    element: ElementParameters,
    conditions: BoundaryConditions,
}

impl CantileverProblem<PlaneStressSolver> {
    /// Create the problem with the bundled plane-stress solver.
    pub fn new(config: StructuralConfig) -> Result<Self, ConfigError> {
        Self::with_solver(config, PlaneStressSolver::new())
    }
}

impl<S: StructuralSolver> CantileverProblem<S> {
    /// Create the problem with a custom structural solver.
    pub fn with_solver(config: StructuralConfig, solver: S) -> Result<Self, ConfigError> {
        config.validate()?;

        let n = config.refinement_order;
        let element = ElementParameters {
            size: config.element_size(),
            thickness: config.thickness,
            poisson_ratio: config.poisson_ratio,
            young_modulus: config.young_modulus,
        };
        let conditions = BoundaryConditions {
            clamped: (0..=n).map(|row| (row, 0)).collect(),
            loads: vec![NodalLoad {
                label: (n / 2, 2 * n),
                fx: 0.0,
                fy: -config.load_magnitude,
            }],
        };

        Ok(Self {
            config,
            solver,
            element,
            conditions,
        })
    }

    pub fn config(&self) -> &StructuralConfig {
        &self.config
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn boundary_conditions(&self) -> &BoundaryConditions {
        &self.conditions
    }

    /// Weight of the displacement penalty at a given generation.
    pub fn penalty_weight(&self, generation: usize) -> f64 {
        self.config.penalty_weight * PENALTY_GROWTH.powi(generation as i32)
    }

    /// Build one random feasible design.
    pub fn random_design(&self, rng: &mut Pcg64) -> Result<Chromosome, ConfigError> {
        let n = self.config.refinement_order;
        let row_slices = self.config.row_slices;
        let col_slices = self.config.column_slices;
        let thickness = self.config.min_internal_thickness;

        let (row_cuts, start_slice) = slice_through_middle(n, row_slices, thickness, rng)?;
        let col_cuts = slice_interval(2 * n, col_slices, thickness, rng)?;

        let density = if self.config.fixed_corners {
            CORNER_BLOCK_DENSITY
        } else {
            EDGE_BLOCK_DENSITY
        };
        let mut graph: Vec<bool> = (0..row_slices * col_slices)
            .map(|_| rng.gen_bool(density))
            .collect();

        let paths = if self.config.fixed_corners {
            let mut paths = walk_from_corner(
                row_slices - 1,
                start_slice,
                row_slices,
                col_slices,
                CORNER_WALK_FORWARD,
                rng,
            );
            paths.extend(walk_from_corner(
                0,
                start_slice,
                row_slices,
                col_slices,
                CORNER_WALK_FORWARD,
                rng,
            ));
            paths
        } else {
            walk_to_edge(start_slice, col_slices - 1, row_slices, rng)
        };
        for (i, j) in paths {
            graph[i * col_slices + j] = true;
        }

        let mut design = OccupancyGrid::new(n, 2 * n);
        for i in 0..row_slices {
            for j in 0..col_slices {
                design.fill_block(
                    row_cuts[i]..row_cuts[i + 1],
                    col_cuts[j]..col_cuts[j + 1],
                    graph[i * col_slices + j],
                );
            }
        }
        Ok(design)
    }
}

impl<S: StructuralSolver> Problem for CantileverProblem<S> {
    fn scope(&self) -> ScopeKey {
        ScopeKey(self.config.scope_key())
    }

    fn initial_population(
        &self,
        count: usize,
        rng: &mut Pcg64,
    ) -> Result<Vec<Chromosome>, EvolutionError> {
        (0..count)
            .map(|_| self.random_design(rng).map_err(EvolutionError::from))
            .collect()
    }

    fn evaluate(
        &self,
        individual: &mut Individual,
        generation: usize,
        phenotypes: &mut PhenotypeCache,
    ) -> Result<(), EvolutionError> {
        let l = self.config.element_size();
        let phenotype = extract(&individual.chromosome, self.config.start_cell(), l);
        individual.evaluated = true;

        if !phenotype.boundary_reached {
            log::debug!("{} is disconnected from the support", individual.name);
            individual.fitness = 0.0;
            individual.structure = None;
            return Ok(());
        }
        if self.config.fixed_corners && !holds_support_corners(&phenotype.region) {
            log::debug!("{} is disconnected from the support corners", individual.name);
            individual.fitness = 0.0;
            individual.structure = None;
            return Ok(());
        }

        if let Some(hit) = phenotypes.get(&phenotype.region) {
            log::debug!("{}: phenotype already known", individual.name);
            individual.fitness = hit.fitness;
            individual.structure = Some(hit.structure);
            return Ok(());
        }

        let solution = self
            .solver
            .solve(&phenotype.mesh, &self.element, &self.conditions)?;
        let structure = Arc::new(StructuralResult::new(solution, phenotype.mesh));

        let cell_area = l * l;
        let connected_area = phenotype.region.count() as f64 * cell_area;
        let disconnected_area = individual.chromosome.count() as f64 * cell_area - connected_area;

        let excess = structure.max_displacement() - self.config.displacement_limit;
        let penalty = excess.max(0.0);
        if penalty > 0.0 {
            log::debug!(
                "{} penalized: Dmax - Dlim = {:.3e}",
                individual.name,
                penalty
            );
        }

        let fitness = 1.0
            / (connected_area
                + self.config.disconnected_area_weight * disconnected_area
                + self.penalty_weight(generation) * penalty);

        phenotypes.insert(
            &phenotype.region,
            CachedEvaluation {
                fitness,
                structure: Arc::clone(&structure),
            },
        );

        individual.fitness = fitness;
        individual.structure = Some(structure);
        Ok(())
    }
}

/// Whether the region holds both cells at the ends of the clamped edge.
pub fn holds_support_corners(region: &OccupancyGrid) -> bool {
    let rows = region.rows();
    rows > 0 && region.get(0, 0) && region.get(rows - 1, 0)
}

// ============================================================================
// Generation 0 helpers
// ============================================================================

/// Randomly split `length` into `slices` slices of at least `min_length`.
///
/// Returns the `slices + 1` cut positions, starting at 0 and ending at
/// `length`. Fails when there is no slack left over the minimum lengths.
pub fn slice_interval(
    length: usize,
    slices: usize,
    min_length: usize,
    rng: &mut Pcg64,
) -> Result<Vec<usize>, ConfigError> {
    let infeasible = ConfigError::InfeasiblePartition {
        length,
        slices,
        min_length,
    };
    match length.checked_sub(slices * min_length) {
        Some(slack) if slack > 0 => Ok(cut_points(slices, min_length, slack, 0, rng)),
        _ => Err(infeasible),
    }
}

/// Split `length` like [`slice_interval`] with a cut forced at `length / 2`.
///
/// Returns the cut positions and the index of the slice starting at the
/// middle cut.
pub fn slice_through_middle(
    length: usize,
    slices: usize,
    min_length: usize,
    rng: &mut Pcg64,
) -> Result<(Vec<usize>, usize), ConfigError> {
    let infeasible = ConfigError::InfeasiblePartition {
        length,
        slices,
        min_length,
    };
    if slices < 2 || length <= slices * min_length {
        return Err(infeasible);
    }

    let top_length = length / 2;
    let bottom_length = length - top_length;
    let fits = |top: usize| {
        top * min_length <= top_length && (slices - top) * min_length <= bottom_length
    };

    let preferred = slices / 2;
    let top = [preferred, slices - preferred]
        .into_iter()
        .chain(1..slices)
        .find(|&top| top >= 1 && top < slices && fits(top))
        .ok_or(infeasible)?;

    let mut cuts = cut_points(top, min_length, top_length - top * min_length, 0, rng);
    let bottom = cut_points(
        slices - top,
        min_length,
        bottom_length - (slices - top) * min_length,
        top_length,
        rng,
    );
    cuts.extend_from_slice(&bottom[1..]);
    Ok((cuts, top))
}

fn cut_points(
    slices: usize,
    min_length: usize,
    slack: usize,
    offset: usize,
    rng: &mut Pcg64,
) -> Vec<usize> {
    let mut cuts = Vec::with_capacity(slices + 1);
    let mut position = offset;
    cuts.push(position);
    for extra in distribute(slack, slices, rng) {
        position += min_length + extra;
        cuts.push(position);
    }
    cuts
}

/// Randomly spread `slack` units over `slices` slices.
pub fn distribute(slack: usize, slices: usize, rng: &mut Pcg64) -> Vec<usize> {
    if slices == 0 {
        return Vec::new();
    }

    let mut remaining = slack;
    let mut extras: Vec<usize> = (0..slices)
        .map(|_| {
            let extra = rng.gen_range(0..=remaining);
            remaining -= extra;
            extra
        })
        .collect();
    if let Some(last) = extras.last_mut() {
        *last += remaining;
    }
    extras.shuffle(rng);
    extras
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Up,
    Down,
    Left,
    Right,
}

/// Random walk over the block graph from `(row, col)` to the left edge.
///
/// Never reverses a vertical move. The step probabilities depend on the
/// number of options left: `1`, `(0.64, 0.36)` or `(0.32, 0.32, 0.36)` over
/// the options in the order up, down, left.
pub fn walk_to_edge(
    row: usize,
    col: usize,
    rows: usize,
    rng: &mut Pcg64,
) -> Vec<(usize, usize)> {
    let (mut i, mut j) = (row, col);
    let mut last: Option<Step> = None;
    let mut path = Vec::new();

    loop {
        path.push((i, j));

        let options: Vec<Step> = [Step::Up, Step::Down, Step::Left]
            .into_iter()
            .filter(|&step| match step {
                Step::Up => i > 0 && last != Some(Step::Down),
                Step::Down => i + 1 < rows && last != Some(Step::Up),
                Step::Left => true,
                Step::Right => false,
            })
            .collect();

        let weights: &[f64] = match options.len() {
            1 => &[1.0],
            2 => &[0.64, 0.36],
            _ => &[0.32, 0.32, 0.36],
        };
        let step = match WeightedIndex::new(weights) {
            Ok(dist) => options[dist.sample(rng)],
            Err(_) => Step::Left,
        };

        match step {
            Step::Left if j == 0 => break,
            Step::Left => j -= 1,
            Step::Right => j += 1,
            Step::Up => i -= 1,
            Step::Down => i += 1,
        }
        last = Some(step);
    }

    path
}

/// Random walk over the block graph from `(from_row, 0)` to
/// `(to_row, cols - 1)`.
///
/// Never reverses a vertical move. Free to move right, it does so with
/// probability `forward`; the remaining `1 - forward` is split between down
/// and up as `q / (1 + 3^(i - line))` and its complement, which pulls the
/// walk toward the straight line between both ends. With a single vertical
/// option the vertical weight is that share plus `q / 2`. Once in the last
/// column the walk moves straight to `to_row`.
pub fn walk_from_corner(
    from_row: usize,
    to_row: usize,
    rows: usize,
    cols: usize,
    forward: f64,
    rng: &mut Pcg64,
) -> Vec<(usize, usize)> {
    let last_col = cols.saturating_sub(1);
    let slope = (from_row as f64 - to_row as f64) / last_col.max(1) as f64;
    let line = |j: usize| from_row as f64 - j as f64 * slope;
    let q = 1.0 - forward;

    let (mut i, mut j) = (from_row, 0);
    let mut last = Step::Right;
    let mut path = Vec::new();

    while i != to_row || j != last_col {
        path.push((i, j));

        if last == Step::Right && j == last_col {
            if i > to_row {
                i -= 1;
            } else {
                i += 1;
            }
            continue;
        }

        let options: Vec<Step> = [Step::Down, Step::Up, Step::Right]
            .into_iter()
            .filter(|&step| match step {
                Step::Down => i + 1 < rows && last != Step::Up,
                Step::Up => i > 0 && last != Step::Down,
                _ => true,
            })
            .collect();

        let pull_down = q / (1.0 + 3f64.powf(i as f64 - line(j)));
        let weights = match options.len() {
            1 => vec![1.0],
            2 => {
                let share = if options[0] == Step::Up {
                    q - pull_down
                } else {
                    pull_down
                };
                let vertical = share + q / 2.0;
                vec![vertical, 1.0 - vertical]
            }
            _ => vec![pull_down, q - pull_down, forward],
        };
        let step = match WeightedIndex::new(&weights) {
            Ok(dist) => options[dist.sample(rng)],
            Err(_) => Step::Right,
        };

        match step {
            Step::Down => i += 1,
            Step::Up => i -= 1,
            _ => j += 1,
        }
        last = step;
    }

    path.push((i, j));
    path
}
