//! Genetic operators on occupancy-grid chromosomes.
//!
//! Provides the population convergence measure, the adaptive per-bit
//! mutation, the border-focused topology mutation and the three-block
//! crossover.

use rand::Rng;
use rand::seq::index;

use crate::compute::Chromosome;

use super::individual::Individual;

/// Per-cell population mean of the chromosomes (fraction of individuals
/// holding material in each cell).
pub fn mean_map(population: &[Individual]) -> Vec<f64> {
    let Some(first) = population.first() else {
        return Vec::new();
    };

    let mut sums = vec![0.0; first.chromosome.len()];
    for ind in population {
        for (sum, &cell) in sums.iter_mut().zip(ind.chromosome.cells()) {
            if cell {
                *sum += 1.0;
            }
        }
    }

    let n = population.len() as f64;
    sums.iter_mut().for_each(|s| *s /= n);
    sums
}

/// Mean of `4m² − 4m + 1` over the mean map: 1 when every cell is agreed
/// upon, 0 when every cell is split evenly.
pub fn convergence_index(mean: &[f64]) -> f64 {
    if mean.is_empty() {
        return 0.0;
    }
    mean.iter()
        .map(|&m| 4.0 * m * m - 4.0 * m + 1.0)
        .sum::<f64>()
        / mean.len() as f64
}

/// Flip probability of one cell under adaptive mutation.
///
/// Near `base` while the cell agrees with the population, up to `100 · base`
/// when it disagrees with a converged consensus.
#[inline]
pub fn adaptive_probability(base: f64, mean: f64, gene: bool) -> f64 {
    let b = if gene { 1.0 } else { 0.0 };
    base * (1.0 + 99.0 * mean * mean + 99.0 * b * (1.0 - 2.0 * mean))
}

/// Apply adaptive per-bit mutation. Draws one uniform value per cell and
/// returns the number of flipped cells.
pub fn adaptive_mutation<R: Rng + ?Sized>(
    chromosome: &mut Chromosome,
    mean: &[f64],
    base_probability: f64,
    rng: &mut R,
) -> usize {
    let mut flips = 0;
    for (idx, &m) in mean.iter().enumerate().take(chromosome.len()) {
        let p = adaptive_probability(base_probability, m, chromosome.cells()[idx]);
        if rng.r#gen::<f64>() < p {
            chromosome.flip_index(idx);
            flips += 1;
        }
    }
    flips
}

/// Cells whose state differs from at least one 4-neighbour, with wrap-around
/// at the grid edges.
pub fn edge_cells(chromosome: &Chromosome) -> Vec<bool> {
    let (rows, cols) = chromosome.shape();
    let mut edges = vec![false; chromosome.len()];
    if rows == 0 || cols == 0 {
        return edges;
    }

    for row in 0..rows {
        let up = (row + rows - 1) % rows;
        let down = (row + 1) % rows;
        for col in 0..cols {
            let left = (col + cols - 1) % cols;
            let right = (col + 1) % cols;
            let here = chromosome.get(row, col);
            edges[chromosome.index(row, col)] = chromosome.get(up, col) != here
                || chromosome.get(down, col) != here
                || chromosome.get(row, left) != here
                || chromosome.get(row, right) != here;
        }
    }
    edges
}

/// Flip edge cells with probability `flip_probability`.
///
/// When `grow` is set only empty edge cells are candidates (material is
/// added at the border); otherwise only material edge cells are (material is
/// removed). Returns the number of flipped cells.
pub fn border_mutation<R: Rng + ?Sized>(
    chromosome: &mut Chromosome,
    flip_probability: f64,
    grow: bool,
    rng: &mut R,
) -> usize {
    let edges = edge_cells(chromosome);
    let mut flips = 0;
    for (idx, is_edge) in edges.into_iter().enumerate() {
        let material = chromosome.cells()[idx];
        if is_edge && material != grow && rng.r#gen::<f64>() < flip_probability {
            chromosome.flip_index(idx);
            flips += 1;
        }
    }
    flips
}

/// Two distinct sorted cut positions splitting `0..len` into three bands.
///
/// Cuts are interior when the dimension allows it.
fn two_cuts<R: Rng + ?Sized>(len: usize, rng: &mut R) -> (usize, usize) {
    let (a, b) = if len >= 3 {
        let picks = index::sample(rng, len - 1, 2);
        (picks.index(0) + 1, picks.index(1) + 1)
    } else {
        let picks = index::sample(rng, len + 1, 2);
        (picks.index(0), picks.index(1))
    };
    (a.min(b), a.max(b))
}

/// Three-block crossover.
///
/// Two horizontal and two vertical cuts partition the grid into a 3×3
/// layout; three distinct blocks are copied from `p2` into a copy of `p1`.
pub fn three_block_crossover<R: Rng + ?Sized>(
    p1: &Chromosome,
    p2: &Chromosome,
    rng: &mut R,
) -> Chromosome {
    let (rows, cols) = p1.shape();
    let (r1, r2) = two_cuts(rows, rng);
    let (c1, c2) = two_cuts(cols, rng);
    let row_bands = [0..r1, r1..r2, r2..rows];
    let col_bands = [0..c1, c1..c2, c2..cols];

    let mut child = p1.clone();
    for block in index::sample(rng, 9, 3) {
        child.copy_block_from(p2, row_bands[block / 3].clone(), col_bands[block % 3].clone());
    }
    child
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    use super::*;
    use crate::compute::OccupancyGrid;

    fn individual(grid: &str) -> Individual {
        Individual::new("x", grid.parse().unwrap())
    }

    #[test]
    fn test_convergence_index_extremes() {
        // Two complementary individuals: every cell mean is 0.5.
        let split = [individual("#.#.\n.#.#"), individual(".#.#\n#.#.")];
        let mean = mean_map(&split);
        assert!(mean.iter().all(|&m| (m - 0.5).abs() < 1e-12));
        assert!(convergence_index(&mean).abs() < 1e-12);

        // Identical individuals: every cell mean is 0 or 1.
        let agreed = [individual("##..\n.##."), individual("##..\n.##.")];
        assert!((convergence_index(&mean_map(&agreed)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_adaptive_probability() {
        let base = 1e-3;
        // Agreeing with a converged consensus keeps the base rate.
        assert!((adaptive_probability(base, 1.0, true) - base).abs() < 1e-15);
        assert!((adaptive_probability(base, 0.0, false) - base).abs() < 1e-15);
        // Disagreeing with it raises the rate a hundredfold.
        assert!((adaptive_probability(base, 1.0, false) - 100.0 * base).abs() < 1e-12);
        assert!((adaptive_probability(base, 0.0, true) - 100.0 * base).abs() < 1e-12);
    }

    #[test]
    fn test_adaptive_mutation_corrects_outlier() {
        let mut rng = Pcg64::seed_from_u64(3);
        let mean = vec![1.0; 4];
        let mut chromosome: OccupancyGrid = "....".parse().unwrap();
        // p = 100 · 0.01 = 1 for every disagreeing cell.
        let flips = adaptive_mutation(&mut chromosome, &mean, 0.01, &mut rng);
        assert_eq!(flips, 4);
        assert_eq!(chromosome.count(), 4);
    }

    #[test]
    fn test_zero_probability_never_flips() {
        let mut rng = Pcg64::seed_from_u64(3);
        let mut chromosome: OccupancyGrid = "#.#.".parse().unwrap();
        let before = chromosome.clone();
        let mean = vec![0.5; 4];
        assert_eq!(adaptive_mutation(&mut chromosome, &mean, 0.0, &mut rng), 0);
        assert_eq!(border_mutation(&mut chromosome, 0.0, true, &mut rng), 0);
        assert_eq!(chromosome, before);
    }

    #[test]
    fn test_edge_cells() {
        let chromosome: OccupancyGrid = ".....\n.###.\n.###.\n.###.\n.....".parse().unwrap();
        let edges = edge_cells(&chromosome);
        let idx = |r, c| chromosome.index(r, c);

        assert!(!edges[idx(2, 2)], "interior cell");
        assert!(edges[idx(1, 1)], "material border");
        assert!(edges[idx(0, 1)], "void border");
        assert!(!edges[idx(0, 0)], "far void corner");
    }

    #[test]
    fn test_border_mutation_direction() {
        let mut rng = Pcg64::seed_from_u64(11);
        let base: OccupancyGrid = ".....\n.###.\n.###.\n.###.\n.....".parse().unwrap();

        let mut grown = base.clone();
        border_mutation(&mut grown, 1.0, true, &mut rng);
        assert!(base.is_subset_of(&grown));
        assert!(grown.count() > base.count());

        let mut shrunk = base.clone();
        border_mutation(&mut shrunk, 1.0, false, &mut rng);
        assert!(shrunk.is_subset_of(&base));
        assert_eq!(shrunk.count(), 1);
    }

    #[test]
    fn test_three_block_crossover() {
        let mut rng = Pcg64::seed_from_u64(5);
        let p1 = OccupancyGrid::new(8, 16);
        let p2 = OccupancyGrid::filled(8, 16);

        for _ in 0..50 {
            let child = three_block_crossover(&p1, &p2, &mut rng);
            let taken = child.count();
            assert!(taken > 0 && taken < child.len());

            // The copied material forms whole blocks: every material row
            // segment matches one of at most three column bands.
            let distinct_rows: std::collections::HashSet<Vec<bool>> = (0..8)
                .map(|r| (0..16).map(|c| child.get(r, c)).collect())
                .collect();
            assert!(distinct_rows.len() <= 3);
        }
    }

    #[test]
    fn test_crossover_on_small_grid() {
        let mut rng = Pcg64::seed_from_u64(1);
        let p1: OccupancyGrid = "....".parse().unwrap();
        let p2: OccupancyGrid = "####".parse().unwrap();
        let child = three_block_crossover(&p1, &p2, &mut rng);
        assert_eq!(child.shape(), (1, 4));
    }
}
