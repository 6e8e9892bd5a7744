//! Individuals of the population.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compute::{Chromosome, Mesh, StructuralSolution};

/// Structural analysis results attached to an evaluated design.
///
/// Shared through `Arc` between individuals and the phenotype cache; never
/// mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralResult {
    pub force: Vec<f64>,
    pub displacement: Vec<f64>,
    pub mesh: Mesh,
}

impl StructuralResult {
    pub fn new(solution: StructuralSolution, mesh: Mesh) -> Self {
        Self {
            force: solution.force,
            displacement: solution.displacement,
            mesh,
        }
    }

    /// Largest nodal displacement norm.
    pub fn max_displacement(&self) -> f64 {
        self.displacement
            .chunks_exact(2)
            .map(|d| (d[0] * d[0] + d[1] * d[1]).sqrt())
            .fold(0.0, f64::max)
    }
}

/// One candidate design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub name: String,
    pub chromosome: Chromosome,
    pub fitness: f64,
    /// Whether `fitness` reflects the current chromosome.
    pub evaluated: bool,
    /// Structural results of the last full evaluation, if any.
    #[serde(skip)]
    pub structure: Option<Arc<StructuralResult>>,
}

impl Individual {
    /// Create an unevaluated individual.
    pub fn new(name: impl Into<String>, chromosome: Chromosome) -> Self {
        Self {
            name: name.into(),
            chromosome,
            fitness: 0.0,
            evaluated: false,
            structure: None,
        }
    }

    /// Mark the fitness stale after the chromosome changed.
    ///
    /// The old fitness value is kept so the population can still be ordered
    /// until the next evaluation.
    pub fn invalidate(&mut self) {
        self.evaluated = false;
        self.structure = None;
    }
}

/// Descending fitness order, suitable for a stable `sort_by`.
pub fn by_fitness_desc(a: &Individual, b: &Individual) -> Ordering {
    b.fitness.partial_cmp(&a.fitness).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::OccupancyGrid;

    #[test]
    fn test_max_displacement() {
        let result = StructuralResult {
            force: vec![0.0; 6],
            displacement: vec![0.0, 0.0, 3.0, -4.0, 1.0, 1.0],
            mesh: Mesh::new(1, 1.0),
        };
        assert!((result.max_displacement() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_sort_is_stable_and_descending() {
        let mut population: Vec<Individual> = [3.0, 5.0, 3.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, &f)| {
                let mut ind = Individual::new(format!("I{i}"), OccupancyGrid::new(1, 1));
                ind.fitness = f;
                ind
            })
            .collect();

        population.sort_by(by_fitness_desc);
        let names: Vec<&str> = population.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["I1", "I0", "I2", "I3"]);
    }

    #[test]
    fn test_invalidate_keeps_fitness() {
        let mut ind = Individual::new("A", OccupancyGrid::new(1, 1));
        ind.fitness = 2.5;
        ind.evaluated = true;
        ind.invalidate();
        assert!(!ind.evaluated);
        assert_eq!(ind.fitness, 2.5);
    }
}
