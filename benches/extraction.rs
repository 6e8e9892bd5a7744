//! Benchmarks for phenotype extraction, structural analysis and a generation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use evotopo::{
    CantileverProblem, Environment, EvolutionConfig, OccupancyGrid, StructuralConfig,
    compute::{ElementParameters, PlaneStressSolver, StructuralSolver, extract},
};

fn random_grid(n: usize, density: f64, seed: u64) -> OccupancyGrid {
    let mut rng = Pcg64::seed_from_u64(seed);
    let cells = (0..2 * n * n).map(|_| rng.gen_bool(density)).collect();
    OccupancyGrid::from_cells(n, 2 * n, cells).unwrap_or_else(|| OccupancyGrid::filled(n, 2 * n))
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");

    for n in [8, 16, 32, 64] {
        let grid = random_grid(n, 0.7, 1);
        let start = (n / 2, 2 * n - 1);

        group.bench_with_input(BenchmarkId::from_parameter(format!("{}x{}", n, 2 * n)), &n, |b, &n| {
            b.iter(|| extract(black_box(&grid), start, 1.0 / n as f64));
        });
    }

    group.finish();
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("plane_stress_solve");
    group.sample_size(20);

    for n in [8, 16] {
        let config = StructuralConfig {
            refinement_order: n,
            ..Default::default()
        };
        let Ok(problem) = CantileverProblem::new(config.clone()) else {
            continue;
        };
        let phenotype = extract(&OccupancyGrid::filled(n, 2 * n), config.start_cell(), config.element_size());
        let parameters = ElementParameters {
            size: config.element_size(),
            thickness: config.thickness,
            poisson_ratio: config.poisson_ratio,
            young_modulus: config.young_modulus,
        };
        let solver = PlaneStressSolver::new();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                solver
                    .solve(black_box(&phenotype.mesh), &parameters, problem.boundary_conditions())
                    .ok()
            });
        });
    }

    group.finish();
}

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generation");
    group.sample_size(10);

    let mut config = EvolutionConfig::default();
    config.structure.refinement_order = 8;
    config.structure.row_slices = 3;
    config.structure.column_slices = 6;
    config.population.size = 20;
    config.random_seed = Some(3);

    for parallel in [false, true] {
        let mut config = config.clone();
        config.evaluation.parallel = parallel;

        group.bench_with_input(
            BenchmarkId::from_parameter(if parallel { "parallel" } else { "serial" }),
            &parallel,
            |b, _| {
                b.iter_with_setup(
                    || {
                        let problem = CantileverProblem::new(config.structure.clone()).ok()?;
                        Environment::new(problem, &config).ok()
                    },
                    |env| {
                        if let Some(mut env) = env {
                            env.advance_one_generation().ok();
                        }
                    },
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_extract, bench_solve, bench_generation);
criterion_main!(benches);
