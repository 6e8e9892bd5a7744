//! evotopo CLI - Run a cantilever optimization from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;

use evotopo::{
    CantileverProblem, Environment, EvolutionConfig,
    compute::evolution::Individual,
};

fn print_usage(program: &str) {
    eprintln!("Usage: {} <config.json> [generations] [--resume <generation>]", program);
    eprintln!();
    eprintln!("Evolve a cantilever plate design from JSON configuration.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.json  Path to evolution configuration file");
    eprintln!("  generations  Number of generations (default: population.max_generations)");
    eprintln!("  --resume     Continue from the checkpoint of that generation");
    eprintln!("               (needs checkpoint.output_dir and random_seed; starts");
    eprintln!("               fresh when the checkpoint is missing)");
    eprintln!();
    eprintln!("Example configuration is generated with --example flag.");
}

fn print_example_config() {
    let config = EvolutionConfig {
        random_seed: Some(1),
        ..Default::default()
    };
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing example config: {e}"),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let mut generations: Option<usize> = None;
    let mut resume: Option<usize> = None;
    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        if arg == "--resume" {
            resume = rest.next().and_then(|s| s.parse().ok());
            if resume.is_none() {
                fail("--resume expects a generation number");
            }
        } else if let Ok(n) = arg.parse() {
            generations = Some(n);
        } else {
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }

    // Load configuration
    let config_str = fs::read_to_string(&config_path)
        .unwrap_or_else(|e| fail(format!("Error reading config file: {e}")));
    let mut config: EvolutionConfig = serde_json::from_str(&config_str)
        .unwrap_or_else(|e| fail(format!("Error parsing config: {e}")));
    if let Some(n) = generations {
        config.population.max_generations = n;
    }
    if let Err(e) = config.validate() {
        fail(format!("Invalid config: {e}"));
    }

    let problem = CantileverProblem::new(config.structure.clone())
        .unwrap_or_else(|e| fail(format!("Invalid structure: {e}")));

    let mut env = match resume {
        Some(generation) => {
            let Some(dir) = config.checkpoint.output_dir.clone() else {
                fail("--resume needs checkpoint.output_dir in the config");
            };
            Environment::resume_or_new(problem, &config, dir, generation)
        }
        None => Environment::new(problem, &config),
    }
    .unwrap_or_else(|e| fail(format!("Error creating environment: {e}")));

    let structure = &config.structure;
    println!("Cantilever Topology Optimization");
    println!("================================");
    println!(
        "Grid: {}x{} (n = {})",
        structure.rows(),
        structure.cols(),
        structure.refinement_order
    );
    println!("Population: {}", config.population.size);
    println!("Generations: {}", config.population.max_generations);
    println!("Seed: {}", env.seed());
    println!();

    println!("Running evolution...");
    let report_every = (config.population.max_generations / 10).max(1);
    let summary = env
        .run_with_callback(|stats| {
            if stats.generation % report_every == 0 {
                println!(
                    "  Generation {}: best={:.6}, mean={:.6}, convergence={:.3}, cache hits={}/{}",
                    stats.generation,
                    stats.best_fitness,
                    stats.mean_fitness,
                    stats.convergence_index,
                    stats.gene_hits,
                    stats.phenotype_hits
                );
            }
        })
        .unwrap_or_else(|e| fail(format!("Evolution failed: {e}")));

    println!();
    println!("Stopped: {:?}", summary.stop_reason);
    println!("Generations: {}", summary.generations);
    println!("Convergence index: {:.4}", summary.convergence_index);
    println!("Time: {:.2}s", summary.elapsed_seconds);
    println!();

    if let Some(best) = env.population().first() {
        print_best(best);
    }
}

fn print_best(best: &Individual) {
    println!("Best design {} (fitness {:.6}):", best.name, best.fitness);
    if let Some(structure) = &best.structure {
        println!(
            "  Elements: {}, max displacement: {:.3e}",
            structure.mesh.element_count(),
            structure.max_displacement()
        );
    }
    println!("{}", best.chromosome);
}
