//! VSPTW Solver - Command Line Interface
//!
//! Builds driver schedules for time-windowed shipments dispatched from several depots.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use vsptw_solver::benchmark::{Benchmark, Strategy};
use vsptw_solver::check::check_schedule;
use vsptw_solver::config::SolverConfig;
use vsptw_solver::error::Result;
use vsptw_solver::exact::{ExactConfig, ExactSolver, UnavailableExactSolver};
use vsptw_solver::export::{build_report, write_json_report, write_schedule_csv};
use vsptw_solver::heuristics::local_search::RandomizedSearch;
use vsptw_solver::heuristics::repair::DriverChangeRepair;
use vsptw_solver::instance::Instance;
use vsptw_solver::visualization::Visualizer;

use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "vsptw-solver")]
#[command(version = "1.0")]
#[command(about = "Heuristic solver for the multi-depot vehicle scheduling problem with time windows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// The three input files of an instance
#[derive(clap::Args)]
struct InputArgs {
    /// Drive time matrix CSV
    #[arg(short, long)]
    matrix: PathBuf,

    /// Depots CSV (depot, capacity)
    #[arg(short, long)]
    depots: PathBuf,

    /// Shipments CSV
    #[arg(short, long)]
    shipments: PathBuf,

    /// Shipments have fixed start and end times
    #[arg(long)]
    fixed: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a schedule for an instance
    Solve {
        #[command(flatten)]
        input: InputArgs,

        /// Strategy to use
        #[arg(long, value_enum, default_value = "randomized")]
        strategy: Strategy,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Number of restarts of the randomized search
        #[arg(long)]
        restarts: Option<usize>,

        /// Time limit in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Rebuild too-long trucks that cannot change drivers
        #[arg(long)]
        repair: bool,

        /// Write one CSV row per scheduled shipment
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the JSON report
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write the SVG timeline
        #[arg(long)]
        svg: Option<PathBuf>,

        /// Write the timeline as PNG
        #[arg(long)]
        png: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Analyze an instance
    Analyze {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Compare strategies on an instance
    Compare {
        #[command(flatten)]
        input: InputArgs,

        /// Number of seeds per strategy
        #[arg(short, long, default_value = "10")]
        runs: usize,

        /// Output CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build the time-expanded network and hand it to the exact solver
    Exact {
        #[command(flatten)]
        input: InputArgs,

        /// Time limit in seconds
        #[arg(short, long, default_value = "3600")]
        time_limit: f64,

        /// Spacing of candidate start times, in minutes
        #[arg(long, default_value = "15")]
        interval: f64,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Solve { input, strategy, seed, restarts, time_limit, repair, csv, json, svg, png, verbose } => {
            let outputs = Outputs { csv, json, svg, png };
            solve_instance(&input, strategy, seed, restarts, time_limit, repair, &outputs, verbose)
        }
        Commands::Analyze { input } => analyze_instance(&input),
        Commands::Compare { input, runs, output } => compare_strategies(&input, runs, output),
        Commands::Exact { input, time_limit, interval } => run_exact(&input, time_limit, interval),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct Outputs {
    csv: Option<PathBuf>,
    json: Option<PathBuf>,
    svg: Option<PathBuf>,
    png: Option<PathBuf>,
}

fn load(input: &InputArgs) -> Result<(Instance, SolverConfig)> {
    println!("Loading instance from {:?}...", input.shipments);
    let instance = if input.fixed {
        Instance::from_fixed_files(&input.matrix, &input.depots, &input.shipments)?
    } else {
        Instance::from_files(&input.matrix, &input.depots, &input.shipments)?
    };
    let config = match &input.config {
        Some(path) => SolverConfig::from_file(path)?,
        None => SolverConfig::default(),
    };
    Ok((instance, config))
}

#[allow(clippy::too_many_arguments)]
fn solve_instance(
    input: &InputArgs,
    strategy: Strategy,
    seed: Option<u64>,
    restarts: Option<usize>,
    time_limit: Option<f64>,
    repair: bool,
    outputs: &Outputs,
    verbose: bool,
) -> Result<()> {
    let (instance, mut config) = load(input)?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(restarts) = restarts {
        config.search.restarts = restarts;
    }
    if time_limit.is_some() {
        config.search.time_limit = time_limit;
    }
    config.validate()?;
    let ctx = instance.context(&config);

    if verbose {
        println!("{}", instance.statistics());
    }

    println!("Solving with {:?} strategy...", strategy);
    let start = Instant::now();

    let mut schedule = match strategy {
        Strategy::Randomized => {
            let bar = ProgressBar::new(config.search.restarts as u64 + 1);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} runs")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            let frontier = RandomizedSearch::from_config(&config).search(&ctx, &instance.requests, Some(&bar));
            bar.finish_and_clear();
            if verbose {
                for (label, alternative) in [
                    ("one more truck", &frontier.one_more_truck),
                    ("two more trucks", &frontier.two_more_trucks),
                ] {
                    if let Some(alternative) = alternative {
                        println!("Best with {}: {:.2}", label, alternative.total_cost(&ctx));
                    }
                }
            }
            frontier.best
        }
        other => other.run(&ctx, &instance.requests, config.seed),
    };

    if repair {
        schedule = DriverChangeRepair::from_config(&config).repair(&ctx, &schedule);
    }

    let elapsed = start.elapsed();
    let check = check_schedule(&ctx, &instance.requests, &schedule);

    println!("\n========== Results ==========");
    println!("{}", schedule.metrics(&ctx));
    println!("Check: {}", check);
    println!("Time: {:.4}s", elapsed.as_secs_f64());

    if verbose {
        println!();
        for truck in &schedule.trucks {
            println!("{}", truck.describe(&ctx));
        }
    }

    if let Some(path) = &outputs.csv {
        write_schedule_csv(&ctx, &schedule, path)?;
        println!("Schedule saved to {:?}", path);
    }

    if let Some(path) = &outputs.json {
        let report = build_report(&ctx, &instance.name, &instance.requests, &schedule);
        write_json_report(&report, path)?;
        println!("Report saved to {:?}", path);
    }

    if outputs.svg.is_some() || outputs.png.is_some() {
        let viz = Visualizer::new();
        let svg = viz.generate_timeline_svg(&ctx, &schedule, &format!("{} - {}", instance.name, schedule.algorithm));
        if let Some(path) = &outputs.svg {
            save_svg(&viz, &svg, path)?;
        }
        if let Some(path) = &outputs.png {
            match viz.save_png(&svg, path) {
                Ok(()) => println!("Timeline saved to {:?}", path),
                Err(e) => {
                    // fallback: write SVG if PNG conversion failed
                    let svg_path = path.with_extension("svg");
                    save_svg(&viz, &svg, &svg_path)?;
                    println!("PNG conversion failed ({}). Saved SVG instead", e);
                }
            }
        }
    }

    Ok(())
}

fn save_svg(viz: &Visualizer, svg: &str, path: &Path) -> Result<()> {
    viz.save_svg(svg, path).map_err(|e| vsptw_solver::SolverError::io(path, e))?;
    println!("Timeline saved to {:?}", path);
    Ok(())
}

fn analyze_instance(input: &InputArgs) -> Result<()> {
    let (instance, config) = load(input)?;
    let ctx = instance.context(&config);

    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());

    println!("\nDepots:");
    for depot in &instance.depots {
        let served = instance
            .requests
            .iter()
            .filter(|r| r.start_location == depot.location || r.end_location == depot.location)
            .count();
        println!("  {:<12} capacity {:>3}, {} shipments touch it", ctx.name(depot.location), depot.capacity, served);
    }

    let lower_bound = (instance.input_hours() / config.duration.max_duration_with_waiting).ceil() as usize;
    println!("\nFleet lower bound (input hours / longest day): {}", lower_bound);
    if lower_bound > instance.total_capacity() {
        println!("  Warning: exceeds the total depot capacity of {}", instance.total_capacity());
    }

    let quick = Strategy::Construction.run(&ctx, &instance.requests, config.seed);
    println!("\nQuick Solution Estimate:");
    println!(
        "  SequentialInsertion: {:.2} with {} trucks, {} unplaced (feasible: {})",
        quick.total_cost(&ctx),
        quick.num_trucks(),
        quick.unplaced.len(),
        quick.is_feasible(&ctx)
    );
    Ok(())
}

fn compare_strategies(input: &InputArgs, runs: usize, output: Option<PathBuf>) -> Result<()> {
    let (instance, config) = load(input)?;
    config.validate()?;

    println!("Comparing strategies on {} ({} shipments)...\n", instance.name, instance.requests.len());

    let strategies = Strategy::all();
    let bar = ProgressBar::new((strategies.len() * runs) as u64);
    let mut benchmark = Benchmark::with_seed_count(config.seed, runs);
    benchmark.run(&instance, &config, &strategies, Some(&bar));
    bar.finish_and_clear();

    println!("{}", benchmark.generate_report());

    if let Some(out_path) = output {
        benchmark.export_to_csv(&out_path)?;
        println!("Results exported to {:?}", out_path);
        let stats_path = out_path.with_extension("statistics.csv");
        benchmark.export_statistics_csv(&stats_path)?;
        println!("Statistics exported to {:?}", stats_path);
    }
    Ok(())
}

fn run_exact(input: &InputArgs, time_limit: f64, interval: f64) -> Result<()> {
    let (instance, config) = load(input)?;
    let ctx = instance.context(&config);
    let exact = ExactConfig { time_limit, interval_minutes: interval, ..ExactConfig::default() };

    let solver = UnavailableExactSolver;
    let result = solver.solve(&ctx, &instance.requests, &exact)?;
    println!("Status: {}", result.status);
    println!("Lower bound: {:.2}", result.lower_bound);
    println!("Gap: {:.4}%", result.gap * 100.0);
    println!("Nodes explored: {}", result.nodes_explored);
    println!("{}", result.schedule.metrics(&ctx));
    Ok(())
}
