//! TSPTW Solver - Command Line Interface
//!
//! Metaheuristic solver for the Travelling Salesman Problem with Time Windows.

use clap::{Parser, Subcommand, ValueEnum};
use tsptw_solver::benchmark::Benchmark;
use tsptw_solver::config::SolverConfig;
use tsptw_solver::heuristics::{AntSolver, BeamAcoSolver, DescentSolver, Gvns, Solver};
use tsptw_solver::instance::{Objective, TsptwInstance};
use tsptw_solver::report::{NullSink, ProgressSink, TraceRecorder};

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "tsptw-solver")]
#[command(version = "1.0")]
#[command(about = "Metaheuristic solver for the TSP with Time Windows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve an instance with independent seeded trials
    Solve {
        #[arg(short, long)]
        instance: PathBuf,

        /// Algorithm to use
        #[arg(short, long, value_enum, default_value = "gvns")]
        algorithm: Algorithm,

        /// Time limit per trial in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Iteration limit per trial
        #[arg(short = 'n', long)]
        iterations: Option<usize>,

        /// Number of trials
        #[arg(short = 'r', long)]
        trials: Option<usize>,

        /// Seed of the first trial
        #[arg(short, long)]
        seed: Option<u64>,

        #[arg(long, value_enum)]
        objective: Option<ObjectiveArg>,

        /// JSON file with solver parameters
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output best solution to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV file receiving every improvement
        #[arg(long)]
        trace: Option<PathBuf>,

        /// CSV file receiving one row per trial
        #[arg(long)]
        results: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Algorithm {
    /// General Variable Neighborhood Search
    Gvns,
    /// Beam-ACO construction with local search
    BeamAco,
    /// Ant construction with local search
    Aco,
    /// Random restarts with descent
    Descent,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum ObjectiveArg {
    /// Total travel time
    TourCost,
    /// Arrival time back at the depot
    Makespan,
}

impl From<ObjectiveArg> for Objective {
    fn from(arg: ObjectiveArg) -> Self {
        match arg {
            ObjectiveArg::TourCost => Objective::TourCost,
            ObjectiveArg::Makespan => Objective::Makespan,
        }
    }
}

struct SolveArgs {
    instance: PathBuf,
    algorithm: Algorithm,
    time_limit: Option<f64>,
    iterations: Option<usize>,
    trials: Option<usize>,
    seed: Option<u64>,
    objective: Option<ObjectiveArg>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    trace: Option<PathBuf>,
    results: Option<PathBuf>,
    verbose: bool,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            instance,
            algorithm,
            time_limit,
            iterations,
            trials,
            seed,
            objective,
            config,
            output,
            trace,
            results,
            verbose,
        } => {
            solve_instance(SolveArgs {
                instance,
                algorithm,
                time_limit,
                iterations,
                trials,
                seed,
                objective,
                config,
                output,
                trace,
                results,
                verbose,
            });
        }

        Commands::Analyze { instance } => {
            analyze_instance(&instance);
        }
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

fn load_instance(path: &Path) -> TsptwInstance {
    match TsptwInstance::from_file(path) {
        Ok(inst) => inst,
        Err(e) => fail(&format!("Error loading instance: {}", e)),
    }
}

/// Configuration file first, then individual flags on top.
fn build_config(args: &SolveArgs) -> Result<SolverConfig, String> {
    let mut config = match &args.config {
        Some(path) => SolverConfig::from_file(path)?,
        None => SolverConfig::default(),
    };
    if let Some(t) = args.time_limit {
        config.benchmark.time_limit = t;
    }
    if let Some(n) = args.iterations {
        config.benchmark.max_iterations = n;
    }
    if let Some(r) = args.trials {
        config.benchmark.trials = r;
    }
    if let Some(s) = args.seed {
        config.benchmark.seed = s;
    }
    if let Some(o) = args.objective {
        config.objective = o.into();
    }
    config.benchmark.progress = !args.verbose && config.benchmark.trials > 1;
    config.validate()?;
    Ok(config)
}

fn make_solver(algorithm: Algorithm, config: &SolverConfig) -> Box<dyn Solver> {
    match algorithm {
        Algorithm::Gvns => Box::new(Gvns::new(config.gvns.clone())),
        Algorithm::BeamAco => Box::new(BeamAcoSolver::new(config.beam.clone(), config.local_search.clone())),
        Algorithm::Aco => Box::new(AntSolver::new(config.ant.clone(), config.local_search.clone())),
        Algorithm::Descent => Box::new(DescentSolver::new(config.local_search.clone())),
    }
}

fn solve_instance(args: SolveArgs) {
    let config = build_config(&args).unwrap_or_else(|e| fail(&format!("Error in configuration: {}", e)));

    println!("Loading instance from {:?}...", args.instance);
    let mut instance = load_instance(&args.instance);
    instance.objective = config.objective;

    if args.verbose {
        println!("{}", instance.statistics());
        println!("Objective: {:?}", config.objective);
    }

    let solver = make_solver(args.algorithm, &config);
    println!(
        "Solving with {} ({} trials, {:.1}s per trial)...",
        solver.name(),
        config.benchmark.trials,
        config.benchmark.time_limit
    );

    let mut recorder = if args.verbose { TraceRecorder::logging() } else { TraceRecorder::new() };
    let mut null = NullSink;
    let sink: &mut dyn ProgressSink = if args.trace.is_some() || args.verbose { &mut recorder } else { &mut null };

    let mut benchmark = Benchmark::new(config.benchmark.clone());
    let solution = benchmark.run(&instance, solver.as_ref(), sink);

    println!("\n========== Results ==========");
    print!("{}", benchmark.generate_report());
    println!();
    print!("{}", solution);

    if let Err(e) = solution.to_tour(&instance).and_then(|tour| tour.check_solution()) {
        fail(&format!("Inconsistent solution: {}", e));
    }

    if let Some(path) = args.output {
        match solution.save_json(&path) {
            Ok(()) => println!("\nSolution saved to {:?}", path),
            Err(e) => fail(&format!("Cannot write solution: {}", e)),
        }
    }
    if let Some(path) = args.trace {
        match recorder.export_csv(&path) {
            Ok(()) => println!("Trace saved to {:?}", path),
            Err(e) => fail(&format!("Cannot write trace: {}", e)),
        }
    }
    if let Some(path) = args.results {
        let exported = if path.extension().map_or(false, |ext| ext == "json") {
            benchmark.export_to_json(&path)
        } else {
            benchmark.export_to_csv(&path)
        };
        match exported {
            Ok(()) => println!("Results saved to {:?}", path),
            Err(e) => fail(&format!("Cannot write results: {}", e)),
        }
    }
}

fn analyze_instance(path: &Path) {
    let instance = load_instance(path);

    println!("========== Instance Analysis ==========\n");
    print!("{}", instance.statistics());

    let n = instance.n();
    let widths: Vec<f64> = (1..n)
        .map(|i| instance.window_end(i) - instance.window_start(i))
        .collect();
    if !widths.is_empty() {
        let avg = widths.iter().sum::<f64>() / widths.len() as f64;
        let min = widths.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = widths.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        println!("\nTime Window Widths:");
        println!("  Average: {:.2}", avg);
        println!("  Min: {:.2}", min);
        println!("  Max: {:.2}", max);
    }

    let unreachable: Vec<usize> = (1..n).filter(|&i| instance.tw_infeasible(0, i)).collect();
    if !unreachable.is_empty() {
        println!("\nCustomers unreachable in time from the depot: {:?}", unreachable);
    }
}
