//! Gatefield scenario runner.
//!
//! Provides the `gatefield` binary. `run` plays a scenario file (a blueprint
//! plus a scripted input sequence) and prints the committed state changes as
//! JSON; `check` loads a blueprint and reports repairs, dropped gates and
//! dependency cycles without running any node.

mod scenario;

use std::fs;
use std::process;

use clap::{Parser, Subcommand};
use tracing::Level;

use gatefield_state::SessionError;
use scenario::Scenario;

/// Reactive field graph and state machine runner.
#[derive(Parser)]
#[command(name = "gatefield", about = "Reactive field graph and state machine runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Play a scenario and print the state changes it produces.
    Run {
        /// Path to the scenario JSON file.
        scenario: String,

        /// Number of ticks to run (default: from the scenario).
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Seconds per tick (default: from the scenario).
        #[arg(long)]
        dt: Option<f64>,

        /// Sort operations per refresh before the sort yields.
        #[arg(long)]
        op_budget: Option<usize>,

        /// Fail the run on the first dependency cycle.
        #[arg(long)]
        strict_cycles: bool,

        /// Log every value refresh and sort pass.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Load a scenario's blueprint and report problems without running it.
    Check {
        /// Path to the scenario JSON file.
        scenario: String,

        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Run {
            scenario,
            ticks,
            dt,
            op_budget,
            strict_cycles,
            verbose,
        } => {
            init_tracing(verbose);
            run_scenario(&scenario, ticks, dt, op_budget, strict_cycles)
        }
        Commands::Check { scenario, verbose } => {
            init_tracing(verbose);
            run_check(&scenario)
        }
    };
    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_scenario(path: &str) -> Result<Scenario, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read scenario '{}': {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("failed to parse scenario '{}': {}", path, e))
}

fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 = success, 1 = session error, 3 = I/O or parse error.
fn run_scenario(
    path: &str,
    ticks: Option<u64>,
    dt: Option<f64>,
    op_budget: Option<usize>,
    strict_cycles: bool,
) -> i32 {
    let mut scenario = match load_scenario(path) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 3;
        }
    };

    // Command-line flags win over the scenario file
    if let Some(ticks) = ticks {
        scenario.ticks = ticks;
    }
    if let Some(dt) = dt {
        scenario.dt = dt;
    }
    if let Some(budget) = op_budget {
        scenario.config.graph.op_budget = budget;
    }
    if strict_cycles {
        scenario.config.graph.strict_cycles = true;
    }

    match scenario::run(&scenario) {
        Ok(summary) => {
            print_json(&summary);
            0
        }
        Err(SessionError::Graph(e)) => {
            eprintln!("Graph error: {}", e);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 = clean, 1 = load error, 2 = problems found,
/// 3 = I/O or parse error.
fn run_check(path: &str) -> i32 {
    let scenario = match load_scenario(path) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 3;
        }
    };

    match scenario::check(scenario.config, &scenario.blueprint) {
        Ok(report) => {
            print_json(&report);
            if report.is_clean() {
                0
            } else {
                2
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
