//! Headless Gridwar match runner.
//!
//! Runs a match without graphics at a fixed tick rate and prints a JSON
//! summary. Designed for AI tuning and CI smoke tests.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in 1v1 AI skirmish for 3600 ticks
//! cargo run -p gridwar_headless -- run
//!
//! # Run a scenario file on a specific map
//! cargo run -p gridwar_headless -- run --config scenarios/skirmish_1v1.ron --map arena.map --ticks 7200
//!
//! # Verify determinism
//! cargo run -p gridwar_headless -- verify --config scenarios/skirmish_1v1.ron --ticks 1800
//! ```
//!
//! Output (stdout): JSON summary
//! Logs (stderr): tracing output

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridwar_headless::{
    runner::{verify_determinism, HeadlessRunner},
    scenario::{Scenario, ScenarioError},
};

#[derive(Parser)]
#[command(name = "gridwar_headless")]
#[command(about = "Headless Gridwar match runner for AI tuning and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single match and print its summary
    Run {
        /// Scenario file (RON); the built-in skirmish when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Binary map file, overriding the scenario's map
        #[arg(short, long)]
        map: Option<PathBuf>,

        /// Ticks to run; the scenario's default when omitted
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Run a match repeatedly and compare final state hashes
    Verify {
        /// Scenario file (RON); the built-in skirmish when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Ticks per run
        #[arg(short, long, default_value = "1800")]
        ticks: u64,

        /// Number of runs
        #[arg(short, long, default_value = "2")]
        runs: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for the summary)
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    let result = match cli.command {
        Some(Commands::Run { config, map, ticks }) => cmd_run(config.as_deref(), map.as_deref(), ticks),
        Some(Commands::Verify {
            config,
            ticks,
            runs,
        }) => cmd_verify(config.as_deref(), ticks, runs),
        None => cmd_run(None, None, None),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(%err, "headless run failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load(config: Option<&Path>) -> Result<Scenario, ScenarioError> {
    config.map_or_else(|| Ok(Scenario::skirmish_1v1()), Scenario::load)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::error!(%err, "summary not serializable"),
    }
}

/// Run a single match
fn cmd_run(
    config: Option<&Path>,
    map: Option<&Path>,
    ticks: Option<u64>,
) -> Result<ExitCode, ScenarioError> {
    let scenario = load(config)?;
    let ticks = ticks.unwrap_or(scenario.ticks);
    let mut runner = HeadlessRunner::new(scenario, map)?;
    let summary = runner.run(ticks)?;
    print_json(&summary);
    Ok(ExitCode::SUCCESS)
}

/// Verify determinism by running the same scenario several times
fn cmd_verify(config: Option<&Path>, ticks: u64, runs: usize) -> Result<ExitCode, ScenarioError> {
    let scenario = load(config)?;
    tracing::info!(scenario = %scenario.name, ticks, runs, "verifying determinism");
    let report = verify_determinism(&scenario, None, ticks, runs.max(2))?;
    print_json(&report);
    if report.deterministic {
        eprintln!("PASS: All {} runs produced identical results", report.hashes.len());
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        Ok(ExitCode::FAILURE)
    }
}
