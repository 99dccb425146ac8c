//! Kinetrack CLI - replay, score, and synthesize landmark recordings
//!
//! This binary drives the limb trackers offline from JSON lines recordings.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use kinetrack_cli::commands;
use kinetrack_cli::commands::synth::SynthOptions;

/// Kinetrack - landmark-driven limb tracking with motion prediction
#[derive(Parser)]
#[command(name = "kinetrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log pipeline activity to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recording through the left arm, right arm, and body trackers
    Replay {
        /// Path to the JSON lines recording
        #[arg(short, long)]
        input: String,

        /// Tracker configuration file (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Score motion prediction against a recording
    Predict {
        /// Path to the JSON lines recording
        #[arg(short, long)]
        input: String,

        /// Prediction horizon in seconds (default: one recorded step)
        #[arg(short, long)]
        lookahead: Option<f64>,

        /// Training batch size override
        #[arg(short, long)]
        batch: Option<usize>,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a synthetic right-arm recording
    Synth {
        /// Output path of the JSON lines recording
        #[arg(short, long)]
        output: String,

        /// Number of frames at 50 fps
        #[arg(long, default_value_t = 500)]
        frames: usize,

        /// Seed for the jitter generator
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Half-width of per-coordinate jitter in meters
        #[arg(long, default_value_t = 0.005)]
        jitter: f64,

        /// Seconds of missing landmarks in the middle of the take
        #[arg(long, default_value_t = 0.0)]
        dropout: f64,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default tracker configuration, or validate a file
    Config {
        /// Configuration file to validate and print
        #[arg(long)]
        check: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Replay {
            input,
            config,
            json,
        } => commands::replay::run(&input, config.as_deref(), json),
        Commands::Predict {
            input,
            lookahead,
            batch,
            json,
        } => commands::predict::run(&input, lookahead, batch, json),
        Commands::Synth {
            output,
            frames,
            seed,
            jitter,
            dropout,
            json,
        } => {
            let options = SynthOptions {
                frames,
                seed,
                jitter,
                dropout,
            };
            commands::synth::run(&output, &options, json)
        }
        Commands::Config { check } => commands::config::run(check.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}
