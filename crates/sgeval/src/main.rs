//! sgeval CLI - Recall@K evaluation of scene-graph predictions.
//!
//! Streams prediction and ground-truth batches from a JSONL file through the
//! evaluation engine and writes per-window and running metrics.
//!
//! # Usage
//!
//! ```bash
//! # Evaluate a stream of batch records
//! sgeval evaluate predictions.jsonl --output report.jsonl --format jsonl
//!
//! # Unconstrained ranking, detection protocol
//! sgeval evaluate predictions.jsonl --mode no-graph-constraint --task sgdet
//!
//! # View configuration
//! sgeval config show
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// sgeval - Recall@K evaluation for scene-graph generation.
#[derive(Parser, Debug)]
#[command(name = "sgeval")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config path)
    #[arg(short, long, global = true, env = "SGEVAL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a JSONL stream of prediction and target batches
    Evaluate(cli::evaluate::EvaluateArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match &cli.config {
        Some(path) => sgeval_core::Config::load_from(path)?,
        None => match sgeval_core::Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load config: {e}\n  \
                     Using default configuration. Check your config file with `sgeval config path`."
                );
                sgeval_core::Config::default()
            }
        },
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("sgeval v{}", sgeval_core::VERSION);

    match cli.command {
        Commands::Evaluate(args) => cli::evaluate::execute(args, config),
        Commands::Config(args) => cli::config::execute(args, config, cli.config),
    }
}
