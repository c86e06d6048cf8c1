//! lxbridge CLI
//!
//! Offline tools for the lxbridge engine.
//!
//! # Commands
//!
//! - `check-config` - Parse and validate a bridge configuration
//! - `structure` - Summarize a controller structure description
//! - `replay` - Run a recorded event script through the engine

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// lxbridge command-line tools.
#[derive(Parser)]
#[command(name = "lxbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a bridge configuration file
    CheckConfig {
        /// Path to the JSON configuration
        file: PathBuf,
    },

    /// Summarize a structure description
    Structure {
        /// Path to the structure file (LoxAPP3.json)
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay an event script against the engine with an in-memory controller
    Replay {
        /// Path to the structure file served by the in-memory controller
        #[arg(short, long)]
        structure: PathBuf,

        /// Path to the JSON-lines event script
        #[arg(short, long)]
        events: PathBuf,

        /// Bridge configuration (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckConfig { file } => {
            commands::check_config::run(&file)?;
        }
        Commands::Structure { file, format } => {
            commands::structure::run(&file, &format)?;
        }
        Commands::Replay {
            structure,
            events,
            config,
            format,
        } => {
            commands::replay::run(&structure, &events, config.as_deref(), &format)?;
        }
        Commands::Version => {
            println!("lxbridge CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
