//! epochlog CLI
//!
//! Command-line tools for inspecting epochlog files.
//!
//! # Commands
//!
//! - `dump` - Print the entries of a log
//! - `verify` - Check a log for corruption and torn writes
//! - `rewind` - Walk entries backwards from the end of a log
//! - `restore` - Show the state a state log restores to

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// epochlog command-line tools.
#[derive(Parser)]
#[command(name = "epochlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the entries of a log
    Dump {
        /// Start reading at this offset (must be an entry boundary)
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Decode state entry headers
        #[arg(short, long)]
        state: bool,
    },

    /// Check a log for corruption and torn writes
    Verify,

    /// Walk entries backwards from the end of a log
    Rewind {
        /// Start from this offset instead of the end of the file
        #[arg(short, long)]
        limit: Option<u64>,

        /// Maximum number of entries to visit
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Show the state a state log restores to
    Restore {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Dump {
            offset,
            limit,
            format,
            state,
        } => {
            let path = cli.path.ok_or("Log path required for dump")?;
            commands::dump::run(&path, offset, limit, format, state)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Log path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Rewind { limit, count } => {
            let path = cli.path.ok_or("Log path required for rewind")?;
            commands::rewind::run(&path, limit, count)?;
        }
        Commands::Restore { format } => {
            let path = cli.path.ok_or("Log path required for restore")?;
            commands::restore::run(&path, format)?;
        }
        Commands::Version => {
            println!("epochlog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "log format: {} byte blocks, {} byte record headers",
                epochlog_log::BLOCK_SIZE,
                epochlog_log::HEADER_SIZE
            );
        }
    }

    Ok(())
}
