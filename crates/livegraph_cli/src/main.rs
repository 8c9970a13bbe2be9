//! LiveGraph CLI
//!
//! Command-line tools for exercising a LiveGraph store offline.
//!
//! # Commands
//!
//! - `replay` - Replay a JSON Lines event stream and summarize the store
//! - `verify` - Replay a stream and check the store's invariants

mod commands;
mod error;
mod events;
mod schema_file;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LiveGraph command-line store tools.
#[derive(Parser)]
#[command(name = "livegraph")]
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
    /// Replay events and print a summary of the resulting store
    Replay {
        /// Schema file (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Event stream (JSON Lines)
        #[arg(short, long)]
        events: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Include every live record in the output
        #[arg(short, long)]
        dump: bool,

        /// Only flush on explicit flush events
        #[arg(long)]
        deferred: bool,
    },

    /// Replay events and verify store invariants
    Verify {
        /// Schema file (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Event stream (JSON Lines)
        #[arg(short, long)]
        events: PathBuf,
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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Replay {
            schema,
            events,
            format,
            dump,
            deferred,
        } => {
            commands::replay::run(&schema, &events, &format, dump, deferred)?;
        }
        Commands::Verify { schema, events } => {
            commands::verify::run(&schema, &events)?;
        }
        Commands::Version => {
            println!("LiveGraph CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("LiveGraph Core v{}", livegraph_core::VERSION);
        }
    }

    Ok(())
}
