//! deltasync CLI
//!
//! Runs and maintains a deltasync server.
//!
//! # Commands
//!
//! - `serve` - Run the sync server
//! - `inspect` - Display per-table row and tombstone counts
//! - `checkpoint` - Fold the journal into the snapshot

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// deltasync server tools.
#[derive(Parser)]
#[command(name = "deltasync")]
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
    /// Run the sync server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Data directory (in-memory if omitted)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Maximum records accepted in one push
        #[arg(long, default_value = "10000")]
        max_push_records: usize,
    },

    /// Display per-table row and tombstone counts
    Inspect {
        /// Data directory
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Fold the journal into the snapshot
    Checkpoint {
        /// Data directory
        #[arg(short, long)]
        data_dir: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            data_dir,
            max_push_records,
        } => {
            commands::serve::run(bind, data_dir, max_push_records)?;
        }
        Commands::Inspect { data_dir, format } => {
            commands::inspect::run(&data_dir, &format)?;
        }
        Commands::Checkpoint { data_dir } => {
            commands::checkpoint::run(&data_dir)?;
        }
    }

    Ok(())
}
