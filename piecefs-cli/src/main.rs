//! Piecefs CLI - Browse and stream torrent content while it downloads
//!
//! Runs the filesystem core against the simulated swarm, seeded from a
//! local content directory, and exposes `ls`, `stat` and `cat` over it.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use piecefs_core::tracing_setup::{CliLogLevel, init_tracing};

/// Command-line options shared by every subcommand.
#[derive(Parser)]
#[command(name = "piecefs")]
#[command(about = "Read-only filesystem over a downloading torrent")]
#[command(version)]
pub struct Cli {
    /// Magnet link or path to a .torrent file
    pub source: String,

    #[command(subcommand)]
    pub command: Commands,

    /// Console log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: CliLogLevel,

    /// Directory for a full trace log, none is written when omitted
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,

    /// Directory under which the scratch directory is created
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// Directory whose files the simulated swarm serves
    #[arg(long)]
    pub content: Option<PathBuf>,

    /// Piece length of the simulated torrent in bytes
    #[arg(long, default_value_t = 262_144)]
    pub piece_length: u32,

    /// Seed for the simulated swarm
    #[arg(long, default_value_t = 12345)]
    pub seed: u64,

    /// Download limit in bytes per second, 0 for unlimited
    #[arg(long)]
    pub download_limit: Option<u64>,

    /// Upload limit in bytes per second, 0 for unlimited
    #[arg(long)]
    pub upload_limit: Option<u64>,

    /// Bytes ahead of a read that are fetched at top priority
    #[arg(long)]
    pub urgent_window: Option<u64>,

    /// Seconds to wait for torrent metadata
    #[arg(long, default_value_t = 30)]
    pub metadata_timeout: u64,
}

/// Available CLI commands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Show whether a path is a file or directory, and its size
    Stat { path: String },

    /// Write a file's contents to stdout, blocking on missing pieces
    Cat {
        path: String,

        /// Byte offset to start from
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Maximum number of bytes to write
        #[arg(long)]
        length: Option<u64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref()) {
        eprintln!("Error: Failed to initialize tracing: {error}");
        return ExitCode::FAILURE;
    }

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(commands::exit_status(&error))
        }
    }
}
