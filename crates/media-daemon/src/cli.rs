//! Command-line arguments.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keeps derived media state (paths, thumbnail cache, search documents) in sync.
#[derive(Parser, Debug)]
#[command(name = "media-indexer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides ~/.config/media-indexer/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level or tracing filter (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the worker pool, listeners and scheduled sweeps until Ctrl-C
    Run {
        /// Number of consumer workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Do not schedule periodic full sweeps
        #[arg(long)]
        no_sweep: bool,
    },

    /// Run one full sweep to completion
    Reindex {
        /// Only sweep this indexer (default: all)
        #[arg(short, long)]
        indexer: Option<String>,

        /// Number of consumer workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show totals and sweep checkpoints per indexer
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Load media and thumbnail records from a JSON-lines file
    Import {
        /// File with one `{"kind": "media" | "thumbnail", ...}` record per line
        file: PathBuf,
    },

    /// Delete sweep checkpoints so the next sweep starts over
    Reset {
        /// Only reset this indexer (default: all)
        #[arg(short, long)]
        indexer: Option<String>,
    },

    /// Print the relative and absolute URL of a media file or thumbnail
    Url {
        /// Media id
        media_id: String,

        /// Thumbnail id of that media
        #[arg(short, long)]
        thumbnail: Option<String>,

        /// Request host used when no base URL is configured
        #[arg(long)]
        host: Option<String>,
    },
}

impl Commands {
    /// Worker count given on the command line, if any.
    pub fn workers(&self) -> Option<usize> {
        match self {
            Commands::Run { workers, .. } | Commands::Reindex { workers, .. } => *workers,
            _ => None,
        }
    }
}
