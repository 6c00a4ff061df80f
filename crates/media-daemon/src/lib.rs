//! Media indexer daemon library exports.
//!
//! # Modules
//!
//! - `app`: Storage, channels and indexers wired from settings
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, reindex, status, import, reset, url)
//! - `import`: JSON-lines import format

pub mod app;
pub mod cli;
pub mod commands;
pub mod import;

pub use app::IndexerApp;
pub use cli::{Cli, Commands};
pub use commands::{
    import, init_logging, load_settings, media_url, print_status, print_summaries, reindex,
    reset, run_daemon, status, ImportSummary, StatusReport, UrlReport, INDEXER_NAMES,
};
pub use import::ImportBatch;
