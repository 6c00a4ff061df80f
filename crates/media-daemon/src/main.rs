//! Media Indexer
//!
//! Keeps derived media state in sync: storage paths of media files and
//! thumbnails, the thumbnail cache of each media, and search documents.
//!
//! # Usage
//!
//! ```bash
//! media-indexer run [--workers N] [--no-sweep]
//! media-indexer reindex [--indexer NAME]
//! media-indexer status [--json]
//! media-indexer import records.jsonl
//! media-indexer reset [--indexer NAME]
//! media-indexer url MEDIA_ID [--thumbnail ID] [--host HOST]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/media-indexer/config.toml)
//! 3. Environment variables (MEDIA_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use media_daemon::{
    import, init_logging, load_settings, media_url, print_status, print_summaries, reindex,
    reset, run_daemon, status, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Run { no_sweep, .. } => {
            run_daemon(settings, no_sweep).await?;
        }
        Commands::Reindex { indexer, .. } => {
            let summaries = reindex(settings, indexer.as_deref()).await?;
            print_summaries(&summaries);
        }
        Commands::Status { json } => {
            let report = status(settings)?;
            print_status(&report, json)?;
        }
        Commands::Import { file } => {
            let summary = import(settings, &file).await?;
            println!(
                "Imported {} media and {} thumbnails ({} messages handled, {} dead-lettered)",
                summary.media, summary.thumbnails, summary.handled, summary.dead_lettered
            );
        }
        Commands::Reset { indexer } => {
            let cleared = reset(settings, indexer.as_deref())?;
            println!("Cleared {} checkpoint(s)", cleared);
        }
        Commands::Url {
            media_id,
            thumbnail,
            host,
        } => {
            let report = media_url(settings, &media_id, thumbnail.as_deref(), host.as_deref())?;
            println!("{}", report.relative);
            println!("{}", report.absolute);
        }
    }

    Ok(())
}
