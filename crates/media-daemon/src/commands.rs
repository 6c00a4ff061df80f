//! Command implementations.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use media_indexing::{
    EntityIndexer, EntitySubscription, IndexCheckpoint, RequestScope, SearchIndexer,
    MEDIA_INDEXER_NAME, SEARCH_INDEXER_NAME,
};
use media_scheduler::{
    create_sweep_job, spawn_change_listeners, spawn_completion_listener, IndexingDispatcher,
    SchedulerConfig, SchedulerService, SweepJobConfig, SweepSummary,
};
use media_types::{Context, EntityId, EntityIndexedEvent, Settings};

use crate::app::IndexerApp;
use crate::cli::Cli;
use crate::import::ImportBatch;

/// Indexer names in sweep order.
pub const INDEXER_NAMES: [&str; 2] = [MEDIA_INDEXER_NAME, SEARCH_INDEXER_NAME];

/// Load layered settings and apply command-line overrides.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db_path) = &cli.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(workers) = cli.command.workers() {
        settings.workers = workers;
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Run until a shutdown signal.
///
/// 1. Start the worker pool
/// 2. Listen to change and completion events
/// 3. Resume sweeps interrupted by a previous shutdown
/// 4. Schedule periodic full sweeps (unless `no_sweep`)
pub async fn run_daemon(settings: Settings, no_sweep: bool) -> Result<()> {
    info!("Media indexer starting...");
    info!("  Database path: {}", settings.db_path);
    info!("  Workers: {}", settings.workers);
    info!("  Languages: {}", settings.languages.join(","));

    let app = IndexerApp::open(settings)?;
    let dispatcher = Arc::new(app.start_dispatcher()?);
    let cancel = CancellationToken::new();

    let mut listeners = spawn_change_listeners(&app.feed, &dispatcher, cancel.clone());
    listeners.extend(spawn_completion_listener(
        &app.events,
        app.search.clone(),
        &dispatcher,
        cancel.clone(),
    ));

    let resume = {
        let dispatcher = dispatcher.clone();
        let storage = app.storage.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            for name in INDEXER_NAMES {
                match IndexCheckpoint::load(&storage, name) {
                    Ok(Some(_)) => {
                        info!(indexer = name, "Resuming interrupted sweep");
                        if let Err(e) = dispatcher.sweep(name, &cancel).await {
                            warn!(indexer = name, error = %e, "Resumed sweep failed");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(indexer = name, error = %e, "Failed to read checkpoint"),
                }
            }
        })
    };

    let mut scheduler = if no_sweep {
        None
    } else {
        let scheduler = SchedulerService::new(SchedulerConfig::from_settings(&app.settings))
            .await
            .context("Failed to create scheduler")?;
        create_sweep_job(
            &scheduler,
            dispatcher.clone(),
            SweepJobConfig::from_settings(&app.settings),
        )
        .await
        .context("Failed to register sweep job")?;
        scheduler.start().await.context("Failed to start scheduler")?;
        Some(scheduler)
    };

    info!("Media indexer running");
    shutdown_signal().await;

    cancel.cancel();
    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            warn!("Scheduler shutdown failed: {}", e);
        }
    }
    for listener in listeners {
        if let Err(e) = listener.await {
            warn!("Listener task failed: {}", e);
        }
    }
    if let Err(e) = resume.await {
        warn!("Resume task failed: {}", e);
    }
    dispatcher.shutdown().await;
    Ok(())
}

/// Sweep one or all indexers to completion. Ctrl-C stops early and keeps
/// the checkpoints.
pub async fn reindex(settings: Settings, indexer: Option<&str>) -> Result<Vec<SweepSummary>> {
    let app = IndexerApp::open(settings)?;
    let dispatcher = app.start_dispatcher()?;
    if let Some(name) = indexer {
        if !dispatcher.indexers().contains(name) {
            bail!(
                "Unknown indexer '{}', expected one of: {}",
                name,
                INDEXER_NAMES.join(", ")
            );
        }
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        })
    };

    let mut summaries = Vec::new();
    let names: Vec<&str> = match indexer {
        Some(name) => vec![name],
        None => INDEXER_NAMES.to_vec(),
    };
    for name in names {
        if cancel.is_cancelled() {
            break;
        }
        let summary = dispatcher
            .sweep(name, &cancel)
            .await
            .with_context(|| format!("Sweep of {} failed", name))?;
        summaries.push(summary);
    }

    interrupt.abort();
    dispatcher.shutdown().await;
    Ok(summaries)
}

pub fn print_summaries(summaries: &[SweepSummary]) {
    for summary in summaries {
        let state = if summary.completed {
            "completed"
        } else if summary.cancelled {
            "interrupted"
        } else {
            "incomplete"
        };
        println!(
            "{:<16} {:>8} ids  {:>6} batches  {:>3} dead-lettered  {}{}",
            summary.indexer,
            summary.processed,
            summary.batches,
            summary.dead_lettered,
            state,
            if summary.resumed { " (resumed)" } else { "" }
        );
    }
}

#[derive(Debug, Serialize)]
pub struct CheckpointStatus {
    pub processed_count: u64,
    pub phase: Option<String>,
    pub entity_type: Option<String>,
    pub last_id: Option<String>,
    pub last_processed_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct IndexerStatus {
    pub name: String,
    /// Rows a full sweep visits
    pub total: u64,
    /// Position of an unfinished sweep
    pub checkpoint: Option<CheckpointStatus>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    pub media_count: u64,
    pub thumbnail_count: u64,
    pub search_document_count: u64,
    pub indexers: Vec<IndexerStatus>,
}

pub fn status(settings: Settings) -> Result<StatusReport> {
    let db_path = settings.db_path.clone();
    let app = IndexerApp::open(settings)?;
    let stats = app.storage.get_stats().context("Failed to read storage stats")?;

    let indexers: [Arc<dyn EntityIndexer>; 2] = [app.media.clone(), app.search.clone()];
    let mut statuses = Vec::with_capacity(indexers.len());
    for indexer in indexers {
        let name = indexer.name().to_string();
        let total = indexer
            .total()
            .with_context(|| format!("Failed to count rows of {}", name))?;
        let checkpoint = IndexCheckpoint::load(&app.storage, &name)
            .with_context(|| format!("Failed to load checkpoint of {}", name))?
            .map(|checkpoint| {
                let offset = checkpoint.offset.as_ref();
                CheckpointStatus {
                    processed_count: checkpoint.processed_count,
                    phase: offset.and_then(|o| o.phase()).map(str::to_string),
                    entity_type: offset.and_then(|o| o.entity_type()).map(str::to_string),
                    last_id: offset
                        .and_then(|o| o.last_id())
                        .map(|id| id.as_str().to_string()),
                    last_processed_time: checkpoint.last_processed_time,
                    created_at: checkpoint.created_at,
                }
            });
        statuses.push(IndexerStatus {
            name,
            total,
            checkpoint,
        });
    }

    Ok(StatusReport {
        db_path,
        media_count: stats.media_count,
        thumbnail_count: stats.thumbnail_count,
        search_document_count: stats.search_document_count,
        indexers: statuses,
    })
}

pub fn print_status(report: &StatusReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Database: {}", report.db_path);
    println!("  Media:            {}", report.media_count);
    println!("  Thumbnails:       {}", report.thumbnail_count);
    println!("  Search documents: {}", report.search_document_count);
    println!();
    for indexer in &report.indexers {
        println!("{} (total {})", indexer.name, indexer.total);
        match &indexer.checkpoint {
            Some(checkpoint) => {
                println!(
                    "  sweep in progress: {} processed, at {}/{} after {}",
                    checkpoint.processed_count,
                    checkpoint.phase.as_deref().unwrap_or("-"),
                    checkpoint.entity_type.as_deref().unwrap_or("-"),
                    checkpoint.last_id.as_deref().unwrap_or("-"),
                );
                println!(
                    "  last batch: {}",
                    checkpoint.last_processed_time.to_rfc3339()
                );
            }
            None => println!("  no sweep in progress"),
        }
    }
    Ok(())
}

#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub media: usize,
    pub thumbnails: usize,
    /// Incremental messages handled by the workers
    pub handled: u64,
    pub dead_lettered: u64,
}

/// Write the records of `file` through the write path and wait until the
/// resulting incremental messages, including chained search refreshes,
/// were handled.
///
/// Each chunk is fully indexed before the next one is written, so two
/// messages for the same media never race.
pub async fn import(settings: Settings, file: &Path) -> Result<ImportSummary> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );
    let batch = ImportBatch::read(reader)?;

    let app = IndexerApp::open(settings)?;
    let dispatcher = app.start_dispatcher()?;
    let mut feed = ImportFeed {
        subscriptions: dispatcher
            .indexers()
            .iter()
            .map(|indexer| (indexer.clone(), app.feed.subscribe_entity(indexer.entity())))
            .collect(),
        completions: app.events.subscribe(),
        search: app.search.clone(),
    };

    let writer = app.writer();
    let context = Context::system();
    let chunk_size = app.settings.batch_size.max(1);

    for chunk in batch.media.chunks(chunk_size) {
        writer
            .write_media(chunk, &context)
            .context("Failed to write media")?;
        feed.settle(&dispatcher).await?;
    }
    for chunk in batch.thumbnails.chunks(chunk_size) {
        writer
            .write_thumbnails(chunk, &context)
            .context("Failed to write thumbnails")?;
        feed.settle(&dispatcher).await?;
    }

    let stats = dispatcher.shutdown().await;
    let summary = ImportSummary {
        media: batch.media.len(),
        thumbnails: batch.thumbnails.len(),
        handled: stats.handled,
        dead_lettered: stats.dead_lettered,
    };
    info!(
        media = summary.media,
        thumbnails = summary.thumbnails,
        handled = summary.handled,
        "Import finished"
    );
    Ok(summary)
}

/// Buffered change and completion events of one import.
struct ImportFeed {
    subscriptions: Vec<(Arc<dyn EntityIndexer>, EntitySubscription)>,
    completions: broadcast::Receiver<EntityIndexedEvent>,
    search: Arc<SearchIndexer>,
}

impl ImportFeed {
    /// Enqueue the buffered change events, then follow completion chains
    /// until the pool stays idle.
    async fn settle(&mut self, dispatcher: &IndexingDispatcher) -> Result<()> {
        for (indexer, subscription) in self.subscriptions.iter_mut() {
            loop {
                match subscription.try_recv() {
                    Ok(event) => {
                        if let Some(message) = indexer.update(&event) {
                            dispatcher.enqueue(message).await?;
                        }
                    }
                    Err(TryRecvError::Lagged(missed)) => {
                        warn!(indexer = %indexer.name(), missed, "Change events lost, run `reindex` to catch up");
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }

        // Completion events are published inside `handle`, so once the pool
        // is idle every chained refresh is already buffered.
        loop {
            dispatcher.wait_idle().await;
            let mut chained = 0;
            loop {
                match self.completions.try_recv() {
                    Ok(event) => {
                        if let Some(message) = self.search.on_media_indexed(&event) {
                            dispatcher.enqueue(message).await?;
                            chained += 1;
                        }
                    }
                    Err(TryRecvError::Lagged(missed)) => {
                        warn!(missed, "Completion events lost, run `reindex` to refresh search documents");
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
            if chained == 0 {
                return Ok(());
            }
        }
    }
}

/// Delete sweep checkpoints. Returns how many existed.
pub fn reset(settings: Settings, indexer: Option<&str>) -> Result<usize> {
    let names: Vec<&str> = match indexer {
        Some(name) if INDEXER_NAMES.contains(&name) => vec![name],
        Some(name) => bail!(
            "Unknown indexer '{}', expected one of: {}",
            name,
            INDEXER_NAMES.join(", ")
        ),
        None => INDEXER_NAMES.to_vec(),
    };

    let app = IndexerApp::open(settings)?;
    let mut cleared = 0;
    for name in names {
        if IndexCheckpoint::load(&app.storage, name)?.is_some() {
            IndexCheckpoint::clear(&app.storage, name)?;
            info!(indexer = name, "Checkpoint cleared");
            cleared += 1;
        }
    }
    Ok(cleared)
}

#[derive(Debug, Serialize)]
pub struct UrlReport {
    pub relative: String,
    pub absolute: String,
}

/// URLs of a media file, or of one of its thumbnails.
pub fn media_url(
    settings: Settings,
    media_id: &str,
    thumbnail_id: Option<&str>,
    host: Option<&str>,
) -> Result<UrlReport> {
    let app = IndexerApp::open(settings)?;
    let urls = app.url_generator();
    let scope = match host {
        Some(host) => RequestScope::new(host),
        None => RequestScope::detached(),
    };

    let media_id = EntityId::new(media_id);
    let media = app
        .storage
        .get_media(&media_id)?
        .with_context(|| format!("Media {} not found", media_id))?;

    let report = match thumbnail_id {
        Some(thumbnail_id) => {
            let thumbnail_id = EntityId::new(thumbnail_id);
            let thumbnail = app
                .storage
                .get_thumbnail(&thumbnail_id)?
                .filter(|thumbnail| thumbnail.media_id == media.id)
                .with_context(|| {
                    format!("Thumbnail {} of media {} not found", thumbnail_id, media.id)
                })?;
            UrlReport {
                relative: urls.relative_thumbnail_url(&media, &thumbnail)?,
                absolute: urls.absolute_thumbnail_url(&media, &thumbnail, &scope)?,
            }
        }
        None => UrlReport {
            relative: urls.relative_media_url(&media)?,
            absolute: urls.absolute_media_url(&media, &scope)?,
        },
    };
    Ok(report)
}
