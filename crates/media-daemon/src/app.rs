//! Wiring of storage, channels and indexers from settings.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use media_indexing::{
    ChangeFeed, EntityWriter, IndexerEvents, IteratorFactory, MediaIndexer, PathGeneratorChain,
    RetryPolicy, SearchIndexer, UrlGenerator,
};
use media_scheduler::{DispatcherConfig, IndexerRegistry, IndexingDispatcher};
use media_storage::Storage;
use media_types::Settings;

/// Everything one process needs to index media.
pub struct IndexerApp {
    pub settings: Settings,
    pub storage: Arc<Storage>,
    pub feed: ChangeFeed,
    pub events: IndexerEvents,
    pub paths: Arc<PathGeneratorChain>,
    pub media: Arc<MediaIndexer>,
    pub search: Arc<SearchIndexer>,
}

impl IndexerApp {
    /// Open the store at the configured path, creating it if needed.
    pub fn open(settings: Settings) -> Result<Self> {
        let db_path = settings.expanded_db_path();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        info!("Opening storage at {:?}", db_path);
        let storage = Arc::new(Storage::open(&db_path).context("Failed to open storage")?);

        let feed = ChangeFeed::default();
        let events = IndexerEvents::default();
        let paths = Arc::new(PathGeneratorChain::from_settings(&settings));
        let factory = IteratorFactory::new(storage.clone(), settings.batch_size);

        let media = Arc::new(MediaIndexer::new(
            storage.clone(),
            factory.clone(),
            paths.clone(),
            RetryPolicy::from(&settings.retry),
            events.clone(),
        ));
        let search = Arc::new(SearchIndexer::new(
            storage.clone(),
            factory,
            settings.languages.clone(),
            events.clone(),
        ));

        Ok(Self {
            settings,
            storage,
            feed,
            events,
            paths,
            media,
            search,
        })
    }

    /// Both indexers, registered by name.
    pub fn registry(&self) -> Result<IndexerRegistry> {
        Ok(IndexerRegistry::new()
            .with_indexer(self.media.clone())?
            .with_indexer(self.search.clone())?)
    }

    pub fn start_dispatcher(&self) -> Result<IndexingDispatcher> {
        Ok(IndexingDispatcher::start(
            self.storage.clone(),
            self.registry()?,
            DispatcherConfig::from_settings(&self.settings),
        ))
    }

    pub fn writer(&self) -> EntityWriter {
        EntityWriter::new(self.storage.clone(), self.feed.clone())
    }

    pub fn url_generator(&self) -> UrlGenerator {
        UrlGenerator::from_settings(self.paths.clone(), &self.settings)
    }
}
