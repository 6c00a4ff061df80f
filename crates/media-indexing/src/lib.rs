//! Indexing core for the media indexer.
//!
//! This crate keeps derived state of media records in sync: storage paths of
//! media files and thumbnails, the denormalized thumbnail cache, and search
//! documents.
//!
//! ## Key Components
//!
//! - [`IndexerOffset`]: Resumable sweep position over phases and entity types
//! - [`IteratorFactory`] / [`EntityIterator`]: Batched, ordered id iteration
//! - [`EntityIndexingMessage`]: Deduplicated unit of work
//! - [`RetryableWrite`]: Retries transient write failures of a [`WriteStatement`]
//! - [`PathGeneratorChain`]: Pathname strategy plus optional decorators
//! - [`UrlGenerator`]: Relative and absolute URLs, with per-request fallback
//! - [`EntityIndexer`]: Contract shared by [`MediaIndexer`] and [`SearchIndexer`]
//! - [`ChangeFeed`] / [`IndexerEvents`]: Change and completion channels
//! - [`EntityWriter`]: Write path that publishes change events
//! - [`IndexingPipeline`]: Sequential sweeps with checkpointing
//!
//! ## Flow
//!
//! 1. The write path stores records and publishes an `EntityWrittenEvent`
//! 2. Each indexer turns the keys of its entity type into a message (`update`)
//! 3. Full sweeps produce messages batch by batch (`iterate`)
//! 4. Workers call `handle`, which recomputes derived fields and publishes an
//!    `EntityIndexedEvent`
//! 5. The search indexer chains on media completions
//!
//! ## Example
//!
//! ```ignore
//! use media_indexing::{IndexingPipeline, PipelineConfig, MediaIndexer};
//!
//! let mut pipeline = IndexingPipeline::new(storage.clone(), PipelineConfig::default());
//! pipeline.add_indexer(Arc::new(media_indexer));
//! pipeline.load_checkpoints()?;
//! let result = pipeline.process_until_caught_up()?;
//! ```

pub mod checkpoint;
pub mod error;
pub mod events;
pub mod indexer;
pub mod iterator;
pub mod media_indexer;
pub mod message;
pub mod offset;
pub mod pathname;
pub mod pipeline;
pub mod retry;
pub mod search_indexer;
pub mod statement;
pub mod url;
pub mod writer;

pub use checkpoint::IndexCheckpoint;
pub use error::IndexingError;
pub use events::{ChangeFeed, EntitySubscription, IndexerEvents, DEFAULT_CHANNEL_CAPACITY};
pub use indexer::EntityIndexer;
pub use iterator::{EntityIterator, IteratorFactory, DEFAULT_BATCH_SIZE};
pub use media_indexer::{MediaIndexer, MEDIA_INDEXER_NAME};
pub use message::EntityIndexingMessage;
pub use offset::{IndexerOffset, DEFAULT_PHASE};
pub use pathname::{
    strategy_for, FilenamePathnameStrategy, IdPathnameStrategy, PathDecorator, PathError,
    PathGenerator, PathGeneratorChain, PathnameStrategy, PlainPathnameStrategy, PrefixDecorator,
    StrategyPathGenerator,
};
pub use pipeline::{BatchOutcome, IndexingPipeline, PipelineConfig, ProcessResult, SweepResult};
pub use retry::{RetryPolicy, RetryableWrite};
pub use search_indexer::{SearchIndexer, SEARCH_INDEXER_NAME};
pub use statement::{
    PathUpdate, ThumbnailsUpdate, UpdateMediaPath, UpdateThumbnailPath, UpdateThumbnailsRo,
    WriteStatement,
};
pub use url::{RequestScope, UrlGenerator};
pub use writer::EntityWriter;
