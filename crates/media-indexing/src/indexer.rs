//! Contract every indexer exposes to the scheduler.

use media_types::EntityWrittenEvent;

use crate::error::IndexingError;
use crate::message::EntityIndexingMessage;
use crate::offset::IndexerOffset;

/// An indexer keeps derived state of one entity type in sync.
///
/// Schedulers drive all registered indexers through this trait alone:
/// `iterate` for full sweeps, `update` for incremental changes, `handle` on
/// worker threads. All methods block on storage I/O.
pub trait EntityIndexer: Send + Sync {
    /// Unique name, used for registration, checkpoints and logs.
    fn name(&self) -> &str;

    /// Entity type whose change events this indexer consumes.
    fn entity(&self) -> &str;

    /// Next sweep batch after `offset`, or `None` once the sweep is done.
    /// A `None` offset starts a fresh sweep.
    fn iterate(
        &self,
        offset: Option<IndexerOffset>,
    ) -> Result<Option<EntityIndexingMessage>, IndexingError>;

    /// Message for the keys of [`EntityIndexer::entity`] in a change event.
    fn update(&self, event: &EntityWrittenEvent) -> Option<EntityIndexingMessage>;

    /// Recompute derived state for the ids in `message`.
    ///
    /// Safe to call more than once with the same message.
    fn handle(&self, message: &EntityIndexingMessage) -> Result<(), IndexingError>;

    /// Number of rows a full sweep visits. Advisory only.
    fn total(&self) -> Result<u64, IndexingError>;
}
