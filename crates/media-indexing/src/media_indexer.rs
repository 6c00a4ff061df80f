//! Derived state of media records.
//!
//! Handling a batch of media ids runs three steps in order:
//! 1. generate paths for thumbnails of those media that have none yet
//! 2. rebuild the `thumbnails_ro` cache of every media in the batch
//! 3. generate paths for media that have a file but no path yet
//!
//! Steps 1 and 3 only touch rows that are missing their path, so running a
//! batch twice changes nothing. Step 2 always rewrites the cache from the
//! current thumbnails. Ids that no longer exist drop out of the queries and
//! are skipped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use media_storage::Storage;
use media_types::{
    Context, EntityDefinition, EntityId, EntityIndexedEvent, EntityWrittenEvent, MediaRecord,
    ThumbnailSnapshot, MEDIA_ENTITY,
};

use crate::error::IndexingError;
use crate::events::IndexerEvents;
use crate::indexer::EntityIndexer;
use crate::iterator::IteratorFactory;
use crate::message::EntityIndexingMessage;
use crate::offset::IndexerOffset;
use crate::pathname::PathGenerator;
use crate::retry::{RetryPolicy, RetryableWrite};
use crate::statement::{
    PathUpdate, ThumbnailsUpdate, UpdateMediaPath, UpdateThumbnailPath, UpdateThumbnailsRo,
};

pub const MEDIA_INDEXER_NAME: &str = "media.indexer";

/// Maintains media and thumbnail paths and the thumbnail cache.
pub struct MediaIndexer {
    storage: Arc<Storage>,
    iterator_factory: IteratorFactory,
    path_generator: Arc<dyn PathGenerator>,
    events: IndexerEvents,
    update_thumbnail_path: RetryableWrite<UpdateThumbnailPath>,
    update_thumbnails_ro: RetryableWrite<UpdateThumbnailsRo>,
    update_media_path: RetryableWrite<UpdateMediaPath>,
}

impl MediaIndexer {
    pub fn new(
        storage: Arc<Storage>,
        iterator_factory: IteratorFactory,
        path_generator: Arc<dyn PathGenerator>,
        retry: RetryPolicy,
        events: IndexerEvents,
    ) -> Self {
        Self {
            update_thumbnail_path: RetryableWrite::new(
                UpdateThumbnailPath::new(storage.clone()),
                retry,
            ),
            update_thumbnails_ro: RetryableWrite::new(
                UpdateThumbnailsRo::new(storage.clone()),
                retry,
            ),
            update_media_path: RetryableWrite::new(UpdateMediaPath::new(storage.clone()), retry),
            storage,
            iterator_factory,
            path_generator,
            events,
        }
    }

    /// Step 1: paths of thumbnails that have none.
    fn update_thumbnail_paths(&self, media_ids: &[EntityId]) -> Result<usize, IndexingError> {
        let missing = self.storage.thumbnail_ids_missing_path(media_ids)?;
        if missing.is_empty() {
            return Ok(0);
        }

        let thumbnails = self.storage.find_thumbnails(&missing)?;
        let parent_ids: Vec<EntityId> = thumbnails.iter().map(|t| t.media_id.clone()).collect();
        let parents: HashMap<EntityId, MediaRecord> = self
            .storage
            .find_media(&parent_ids)?
            .into_iter()
            .map(|media| (media.id.clone(), media))
            .collect();

        let mut written = 0;
        for thumbnail in &thumbnails {
            // Without a file on the parent there is nothing to point at
            let Some(media) = parents.get(&thumbnail.media_id).filter(|m| m.has_file()) else {
                continue;
            };
            let path = self.path_generator.generate_path(media, Some(thumbnail))?;
            written += self.update_thumbnail_path.execute(&PathUpdate {
                id: thumbnail.id.clone(),
                path,
            })?;
        }
        Ok(written)
    }

    /// Step 2: rebuild the thumbnail cache of every media in the batch.
    fn update_thumbnails_ro(&self, media_ids: &[EntityId]) -> Result<usize, IndexingError> {
        let mut by_media: BTreeMap<EntityId, Vec<ThumbnailSnapshot>> = BTreeMap::new();
        for thumbnail in self.storage.thumbnails_for_media(media_ids)? {
            by_media
                .entry(thumbnail.media_id.clone())
                .or_default()
                .push(ThumbnailSnapshot::from(&thumbnail));
        }

        let mut written = 0;
        for media_id in media_ids {
            let thumbnails = by_media.remove(media_id).unwrap_or_default();
            written += self.update_thumbnails_ro.execute(&ThumbnailsUpdate {
                media_id: media_id.clone(),
                thumbnails,
            })?;
        }
        Ok(written)
    }

    /// Step 3: paths of media that have a file but no path.
    fn set_media_paths(&self, media_ids: &[EntityId]) -> Result<usize, IndexingError> {
        let missing = self.storage.media_ids_missing_path(media_ids)?;
        if missing.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        for media in self.storage.find_media(&missing)? {
            let path = self.path_generator.generate_path(&media, None)?;
            written += self
                .update_media_path
                .execute(&PathUpdate { id: media.id, path })?;
        }
        Ok(written)
    }
}

impl EntityIndexer for MediaIndexer {
    fn name(&self) -> &str {
        MEDIA_INDEXER_NAME
    }

    fn entity(&self) -> &str {
        MEDIA_ENTITY
    }

    fn iterate(
        &self,
        offset: Option<IndexerOffset>,
    ) -> Result<Option<EntityIndexingMessage>, IndexingError> {
        let mut offset =
            offset.unwrap_or_else(|| IndexerOffset::single(MEDIA_ENTITY, Some(Utc::now().timestamp())));
        if offset.is_exhausted() {
            return Ok(None);
        }

        let mut iterator = self
            .iterator_factory
            .create_iterator(EntityDefinition::Media, offset.last_id().cloned());
        let ids = iterator.fetch()?;
        if ids.is_empty() {
            debug!(indexer = MEDIA_INDEXER_NAME, "Sweep exhausted");
            return Ok(None);
        }

        offset.set_last_id(iterator.last_id().cloned());
        Ok(EntityIndexingMessage::new(
            MEDIA_INDEXER_NAME,
            MEDIA_ENTITY,
            ids,
            Some(offset),
            Context::system(),
        ))
    }

    fn update(&self, event: &EntityWrittenEvent) -> Option<EntityIndexingMessage> {
        EntityIndexingMessage::new(
            MEDIA_INDEXER_NAME,
            MEDIA_ENTITY,
            event.primary_keys(MEDIA_ENTITY),
            None,
            event.context.clone(),
        )
    }

    fn handle(&self, message: &EntityIndexingMessage) -> Result<(), IndexingError> {
        let ids = message.ids();
        if ids.is_empty() {
            return Ok(());
        }

        let thumbnail_paths = self.update_thumbnail_paths(ids)?;
        let caches = self.update_thumbnails_ro(ids)?;
        let media_paths = self.set_media_paths(ids)?;

        info!(
            indexer = MEDIA_INDEXER_NAME,
            count = ids.len(),
            thumbnail_paths = thumbnail_paths,
            thumbnail_caches = caches,
            media_paths = media_paths,
            "Indexed media batch"
        );

        self.events.publish(EntityIndexedEvent {
            indexer: MEDIA_INDEXER_NAME.to_string(),
            ids: ids.to_vec(),
            context: message.context().clone(),
            skip: message.skip().clone(),
        });
        Ok(())
    }

    fn total(&self) -> Result<u64, IndexingError> {
        self.iterator_factory
            .create_iterator(EntityDefinition::Media, None)
            .fetch_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathname::{FilenamePathnameStrategy, PathGeneratorChain, StrategyPathGenerator};
    use media_types::{ThumbnailRecord, MEDIA_THUMBNAIL_ENTITY};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        storage: Arc<Storage>,
        indexer: MediaIndexer,
        events: IndexerEvents,
        _temp: TempDir,
    }

    fn fixture(batch_size: usize) -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let events = IndexerEvents::new(16);
        let generator = PathGeneratorChain::new(StrategyPathGenerator::new(Box::new(
            FilenamePathnameStrategy,
        )));
        let indexer = MediaIndexer::new(
            storage.clone(),
            IteratorFactory::new(storage.clone(), batch_size),
            Arc::new(generator),
            RetryPolicy::new(3, Duration::ZERO),
            events.clone(),
        );
        Fixture {
            storage,
            indexer,
            events,
            _temp: temp,
        }
    }

    fn message(ids: &[EntityId]) -> EntityIndexingMessage {
        EntityIndexingMessage::new(
            MEDIA_INDEXER_NAME,
            MEDIA_ENTITY,
            ids.to_vec(),
            None,
            Context::system(),
        )
        .unwrap()
    }

    #[test]
    fn test_handle_backfills_media_path() {
        let f = fixture(50);
        let media = MediaRecord::new(EntityId::generate(), "file.jpg");
        f.storage.put_media(&media).unwrap();

        f.indexer.handle(&message(&[media.id.clone()])).unwrap();

        let stored = f.storage.get_media(&media.id).unwrap().unwrap();
        assert_eq!(stored.path.as_deref(), Some("media/d0/b3/24/file.jpg"));
    }

    #[test]
    fn test_handle_keeps_existing_path() {
        let f = fixture(50);
        let media = MediaRecord::new(EntityId::generate(), "file.jpg").with_path("custom/file.jpg");
        f.storage.put_media(&media).unwrap();

        f.indexer.handle(&message(&[media.id.clone()])).unwrap();

        let stored = f.storage.get_media(&media.id).unwrap().unwrap();
        assert_eq!(stored.path.as_deref(), Some("custom/file.jpg"));
    }

    #[test]
    fn test_media_without_file_gets_no_path() {
        let f = fixture(50);
        let mut media = MediaRecord::new(EntityId::generate(), "");
        media.file_name = None;
        f.storage.put_media(&media).unwrap();
        let thumbnail = ThumbnailRecord::new(EntityId::generate(), media.id.clone(), 10, 10);
        f.storage.put_thumbnail(&thumbnail).unwrap();

        f.indexer.handle(&message(&[media.id.clone()])).unwrap();

        assert!(f.storage.get_media(&media.id).unwrap().unwrap().path.is_none());
        assert!(f.storage.get_thumbnail(&thumbnail.id).unwrap().unwrap().path.is_none());
    }

    #[test]
    fn test_thumbnail_path_waits_for_parent_file() {
        let f = fixture(50);
        let mut media = MediaRecord::new(EntityId::generate(), "");
        media.file_name = None;
        f.storage.put_media(&media).unwrap();
        let thumbnail = ThumbnailRecord::new(EntityId::generate(), media.id.clone(), 10, 10);
        f.storage.put_thumbnail(&thumbnail).unwrap();

        // Skipped, not failed: the cache still lists the thumbnail
        f.indexer.handle(&message(&[media.id.clone()])).unwrap();
        let cached = f.storage.get_media(&media.id).unwrap().unwrap().thumbnails_ro;
        assert_eq!(cached.map(|c| c.len()), Some(1));

        media.file_name = Some("file.jpg".to_string());
        f.storage.put_media(&media).unwrap();
        f.indexer.handle(&message(&[media.id.clone()])).unwrap();

        let stored = f.storage.get_thumbnail(&thumbnail.id).unwrap().unwrap();
        assert_eq!(stored.path.as_deref(), Some("thumbnail/d0/b3/24/file.jpg_10x10"));
    }

    #[test]
    fn test_thumbnail_paths_and_cache() {
        let f = fixture(50);
        let media = MediaRecord::new(EntityId::generate(), "file.jpg");
        f.storage.put_media(&media).unwrap();
        let small = ThumbnailRecord::new(EntityId::generate(), media.id.clone(), 100, 100);
        let large = ThumbnailRecord::new(EntityId::generate(), media.id.clone(), 800, 600);
        f.storage.put_thumbnail(&small).unwrap();
        f.storage.put_thumbnail(&large).unwrap();

        f.indexer.handle(&message(&[media.id.clone()])).unwrap();

        let small = f.storage.get_thumbnail(&small.id).unwrap().unwrap();
        assert_eq!(
            small.path.as_deref(),
            Some("thumbnail/d0/b3/24/file.jpg_100x100")
        );
        let large = f.storage.get_thumbnail(&large.id).unwrap().unwrap();

        // The cache reflects the freshly written thumbnail paths
        let mut expected = vec![ThumbnailSnapshot::from(&small), ThumbnailSnapshot::from(&large)];
        expected.sort_by(|a, b| a.id.cmp(&b.id));
        let cached = f.storage.get_media(&media.id).unwrap().unwrap().thumbnails_ro;
        assert_eq!(cached, Some(expected));
    }

    #[test]
    fn test_stale_cache_is_overwritten() {
        let f = fixture(50);
        let media = MediaRecord::new(EntityId::generate(), "file.jpg");
        f.storage.put_media(&media).unwrap();
        let thumbnail = ThumbnailRecord::new(EntityId::generate(), media.id.clone(), 10, 10);
        f.storage.put_thumbnail(&thumbnail).unwrap();
        f.indexer.handle(&message(&[media.id.clone()])).unwrap();

        f.storage.delete_thumbnail(&thumbnail.id).unwrap();
        f.indexer.handle(&message(&[media.id.clone()])).unwrap();

        let cached = f.storage.get_media(&media.id).unwrap().unwrap().thumbnails_ro;
        assert_eq!(cached, Some(Vec::new()));
    }

    #[test]
    fn test_deleted_ids_are_skipped() {
        let f = fixture(50);
        let kept = MediaRecord::new(EntityId::generate(), "kept.jpg");
        f.storage.put_media(&kept).unwrap();
        let gone = EntityId::generate();

        f.indexer.handle(&message(&[gone.clone(), kept.id.clone()])).unwrap();

        assert!(f.storage.get_media(&gone).unwrap().is_none());
        assert!(f.storage.get_media(&kept.id).unwrap().unwrap().path.is_some());
    }

    #[test]
    fn test_handle_publishes_completion() {
        let f = fixture(50);
        let mut receiver = f.events.subscribe();
        let media = MediaRecord::new(EntityId::generate(), "file.jpg");
        f.storage.put_media(&media).unwrap();

        let msg = message(&[media.id.clone()]).with_skip(["search.indexer"]);
        f.indexer.handle(&msg).unwrap();

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.indexer, MEDIA_INDEXER_NAME);
        assert_eq!(event.ids, vec![media.id]);
        assert!(event.skip.contains("search.indexer"));
    }

    #[test]
    fn test_update_picks_own_entity() {
        let f = fixture(50);
        let a = EntityId::new("a");
        let b = EntityId::new("b");
        let event = EntityWrittenEvent::new(Context::system())
            .with_written(MEDIA_ENTITY, [a.clone(), b.clone()])
            .with_written("product", [EntityId::new("c")]);

        let message = f.indexer.update(&event).unwrap();
        assert_eq!(message.ids(), &[a, b]);
        assert!(!message.is_sweep());

        let unrelated = EntityWrittenEvent::new(Context::system())
            .with_written(MEDIA_THUMBNAIL_ENTITY, [EntityId::new("t")]);
        assert!(f.indexer.update(&unrelated).is_none());
    }

    #[test]
    fn test_iterate_until_exhausted() {
        let f = fixture(2);
        for i in 0..5 {
            f.storage
                .put_media(&MediaRecord::new(EntityId::generate(), format!("f{}", i)))
                .unwrap();
        }

        let mut offset = None;
        let mut batches = 0;
        let mut seen = Vec::new();
        while let Some(message) = f.indexer.iterate(offset.take()).unwrap() {
            batches += 1;
            seen.extend(message.ids().to_vec());
            offset = message.offset().cloned();
            assert!(offset.is_some());
        }

        assert_eq!(batches, 3);
        assert_eq!(seen.len(), 5);
        assert_eq!(f.indexer.total().unwrap(), 5);
    }
}
