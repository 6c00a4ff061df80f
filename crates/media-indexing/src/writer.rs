//! Write path for media records.
//!
//! Persists records and announces what was written on the [`ChangeFeed`].
//! Indexers never get called from here; they pick the events up on their
//! own subscriptions.

use std::sync::Arc;

use tracing::{debug, info};

use media_storage::Storage;
use media_types::{
    Context, EntityId, EntityWrittenEvent, MediaRecord, ThumbnailRecord, MEDIA_ENTITY,
    MEDIA_THUMBNAIL_ENTITY,
};

use crate::error::IndexingError;
use crate::events::ChangeFeed;

/// Stores records and publishes change events for them.
#[derive(Clone)]
pub struct EntityWriter {
    storage: Arc<Storage>,
    feed: ChangeFeed,
}

impl EntityWriter {
    pub fn new(storage: Arc<Storage>, feed: ChangeFeed) -> Self {
        Self { storage, feed }
    }

    /// Insert or replace media records.
    pub fn write_media(
        &self,
        records: &[MediaRecord],
        context: &Context,
    ) -> Result<EntityWrittenEvent, IndexingError> {
        for record in records {
            self.storage.put_media(record)?;
        }
        let event = EntityWrittenEvent::new(context.clone())
            .with_written(MEDIA_ENTITY, records.iter().map(|r| r.id.clone()));
        Ok(self.publish(event))
    }

    /// Insert or replace thumbnails.
    ///
    /// The owning media ids are reported as written too, since their
    /// thumbnail cache is now stale.
    pub fn write_thumbnails(
        &self,
        records: &[ThumbnailRecord],
        context: &Context,
    ) -> Result<EntityWrittenEvent, IndexingError> {
        let mut parents = Vec::new();
        for record in records {
            if let Some(previous) = self.storage.get_thumbnail(&record.id)? {
                if previous.media_id != record.media_id {
                    parents.push(previous.media_id);
                }
            }
            self.storage.put_thumbnail(record)?;
            parents.push(record.media_id.clone());
        }
        let event = EntityWrittenEvent::new(context.clone())
            .with_written(MEDIA_THUMBNAIL_ENTITY, records.iter().map(|r| r.id.clone()))
            .with_written(MEDIA_ENTITY, parents);
        Ok(self.publish(event))
    }

    /// Delete media records together with their thumbnails.
    pub fn delete_media(
        &self,
        ids: &[EntityId],
        context: &Context,
    ) -> Result<EntityWrittenEvent, IndexingError> {
        let mut deleted = Vec::new();
        for id in ids {
            if self.storage.delete_media(id)? {
                deleted.push(id.clone());
            }
        }
        let event = EntityWrittenEvent::new(context.clone()).with_written(MEDIA_ENTITY, deleted);
        Ok(self.publish(event))
    }

    /// Delete thumbnails; their media ids are reported as written.
    pub fn delete_thumbnails(
        &self,
        ids: &[EntityId],
        context: &Context,
    ) -> Result<EntityWrittenEvent, IndexingError> {
        let mut deleted = Vec::new();
        let mut parents = Vec::new();
        for thumbnail in self.storage.find_thumbnails(ids)? {
            if self.storage.delete_thumbnail(&thumbnail.id)? {
                deleted.push(thumbnail.id);
                parents.push(thumbnail.media_id);
            }
        }
        let event = EntityWrittenEvent::new(context.clone())
            .with_written(MEDIA_THUMBNAIL_ENTITY, deleted)
            .with_written(MEDIA_ENTITY, parents);
        Ok(self.publish(event))
    }

    fn publish(&self, event: EntityWrittenEvent) -> EntityWrittenEvent {
        if event.is_empty() {
            debug!("Nothing written, no change event");
            return event;
        }
        let receivers = self.feed.publish(event.clone());
        info!(
            entities = ?event.entity_names().collect::<Vec<_>>(),
            receivers = receivers,
            "Published change event"
        );
        event
    }
}
