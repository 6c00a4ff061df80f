//! Batched id iteration over one entity definition.

use std::sync::Arc;

use tracing::debug;

use media_storage::Storage;
use media_types::{EntityDefinition, EntityId};

use crate::error::IndexingError;

/// Ids fetched per batch when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Creates iterators that share one store and batch size.
#[derive(Clone)]
pub struct IteratorFactory {
    storage: Arc<Storage>,
    batch_size: usize,
}

impl IteratorFactory {
    pub fn new(storage: Arc<Storage>, batch_size: usize) -> Self {
        Self {
            storage,
            batch_size: batch_size.max(1),
        }
    }

    /// Iterator over `definition` resuming strictly after `last_id`.
    pub fn create_iterator(
        &self,
        definition: EntityDefinition,
        last_id: Option<EntityId>,
    ) -> EntityIterator {
        EntityIterator {
            storage: self.storage.clone(),
            definition,
            last_id,
            batch_size: self.batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Pulls ids in ascending key order, one bounded batch at a time.
pub struct EntityIterator {
    storage: Arc<Storage>,
    definition: EntityDefinition,
    last_id: Option<EntityId>,
    batch_size: usize,
}

impl EntityIterator {
    /// Fetch the next batch and move past it.
    ///
    /// An empty batch means the end of the table; the position is left
    /// unchanged in that case.
    pub fn fetch(&mut self) -> Result<Vec<EntityId>, IndexingError> {
        let ids = self
            .storage
            .scan_ids(self.definition, self.last_id.as_ref(), self.batch_size)?;

        if let Some(last) = ids.last() {
            self.last_id = Some(last.clone());
        }
        debug!(
            definition = %self.definition,
            count = ids.len(),
            last_id = ?self.last_id,
            "Fetched id batch"
        );
        Ok(ids)
    }

    /// Total rows of the definition, for progress reporting only.
    pub fn fetch_count(&self) -> Result<u64, IndexingError> {
        Ok(self.storage.count(self.definition)?)
    }

    /// Last id returned so far.
    pub fn last_id(&self) -> Option<&EntityId> {
        self.last_id.as_ref()
    }

    pub fn definition(&self) -> EntityDefinition {
        self.definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::MediaRecord;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn create_test_storage() -> (Arc<Storage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (Arc::new(storage), temp_dir)
    }

    fn insert_media(storage: &Storage, count: usize) -> Vec<EntityId> {
        (0..count)
            .map(|i| {
                let id = EntityId::generate();
                storage
                    .put_media(&MediaRecord::new(id.clone(), format!("file-{}", i)))
                    .unwrap();
                id
            })
            .collect()
    }

    #[test]
    fn test_fetch_walks_whole_table_once() {
        let (storage, _temp) = create_test_storage();
        let inserted = insert_media(&storage, 7);
        let factory = IteratorFactory::new(storage, 3);

        let mut iterator = factory.create_iterator(EntityDefinition::Media, None);
        let mut seen = Vec::new();
        loop {
            let batch = iterator.fetch().unwrap();
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() <= 3);
            seen.extend(batch);
        }

        assert_eq!(seen.len(), 7);
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), 7);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
        for id in &inserted {
            assert!(unique.contains(id));
        }
    }

    #[test]
    fn test_resume_from_last_id() {
        let (storage, _temp) = create_test_storage();
        insert_media(&storage, 5);
        let factory = IteratorFactory::new(storage, 2);

        let mut first = factory.create_iterator(EntityDefinition::Media, None);
        let batch = first.fetch().unwrap();
        let resume_at = first.last_id().cloned();
        assert_eq!(resume_at.as_ref(), batch.last());

        let mut resumed = factory.create_iterator(EntityDefinition::Media, resume_at.clone());
        let next = resumed.fetch().unwrap();
        assert_eq!(next.len(), 2);
        assert!(next.iter().all(|id| Some(id) > resume_at.as_ref()));
    }

    #[test]
    fn test_empty_batch_keeps_position() {
        let (storage, _temp) = create_test_storage();
        insert_media(&storage, 1);
        let factory = IteratorFactory::new(storage, 10);

        let mut iterator = factory.create_iterator(EntityDefinition::Media, None);
        assert_eq!(iterator.fetch().unwrap().len(), 1);
        let position = iterator.last_id().cloned();
        assert!(iterator.fetch().unwrap().is_empty());
        assert_eq!(iterator.last_id().cloned(), position);
    }

    #[test]
    fn test_fetch_count() {
        let (storage, _temp) = create_test_storage();
        insert_media(&storage, 4);
        let factory = IteratorFactory::new(storage, 10);

        let iterator = factory.create_iterator(EntityDefinition::Media, None);
        assert_eq!(iterator.fetch_count().unwrap(), 4);
        let thumbnails = factory.create_iterator(EntityDefinition::MediaThumbnail, None);
        assert_eq!(thumbnails.fetch_count().unwrap(), 0);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let (storage, _temp) = create_test_storage();
        let factory = IteratorFactory::new(storage, 0);
        assert_eq!(factory.batch_size(), 1);
    }
}
