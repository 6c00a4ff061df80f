//! Registered indexers, by unique name.

use std::collections::BTreeMap;
use std::sync::Arc;

use media_indexing::EntityIndexer;

use crate::SchedulerError;

/// Indexers the dispatcher can drive, in name order.
#[derive(Clone, Default)]
pub struct IndexerRegistry {
    indexers: BTreeMap<String, Arc<dyn EntityIndexer>>,
}

impl IndexerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an indexer. Names must be unique.
    pub fn register(&mut self, indexer: Arc<dyn EntityIndexer>) -> Result<(), SchedulerError> {
        let name = indexer.name().to_string();
        if self.indexers.contains_key(&name) {
            return Err(SchedulerError::DuplicateIndexer(name));
        }
        self.indexers.insert(name, indexer);
        Ok(())
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn EntityIndexer>) -> Result<Self, SchedulerError> {
        self.register(indexer)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn EntityIndexer>, SchedulerError> {
        self.indexers
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownIndexer(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indexers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.indexers.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EntityIndexer>> {
        self.indexers.values()
    }

    pub fn len(&self) -> usize {
        self.indexers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_indexing::{EntityIndexingMessage, IndexerOffset, IndexingError};
    use media_types::EntityWrittenEvent;

    struct Named(&'static str);

    impl EntityIndexer for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn entity(&self) -> &str {
            "media"
        }

        fn iterate(
            &self,
            _offset: Option<IndexerOffset>,
        ) -> Result<Option<EntityIndexingMessage>, IndexingError> {
            Ok(None)
        }

        fn update(&self, _event: &EntityWrittenEvent) -> Option<EntityIndexingMessage> {
            None
        }

        fn handle(&self, _message: &EntityIndexingMessage) -> Result<(), IndexingError> {
            Ok(())
        }

        fn total(&self) -> Result<u64, IndexingError> {
            Ok(0)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = IndexerRegistry::new()
            .with_indexer(Arc::new(Named("search.indexer")))
            .unwrap()
            .with_indexer(Arc::new(Named("media.indexer")))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["media.indexer", "search.indexer"]);
        assert_eq!(registry.get("media.indexer").unwrap().name(), "media.indexer");
        assert!(matches!(
            registry.get("other"),
            Err(SchedulerError::UnknownIndexer(_))
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = IndexerRegistry::new();
        registry.register(Arc::new(Named("media.indexer"))).unwrap();
        assert!(matches!(
            registry.register(Arc::new(Named("media.indexer"))),
            Err(SchedulerError::DuplicateIndexer(_))
        ));
        assert_eq!(registry.len(), 1);
    }
}
