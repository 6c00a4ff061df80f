//! Change and completion events.
//!
//! `EntityWrittenEvent` is published by the write path after entities were
//! persisted; indexers pick the keys of the entity type they own.
//! `EntityIndexedEvent` is published by an indexer after it handled a message
//! so that downstream indexers can chain further work.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::id::EntityId;

/// Notification that entities of one or more types were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityWrittenEvent {
    pub context: Context,
    /// Written primary keys per entity name
    written: BTreeMap<String, Vec<EntityId>>,
}

impl EntityWrittenEvent {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            written: BTreeMap::new(),
        }
    }

    /// Record written keys for an entity type.
    pub fn with_written(
        mut self,
        entity_name: &str,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        self.add_written(entity_name, ids);
        self
    }

    pub fn add_written(&mut self, entity_name: &str, ids: impl IntoIterator<Item = EntityId>) {
        self.written
            .entry(entity_name.to_string())
            .or_default()
            .extend(ids);
    }

    /// Written keys of one entity type, in write order. Empty when the event
    /// carries nothing for that type.
    pub fn primary_keys(&self, entity_name: &str) -> Vec<EntityId> {
        self.written.get(entity_name).cloned().unwrap_or_default()
    }

    /// Entity names present in the event.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.written.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.written.values().all(Vec::is_empty)
    }
}

/// Notification that an indexer finished handling a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIndexedEvent {
    /// Name of the indexer that handled the message
    pub indexer: String,
    pub ids: Vec<EntityId>,
    pub context: Context,
    /// Sub-steps the producer asked to skip
    #[serde(default)]
    pub skip: BTreeSet<String>,
}
