//! Units of indexing work.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use media_types::{Context, EntityId};

use crate::offset::IndexerOffset;

/// A batch of entity ids for one indexer.
///
/// Ids are deduplicated (first occurrence wins) and stripped of empty values
/// on construction; a message never carries an empty id set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIndexingMessage {
    indexer: String,
    entity: String,
    ids: Vec<EntityId>,
    /// Sweep position after this batch; absent for incremental updates
    #[serde(default)]
    offset: Option<IndexerOffset>,
    context: Context,
    #[serde(default)]
    skip: BTreeSet<String>,
}

impl EntityIndexingMessage {
    /// Build a message, or `None` if no usable id remains.
    pub fn new(
        indexer: impl Into<String>,
        entity: impl Into<String>,
        ids: impl IntoIterator<Item = EntityId>,
        offset: Option<IndexerOffset>,
        context: Context,
    ) -> Option<Self> {
        let mut seen = HashSet::new();
        let ids: Vec<EntityId> = ids
            .into_iter()
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(id.clone()))
            .collect();

        if ids.is_empty() {
            return None;
        }

        Some(Self {
            indexer: indexer.into(),
            entity: entity.into(),
            ids,
            offset,
            context,
            skip: BTreeSet::new(),
        })
    }

    /// Mark sub-steps as already done.
    pub fn with_skip<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(steps.into_iter().map(Into::into));
        self
    }

    pub fn indexer(&self) -> &str {
        &self.indexer
    }

    /// Entity name the ids belong to
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn offset(&self) -> Option<&IndexerOffset> {
        self.offset.as_ref()
    }

    /// Whether the message was produced by a sweep rather than a change.
    pub fn is_sweep(&self) -> bool {
        self.offset.is_some()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn skip(&self) -> &BTreeSet<String> {
        &self.skip
    }

    pub fn skips(&self, step: &str) -> bool {
        self.skip.contains(step)
    }
}
