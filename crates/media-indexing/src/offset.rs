//! Resumable sweep position.
//!
//! An [`IndexerOffset`] cycles over two dimensions: an outer list of phase
//! keys (languages) and an inner list of entity types. Within the current
//! (phase, entity type) pair it remembers the last id handed out, so an
//! interrupted sweep resumes right after it.
//!
//! Single-dimension sweeps use [`IndexerOffset::single`], which fixes the
//! phase list to [`DEFAULT_PHASE`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use media_types::EntityId;

/// Phase key used by sweeps that do not cycle over languages.
pub const DEFAULT_PHASE: &str = media_types::context::DEFAULT_LANGUAGE;

/// One cycling dimension: the full key list fixed at creation, the keys not
/// yet visited and the key currently active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Dimension {
    all: Vec<String>,
    remaining: VecDeque<String>,
    current: Option<String>,
}

impl Dimension {
    fn new(keys: Vec<String>) -> Self {
        let mut dimension = Self {
            remaining: keys.iter().cloned().collect(),
            all: keys,
            current: None,
        };
        dimension.advance();
        dimension
    }

    fn advance(&mut self) -> Option<&str> {
        self.current = self.remaining.pop_front();
        self.current.as_deref()
    }

    fn reset(&mut self) -> Option<&str> {
        self.remaining = self.all.iter().cloned().collect();
        self.advance()
    }

    fn has_next(&self) -> bool {
        !self.remaining.is_empty()
    }

    fn clear(&mut self) {
        self.remaining.clear();
        self.current = None;
    }
}

/// Where a sweep currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerOffset {
    phases: Dimension,
    entity_types: Dimension,
    /// Last id handed out within the current (phase, entity type)
    #[serde(default)]
    last_id: Option<EntityId>,
    /// Unix seconds marking the start of the sweep
    #[serde(default)]
    timestamp: Option<i64>,
}

impl IndexerOffset {
    /// Create a cursor positioned on the first phase and the first entity
    /// type. Empty lists produce a cursor that is exhausted from the start.
    pub fn new<P, E>(phases: P, entity_types: E, timestamp: Option<i64>) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        let mut offset = Self {
            phases: Dimension::new(phases.into_iter().map(Into::into).collect()),
            entity_types: Dimension::new(entity_types.into_iter().map(Into::into).collect()),
            last_id: None,
            timestamp,
        };
        if offset.phases.current.is_none() || offset.entity_types.current.is_none() {
            offset.phases.clear();
            offset.entity_types.clear();
        }
        offset
    }

    /// Cursor over a single entity type in the default phase.
    pub fn single(entity_type: impl Into<String>, timestamp: Option<i64>) -> Self {
        Self::new([DEFAULT_PHASE], [entity_type.into()], timestamp)
    }

    /// Move to the next entity type of the current phase. Leaves the phase
    /// and the last id untouched.
    pub fn advance_entity_type(&mut self) -> Option<&str> {
        self.entity_types.advance()
    }

    /// Restore the full entity type list and activate its first entry.
    pub fn reset_entity_types(&mut self) -> Option<&str> {
        self.entity_types.reset()
    }

    /// Move to the next phase. Does not touch the entity types.
    pub fn advance_phase(&mut self) -> Option<&str> {
        self.phases.advance()
    }

    pub fn has_next_entity_type(&self) -> bool {
        self.entity_types.has_next()
    }

    pub fn has_next_phase(&self) -> bool {
        self.phases.has_next()
    }

    /// Step past an exhausted (phase, entity type) pair.
    ///
    /// Advances the entity type if one remains; otherwise advances the phase
    /// and restarts its entity types. Clears the last id either way. Returns
    /// false, leaving the cursor exhausted, when both dimensions are used up.
    pub fn advance(&mut self) -> bool {
        self.last_id = None;
        if self.has_next_entity_type() {
            self.advance_entity_type();
            return true;
        }
        if self.has_next_phase() {
            self.advance_phase();
            self.reset_entity_types();
            return true;
        }
        self.entity_types.current = None;
        self.phases.current = None;
        false
    }

    pub fn phase(&self) -> Option<&str> {
        self.phases.current.as_deref()
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity_types.current.as_deref()
    }

    pub fn remaining_phases(&self) -> impl Iterator<Item = &str> {
        self.phases.remaining.iter().map(String::as_str)
    }

    pub fn remaining_entity_types(&self) -> impl Iterator<Item = &str> {
        self.entity_types.remaining.iter().map(String::as_str)
    }

    pub fn last_id(&self) -> Option<&EntityId> {
        self.last_id.as_ref()
    }

    pub fn set_last_id(&mut self, last_id: Option<EntityId>) {
        self.last_id = last_id;
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// A cursor missing either its phase or its entity type has nothing
    /// left to sweep.
    pub fn is_exhausted(&self) -> bool {
        self.phase().is_none() || self.entity_type().is_none()
    }
}
