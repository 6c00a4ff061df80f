//! Checkpoint tracking for sweeps.
//!
//! A checkpoint records, per indexer, the offset of the last sweep batch that
//! was handled, so a sweep interrupted by a crash or shutdown resumes after
//! it instead of starting over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use media_storage::Storage;

use crate::error::IndexingError;
use crate::offset::IndexerOffset;

/// Sweep progress of one indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexCheckpoint {
    /// Name of the indexer this checkpoint belongs to
    pub indexer: String,

    /// Offset to resume from; `None` before the first batch
    #[serde(default)]
    pub offset: Option<IndexerOffset>,

    /// Timestamp of last processing (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_processed_time: DateTime<Utc>,

    /// Ids handled since the sweep started
    pub processed_count: u64,

    /// When the sweep started (milliseconds since epoch)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl IndexCheckpoint {
    /// Create a new checkpoint for the given indexer
    pub fn new(indexer: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            indexer: indexer.into(),
            offset: None,
            last_processed_time: now,
            processed_count: 0,
            created_at: now,
        }
    }

    /// Get the checkpoint key for storage
    pub fn checkpoint_key(&self) -> &str {
        &self.indexer
    }

    /// Update checkpoint after handling a batch
    pub fn update(&mut self, offset: Option<IndexerOffset>, items_processed: u64) {
        self.offset = offset;
        self.last_processed_time = Utc::now();
        self.processed_count += items_processed;
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexingError> {
        serde_json::to_vec(self).map_err(IndexingError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexingError> {
        serde_json::from_slice(bytes).map_err(IndexingError::from)
    }

    /// Load the stored checkpoint of an indexer, if any.
    pub fn load(storage: &Storage, indexer: &str) -> Result<Option<Self>, IndexingError> {
        match storage.get_checkpoint(indexer)? {
            Some(bytes) => Ok(Some(Self::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, storage: &Storage) -> Result<(), IndexingError> {
        storage.put_checkpoint(self.checkpoint_key(), &self.to_bytes()?)?;
        Ok(())
    }

    /// Remove the stored checkpoint so the next sweep starts fresh.
    pub fn clear(storage: &Storage, indexer: &str) -> Result<(), IndexingError> {
        storage.delete_checkpoint(indexer)?;
        Ok(())
    }
}
