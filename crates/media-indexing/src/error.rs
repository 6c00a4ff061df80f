//! Error types for the indexing core.

use media_storage::StorageError;
use thiserror::Error;

use crate::pathname::PathError;

/// Errors that can occur while iterating or handling indexing messages
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Storage operation failed with a non-transient error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A transient write failure survived every retry
    #[error("Write '{statement}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        statement: String,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    /// Path generation failed; retrying would fail identically
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    /// Checkpoint load/save issues
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Offset or message names an entity the store does not know
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// No indexer registered under this name
    #[error("Unknown indexer: {0}")]
    UnknownIndexer(String),
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}
