//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Lock contention reported by a store that cannot express it as a
    /// RocksDB status
    #[error("Write contention: {0}")]
    Contention(String),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Busy, try-again and timed-out statuses come from lock waits and write
    /// stalls; everything else fails identically on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::RocksDb(e) => matches!(
                e.kind(),
                rocksdb::ErrorKind::Busy
                    | rocksdb::ErrorKind::TryAgain
                    | rocksdb::ErrorKind::TimedOut
            ),
            StorageError::Contention(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::Contention("deadlock".into()).is_transient());
        assert!(!StorageError::Key("bad".into()).is_transient());
        assert!(!StorageError::Serialization("bad".into()).is_transient());
        assert!(!StorageError::ColumnFamilyNotFound("media".into()).is_transient());
    }
}
