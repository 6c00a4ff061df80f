//! Storage layer for the media indexer.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation per entity type
//! - A secondary index from media to its thumbnails
//! - Point updates that report affected rows and never insert
//! - Ordered id scans for resumable iteration
//! - Checkpoints and search documents

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{CheckpointKey, SearchDocumentKey, ThumbnailMediaKey};
