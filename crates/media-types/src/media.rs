//! Media and thumbnail records.
//!
//! `path` on both records and `thumbnails_ro` on media are derived fields:
//! they are maintained by the media indexer, never computed on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// A stored media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: EntityId,

    /// File name without extension. Media without a file name has no file yet.
    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub file_extension: Option<String>,

    #[serde(default)]
    pub mime_type: Option<String>,

    /// Upload time, used as cache buster in generated paths
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub uploaded_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub private: bool,

    /// Derived storage path (relative to the public/private filesystem root)
    #[serde(default)]
    pub path: Option<String>,

    /// Derived read-only cache of the media's thumbnails
    #[serde(default)]
    pub thumbnails_ro: Option<Vec<ThumbnailSnapshot>>,
}

impl MediaRecord {
    /// Create a media record with a file name and no derived state.
    pub fn new(id: EntityId, file_name: impl Into<String>) -> Self {
        Self {
            id,
            file_name: Some(file_name.into()),
            file_extension: None,
            mime_type: None,
            uploaded_at: None,
            private: false,
            path: None,
            thumbnails_ro: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    pub fn with_uploaded_at(mut self, uploaded_at: DateTime<Utc>) -> Self {
        self.uploaded_at = Some(uploaded_at);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Whether the media has a file name to derive a path from.
    pub fn has_file(&self) -> bool {
        self.file_name.as_deref().is_some_and(|name| !name.is_empty())
    }

    /// Whether the derived path still needs to be computed.
    pub fn is_missing_path(&self) -> bool {
        self.path.is_none() && self.has_file()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A generated thumbnail of a media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRecord {
    pub id: EntityId,
    pub media_id: EntityId,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub path: Option<String>,
}

impl ThumbnailRecord {
    pub fn new(id: EntityId, media_id: EntityId, width: u32, height: u32) -> Self {
        Self {
            id,
            media_id,
            width,
            height,
            path: None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Thumbnail entry in the denormalized `thumbnails_ro` cache of a media record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSnapshot {
    pub id: EntityId,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub path: Option<String>,
}

impl From<&ThumbnailRecord> for ThumbnailSnapshot {
    fn from(thumbnail: &ThumbnailRecord) -> Self {
        Self {
            id: thumbnail.id.clone(),
            width: thumbnail.width,
            height: thumbnail.height,
            path: thumbnail.path.clone(),
        }
    }
}
