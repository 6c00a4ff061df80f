//! Key encoding and decoding for the storage layer.
//!
//! Record keys are the raw entity id bytes. Composite keys join their parts
//! with `:`, so ids must not contain `:`.

use media_types::EntityId;

use crate::error::StorageError;

const SEPARATOR: char = ':';

/// Reject ids that would corrupt composite keys.
pub fn validate_id(id: &EntityId) -> Result<(), StorageError> {
    if id.is_empty() {
        return Err(StorageError::Key("empty entity id".to_string()));
    }
    if id.as_str().contains(SEPARATOR) {
        return Err(StorageError::Key(format!(
            "entity id must not contain '{}': {}",
            SEPARATOR, id
        )));
    }
    Ok(())
}

/// Secondary index entry linking a thumbnail to its media.
/// Format: {media_id}:{thumbnail_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailMediaKey {
    pub media_id: EntityId,
    pub thumbnail_id: EntityId,
}

impl ThumbnailMediaKey {
    pub fn new(media_id: EntityId, thumbnail_id: EntityId) -> Self {
        Self {
            media_id,
            thumbnail_id,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}{}{}", self.media_id, SEPARATOR, self.thumbnail_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        let (media_id, thumbnail_id) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| StorageError::Key(format!("Invalid thumbnail index key: {}", s)))?;
        Ok(Self::new(
            EntityId::new(media_id),
            EntityId::new(thumbnail_id),
        ))
    }

    /// Prefix covering all thumbnails of one media
    pub fn prefix(media_id: &EntityId) -> Vec<u8> {
        format!("{}{}", media_id, SEPARATOR).into_bytes()
    }
}

/// Key for a search document.
/// Format: {language}:{entity}:{id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDocumentKey {
    pub language: String,
    pub entity: String,
    pub id: EntityId,
}

impl SearchDocumentKey {
    pub fn new(language: impl Into<String>, entity: impl Into<String>, id: EntityId) -> Self {
        Self {
            language: language.into(),
            entity: entity.into(),
            id,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "{}{sep}{}{sep}{}",
            self.language,
            self.entity,
            self.id,
            sep = SEPARATOR
        )
        .into_bytes()
    }

    /// Prefix covering all documents of one language
    pub fn language_prefix(language: &str) -> Vec<u8> {
        format!("{}{}", language, SEPARATOR).into_bytes()
    }
}

/// Key for checkpoint entries
/// Format: checkpoint:{name}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointKey {
    pub name: String,
}

impl CheckpointKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("checkpoint{}{}", SEPARATOR, self.name).into_bytes()
    }
}
