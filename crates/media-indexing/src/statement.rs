//! Parameterized point writes issued by the indexers.
//!
//! Each statement updates exactly one row keyed by id and reports how many
//! rows it touched. A row deleted in the meantime yields 0, never an insert.

use std::sync::Arc;

use media_storage::{Storage, StorageError};
use media_types::{EntityId, ThumbnailSnapshot};

/// A single write with bound parameters.
pub trait WriteStatement: Send + Sync {
    type Params: ?Sized;

    /// Name used in logs and errors
    fn name(&self) -> &'static str;

    /// Execute once. Returns affected rows.
    fn execute(&self, params: &Self::Params) -> Result<usize, StorageError>;
}

/// Parameters of a derived path update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathUpdate {
    pub id: EntityId,
    pub path: String,
}

/// Parameters of a thumbnail cache refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailsUpdate {
    pub media_id: EntityId,
    pub thumbnails: Vec<ThumbnailSnapshot>,
}

/// `media.path = :path WHERE id = :id`
pub struct UpdateMediaPath {
    storage: Arc<Storage>,
}

impl UpdateMediaPath {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl WriteStatement for UpdateMediaPath {
    type Params = PathUpdate;

    fn name(&self) -> &'static str {
        "update_media_path"
    }

    fn execute(&self, params: &PathUpdate) -> Result<usize, StorageError> {
        self.storage.update_media_path(&params.id, &params.path)
    }
}

/// `media_thumbnail.path = :path WHERE id = :id`
pub struct UpdateThumbnailPath {
    storage: Arc<Storage>,
}

impl UpdateThumbnailPath {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl WriteStatement for UpdateThumbnailPath {
    type Params = PathUpdate;

    fn name(&self) -> &'static str {
        "update_thumbnail_path"
    }

    fn execute(&self, params: &PathUpdate) -> Result<usize, StorageError> {
        self.storage.update_thumbnail_path(&params.id, &params.path)
    }
}

/// `media.thumbnails_ro = :thumbnails WHERE id = :media_id`
pub struct UpdateThumbnailsRo {
    storage: Arc<Storage>,
}

impl UpdateThumbnailsRo {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl WriteStatement for UpdateThumbnailsRo {
    type Params = ThumbnailsUpdate;

    fn name(&self) -> &'static str {
        "update_media_thumbnails_ro"
    }

    fn execute(&self, params: &ThumbnailsUpdate) -> Result<usize, StorageError> {
        self.storage
            .update_media_thumbnails_ro(&params.media_id, &params.thumbnails)
    }
}
