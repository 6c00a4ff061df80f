//! RocksDB wrapper for media indexer storage.
//!
//! Provides:
//! - Database open with column family setup
//! - Record writes that keep the thumbnail index consistent
//! - Subset queries that silently drop ids which no longer exist
//! - Point updates of derived fields returning affected-row counts, each a
//!   read-modify-write under the row lock of a pessimistic transaction
//! - Ordered id scans and counts per entity definition

use rocksdb::{
    ColumnFamily, Direction, IteratorMode, Options, TransactionDB, TransactionDBOptions,
    WriteBatchWithTransaction,
};
use std::path::Path;
use tracing::{debug, info};

use media_types::{EntityDefinition, EntityId, MediaRecord, ThumbnailRecord, ThumbnailSnapshot};

use crate::column_families::{
    build_cf_descriptors, cf_for_definition, CF_CHECKPOINTS, CF_MEDIA, CF_SEARCH_DOCUMENTS,
    CF_THUMBNAILS, CF_THUMBNAIL_BY_MEDIA,
};
use crate::error::StorageError;
use crate::keys::{validate_id, CheckpointKey, SearchDocumentKey, ThumbnailMediaKey};

/// How long a write waits for a row lock before failing with `TimedOut`.
pub const LOCK_TIMEOUT_MS: i64 = 1000;

/// Main storage interface for the media indexer
///
/// Every write, transactional or not, takes the row locks of the keys it
/// touches, so a point update never interleaves with a record write.
pub struct Storage {
    db: TransactionDB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(LOCK_TIMEOUT_MS);
        txn_db_opts.set_default_lock_timeout(LOCK_TIMEOUT_MS);

        let cf_descriptors = build_cf_descriptors();
        let db = TransactionDB::open_cf_descriptors(&db_opts, &txn_db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    // ==================== Media ====================

    /// Insert or replace a media record.
    pub fn put_media(&self, media: &MediaRecord) -> Result<(), StorageError> {
        validate_id(&media.id)?;
        let cf = self.cf(CF_MEDIA)?;
        self.db.put_cf(&cf, media.id.as_bytes(), media.to_bytes()?)?;
        debug!(media_id = %media.id, "Stored media");
        Ok(())
    }

    pub fn get_media(&self, id: &EntityId) -> Result<Option<MediaRecord>, StorageError> {
        let cf = self.cf(CF_MEDIA)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(MediaRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch media records for the given ids, in id order. Missing ids are skipped.
    pub fn find_media(&self, ids: &[EntityId]) -> Result<Vec<MediaRecord>, StorageError> {
        let mut results = Vec::with_capacity(ids.len());
        for id in sorted_unique(ids) {
            if let Some(media) = self.get_media(&id)? {
                results.push(media);
            }
        }
        Ok(results)
    }

    /// Delete a media record together with its thumbnails.
    ///
    /// Returns false if the media did not exist.
    pub fn delete_media(&self, id: &EntityId) -> Result<bool, StorageError> {
        let media_cf = self.cf(CF_MEDIA)?;
        if self.db.get_cf(&media_cf, id.as_bytes())?.is_none() {
            return Ok(false);
        }
        let thumbnails_cf = self.cf(CF_THUMBNAILS)?;
        let index_cf = self.cf(CF_THUMBNAIL_BY_MEDIA)?;

        let mut batch = WriteBatchWithTransaction::<true>::default();
        for key in self.thumbnail_index_entries(id)? {
            batch.delete_cf(&thumbnails_cf, key.thumbnail_id.as_bytes());
            batch.delete_cf(&index_cf, key.to_bytes());
        }
        batch.delete_cf(&media_cf, id.as_bytes());
        self.db.write(batch)?;

        debug!(media_id = %id, "Deleted media");
        Ok(true)
    }

    /// Ids among `ids` whose media has a file name but no path yet.
    pub fn media_ids_missing_path(&self, ids: &[EntityId]) -> Result<Vec<EntityId>, StorageError> {
        Ok(self
            .find_media(ids)?
            .into_iter()
            .filter(MediaRecord::is_missing_path)
            .map(|media| media.id)
            .collect())
    }

    /// Set the derived path of a media record. Returns affected rows.
    pub fn update_media_path(&self, id: &EntityId, path: &str) -> Result<usize, StorageError> {
        self.update_media(id, |media| media.path = Some(path.to_string()))
    }

    /// Overwrite the thumbnail cache of a media record. Returns affected rows.
    pub fn update_media_thumbnails_ro(
        &self,
        id: &EntityId,
        thumbnails: &[ThumbnailSnapshot],
    ) -> Result<usize, StorageError> {
        self.update_media(id, |media| media.thumbnails_ro = Some(thumbnails.to_vec()))
    }

    fn update_media(
        &self,
        id: &EntityId,
        apply: impl FnOnce(&mut MediaRecord),
    ) -> Result<usize, StorageError> {
        self.update_row(CF_MEDIA, id.as_bytes(), |bytes| {
            let mut media = MediaRecord::from_bytes(bytes)?;
            apply(&mut media);
            Ok(media.to_bytes()?)
        })
    }

    /// UPDATE of one existing row: the row stays locked from read to commit.
    /// A missing row is left alone and reports 0 affected rows.
    fn update_row(
        &self,
        cf_name: &str,
        key: &[u8],
        apply: impl FnOnce(&[u8]) -> Result<Vec<u8>, StorageError>,
    ) -> Result<usize, StorageError> {
        let cf = self.cf(cf_name)?;
        let txn = self.db.transaction();
        let Some(bytes) = txn.get_for_update_cf(cf, key, true)? else {
            return Ok(0);
        };
        let updated = apply(&bytes)?;
        txn.put_cf(cf, key, updated)?;
        txn.commit()?;
        Ok(1)
    }

    // ==================== Thumbnails ====================

    /// Insert or replace a thumbnail, keeping the media index in sync.
    pub fn put_thumbnail(&self, thumbnail: &ThumbnailRecord) -> Result<(), StorageError> {
        validate_id(&thumbnail.id)?;
        validate_id(&thumbnail.media_id)?;
        let thumbnails_cf = self.cf(CF_THUMBNAILS)?;
        let index_cf = self.cf(CF_THUMBNAIL_BY_MEDIA)?;

        // The previous owner is read under lock so the index cannot miss a move
        let txn = self.db.transaction();
        if let Some(bytes) = txn.get_for_update_cf(thumbnails_cf, thumbnail.id.as_bytes(), true)? {
            let previous = ThumbnailRecord::from_bytes(&bytes)?;
            if previous.media_id != thumbnail.media_id {
                let stale = ThumbnailMediaKey::new(previous.media_id, previous.id);
                txn.delete_cf(index_cf, stale.to_bytes())?;
            }
        }
        let index_key = ThumbnailMediaKey::new(thumbnail.media_id.clone(), thumbnail.id.clone());
        txn.put_cf(thumbnails_cf, thumbnail.id.as_bytes(), thumbnail.to_bytes()?)?;
        txn.put_cf(index_cf, index_key.to_bytes(), b"")?;
        txn.commit()?;

        debug!(thumbnail_id = %thumbnail.id, media_id = %thumbnail.media_id, "Stored thumbnail");
        Ok(())
    }

    pub fn get_thumbnail(&self, id: &EntityId) -> Result<Option<ThumbnailRecord>, StorageError> {
        let cf = self.cf(CF_THUMBNAILS)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(ThumbnailRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch thumbnails for the given ids, in id order. Missing ids are skipped.
    pub fn find_thumbnails(&self, ids: &[EntityId]) -> Result<Vec<ThumbnailRecord>, StorageError> {
        let mut results = Vec::with_capacity(ids.len());
        for id in sorted_unique(ids) {
            if let Some(thumbnail) = self.get_thumbnail(&id)? {
                results.push(thumbnail);
            }
        }
        Ok(results)
    }

    /// Delete a thumbnail. Returns false if it did not exist.
    pub fn delete_thumbnail(&self, id: &EntityId) -> Result<bool, StorageError> {
        let Some(thumbnail) = self.get_thumbnail(id)? else {
            return Ok(false);
        };
        let thumbnails_cf = self.cf(CF_THUMBNAILS)?;
        let index_cf = self.cf(CF_THUMBNAIL_BY_MEDIA)?;

        let mut batch = WriteBatchWithTransaction::<true>::default();
        batch.delete_cf(&thumbnails_cf, id.as_bytes());
        batch.delete_cf(
            &index_cf,
            ThumbnailMediaKey::new(thumbnail.media_id, thumbnail.id).to_bytes(),
        );
        self.db.write(batch)?;
        Ok(true)
    }

    /// All thumbnails belonging to the given media ids, ordered by media id
    /// then thumbnail id.
    pub fn thumbnails_for_media(
        &self,
        media_ids: &[EntityId],
    ) -> Result<Vec<ThumbnailRecord>, StorageError> {
        let mut results = Vec::new();
        for media_id in sorted_unique(media_ids) {
            for key in self.thumbnail_index_entries(&media_id)? {
                // Index entries may briefly outlive a concurrently deleted thumbnail
                if let Some(thumbnail) = self.get_thumbnail(&key.thumbnail_id)? {
                    results.push(thumbnail);
                }
            }
        }
        Ok(results)
    }

    /// Ids of thumbnails of the given media that have no path yet.
    pub fn thumbnail_ids_missing_path(
        &self,
        media_ids: &[EntityId],
    ) -> Result<Vec<EntityId>, StorageError> {
        Ok(self
            .thumbnails_for_media(media_ids)?
            .into_iter()
            .filter(|thumbnail| thumbnail.path.is_none())
            .map(|thumbnail| thumbnail.id)
            .collect())
    }

    /// Set the derived path of a thumbnail. Returns affected rows.
    pub fn update_thumbnail_path(&self, id: &EntityId, path: &str) -> Result<usize, StorageError> {
        self.update_row(CF_THUMBNAILS, id.as_bytes(), |bytes| {
            let mut thumbnail = ThumbnailRecord::from_bytes(bytes)?;
            thumbnail.path = Some(path.to_string());
            Ok(thumbnail.to_bytes()?)
        })
    }

    fn thumbnail_index_entries(
        &self,
        media_id: &EntityId,
    ) -> Result<Vec<ThumbnailMediaKey>, StorageError> {
        let prefix = ThumbnailMediaKey::prefix(media_id);
        self.prefix_keys(CF_THUMBNAIL_BY_MEDIA, &prefix)?
            .iter()
            .map(|key| ThumbnailMediaKey::from_bytes(key))
            .collect()
    }

    // ==================== Iteration ====================

    /// Up to `limit` ids of a definition in ascending order, strictly after `after`.
    pub fn scan_ids(
        &self,
        definition: EntityDefinition,
        after: Option<&EntityId>,
        limit: usize,
    ) -> Result<Vec<EntityId>, StorageError> {
        let cf = self.cf(cf_for_definition(definition))?;
        let mode = match after {
            Some(after) => IteratorMode::From(after.as_bytes(), Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut results = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(&cf, mode) {
            if results.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if after.is_some_and(|after| key.as_ref() == after.as_bytes()) {
                continue;
            }
            let id = EntityId::from_bytes(&key)
                .ok_or_else(|| StorageError::Key("Invalid UTF-8 entity key".to_string()))?;
            results.push(id);
        }
        Ok(results)
    }

    /// Number of stored records of a definition.
    pub fn count(&self, definition: EntityDefinition) -> Result<u64, StorageError> {
        let cf = self.cf(cf_for_definition(definition))?;
        self.count_cf_entries(cf)
    }

    // ==================== Checkpoints ====================

    /// Store a sweep checkpoint
    pub fn put_checkpoint(&self, name: &str, checkpoint_bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        self.db
            .put_cf(&cf, CheckpointKey::new(name).to_bytes(), checkpoint_bytes)?;
        Ok(())
    }

    pub fn get_checkpoint(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        Ok(self.db.get_cf(&cf, CheckpointKey::new(name).to_bytes())?)
    }

    pub fn delete_checkpoint(&self, name: &str) -> Result<(), StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        self.db.delete_cf(&cf, CheckpointKey::new(name).to_bytes())?;
        Ok(())
    }

    // ==================== Search documents ====================

    pub fn put_search_document(
        &self,
        key: &SearchDocumentKey,
        document: &[u8],
    ) -> Result<(), StorageError> {
        let cf = self.cf(CF_SEARCH_DOCUMENTS)?;
        self.db.put_cf(&cf, key.to_bytes(), document)?;
        Ok(())
    }

    pub fn get_search_document(
        &self,
        key: &SearchDocumentKey,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_SEARCH_DOCUMENTS)?;
        Ok(self.db.get_cf(&cf, key.to_bytes())?)
    }

    pub fn delete_search_document(&self, key: &SearchDocumentKey) -> Result<(), StorageError> {
        let cf = self.cf(CF_SEARCH_DOCUMENTS)?;
        self.db.delete_cf(&cf, key.to_bytes())?;
        Ok(())
    }

    /// Number of search documents stored for a language.
    pub fn search_document_count(&self, language: &str) -> Result<u64, StorageError> {
        let prefix = SearchDocumentKey::language_prefix(language);
        Ok(self.prefix_keys(CF_SEARCH_DOCUMENTS, &prefix)?.len() as u64)
    }

    // ==================== Admin ====================

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            media_count: self.count_cf_entries(self.cf(CF_MEDIA)?)?,
            thumbnail_count: self.count_cf_entries(self.cf(CF_THUMBNAILS)?)?,
            search_document_count: self.count_cf_entries(self.cf(CF_SEARCH_DOCUMENTS)?)?,
            checkpoint_count: self.count_cf_entries(self.cf(CF_CHECKPOINTS)?)?,
        })
    }

    fn prefix_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

fn sorted_unique(ids: &[EntityId]) -> Vec<EntityId> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();
    ids
}

/// Statistics about the storage.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub media_count: u64,
    pub thumbnail_count: u64,
    pub search_document_count: u64,
    pub checkpoint_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_families::ALL_CF_NAMES;
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn media(id: &str, file_name: &str) -> MediaRecord {
        MediaRecord::new(EntityId::new(id), file_name)
    }

    fn thumbnail(id: &str, media_id: &str, size: u32) -> ThumbnailRecord {
        ThumbnailRecord::new(EntityId::new(id), EntityId::new(media_id), size, size)
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_put_and_find_media_skips_missing() {
        let (storage, _temp) = create_test_storage();
        storage.put_media(&media("m1", "a")).unwrap();
        storage.put_media(&media("m2", "b")).unwrap();

        let found = storage
            .find_media(&[EntityId::new("m2"), EntityId::new("gone"), EntityId::new("m1")])
            .unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn test_put_media_rejects_separator_in_id() {
        let (storage, _temp) = create_test_storage();
        let result = storage.put_media(&media("a:b", "file"));
        assert!(matches!(result, Err(StorageError::Key(_))));
    }

    #[test]
    fn test_media_ids_missing_path() {
        let (storage, _temp) = create_test_storage();
        storage.put_media(&media("m1", "a")).unwrap();
        storage.put_media(&media("m2", "b").with_path("media/b")).unwrap();
        let mut no_file = media("m3", "c");
        no_file.file_name = None;
        storage.put_media(&no_file).unwrap();

        let missing = storage
            .media_ids_missing_path(&[EntityId::new("m1"), EntityId::new("m2"), EntityId::new("m3")])
            .unwrap();
        assert_eq!(missing, vec![EntityId::new("m1")]);
    }

    #[test]
    fn test_update_media_path_is_point_update() {
        let (storage, _temp) = create_test_storage();
        storage.put_media(&media("m1", "a")).unwrap();

        assert_eq!(storage.update_media_path(&EntityId::new("m1"), "media/a").unwrap(), 1);
        assert_eq!(storage.update_media_path(&EntityId::new("gone"), "media/x").unwrap(), 0);

        let stored = storage.get_media(&EntityId::new("m1")).unwrap().unwrap();
        assert_eq!(stored.path.as_deref(), Some("media/a"));
        assert!(storage.get_media(&EntityId::new("gone")).unwrap().is_none());
    }

    #[test]
    fn test_path_update_never_reverts_concurrent_put() {
        let (storage, _temp) = create_test_storage();
        let id = EntityId::new("m1");
        storage.put_media(&media("m1", "file-0")).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..=200 {
                    storage.put_media(&media("m1", &format!("file-{}", i))).unwrap();
                }
            });
            scope.spawn(|| {
                for i in 0..200 {
                    storage
                        .update_media_path(&id, &format!("media/{}", i))
                        .unwrap();
                }
            });
        });

        let stored = storage.get_media(&id).unwrap().unwrap();
        assert_eq!(stored.file_name.as_deref(), Some("file-200"));
    }

    #[test]
    fn test_cache_and_path_updates_both_survive() {
        let (storage, _temp) = create_test_storage();
        let ids: Vec<EntityId> = (0..20).map(|i| EntityId::new(format!("m{:02}", i))).collect();
        for id in &ids {
            storage.put_media(&MediaRecord::new(id.clone(), "file")).unwrap();
        }
        let snapshot = ThumbnailSnapshot::from(&thumbnail("t1", "m00", 10));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for id in &ids {
                    storage.update_media_path(id, "media/file").unwrap();
                }
            });
            scope.spawn(|| {
                for id in &ids {
                    storage
                        .update_media_thumbnails_ro(id, std::slice::from_ref(&snapshot))
                        .unwrap();
                }
            });
        });

        for media in storage.find_media(&ids).unwrap() {
            assert_eq!(media.path.as_deref(), Some("media/file"));
            assert_eq!(media.thumbnails_ro.as_ref().map(Vec::len), Some(1));
        }
    }

    #[test]
    fn test_locked_row_times_out_as_transient() {
        let (storage, _temp) = create_test_storage();
        storage.put_media(&media("m1", "a")).unwrap();

        let cf = storage.cf(CF_MEDIA).unwrap();
        let holder = storage.db.transaction();
        holder.get_for_update_cf(cf, b"m1", true).unwrap();

        let err = storage
            .update_media_path(&EntityId::new("m1"), "media/a")
            .unwrap_err();
        assert!(err.is_transient(), "lock wait should be transient: {}", err);

        holder.rollback().unwrap();
        assert_eq!(storage.update_media_path(&EntityId::new("m1"), "media/a").unwrap(), 1);
    }

    #[test]
    fn test_thumbnails_for_media_uses_index() {
        let (storage, _temp) = create_test_storage();
        storage.put_media(&media("m1", "a")).unwrap();
        storage.put_media(&media("m10", "b")).unwrap();
        storage.put_thumbnail(&thumbnail("t2", "m1", 200)).unwrap();
        storage.put_thumbnail(&thumbnail("t1", "m1", 100)).unwrap();
        storage.put_thumbnail(&thumbnail("t3", "m10", 100)).unwrap();

        let thumbnails = storage.thumbnails_for_media(&[EntityId::new("m1")]).unwrap();
        let ids: Vec<_> = thumbnails.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[test]
    fn test_moving_thumbnail_updates_index() {
        let (storage, _temp) = create_test_storage();
        storage.put_thumbnail(&thumbnail("t1", "m1", 100)).unwrap();
        storage.put_thumbnail(&thumbnail("t1", "m2", 100)).unwrap();

        assert!(storage.thumbnails_for_media(&[EntityId::new("m1")]).unwrap().is_empty());
        assert_eq!(storage.thumbnails_for_media(&[EntityId::new("m2")]).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_media_cascades_thumbnails() {
        let (storage, _temp) = create_test_storage();
        storage.put_media(&media("m1", "a")).unwrap();
        storage.put_thumbnail(&thumbnail("t1", "m1", 100)).unwrap();

        assert!(storage.delete_media(&EntityId::new("m1")).unwrap());
        assert!(!storage.delete_media(&EntityId::new("m1")).unwrap());
        assert!(storage.get_thumbnail(&EntityId::new("t1")).unwrap().is_none());
        assert_eq!(storage.count(EntityDefinition::MediaThumbnail).unwrap(), 0);
    }

    #[test]
    fn test_thumbnail_ids_missing_path() {
        let (storage, _temp) = create_test_storage();
        let mut with_path = thumbnail("t1", "m1", 100);
        with_path.path = Some("thumbnail/t1".to_string());
        storage.put_thumbnail(&with_path).unwrap();
        storage.put_thumbnail(&thumbnail("t2", "m1", 200)).unwrap();

        let missing = storage.thumbnail_ids_missing_path(&[EntityId::new("m1")]).unwrap();
        assert_eq!(missing, vec![EntityId::new("t2")]);

        assert_eq!(storage.update_thumbnail_path(&EntityId::new("t2"), "p").unwrap(), 1);
        assert!(storage
            .thumbnail_ids_missing_path(&[EntityId::new("m1")])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_scan_ids_is_exclusive_and_bounded() {
        let (storage, _temp) = create_test_storage();
        for id in ["a", "b", "c", "d", "e"] {
            storage.put_media(&media(id, id)).unwrap();
        }

        let first = storage.scan_ids(EntityDefinition::Media, None, 2).unwrap();
        assert_eq!(first, vec![EntityId::new("a"), EntityId::new("b")]);

        let next = storage
            .scan_ids(EntityDefinition::Media, Some(&EntityId::new("b")), 2)
            .unwrap();
        assert_eq!(next, vec![EntityId::new("c"), EntityId::new("d")]);

        let last = storage
            .scan_ids(EntityDefinition::Media, Some(&EntityId::new("d")), 2)
            .unwrap();
        assert_eq!(last, vec![EntityId::new("e")]);

        let done = storage
            .scan_ids(EntityDefinition::Media, Some(&EntityId::new("e")), 2)
            .unwrap();
        assert!(done.is_empty());
        assert_eq!(storage.count(EntityDefinition::Media).unwrap(), 5);
    }

    #[test]
    fn test_scan_after_deleted_key() {
        let (storage, _temp) = create_test_storage();
        for id in ["a", "b", "c"] {
            storage.put_media(&media(id, id)).unwrap();
        }
        storage.delete_media(&EntityId::new("b")).unwrap();

        let next = storage
            .scan_ids(EntityDefinition::Media, Some(&EntityId::new("b")), 10)
            .unwrap();
        assert_eq!(next, vec![EntityId::new("c")]);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.get_checkpoint("media.indexer").unwrap().is_none());

        storage.put_checkpoint("media.indexer", b"{}").unwrap();
        assert_eq!(
            storage.get_checkpoint("media.indexer").unwrap(),
            Some(b"{}".to_vec())
        );

        storage.delete_checkpoint("media.indexer").unwrap();
        assert!(storage.get_checkpoint("media.indexer").unwrap().is_none());
    }

    #[test]
    fn test_search_documents_by_language() {
        let (storage, _temp) = create_test_storage();
        let en = SearchDocumentKey::new("en", "media", EntityId::new("m1"));
        let de = SearchDocumentKey::new("de", "media", EntityId::new("m1"));
        storage.put_search_document(&en, b"{\"a\":1}").unwrap();
        storage.put_search_document(&de, b"{\"a\":2}").unwrap();

        assert_eq!(storage.search_document_count("en").unwrap(), 1);
        storage.delete_search_document(&en).unwrap();
        assert_eq!(storage.search_document_count("en").unwrap(), 0);
        assert_eq!(storage.get_search_document(&de).unwrap(), Some(b"{\"a\":2}".to_vec()));
    }

    #[test]
    fn test_stats() {
        let (storage, _temp) = create_test_storage();
        storage.put_media(&media("m1", "a")).unwrap();
        storage.put_thumbnail(&thumbnail("t1", "m1", 100)).unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.media_count, 1);
        assert_eq!(stats.thumbnail_count, 1);
        assert_eq!(stats.search_document_count, 0);
    }

    #[test]
    fn test_uploaded_at_survives_storage() {
        let (storage, _temp) = create_test_storage();
        let uploaded = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        storage
            .put_media(&media("m1", "a").with_uploaded_at(uploaded))
            .unwrap();
        let stored = storage.get_media(&EntityId::new("m1")).unwrap().unwrap();
        assert_eq!(stored.uploaded_at, Some(uploaded));
    }
}
