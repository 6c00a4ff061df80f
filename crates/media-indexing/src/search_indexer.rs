//! Search documents for media and thumbnails.
//!
//! A full sweep visits every (language, entity definition) pair: all
//! definitions of the first language, then all definitions of the next one.
//! Incremental updates follow media changes and refresh the documents of the
//! media and its thumbnails in every configured language.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use media_storage::{SearchDocumentKey, Storage};
use media_types::{
    Context, EntityDefinition, EntityId, EntityIndexedEvent, EntityWrittenEvent, MediaRecord,
    ThumbnailRecord, MEDIA_ENTITY, MEDIA_THUMBNAIL_ENTITY,
};

use crate::error::IndexingError;
use crate::events::IndexerEvents;
use crate::indexer::EntityIndexer;
use crate::iterator::IteratorFactory;
use crate::media_indexer::MEDIA_INDEXER_NAME;
use crate::message::EntityIndexingMessage;
use crate::offset::IndexerOffset;

pub const SEARCH_INDEXER_NAME: &str = "search.indexer";

/// Writes one JSON document per entity and language.
pub struct SearchIndexer {
    storage: Arc<Storage>,
    iterator_factory: IteratorFactory,
    languages: Vec<String>,
    definitions: Vec<EntityDefinition>,
    events: IndexerEvents,
}

impl SearchIndexer {
    pub fn new(
        storage: Arc<Storage>,
        iterator_factory: IteratorFactory,
        languages: Vec<String>,
        events: IndexerEvents,
    ) -> Self {
        Self {
            storage,
            iterator_factory,
            languages,
            definitions: EntityDefinition::ALL.to_vec(),
            events,
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Follow-up message for a media completion, unless the producer asked
    /// to skip search indexing.
    pub fn on_media_indexed(&self, event: &EntityIndexedEvent) -> Option<EntityIndexingMessage> {
        if event.indexer != MEDIA_INDEXER_NAME || event.skip.contains(SEARCH_INDEXER_NAME) {
            return None;
        }
        EntityIndexingMessage::new(
            SEARCH_INDEXER_NAME,
            MEDIA_ENTITY,
            event.ids.iter().cloned(),
            None,
            event.context.clone(),
        )
    }

    fn fresh_offset(&self) -> IndexerOffset {
        IndexerOffset::new(
            self.languages.iter().cloned(),
            self.definitions.iter().map(|d| d.entity_name()),
            Some(Utc::now().timestamp()),
        )
    }

    /// Refresh media documents. With `with_children`, the documents of the
    /// media's thumbnails are refreshed as well.
    fn index_media(
        &self,
        ids: &[EntityId],
        languages: &[String],
        with_children: bool,
    ) -> Result<usize, IndexingError> {
        let records: HashMap<EntityId, MediaRecord> = self
            .storage
            .find_media(ids)?
            .into_iter()
            .map(|media| (media.id.clone(), media))
            .collect();
        let mut thumbnails: BTreeMap<EntityId, Vec<ThumbnailRecord>> = BTreeMap::new();
        for thumbnail in self.storage.thumbnails_for_media(ids)? {
            thumbnails
                .entry(thumbnail.media_id.clone())
                .or_default()
                .push(thumbnail);
        }

        let mut written = 0;
        for id in ids {
            let children = thumbnails.remove(id).unwrap_or_default();
            for language in languages {
                let key = SearchDocumentKey::new(language.as_str(), MEDIA_ENTITY, id.clone());
                let previous_children = self.indexed_thumbnail_ids(&key)?;

                let current_children: BTreeSet<EntityId> = match records.get(id) {
                    Some(media) => {
                        let document = media_document(media, &children, language);
                        self.storage
                            .put_search_document(&key, &serde_json::to_vec(&document)?)?;
                        written += 1;
                        children.iter().map(|t| t.id.clone()).collect()
                    }
                    None => {
                        self.storage.delete_search_document(&key)?;
                        BTreeSet::new()
                    }
                };

                // Thumbnails that left this media lose their documents
                for stale in previous_children.difference(&current_children) {
                    let key = SearchDocumentKey::new(
                        language.as_str(),
                        MEDIA_THUMBNAIL_ENTITY,
                        stale.clone(),
                    );
                    self.storage.delete_search_document(&key)?;
                }

                if with_children {
                    for thumbnail in &children {
                        self.put_thumbnail_document(thumbnail, language)?;
                        written += 1;
                    }
                }
            }
        }
        Ok(written)
    }

    fn index_thumbnails(
        &self,
        ids: &[EntityId],
        languages: &[String],
    ) -> Result<usize, IndexingError> {
        let records: HashMap<EntityId, ThumbnailRecord> = self
            .storage
            .find_thumbnails(ids)?
            .into_iter()
            .map(|thumbnail| (thumbnail.id.clone(), thumbnail))
            .collect();

        let mut written = 0;
        for id in ids {
            for language in languages {
                match records.get(id) {
                    Some(thumbnail) => {
                        self.put_thumbnail_document(thumbnail, language)?;
                        written += 1;
                    }
                    None => {
                        let key = SearchDocumentKey::new(
                            language.as_str(),
                            MEDIA_THUMBNAIL_ENTITY,
                            id.clone(),
                        );
                        self.storage.delete_search_document(&key)?;
                    }
                }
            }
        }
        Ok(written)
    }

    fn put_thumbnail_document(
        &self,
        thumbnail: &ThumbnailRecord,
        language: &str,
    ) -> Result<(), IndexingError> {
        let key = SearchDocumentKey::new(language, MEDIA_THUMBNAIL_ENTITY, thumbnail.id.clone());
        let document = thumbnail_document(thumbnail, language);
        self.storage
            .put_search_document(&key, &serde_json::to_vec(&document)?)?;
        Ok(())
    }

    /// Thumbnail ids recorded in the currently stored media document.
    fn indexed_thumbnail_ids(
        &self,
        key: &SearchDocumentKey,
    ) -> Result<BTreeSet<EntityId>, IndexingError> {
        let Some(bytes) = self.storage.get_search_document(key)? else {
            return Ok(BTreeSet::new());
        };
        let document: Value = serde_json::from_slice(&bytes)?;
        Ok(document["thumbnail_ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(EntityId::new)
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn media_document(media: &MediaRecord, thumbnails: &[ThumbnailRecord], language: &str) -> Value {
    json!({
        "id": media.id,
        "entity": MEDIA_ENTITY,
        "language": language,
        "file_name": media.file_name,
        "file_extension": media.file_extension,
        "mime_type": media.mime_type,
        "path": media.path,
        "private": media.private,
        "uploaded_at": media.uploaded_at.map(|at| at.timestamp()),
        "thumbnail_count": thumbnails.len(),
        "thumbnail_ids": thumbnails.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
    })
}

fn thumbnail_document(thumbnail: &ThumbnailRecord, language: &str) -> Value {
    json!({
        "id": thumbnail.id,
        "entity": MEDIA_THUMBNAIL_ENTITY,
        "language": language,
        "media_id": thumbnail.media_id,
        "width": thumbnail.width,
        "height": thumbnail.height,
        "path": thumbnail.path,
    })
}

impl EntityIndexer for SearchIndexer {
    fn name(&self) -> &str {
        SEARCH_INDEXER_NAME
    }

    fn entity(&self) -> &str {
        MEDIA_ENTITY
    }

    fn iterate(
        &self,
        offset: Option<IndexerOffset>,
    ) -> Result<Option<EntityIndexingMessage>, IndexingError> {
        let mut offset = offset.unwrap_or_else(|| self.fresh_offset());

        loop {
            let Some(entity) = offset.entity_type() else {
                debug!(indexer = SEARCH_INDEXER_NAME, "Sweep exhausted");
                return Ok(None);
            };
            let definition = EntityDefinition::from_name(entity)
                .ok_or_else(|| IndexingError::UnknownEntity(entity.to_string()))?;
            let entity = entity.to_string();

            let mut iterator = self
                .iterator_factory
                .create_iterator(definition, offset.last_id().cloned());
            let ids = iterator.fetch()?;

            if !ids.is_empty() {
                offset.set_last_id(iterator.last_id().cloned());
                let language = offset.phase().unwrap_or(media_types::context::DEFAULT_LANGUAGE);
                let context = Context::system().with_language(language);
                return Ok(EntityIndexingMessage::new(
                    SEARCH_INDEXER_NAME,
                    entity,
                    ids,
                    Some(offset),
                    context,
                ));
            }

            debug!(
                indexer = SEARCH_INDEXER_NAME,
                language = ?offset.phase(),
                entity = %entity,
                "Definition exhausted, advancing"
            );
            if !offset.advance() {
                return Ok(None);
            }
        }
    }

    fn update(&self, event: &EntityWrittenEvent) -> Option<EntityIndexingMessage> {
        EntityIndexingMessage::new(
            SEARCH_INDEXER_NAME,
            MEDIA_ENTITY,
            event.primary_keys(MEDIA_ENTITY),
            None,
            event.context.clone(),
        )
    }

    fn handle(&self, message: &EntityIndexingMessage) -> Result<(), IndexingError> {
        let ids = message.ids();
        if ids.is_empty() {
            return Ok(());
        }

        // Sweep batches cover one language; incremental ones cover them all
        let languages = match message.offset() {
            Some(_) => vec![message.context().language_id.clone()],
            None => self.languages.clone(),
        };
        let definition = EntityDefinition::from_name(message.entity())
            .ok_or_else(|| IndexingError::UnknownEntity(message.entity().to_string()))?;

        let written = match definition {
            EntityDefinition::Media => self.index_media(ids, &languages, !message.is_sweep())?,
            EntityDefinition::MediaThumbnail => self.index_thumbnails(ids, &languages)?,
        };

        info!(
            indexer = SEARCH_INDEXER_NAME,
            entity = %definition,
            count = ids.len(),
            languages = languages.len(),
            documents = written,
            "Indexed search documents"
        );

        self.events.publish(EntityIndexedEvent {
            indexer: SEARCH_INDEXER_NAME.to_string(),
            ids: ids.to_vec(),
            context: message.context().clone(),
            skip: message.skip().clone(),
        });
        Ok(())
    }

    fn total(&self) -> Result<u64, IndexingError> {
        let mut total = 0;
        for definition in &self.definitions {
            total += self
                .iterator_factory
                .create_iterator(*definition, None)
                .fetch_count()?;
        }
        Ok(total * self.languages.len() as u64)
    }
}
