//! Column family definitions for RocksDB.
//!
//! - media: media records keyed by id
//! - media_thumbnail: thumbnail records keyed by id
//! - thumbnail_by_media: secondary index `{media_id}:{thumbnail_id}` -> empty
//! - search_documents: denormalized search documents (compressed)
//! - checkpoints: sweep offsets for resumable iteration

use rocksdb::{ColumnFamilyDescriptor, Options};

use media_types::EntityDefinition;

/// Column family name for media records
pub const CF_MEDIA: &str = "media";

/// Column family name for thumbnail records
pub const CF_THUMBNAILS: &str = "media_thumbnail";

/// Column family name for the media -> thumbnail index
pub const CF_THUMBNAIL_BY_MEDIA: &str = "thumbnail_by_media";

/// Column family name for search documents
pub const CF_SEARCH_DOCUMENTS: &str = "search_documents";

/// Column family name for sweep checkpoints
pub const CF_CHECKPOINTS: &str = "checkpoints";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_MEDIA,
    CF_THUMBNAILS,
    CF_THUMBNAIL_BY_MEDIA,
    CF_SEARCH_DOCUMENTS,
    CF_CHECKPOINTS,
];

/// Column family holding the records of an entity definition.
pub fn cf_for_definition(definition: EntityDefinition) -> &'static str {
    match definition {
        EntityDefinition::Media => CF_MEDIA,
        EntityDefinition::MediaThumbnail => CF_THUMBNAILS,
    }
}

fn search_document_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_MEDIA, Options::default()),
        ColumnFamilyDescriptor::new(CF_THUMBNAILS, Options::default()),
        ColumnFamilyDescriptor::new(CF_THUMBNAIL_BY_MEDIA, Options::default()),
        ColumnFamilyDescriptor::new(CF_SEARCH_DOCUMENTS, search_document_options()),
        ColumnFamilyDescriptor::new(CF_CHECKPOINTS, Options::default()),
    ]
}
