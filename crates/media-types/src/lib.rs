//! # media-types
//!
//! Shared domain types for the media indexer.
//!
//! This crate defines the data structures passed between storage, the
//! indexing core and the scheduler:
//! - Entity ids and entity definition names
//! - Media and thumbnail records, including derived fields
//! - Execution context carried through indexing messages
//! - Change events (entities written) and completion events (entities indexed)
//! - Layered settings

pub mod config;
pub mod context;
pub mod definition;
pub mod error;
pub mod event;
pub mod id;
pub mod media;

pub use config::{PathStrategyKind, RetrySettings, Settings};
pub use context::Context;
pub use definition::{EntityDefinition, MEDIA_ENTITY, MEDIA_THUMBNAIL_ENTITY};
pub use error::MediaError;
pub use event::{EntityIndexedEvent, EntityWrittenEvent};
pub use id::EntityId;
pub use media::{MediaRecord, ThumbnailRecord, ThumbnailSnapshot};
