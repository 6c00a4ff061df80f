//! Entity definition names.
//!
//! Change events and iterators address entity types by name; storage maps each
//! name to its own column family.

/// Entity name of media records.
pub const MEDIA_ENTITY: &str = "media";

/// Entity name of media thumbnails.
pub const MEDIA_THUMBNAIL_ENTITY: &str = "media_thumbnail";

/// Entity types the store can iterate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityDefinition {
    Media,
    MediaThumbnail,
}

impl EntityDefinition {
    /// All iterable definitions, in sweep order.
    pub const ALL: [EntityDefinition; 2] = [EntityDefinition::Media, EntityDefinition::MediaThumbnail];

    pub fn entity_name(&self) -> &'static str {
        match self {
            EntityDefinition::Media => MEDIA_ENTITY,
            EntityDefinition::MediaThumbnail => MEDIA_THUMBNAIL_ENTITY,
        }
    }

    /// Resolve a definition from its entity name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            MEDIA_ENTITY => Some(EntityDefinition::Media),
            MEDIA_THUMBNAIL_ENTITY => Some(EntityDefinition::MediaThumbnail),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.entity_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for definition in EntityDefinition::ALL {
            assert_eq!(
                EntityDefinition::from_name(definition.entity_name()),
                Some(definition)
            );
        }
        assert_eq!(EntityDefinition::from_name("product"), None);
    }
}
