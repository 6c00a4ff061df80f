//! JSON-lines import format.
//!
//! One record per line, tagged by `kind`:
//!
//! ```text
//! {"kind": "media", "id": "01J...", "file_name": "beach", "file_extension": "jpg"}
//! {"kind": "thumbnail", "id": "01K...", "media_id": "01J...", "width": 400, "height": 300}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::io::BufRead;

use anyhow::{Context, Result};
use serde::Deserialize;

use media_types::{MediaRecord, ThumbnailRecord};

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ImportRecord {
    Media(MediaRecord),
    Thumbnail(ThumbnailRecord),
}

/// Records of an import file, split by entity type in file order.
#[derive(Debug, Default)]
pub struct ImportBatch {
    pub media: Vec<MediaRecord>,
    pub thumbnails: Vec<ThumbnailRecord>,
}

impl ImportBatch {
    pub fn read(reader: impl BufRead) -> Result<Self> {
        let mut batch = Self::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", index + 1))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let record: ImportRecord = serde_json::from_str(trimmed)
                .with_context(|| format!("Invalid record on line {}", index + 1))?;
            match record {
                ImportRecord::Media(media) => batch.media.push(media),
                ImportRecord::Thumbnail(thumbnail) => batch.thumbnails.push(thumbnail),
            }
        }
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.media.len() + self.thumbnails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
