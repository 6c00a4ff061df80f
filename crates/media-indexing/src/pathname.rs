//! Storage path generation for media files and thumbnails.
//!
//! Paths look like `media/{hash}/{cache_buster}/{file}` (or `thumbnail/...`),
//! with empty segments left out. The hash segment comes from a pluggable
//! [`PathnameStrategy`]; the whole generator can be wrapped by
//! [`PathDecorator`]s around a mandatory terminal [`StrategyPathGenerator`].

use md5::{Digest, Md5};
use thiserror::Error;

use media_types::{MediaRecord, PathStrategyKind, Settings, ThumbnailRecord};

/// Path generation failures. These are configuration or data errors and fail
/// identically on every attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Media id must not be empty")]
    EmptyMediaId,

    #[error("Media file name must not be empty")]
    EmptyMediaFilename,
}

/// Decides the hash and cache-buster segments of a path.
pub trait PathnameStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Bucketing segment, e.g. `d0/b3/24`. `None` leaves it out.
    fn path_hash(&self, media: &MediaRecord, thumbnail: Option<&ThumbnailRecord>)
        -> Option<String>;

    /// Segment that changes whenever the file is re-uploaded.
    fn cache_buster(
        &self,
        media: &MediaRecord,
        _thumbnail: Option<&ThumbnailRecord>,
    ) -> Option<String> {
        media.uploaded_at.map(|at| at.timestamp().to_string())
    }
}

/// First three byte pairs of the md5 hex digest, joined by `/`. A pair
/// reading `ad` becomes `g0`.
fn md5_buckets(value: &str) -> String {
    let digest = hex::encode(Md5::digest(value.as_bytes()));
    (0..3)
        .map(|i| match &digest[i * 2..i * 2 + 2] {
            "ad" => "g0",
            pair => pair,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Buckets by the md5 of the file name.
pub struct FilenamePathnameStrategy;

impl PathnameStrategy for FilenamePathnameStrategy {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn path_hash(
        &self,
        media: &MediaRecord,
        _thumbnail: Option<&ThumbnailRecord>,
    ) -> Option<String> {
        media.file_name.as_deref().map(md5_buckets)
    }
}

/// Buckets by the md5 of the media id.
pub struct IdPathnameStrategy;

impl PathnameStrategy for IdPathnameStrategy {
    fn name(&self) -> &'static str {
        "id"
    }

    fn path_hash(
        &self,
        media: &MediaRecord,
        _thumbnail: Option<&ThumbnailRecord>,
    ) -> Option<String> {
        Some(md5_buckets(media.id.as_str()))
    }
}

/// No bucketing.
pub struct PlainPathnameStrategy;

impl PathnameStrategy for PlainPathnameStrategy {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn path_hash(
        &self,
        _media: &MediaRecord,
        _thumbnail: Option<&ThumbnailRecord>,
    ) -> Option<String> {
        None
    }
}

/// Strategy for a configured kind.
pub fn strategy_for(kind: PathStrategyKind) -> Box<dyn PathnameStrategy> {
    match kind {
        PathStrategyKind::Filename => Box::new(FilenamePathnameStrategy),
        PathStrategyKind::Id => Box::new(IdPathnameStrategy),
        PathStrategyKind::Plain => Box::new(PlainPathnameStrategy),
    }
}

/// Computes the storage path of a media file or one of its thumbnails.
pub trait PathGenerator: Send + Sync {
    fn generate_path(
        &self,
        media: &MediaRecord,
        thumbnail: Option<&ThumbnailRecord>,
    ) -> Result<String, PathError>;
}

/// Innermost generator: builds the path from a strategy and never delegates.
pub struct StrategyPathGenerator {
    strategy: Box<dyn PathnameStrategy>,
}

impl StrategyPathGenerator {
    pub fn new(strategy: Box<dyn PathnameStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}

impl PathGenerator for StrategyPathGenerator {
    fn generate_path(
        &self,
        media: &MediaRecord,
        thumbnail: Option<&ThumbnailRecord>,
    ) -> Result<String, PathError> {
        if media.id.is_empty() {
            return Err(PathError::EmptyMediaId);
        }
        let file_name = media
            .file_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(PathError::EmptyMediaFilename)?;

        let mut file = file_name.to_string();
        if let Some(thumbnail) = thumbnail {
            file.push_str(&format!("_{}x{}", thumbnail.width, thumbnail.height));
        }
        if let Some(extension) = media.file_extension.as_deref().filter(|e| !e.is_empty()) {
            file.push('.');
            file.push_str(extension);
        }

        let root = if thumbnail.is_some() { "thumbnail" } else { "media" };
        let segments = [
            Some(root.to_string()),
            self.strategy.path_hash(media, thumbnail),
            self.strategy.cache_buster(media, thumbnail),
            Some(file),
        ];

        Ok(segments
            .into_iter()
            .flatten()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/"))
    }
}

/// Wraps the rest of the chain and may rewrite what it produces.
pub trait PathDecorator: Send + Sync {
    fn decorate(
        &self,
        media: &MediaRecord,
        thumbnail: Option<&ThumbnailRecord>,
        inner: &dyn PathGenerator,
    ) -> Result<String, PathError>;
}

/// Prepends a fixed directory to every generated path.
pub struct PrefixDecorator {
    prefix: String,
}

impl PrefixDecorator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }
}

impl PathDecorator for PrefixDecorator {
    fn decorate(
        &self,
        media: &MediaRecord,
        thumbnail: Option<&ThumbnailRecord>,
        inner: &dyn PathGenerator,
    ) -> Result<String, PathError> {
        let path = inner.generate_path(media, thumbnail)?;
        if self.prefix.is_empty() {
            return Ok(path);
        }
        Ok(format!("{}/{}", self.prefix, path))
    }
}

/// Terminal generator plus zero or more decorators. The first decorator added
/// is the outermost one.
pub struct PathGeneratorChain {
    terminal: StrategyPathGenerator,
    decorators: Vec<Box<dyn PathDecorator>>,
}

impl PathGeneratorChain {
    pub fn new(terminal: StrategyPathGenerator) -> Self {
        Self {
            terminal,
            decorators: Vec::new(),
        }
    }

    pub fn with_decorator(mut self, decorator: Box<dyn PathDecorator>) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Chain configured from settings: strategy plus optional prefix.
    pub fn from_settings(settings: &Settings) -> Self {
        let chain = Self::new(StrategyPathGenerator::new(strategy_for(
            settings.path_strategy,
        )));
        match settings.path_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                chain.with_decorator(Box::new(PrefixDecorator::new(prefix)))
            }
            _ => chain,
        }
    }

    pub fn decorator_count(&self) -> usize {
        self.decorators.len()
    }
}

/// The part of a chain below a given decorator.
struct ChainTail<'a> {
    terminal: &'a StrategyPathGenerator,
    decorators: &'a [Box<dyn PathDecorator>],
}

impl PathGenerator for ChainTail<'_> {
    fn generate_path(
        &self,
        media: &MediaRecord,
        thumbnail: Option<&ThumbnailRecord>,
    ) -> Result<String, PathError> {
        match self.decorators.split_first() {
            Some((outer, rest)) => {
                let inner = ChainTail {
                    terminal: self.terminal,
                    decorators: rest,
                };
                outer.decorate(media, thumbnail, &inner)
            }
            None => self.terminal.generate_path(media, thumbnail),
        }
    }
}

impl PathGenerator for PathGeneratorChain {
    fn generate_path(
        &self,
        media: &MediaRecord,
        thumbnail: Option<&ThumbnailRecord>,
    ) -> Result<String, PathError> {
        ChainTail {
            terminal: &self.terminal,
            decorators: &self.decorators,
        }
        .generate_path(media, thumbnail)
    }
}
