//! Public URLs of media files and thumbnails.

use std::cell::OnceCell;
use std::sync::Arc;

use media_types::{MediaRecord, Settings, ThumbnailRecord};

use crate::pathname::{PathError, PathGenerator};

/// Per-request state for URL generation.
///
/// Caches the fallback base URL for the lifetime of one request. Create one
/// per request, or call [`RequestScope::reset`] when a long-lived worker
/// starts on the next one.
#[derive(Debug, Default)]
pub struct RequestScope {
    /// Scheme, host and base path of the current request, if any
    host: Option<String>,
    fallback: OnceCell<String>,
}

impl RequestScope {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            fallback: OnceCell::new(),
        }
    }

    /// Scope outside of any request (CLI, workers).
    pub fn detached() -> Self {
        Self::default()
    }

    /// Forget the cached fallback and switch to another request host.
    pub fn reset(&mut self, host: Option<String>) {
        self.host = host;
        self.fallback = OnceCell::new();
    }

    fn fallback_base_url(&self, app_url: &str) -> &str {
        self.fallback.get_or_init(|| {
            let base = match self.host.as_deref() {
                Some(host) if !host.is_empty() && host != ":" => host,
                _ => app_url,
            };
            base.trim_end_matches('/').to_string()
        })
    }

    pub fn has_cached_fallback(&self) -> bool {
        self.fallback.get().is_some()
    }
}

/// Resolves relative and absolute URLs.
///
/// A stored path always wins; the path generator is only consulted for
/// records that have not been indexed yet.
pub struct UrlGenerator {
    path_generator: Arc<dyn PathGenerator>,
    base_url: Option<String>,
    app_url: String,
}

impl UrlGenerator {
    pub fn new(
        path_generator: Arc<dyn PathGenerator>,
        base_url: Option<String>,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            path_generator,
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            app_url: app_url.into(),
        }
    }

    pub fn from_settings(path_generator: Arc<dyn PathGenerator>, settings: &Settings) -> Self {
        Self::new(
            path_generator,
            settings.base_url.clone(),
            settings.app_url.clone(),
        )
    }

    pub fn relative_media_url(&self, media: &MediaRecord) -> Result<String, PathError> {
        validate(media)?;
        match media.path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => Ok(path.to_string()),
            None => self.path_generator.generate_path(media, None),
        }
    }

    pub fn absolute_media_url(
        &self,
        media: &MediaRecord,
        scope: &RequestScope,
    ) -> Result<String, PathError> {
        let relative = self.relative_media_url(media)?;
        Ok(format!("{}/{}", self.base_url(scope), relative))
    }

    pub fn relative_thumbnail_url(
        &self,
        media: &MediaRecord,
        thumbnail: &ThumbnailRecord,
    ) -> Result<String, PathError> {
        validate(media)?;
        match thumbnail.path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => Ok(path.to_string()),
            None => self.path_generator.generate_path(media, Some(thumbnail)),
        }
    }

    pub fn absolute_thumbnail_url(
        &self,
        media: &MediaRecord,
        thumbnail: &ThumbnailRecord,
        scope: &RequestScope,
    ) -> Result<String, PathError> {
        let relative = self.relative_thumbnail_url(media, thumbnail)?;
        Ok(format!("{}/{}", self.base_url(scope), relative))
    }

    fn base_url<'a>(&'a self, scope: &'a RequestScope) -> &'a str {
        match self.base_url.as_deref() {
            Some(base) => base,
            None => scope.fallback_base_url(&self.app_url),
        }
    }
}

fn validate(media: &MediaRecord) -> Result<(), PathError> {
    if media.id.is_empty() {
        return Err(PathError::EmptyMediaId);
    }
    if !media.has_file() {
        return Err(PathError::EmptyMediaFilename);
    }
    Ok(())
}
