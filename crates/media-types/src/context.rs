//! Execution context carried through indexing messages.
//!
//! The indexing core never interprets the context; it only passes it from the
//! message producer to the completion event.

use serde::{Deserialize, Serialize};

/// Language used when no language is given.
pub const DEFAULT_LANGUAGE: &str = "default";

/// Locale, versioning and permission information of the operation that
/// produced a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub language_id: String,
    #[serde(default)]
    pub version_id: Option<String>,
    /// Whether the operation runs with system privileges
    #[serde(default)]
    pub system_scope: bool,
}

impl Context {
    /// Context used for background sweeps.
    pub fn system() -> Self {
        Self {
            language_id: DEFAULT_LANGUAGE.to_string(),
            version_id: None,
            system_scope: true,
        }
    }

    pub fn with_language(mut self, language_id: impl Into<String>) -> Self {
        self.language_id = language_id.into();
        self
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::system()
    }
}
