/*!
 * Database record types.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted translation cache entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheRecord {
    /// SHA256 hash of the normalized source text
    pub source_text_hash: String,
    /// Normalized guarded source text
    pub source_text: String,
    /// Source language tag
    pub source_language: String,
    /// Target language tag
    pub target_language: String,
    /// Backend identity including model and option fingerprint
    pub backend: String,
    /// Translated text
    pub translated_text: String,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

impl CacheRecord {
    /// Create a new cache record stamped with the current time
    pub fn new(
        source_text: String,
        source_language: String,
        target_language: String,
        backend: String,
        translated_text: String,
    ) -> Self {
        Self {
            source_text_hash: super::Repository::hash_text(&source_text),
            source_text,
            source_language,
            target_language,
            backend,
            translated_text,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Aggregate numbers about the persisted cache
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of stored translations
    pub total_entries: i64,
    /// Number of distinct backend identities
    pub backends: i64,
    /// Database file size in bytes
    pub file_size_bytes: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cache entries: {}, Backends: {}, Size: {} KB",
            self.total_entries,
            self.backends,
            self.file_size_bytes / 1024
        )
    }
}
