/*!
 * Translation caching functionality.
 *
 * An in-memory map shared by every worker, optionally backed by the SQLite
 * repository: persisted entries are loaded when the cache is opened and every
 * `put` is written through. Persistence problems never fail a translation;
 * they surface as `CacheError`s the caller turns into warnings.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::RwLock;

use crate::app_config::CacheConfig;
use crate::database::{CacheRecord, DatabaseConnection, Repository};
use crate::errors::CacheError;
use crate::text_utils::truncate_text;

/// Cache key: normalized guarded text, language pair and backend identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Guarded source text with whitespace collapsed
    pub text: String,
    /// Source language tag
    pub source_language: String,
    /// Target language tag
    pub target_language: String,
    /// Backend identity (`name:model#fingerprint`)
    pub backend: String,
}

impl CacheKey {
    /// Create a new cache key, normalizing the text
    pub fn new(text: &str, source_language: &str, target_language: &str, backend: &str) -> Self {
        Self {
            text: normalize_text(text),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            backend: backend.to_string(),
        }
    }
}

/// Collapse whitespace runs and trim
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cached translation with its creation time
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub translated: String,
    pub created_at: DateTime<Utc>,
}

/// Hit/miss counters and size
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStatistics {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
    pub hit_rate: f64,
}

/// Translation cache for storing and retrieving translations
#[derive(Clone, Default)]
pub struct TranslationCache {
    /// Internal cache storage
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,

    /// Cache hit counter
    hits: Arc<AtomicUsize>,

    /// Cache miss counter
    misses: Arc<AtomicUsize>,

    /// Write-through store, absent for memory-only caches
    repository: Option<Repository>,
}

impl std::fmt::Debug for TranslationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationCache")
            .field("entries", &self.len())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

impl TranslationCache {
    /// Memory-only cache
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache backed by a repository, warmed with every persisted entry
    pub fn with_repository(repository: Repository) -> Result<Self, CacheError> {
        let records = repository.load_all()?;
        let mut entries = HashMap::with_capacity(records.len());
        for record in records {
            let created_at = DateTime::parse_from_rfc3339(&record.created_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            entries.insert(
                CacheKey::new(
                    &record.source_text,
                    &record.source_language,
                    &record.target_language,
                    &record.backend,
                ),
                CacheEntry {
                    translated: record.translated_text,
                    created_at,
                },
            );
        }
        debug!("Loaded {} cached translations", entries.len());

        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            repository: Some(repository),
            ..Self::default()
        })
    }

    /// Open the cache described by the configuration
    ///
    /// A store that cannot be opened degrades to a memory-only cache; the
    /// error is returned alongside so the caller can report it.
    pub fn open(config: &CacheConfig) -> (Self, Option<CacheError>) {
        if !config.enabled {
            return (Self::in_memory(), None);
        }
        let opened = config
            .database_path()
            .and_then(DatabaseConnection::new)
            .map_err(CacheError::from)
            .and_then(|db| Self::with_repository(Repository::new(db)));
        match opened {
            Ok(cache) => (cache, None),
            Err(e) => {
                warn!("Translation cache store unavailable, using memory only: {}", e);
                (Self::in_memory(), Some(e))
            }
        }
    }

    /// Get a translation from the cache
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let entries = self.entries.read();

        match entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Cache hit for '{}' ({} -> {})",
                    truncate_text(&key.text, 30),
                    key.source_language,
                    key.target_language
                );
                Some(entry.translated.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Cache miss for '{}' ({} -> {})",
                    truncate_text(&key.text, 30),
                    key.source_language,
                    key.target_language
                );
                None
            }
        }
    }

    /// Store a translation; the last write for a key wins
    ///
    /// The memory entry is always updated. An error means only the
    /// persistent write failed.
    pub async fn put(&self, key: CacheKey, translated: &str) -> Result<(), CacheError> {
        self.entries.write().insert(
            key.clone(),
            CacheEntry {
                translated: translated.to_string(),
                created_at: Utc::now(),
            },
        );

        if let Some(repository) = &self.repository {
            let record = CacheRecord::new(
                key.text,
                key.source_language,
                key.target_language,
                key.backend,
                translated.to_string(),
            );
            repository.cache_translation(&record).await?;
        }
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStatistics {
            hits,
            misses,
            entries: self.len(),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    /// Clear memory and store, returning the number of removed entries
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let removed = {
            let mut entries = self.entries.write();
            let removed = entries.len();
            entries.clear();
            removed
        };
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);

        let removed = match &self.repository {
            Some(repository) => repository.clear_cache().await?.max(removed as i64) as usize,
            None => removed,
        };
        debug!("Translation cache cleared");
        Ok(removed)
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether puts are written to a store
    pub fn is_persistent(&self) -> bool {
        self.repository.is_some()
    }

    /// The backing repository, if any
    pub fn repository(&self) -> Option<&Repository> {
        self.repository.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> CacheKey {
        CacheKey::new(text, "en", "zh", "mock")
    }

    #[test]
    fn test_cacheKey_shouldNormalizeWhitespace() {
        assert_eq!(key("  Hello \n  world "), key("Hello world"));
        assert_ne!(key("Hello"), CacheKey::new("Hello", "en", "zh", "deepl"));
    }

    #[tokio::test]
    async fn test_getAndPut_shouldCountHitsAndMisses() {
        let cache = TranslationCache::in_memory();
        assert!(cache.get(&key("Hello")).is_none());

        cache.put(key("Hello"), "你好").await.unwrap();
        assert_eq!(cache.get(&key("Hello")).as_deref(), Some("你好"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_withRepository_shouldWarmFromStore() {
        let repository = Repository::new_in_memory().unwrap();
        let first = TranslationCache::with_repository(repository.clone()).unwrap();
        first.put(key("Hello"), "你好").await.unwrap();

        let second = TranslationCache::with_repository(repository).unwrap();
        assert_eq!(second.get(&key("Hello")).as_deref(), Some("你好"));
    }

    #[tokio::test]
    async fn test_clones_shouldShareEntries() {
        let cache = TranslationCache::in_memory();
        let clone = cache.clone();
        clone.put(key("a"), "b").await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(clone.is_empty());
    }

    #[test]
    fn test_open_whenDisabled_shouldBeMemoryOnly() {
        let config = CacheConfig {
            enabled: false,
            path: None,
        };
        let (cache, error) = TranslationCache::open(&config);
        assert!(!cache.is_persistent());
        assert!(error.is_none());
    }
}
