/*!
 * Repository for the persisted translation cache.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{OptionalExtension, params};
use sha2::{Digest, Sha256};

use super::connection::DatabaseConnection;
use super::models::{CacheRecord, CacheStats};

/// Data access for cached translations
#[derive(Debug, Clone)]
pub struct Repository {
    db: DatabaseConnection,
}

impl Repository {
    /// Create a repository over an open connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository over a fresh in-memory database
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    /// SHA-256 hex digest of a text
    pub fn hash_text(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Get a cached translation
    pub async fn get_cached_translation(
        &self,
        source_text: &str,
        source_language: &str,
        target_language: &str,
        backend: &str,
    ) -> Result<Option<String>> {
        let source_text_hash = Self::hash_text(source_text);
        let source_language = source_language.to_string();
        let target_language = target_language.to_string();
        let backend = backend.to_string();

        self.db
            .execute_async(move |conn| {
                let translated = conn
                    .query_row(
                        r#"
                        SELECT translated_text
                        FROM translation_cache
                        WHERE source_text_hash = ?1
                          AND source_language = ?2
                          AND target_language = ?3
                          AND backend = ?4
                        "#,
                        params![source_text_hash, source_language, target_language, backend],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(translated)
            })
            .await
    }

    /// Store a translation; an existing entry for the same key is overwritten
    pub async fn cache_translation(&self, record: &CacheRecord) -> Result<()> {
        let record = record.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO translation_cache (
                        source_text_hash, source_text, source_language, target_language,
                        backend, translated_text, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(source_text_hash, source_language, target_language, backend)
                    DO UPDATE SET translated_text = excluded.translated_text,
                                  created_at = excluded.created_at
                    "#,
                    params![
                        record.source_text_hash,
                        record.source_text,
                        record.source_language,
                        record.target_language,
                        record.backend,
                        record.translated_text,
                        record.created_at,
                    ],
                )?;
                debug!("Persisted translation for hash {}", &record.source_text_hash[..12]);
                Ok(())
            })
            .await
    }

    /// Every stored entry, used to warm the in-memory cache at startup
    pub fn load_all(&self) -> Result<Vec<CacheRecord>> {
        self.db.execute(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT source_text_hash, source_text, source_language, target_language,
                       backend, translated_text, created_at
                FROM translation_cache
                "#,
            )?;
            let records = stmt
                .query_map([], |row| {
                    Ok(CacheRecord {
                        source_text_hash: row.get(0)?,
                        source_text: row.get(1)?,
                        source_language: row.get(2)?,
                        target_language: row.get(3)?,
                        backend: row.get(4)?,
                        translated_text: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    /// Get cache statistics
    pub async fn get_cache_stats(&self) -> Result<CacheStats> {
        let file_size_bytes = self.db.file_size();
        self.db
            .execute_async(move |conn| {
                let total_entries: i64 = conn
                    .query_row("SELECT COUNT(*) FROM translation_cache", [], |row| row.get(0))?;
                let backends: i64 = conn.query_row(
                    "SELECT COUNT(DISTINCT backend) FROM translation_cache",
                    [],
                    |row| row.get(0),
                )?;
                Ok(CacheStats {
                    total_entries,
                    backends,
                    file_size_bytes,
                })
            })
            .await
    }

    /// Clear the translation cache, returning the number of removed entries
    pub async fn clear_cache(&self) -> Result<i64> {
        self.db
            .execute_async(|conn| {
                let deleted = conn.execute("DELETE FROM translation_cache", [])?;
                Ok(deleted as i64)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, translated: &str) -> CacheRecord {
        CacheRecord::new(
            text.to_string(),
            "en".to_string(),
            "fr".to_string(),
            "ollama:llama2".to_string(),
            translated.to_string(),
        )
    }

    #[tokio::test]
    async fn test_cacheTranslation_shouldStoreAndRetrieve() {
        let repo = Repository::new_in_memory().unwrap();

        repo.cache_translation(&record("Hello", "Bonjour")).await.expect("Failed to cache");

        let cached = repo
            .get_cached_translation("Hello", "en", "fr", "ollama:llama2")
            .await
            .expect("Failed to get cached");
        assert_eq!(cached.as_deref(), Some("Bonjour"));

        let other_backend = repo
            .get_cached_translation("Hello", "en", "fr", "deepl")
            .await
            .unwrap();
        assert!(other_backend.is_none());
    }

    #[tokio::test]
    async fn test_cacheTranslation_sameKey_shouldKeepLastWrite() {
        let repo = Repository::new_in_memory().unwrap();

        repo.cache_translation(&record("Hello", "Bonjour")).await.unwrap();
        repo.cache_translation(&record("Hello", "Salut")).await.unwrap();

        let cached = repo
            .get_cached_translation("Hello", "en", "fr", "ollama:llama2")
            .await
            .unwrap();
        assert_eq!(cached.as_deref(), Some("Salut"));
        assert_eq!(repo.get_cache_stats().await.unwrap().total_entries, 1);
    }

    #[tokio::test]
    async fn test_loadAllAndClear_shouldRoundTrip() {
        let repo = Repository::new_in_memory().unwrap();
        repo.cache_translation(&record("a", "A")).await.unwrap();
        repo.cache_translation(&record("b", "B")).await.unwrap();

        let loaded = repo.load_all().unwrap();
        assert_eq!(loaded.len(), 2);

        assert_eq!(repo.clear_cache().await.unwrap(), 2);
        assert!(repo.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_hashText_shouldBeDeterministic() {
        let hash1 = Repository::hash_text("Hello, World!");
        let hash2 = Repository::hash_text("Hello, World!");
        let hash3 = Repository::hash_text("Different text");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }
}
