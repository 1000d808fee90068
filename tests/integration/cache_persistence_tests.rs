/*!
 * Integration tests for the SQLite-backed translation cache
 */

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;

use pdftrans::app_config::{CacheConfig, NotationConfig};
use pdftrans::layout::OutputFont;
use pdftrans::pdf::LopdfPrimitive;
use pdftrans::providers::TranslationBackend;
use pdftrans::providers::mock::MockBackend;
use pdftrans::translation::{
    CacheKey, CancellationFlag, DocumentPipeline, NotationGuard, PipelineOptions, TranslationCache,
};

use crate::common;

fn cache_config(dir: &std::path::Path) -> CacheConfig {
    CacheConfig {
        enabled: true,
        path: Some(dir.join("cache.db")),
    }
}

async fn translate_paper(backend: MockBackend, cache: TranslationCache) -> Result<usize> {
    let pipeline = DocumentPipeline::new(
        Arc::new(LopdfPrimitive::new()),
        Arc::new(backend) as Arc<dyn TranslationBackend>,
        cache,
        Arc::new(NotationGuard::new(&NotationConfig::default())?),
        OutputFont::Helvetica,
    );
    let output = pipeline
        .run(
            Bytes::from(common::paper_pdf()),
            &PipelineOptions::new("en", "fr"),
            &CancellationFlag::new(),
            None,
        )
        .await?;
    Ok(output.stats.backend_calls)
}

#[tokio::test]
async fn test_cache_reopened_shouldServeEarlierTranslations() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let config = cache_config(dir.path());

    let (cache, error) = TranslationCache::open(&config);
    assert!(error.is_none());
    assert!(cache.is_persistent());
    assert!(translate_paper(MockBackend::working(), cache).await? > 0);

    let (reopened, error) = TranslationCache::open(&config);
    assert!(error.is_none());
    assert_eq!(reopened.len(), 2);
    let mock = MockBackend::working();
    assert_eq!(translate_paper(mock.clone(), reopened).await?, 0);
    assert_eq!(mock.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cache_keys_shouldSeparateBackendsAndLanguages() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let (cache, _) = TranslationCache::open(&cache_config(dir.path()));

    cache
        .put(CacheKey::new("Hello", "en", "fr", "mock"), "Bonjour")
        .await?;

    assert_eq!(cache.get(&CacheKey::new("Hello", "en", "fr", "mock")), Some("Bonjour".to_string()));
    assert_eq!(cache.get(&CacheKey::new("Hello", "en", "de", "mock")), None);
    assert_eq!(cache.get(&CacheKey::new("Hello", "en", "fr", "deepl")), None);
    Ok(())
}

#[tokio::test]
async fn test_cache_clear_shouldEmptyStore() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let config = cache_config(dir.path());
    let (cache, _) = TranslationCache::open(&config);
    translate_paper(MockBackend::working(), cache.clone()).await?;

    let removed = cache.clear().await?;
    assert_eq!(removed, 2);
    assert!(cache.is_empty());

    let (reopened, _) = TranslationCache::open(&config);
    assert!(reopened.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cache_withUnwritableLocation_shouldFallBackToMemory() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let blocker = common::create_test_file(dir.path(), "not-a-dir", b"file")?;
    let config = CacheConfig {
        enabled: true,
        path: Some(blocker.join("cache.db")),
    };

    let (cache, error) = TranslationCache::open(&config);

    assert!(error.is_some());
    assert!(!cache.is_persistent());
    assert!(translate_paper(MockBackend::working(), cache).await? > 0);
    Ok(())
}

#[test]
fn test_put_withoutStore_shouldStayInMemory() {
    let cache = TranslationCache::in_memory();
    let key = CacheKey::new("Energy", "en", "fr", "mock");

    let result = tokio_test::block_on(async { cache.put(key.clone(), "Énergie").await });

    assert!(result.is_ok());
    assert_eq!(cache.get(&key).as_deref(), Some("Énergie"));
    assert!(!cache.is_persistent());
}
