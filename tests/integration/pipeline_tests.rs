/*!
 * End-to-end tests of the document pipeline on generated PDFs
 */

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use pdftrans::app_config::NotationConfig;
use pdftrans::document::{FootnoteMode, PageFilter};
use pdftrans::errors::{BackendError, PipelineError, WarningKind};
use pdftrans::layout::OutputFont;
use pdftrans::pdf::LopdfPrimitive;
use pdftrans::providers::TranslationBackend;
use pdftrans::providers::mock::MockBackend;
use pdftrans::translation::{
    CancellationFlag, DocumentPipeline, NotationGuard, PipelineOptions, ProgressFn, RetryPolicy,
    TranslationCache,
};

use crate::common::{self, body, formula};

fn pipeline(backend: MockBackend, cache: TranslationCache) -> DocumentPipeline {
    common::init_test_logging();
    let guard = NotationGuard::new(&NotationConfig::default()).unwrap();
    DocumentPipeline::new(
        Arc::new(LopdfPrimitive::new()),
        Arc::new(backend) as Arc<dyn TranslationBackend>,
        cache,
        Arc::new(guard),
        OutputFont::Helvetica,
    )
}

fn options() -> PipelineOptions {
    PipelineOptions::new("en", "zh")
        .with_thread_count(2)
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)))
}

#[tokio::test]
async fn test_run_withFormulas_shouldTranslateTextAndKeepNotation() {
    let mock = MockBackend::working();
    let pipeline = pipeline(mock.clone(), TranslationCache::in_memory());

    let output = pipeline
        .run(Bytes::from(common::paper_pdf()), &options(), &CancellationFlag::new(), None)
        .await
        .unwrap();

    let mono = common::page_texts(&output.mono);
    assert_eq!(mono.len(), 2);
    assert!(mono[0].contains("[TRANSLATED]"), "page 1: {}", mono[0]);
    assert!(mono[0].contains("E=mc"), "page 1: {}", mono[0]);
    assert!(mono[1].contains("[TRANSLATED]"), "page 2: {}", mono[1]);
    assert!(mono[1].contains("p=mv"), "page 2: {}", mono[1]);

    let dual = common::page_texts(&output.dual);
    assert_eq!(dual.len(), 4);
    assert!(!dual[0].contains("[TRANSLATED]"));
    assert!(dual[1].contains("[TRANSLATED]"));
    assert!(!dual[2].contains("[TRANSLATED]"));
    assert!(dual[3].contains("[TRANSLATED]"));

    let mut sent: Vec<String> = mock.requests().into_iter().flatten().collect();
    sent.sort();
    assert_eq!(sent, vec!["Momentum is conserved", "The energy of a body"]);
    assert_eq!(output.stats.pages, 2);
    assert_eq!(output.stats.translated_pages, 2);
    assert_eq!(output.stats.notation_runs, 2);
    assert_eq!(output.stats.units, 2);
}

#[tokio::test]
async fn test_run_withMarkdown_shouldExportTranslatedText() {
    let pipeline = pipeline(MockBackend::working(), TranslationCache::in_memory());
    let source = Bytes::from(common::paper_pdf());

    let plain = pipeline
        .run(source.clone(), &options(), &CancellationFlag::new(), None)
        .await
        .unwrap();
    assert!(plain.markdown.is_none());

    let output = pipeline
        .run(source, &options().with_markdown(FootnoteMode::Append), &CancellationFlag::new(), None)
        .await
        .unwrap();
    let markdown = output.markdown.unwrap();
    let energy = markdown.find("The energy of a body").unwrap();
    let momentum = markdown.find("Momentum is conserved").unwrap();
    assert!(energy < momentum, "{}", markdown);
    assert_eq!(markdown.matches("[TRANSLATED]").count(), 2, "{}", markdown);
    assert!(markdown.contains("E=mc"), "{}", markdown);
    assert!(markdown.contains("p=mv"), "{}", markdown);
}

#[tokio::test]
async fn test_run_withPageFilter_shouldPassOtherPagesThrough() {
    let source = common::paper_pdf();
    let original = common::page_texts(&source);
    let pipeline = pipeline(MockBackend::working(), TranslationCache::in_memory());
    let options = options().with_pages(PageFilter::parse("2").unwrap());

    let output = pipeline
        .run(Bytes::from(source), &options, &CancellationFlag::new(), None)
        .await
        .unwrap();

    let mono = common::page_texts(&output.mono);
    assert_eq!(mono[0], original[0]);
    assert!(mono[1].contains("[TRANSLATED]"));

    // Every page is paired in the dual output, translated or not
    let dual = common::page_texts(&output.dual);
    assert_eq!(dual.len(), 4);
    assert_eq!(dual[0], original[0]);
    assert_eq!(dual[1], original[0]);
    assert_eq!(dual[2], original[1]);
    assert!(dual[3].contains("[TRANSLATED]"));
    assert_eq!(output.stats.translated_pages, 1);
}

#[tokio::test]
async fn test_run_twice_shouldServeSecondRunFromCache() {
    let mock = MockBackend::working();
    let cache = TranslationCache::in_memory();
    let pipeline = pipeline(mock.clone(), cache.clone());
    let source = Bytes::from(common::paper_pdf());

    let first = pipeline
        .run(source.clone(), &options(), &CancellationFlag::new(), None)
        .await
        .unwrap();
    let calls_after_first = mock.call_count();
    let second = pipeline
        .run(source, &options(), &CancellationFlag::new(), None)
        .await
        .unwrap();

    assert!(first.stats.backend_calls > 0);
    assert_eq!(second.stats.backend_calls, 0);
    assert_eq!(second.stats.cache_hits, 2);
    assert_eq!(mock.call_count(), calls_after_first);
    assert_eq!(common::page_texts(&first.mono), common::page_texts(&second.mono));
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_run_withIgnoreCache_shouldCallBackendAgain() {
    let mock = MockBackend::working();
    let pipeline = pipeline(mock.clone(), TranslationCache::in_memory());
    let source = Bytes::from(common::paper_pdf());

    pipeline
        .run(source.clone(), &options(), &CancellationFlag::new(), None)
        .await
        .unwrap();
    let second = pipeline
        .run(source, &options().with_ignore_cache(true), &CancellationFlag::new(), None)
        .await
        .unwrap();

    assert_eq!(second.stats.cache_hits, 0);
    assert!(second.stats.backend_calls > 0);
}

#[tokio::test]
async fn test_run_withCancelledFlag_shouldStopBeforeExtraction() {
    let mock = MockBackend::working();
    let pipeline = pipeline(mock.clone(), TranslationCache::in_memory());
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let result = pipeline
        .run(Bytes::from(common::paper_pdf()), &options(), &cancel, None)
        .await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_run_withAuthenticationFailure_shouldFailRun() {
    let mock = MockBackend::failing(BackendError::AuthenticationFailed("bad key".to_string()));
    let pipeline = pipeline(mock, TranslationCache::in_memory());

    let result = pipeline
        .run(Bytes::from(common::paper_pdf()), &options(), &CancellationFlag::new(), None)
        .await;

    match result {
        Err(PipelineError::Backend(BackendError::AuthenticationFailed(message))) => {
            assert_eq!(message, "bad key")
        }
        other => panic!("expected an authentication failure, got {:?}", other.map(|o| o.stats)),
    }
}

#[tokio::test]
async fn test_run_withTransientFailures_shouldRetryAndSucceed() {
    let mock = MockBackend::working().with_capabilities(8, 1).with_failures(vec![
        BackendError::Unreachable("connection reset".to_string()),
        BackendError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_millis(2)),
        },
    ]);
    let pipeline = pipeline(mock.clone(), TranslationCache::in_memory());

    let output = pipeline
        .run(Bytes::from(common::paper_pdf()), &options(), &CancellationFlag::new(), None)
        .await
        .unwrap();

    assert!(
        output.warnings.iter().all(|w| w.kind == WarningKind::LayoutOverflow),
        "{:?}",
        output.warnings
    );
    assert_eq!(output.stats.backend_calls, 4);
    assert!(common::page_texts(&output.mono)[0].contains("[TRANSLATED]"));
}

#[tokio::test]
async fn test_run_withDroppedPlaceholder_shouldKeepOriginalText() {
    let source = common::sample_pdf(&[vec![body("Let $x$ be real", 700)]]);
    let original = common::page_texts(&source);
    let mock = MockBackend::working().with_transform(|text| text.replace("{v0}", ""));
    let pipeline = pipeline(mock, TranslationCache::in_memory());

    let output = pipeline
        .run(Bytes::from(source), &options(), &CancellationFlag::new(), None)
        .await
        .unwrap();

    assert_eq!(output.warnings.len(), 1);
    assert_eq!(output.warnings[0].kind, WarningKind::RestorationFailure);
    assert_eq!(output.warnings[0].page, Some(0));
    assert_eq!(common::page_texts(&output.mono), original);
    assert_eq!(output.stats.translated_pages, 0);
}

#[tokio::test]
async fn test_run_withFallbackPage_shouldStillPairDualPages() {
    let source = common::sample_pdf(&[
        vec![body("Let $x$ be real", 700)],
        vec![body("Momentum is conserved", 700)],
    ]);
    let original = common::page_texts(&source);
    let mock = MockBackend::working().with_transform(|text| text.replace("{v0}", ""));
    let pipeline = pipeline(mock, TranslationCache::in_memory());

    let output = pipeline
        .run(Bytes::from(source), &options(), &CancellationFlag::new(), None)
        .await
        .unwrap();

    let dual = common::page_texts(&output.dual);
    assert_eq!(dual.len(), 4);
    assert_eq!(dual[0], original[0]);
    assert_eq!(dual[1], original[0]);
    assert_eq!(dual[2], original[1]);
    assert!(dual[3].contains("[TRANSLATED]"));
}

#[tokio::test]
async fn test_run_withInlineMath_shouldRestoreSpansVerbatim() {
    let source = common::sample_pdf(&[vec![body("Let $x$ be real", 700), formula("x>0", 650)]]);
    let mock = MockBackend::working();
    let pipeline = pipeline(mock.clone(), TranslationCache::in_memory());

    let output = pipeline
        .run(Bytes::from(source), &options(), &CancellationFlag::new(), None)
        .await
        .unwrap();

    assert_eq!(mock.requests(), vec![vec!["Let {v0} be real".to_string()]]);
    let mono = common::page_texts(&output.mono);
    assert!(mono[0].contains("$x$"), "{}", mono[0]);
    assert!(mono[0].contains("x>0"), "{}", mono[0]);
}

#[tokio::test]
async fn test_run_withProgress_shouldReportEveryUnit() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let progress: ProgressFn = Arc::new(move |completed, total| recorder.lock().push((completed, total)));
    let pipeline = pipeline(MockBackend::working().with_latency(1, 5), TranslationCache::in_memory());

    pipeline
        .run(Bytes::from(common::paper_pdf()), &options(), &CancellationFlag::new(), Some(progress))
        .await
        .unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|(_, total)| *total == 2));
    assert!(seen.contains(&(2, 2)));
}

#[tokio::test]
async fn test_run_withGarbageInput_shouldFailExtraction() {
    let pipeline = pipeline(MockBackend::working(), TranslationCache::in_memory());

    let result = pipeline
        .run(Bytes::from_static(b"not a pdf"), &options(), &CancellationFlag::new(), None)
        .await;

    assert!(matches!(result, Err(PipelineError::Extraction(_))));
}
