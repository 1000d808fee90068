/*!
 * Tests for bounded, ordered unit dispatch
 */

use std::sync::Arc;
use std::time::Duration;

use pdftrans::app_config::NotationConfig;
use pdftrans::document::{BoundingBox, Document, FontId, Page, RunStyle, TextRun};
use pdftrans::providers::TranslationBackend;
use pdftrans::providers::mock::MockBackend;
use pdftrans::translation::{
    CancellationFlag, DispatchOptions, Dispatcher, NotationGuard, RetryPolicy, TranslationCache,
    build_units,
};

/// One page per text, each holding a single run
fn document_with(texts: &[&str]) -> Document {
    let mut document = Document::new(bytes::Bytes::new());
    for (index, text) in texts.iter().enumerate() {
        let mut page = Page::new(index, BoundingBox::new(0.0, 0.0, 612.0, 792.0));
        page.push_run(TextRun::new(
            *text,
            BoundingBox::new(72.0, 700.0, 540.0, 712.0),
            FontId::new("F1"),
            RunStyle::new(12.0),
        ));
        document.pages.push(page);
    }
    document
}

fn dispatcher(mock: &MockBackend, thread_count: usize) -> Dispatcher {
    Dispatcher::new(
        Arc::new(mock.clone()) as Arc<dyn TranslationBackend>,
        TranslationCache::in_memory(),
        DispatchOptions {
            thread_count,
            retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
            ..DispatchOptions::default()
        },
        CancellationFlag::new(),
    )
}

#[tokio::test]
async fn test_dispatch_withRandomLatency_shouldKeepDocumentOrder() {
    let texts: Vec<String> = (0..12).map(|i| format!("Sentence number {}", i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let document = document_with(&refs);
    let guard = NotationGuard::new(&NotationConfig::default()).unwrap();
    let units = build_units(&document, &guard, 4, "en", "fr");
    let mock = MockBackend::working().with_latency(1, 15).with_capabilities(4, 8);

    let report = dispatcher(&mock, 4).dispatch(&units, None).await.unwrap();

    let translated: Vec<String> = report.results.iter().flat_map(|r| r.texts.clone()).collect();
    let expected: Vec<String> = texts.iter().map(|t| format!("[TRANSLATED] {}", t)).collect();
    assert_eq!(translated, expected);
    assert!(report.results.windows(2).all(|w| w[0].unit_id < w[1].unit_id));
}

#[tokio::test]
async fn test_dispatch_shouldNeverExceedWorkerLimit() {
    let texts: Vec<String> = (0..16).map(|i| format!("Line {}", i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let document = document_with(&refs);
    let guard = NotationGuard::new(&NotationConfig::default()).unwrap();
    let units = build_units(&document, &guard, 1, "en", "fr");
    let mock = MockBackend::working().with_latency(2, 8).with_capabilities(1, 3);

    let dispatcher = dispatcher(&mock, 8);
    assert_eq!(dispatcher.pool_size(), 3);
    dispatcher.dispatch(&units, None).await.unwrap();

    assert!(mock.peak_in_flight() <= 3, "peak {}", mock.peak_in_flight());
    assert_eq!(mock.call_count(), 16);
}

#[tokio::test]
async fn test_dispatch_withBatchLimit_shouldSplitUnitsPerPage() {
    let document = document_with(&["One", "Two", "Three"]);
    let guard = NotationGuard::new(&NotationConfig::default()).unwrap();
    let units = build_units(&document, &guard, 8, "en", "fr");

    // Units never span pages
    assert_eq!(units.len(), 3);
    assert!(units.iter().all(|u| u.len() == 1));
    assert_eq!(units[2].page, 2);
}
