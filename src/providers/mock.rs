/*!
 * Mock backend for testing.
 *
 * `MockBackend` echoes its input behind a prefix and can be scripted to:
 * - fail the next calls with given errors (`with_failures`)
 * - rewrite the echoed text (`with_transform`), e.g. to drop placeholders
 * - sleep a random time per call (`with_latency`)
 * - refuse language pairs (`with_unsupported_pair`)
 *
 * It records every call so tests can assert on call counts, submitted batches
 * and the highest number of concurrent calls observed.
 */

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

use crate::errors::BackendError;

use super::{BackendCapabilities, BackendOptions, PairSupport, TranslationBackend};

/// Text rewrite applied by a scripted mock
pub type MockTransform = fn(&str) -> String;

/// Mock translation backend
#[derive(Debug, Clone)]
pub struct MockBackend {
    /// Prefix put in front of every echoed segment
    prefix: String,
    /// Declared limits
    capabilities: BackendCapabilities,
    /// Errors returned by the next calls, in order
    failures: Arc<Mutex<VecDeque<BackendError>>>,
    /// Optional rewrite of each segment
    transform: Option<MockTransform>,
    /// Random latency range in milliseconds
    latency_ms: Option<(u64, u64)>,
    /// Pairs reported as unsupported
    unsupported_pairs: Vec<(String, String)>,
    /// Number of `translate` calls
    calls: Arc<AtomicUsize>,
    /// Calls currently running
    in_flight: Arc<AtomicUsize>,
    /// Highest value `in_flight` reached
    peak_in_flight: Arc<AtomicUsize>,
    /// Batches received, in call order
    requests: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockBackend {
    /// Create an echoing mock with the given prefix
    pub fn echo(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            capabilities: BackendCapabilities::new(8, 8),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            transform: None,
            latency_ms: None,
            unsupported_pairs: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mock that prefixes each segment with `[TRANSLATED] `
    pub fn working() -> Self {
        Self::echo("[TRANSLATED] ")
    }

    /// Mock whose every call fails with the given error
    pub fn failing(error: BackendError) -> Self {
        let mock = Self::working();
        mock.failures.lock().extend(std::iter::repeat_n(error, 1024));
        mock
    }

    /// Set the declared limits
    pub fn with_capabilities(mut self, max_batch_size: usize, max_in_flight: usize) -> Self {
        self.capabilities = BackendCapabilities::new(max_batch_size, max_in_flight);
        self
    }

    /// Fail the next calls with these errors, then behave normally
    pub fn with_failures(self, failures: Vec<BackendError>) -> Self {
        self.failures.lock().extend(failures);
        self
    }

    /// Rewrite each segment after prefixing
    pub fn with_transform(mut self, transform: MockTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Sleep a random time between `min_ms` and `max_ms` on every call
    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_ms = Some((min_ms.min(max_ms), max_ms.max(min_ms)));
        self
    }

    /// Report a language pair as unsupported
    pub fn with_unsupported_pair(mut self, source: &str, target: &str) -> Self {
        self.unsupported_pairs
            .push((source.to_string(), target.to_string()));
        self
    }

    /// Number of `translate` calls so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Batches received so far
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().clone()
    }

    fn render(&self, text: &str) -> String {
        let echoed = format!("{}{}", self.prefix, text);
        match self.transform {
            Some(transform) => transform(&echoed),
            None => echoed,
        }
    }

    fn random_delay(&self) -> Option<Duration> {
        let (min, max) = self.latency_ms?;
        let millis = rand::rng().random_range(min..=max);
        Some(Duration::from_millis(millis))
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn supports_pair(&self, source_language: &str, target_language: &str) -> PairSupport {
        let refused = self
            .unsupported_pairs
            .iter()
            .any(|(s, t)| s == source_language && t == target_language);
        if refused {
            PairSupport::Unsupported
        } else {
            PairSupport::Unknown
        }
    }

    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
        _options: &BackendOptions,
    ) -> Result<Vec<String>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(texts.to_vec());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(self.in_flight.clone());

        if let Some(delay) = self.random_delay() {
            tokio::time::sleep(delay).await;
        }

        if self.supports_pair(source_language, target_language) == PairSupport::Unsupported {
            return Err(BackendError::UnsupportedLanguagePair {
                source_language: source_language.to_string(),
                target_language: target_language.to_string(),
            });
        }

        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        Ok(texts.iter().map(|text| self.render(text)).collect())
    }
}
