/*!
 * Translation dispatch.
 *
 * Units are resolved against the cache and misses are sent to the backend
 * through a bounded pool (`buffer_unordered`). Results are collected with
 * their unit id and sorted back into document order, so completion order
 * never matters. Retryable failures back off exponentially; job-fatal
 * failures stop further submissions and fail the dispatch once in-flight
 * calls have drained. Cancellation works the same way without the error.
 *
 * Within one dispatch each distinct cache key is requested once: the first
 * unit to need it owns the request and publishes the raw answer, units that
 * need the same text meanwhile wait for it instead of calling the backend.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::errors::{BackendError, PipelineError, PipelineWarning, WarningKind};
use crate::providers::{BackendOptions, TranslationBackend, cache_identity};

use super::cache::{CacheKey, TranslationCache};
use super::concurrency::effective_workers;
use super::notation::restore_placeholders;
use super::retry::RetryPolicy;
use super::units::TranslationUnit;

/// Cooperative cancellation signal shared between a job and its workers
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for one dispatch
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Configured worker count, capped by the backend's in-flight limit
    pub thread_count: usize,
    pub retry: RetryPolicy,
    /// Skip cache lookups; successful results are still stored
    pub ignore_cache: bool,
    pub backend_options: BackendOptions,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            thread_count: 4,
            retry: RetryPolicy::default(),
            ignore_cache: false,
            backend_options: BackendOptions::default(),
        }
    }
}

/// Final text for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitResult {
    pub unit_id: usize,
    /// One restored translation per segment, or the originals on fallback
    pub texts: Vec<String>,
    /// The unit kept its original text
    pub fallback: bool,
}

/// Outcome of a complete dispatch
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Results in unit order
    pub results: Vec<UnitResult>,
    pub warnings: Vec<PipelineWarning>,
    /// Segments served from the cache
    pub cache_hits: usize,
    /// Backend calls made, retries included
    pub backend_calls: usize,
}

/// Progress callback: (units completed, units total)
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Raw translation shared through `InFlight`: `None` while pending,
/// `Some(None)` when the owning unit gave up
type Shared = Option<Option<String>>;

enum Claim {
    Owner(watch::Sender<Shared>),
    Follower(watch::Receiver<Shared>),
}

/// Backend requests made during one dispatch, by cache key
#[derive(Default)]
struct InFlight {
    requests: Mutex<HashMap<CacheKey, watch::Receiver<Shared>>>,
}

impl InFlight {
    fn claim(&self, key: &CacheKey) -> Claim {
        let mut requests = self.requests.lock();
        if let Some(receiver) = requests.get(key) {
            return Claim::Follower(receiver.clone());
        }
        let (sender, receiver) = watch::channel(None);
        requests.insert(key.clone(), receiver);
        Claim::Owner(sender)
    }
}

enum UnitOutcome {
    Done(UnitResult),
    /// Not started, or stopped between retries, because of a stop signal
    Stopped,
    Fatal(BackendError),
}

/// Drives units through cache and backend
pub struct Dispatcher {
    backend: Arc<dyn TranslationBackend>,
    cache: TranslationCache,
    options: DispatchOptions,
    cancel: CancellationFlag,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        cache: TranslationCache,
        options: DispatchOptions,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            backend,
            cache,
            options,
            cancel,
        }
    }

    /// Worker pool size for this backend
    pub fn pool_size(&self) -> usize {
        effective_workers(self.options.thread_count, self.backend.capabilities())
    }

    /// Translate every unit
    pub async fn dispatch(
        &self,
        units: &[TranslationUnit],
        progress: Option<ProgressFn>,
    ) -> Result<DispatchReport, PipelineError> {
        let total = units.len();
        let pool_size = self.pool_size();
        let identity = cache_identity(self.backend.as_ref(), &self.options.backend_options);
        let halted = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicUsize::new(0));
        let cache_hits = Arc::new(AtomicUsize::new(0));
        let backend_calls = Arc::new(AtomicUsize::new(0));
        let warnings = Arc::new(Mutex::new(Vec::new()));

        debug!(
            "Dispatching {} units to '{}' with {} workers",
            total, identity, pool_size
        );

        let in_flight = InFlight::default();
        let outcomes = stream::iter(0..units.len())
            .map(|index| {
                let unit = &units[index];
                let in_flight = &in_flight;
                let halted = halted.clone();
                let completed = completed.clone();
                let cache_hits = cache_hits.clone();
                let backend_calls = backend_calls.clone();
                let warnings = warnings.clone();
                let progress = progress.clone();
                let identity = identity.as_str();

                async move {
                    if self.should_stop(&halted) {
                        return (unit.id, UnitOutcome::Stopped);
                    }

                    let outcome = self
                        .translate_unit(unit, identity, in_flight, &halted, &cache_hits, &backend_calls, &warnings)
                        .await;

                    match &outcome {
                        UnitOutcome::Fatal(error) => {
                            warn!("Unit {} hit a job-fatal error: {}", unit.id, error);
                            halted.store(true, Ordering::SeqCst);
                        }
                        UnitOutcome::Done(_) => {
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            if let Some(progress) = &progress {
                                progress(done, total);
                            }
                        }
                        UnitOutcome::Stopped => {}
                    }
                    (unit.id, outcome)
                }
            })
            .buffer_unordered(pool_size)
            .collect::<Vec<_>>()
            .await;

        let mut sorted = outcomes;
        sorted.sort_by_key(|(id, _)| *id);

        let mut results = Vec::with_capacity(sorted.len());
        let mut fatal = None;
        for (_, outcome) in sorted {
            match outcome {
                UnitOutcome::Done(result) => results.push(result),
                UnitOutcome::Fatal(error) => {
                    fatal.get_or_insert(error);
                }
                UnitOutcome::Stopped => {}
            }
        }

        if let Some(error) = fatal {
            return Err(PipelineError::Backend(error));
        }
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let warnings = std::mem::take(&mut *warnings.lock());
        Ok(DispatchReport {
            results,
            warnings,
            cache_hits: cache_hits.load(Ordering::SeqCst),
            backend_calls: backend_calls.load(Ordering::SeqCst),
        })
    }

    fn should_stop(&self, halted: &AtomicBool) -> bool {
        self.cancel.is_cancelled() || halted.load(Ordering::SeqCst)
    }

    #[allow(clippy::too_many_arguments)]
    async fn translate_unit(
        &self,
        unit: &TranslationUnit,
        identity: &str,
        in_flight: &InFlight,
        halted: &AtomicBool,
        cache_hits: &AtomicUsize,
        backend_calls: &AtomicUsize,
        warnings: &Mutex<Vec<PipelineWarning>>,
    ) -> UnitOutcome {
        let keys: Vec<CacheKey> = unit
            .segments
            .iter()
            .map(|s| CacheKey::new(&s.text, &unit.source_language, &unit.target_language, identity))
            .collect();

        // Raw (still guarded) translations per segment
        let mut raw: Vec<Option<String>> = if self.options.ignore_cache {
            vec![None; keys.len()]
        } else {
            keys.iter().map(|k| self.cache.get(k)).collect()
        };
        let misses: Vec<usize> = (0..raw.len()).filter(|i| raw[*i].is_none()).collect();
        cache_hits.fetch_add(raw.len() - misses.len(), Ordering::SeqCst);

        // Distinct keys among the misses, with the text to send for each
        let mut distinct: Vec<(CacheKey, String)> = Vec::new();
        for i in &misses {
            if !distinct.iter().any(|(key, _)| *key == keys[*i]) {
                distinct.push((keys[*i].clone(), unit.segments[*i].text.clone()));
            }
        }

        let mut owned = Vec::new();
        let mut followed = Vec::new();
        for (key, text) in distinct {
            match in_flight.claim(&key) {
                Claim::Owner(sender) => owned.push((key, text, sender)),
                Claim::Follower(receiver) => followed.push((key, text, receiver)),
            }
        }

        // Translations this unit fetched itself; only these are stored
        let mut fetched: HashMap<CacheKey, String> = HashMap::new();
        let mut shared: HashMap<CacheKey, String> = HashMap::new();

        if !owned.is_empty() {
            let texts: Vec<String> = owned.iter().map(|(_, text, _)| text.clone()).collect();
            let outcome = self.call_with_retry(unit, &texts, backend_calls).await;
            match self.settle(unit, outcome, halted, warnings) {
                Ok(translated) => {
                    for ((key, _, sender), text) in owned.into_iter().zip(translated) {
                        sender.send_replace(Some(Some(text.clone())));
                        fetched.insert(key, text);
                    }
                }
                Err(outcome) => {
                    for (_, _, sender) in &owned {
                        sender.send_replace(Some(None));
                    }
                    return outcome;
                }
            }
        }

        let mut unresolved = Vec::new();
        for (key, text, mut receiver) in followed {
            let answer = receiver
                .wait_for(|value| value.is_some())
                .await
                .ok()
                .and_then(|value| (*value).clone())
                .flatten();
            match answer {
                Some(translated) => {
                    shared.insert(key, translated);
                }
                None => unresolved.push((key, text)),
            }
        }

        // The owner gave up; try once more on our own
        if !unresolved.is_empty() {
            if self.should_stop(halted) {
                return UnitOutcome::Stopped;
            }
            let texts: Vec<String> = unresolved.iter().map(|(_, text)| text.clone()).collect();
            let outcome = self.call_with_retry(unit, &texts, backend_calls).await;
            match self.settle(unit, outcome, halted, warnings) {
                Ok(translated) => {
                    for ((key, _), text) in unresolved.into_iter().zip(translated) {
                        fetched.insert(key, text);
                    }
                }
                Err(outcome) => return outcome,
            }
        }

        for i in &misses {
            raw[*i] = fetched.get(&keys[*i]).or_else(|| shared.get(&keys[*i])).cloned();
        }

        let mut restored = Vec::with_capacity(raw.len());
        for (index, (translated, segment)) in raw.iter().zip(&unit.segments).enumerate() {
            let translated = translated.as_deref().unwrap_or_default();
            match restore_placeholders(translated, &segment.spans) {
                Ok(text) => restored.push(text),
                Err(e) => {
                    let run = unit.run_indices[index];
                    let warning = PipelineWarning::new(
                        WarningKind::RestorationFailure,
                        format!("unit {} kept its original text: {}", unit.id, e),
                    )
                    .on_run(unit.page, run);
                    warn!("{}", warning);
                    warnings.lock().push(warning);
                    return UnitOutcome::Done(self.fallback(unit));
                }
            }
        }

        // Only fresh, restorable results reach the cache
        for (key, translated) in fetched {
            if let Err(e) = self.cache.put(key, &translated).await {
                let warning = PipelineWarning::new(WarningKind::CacheUnavailable, e.to_string())
                    .on_page(unit.page);
                debug!("{}", warning);
                warnings.lock().push(warning);
            }
        }

        UnitOutcome::Done(UnitResult {
            unit_id: unit.id,
            texts: restored,
            fallback: false,
        })
    }

    async fn call_with_retry(
        &self,
        unit: &TranslationUnit,
        texts: &[String],
        backend_calls: &AtomicUsize,
    ) -> CallOutcome {
        let mut attempt = 0u32;
        loop {
            backend_calls.fetch_add(1, Ordering::SeqCst);
            let result = self
                .backend
                .translate(
                    texts,
                    &unit.source_language,
                    &unit.target_language,
                    &self.options.backend_options,
                )
                .await;

            let error = match result {
                Ok(translated) if translated.len() == texts.len() => {
                    return CallOutcome::Translated(translated);
                }
                Ok(translated) => BackendError::InvalidResponse(format!(
                    "{} translations for {} segments",
                    translated.len(),
                    texts.len()
                )),
                Err(e) => e,
            };

            if error.is_job_fatal() {
                return CallOutcome::Fatal(error);
            }

            if !self.options.retry.should_retry(attempt, &error) {
                let kind = if error.is_retryable() {
                    WarningKind::RetriesExhausted
                } else {
                    WarningKind::InvalidResponse
                };
                return CallOutcome::Fallback(
                    PipelineWarning::new(
                        kind,
                        format!("unit {} kept its original text after {} attempt(s): {}", unit.id, attempt + 1, error),
                    )
                    .on_run(unit.page, unit.run_indices[0]),
                );
            }

            let delay = self.options.retry.delay_for(attempt, &error);
            debug!(
                "Unit {} attempt {} failed ({}), retrying in {:?}",
                unit.id,
                attempt + 1,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;

            if self.cancel.is_cancelled() {
                return CallOutcome::Stopped;
            }
        }
    }

    /// Translations from a backend call, or how the unit ends instead
    fn settle(
        &self,
        unit: &TranslationUnit,
        outcome: CallOutcome,
        halted: &AtomicBool,
        warnings: &Mutex<Vec<PipelineWarning>>,
    ) -> Result<Vec<String>, UnitOutcome> {
        match outcome {
            CallOutcome::Translated(translated) => Ok(translated),
            CallOutcome::Fallback(warning) => {
                warn!("{}", warning);
                warnings.lock().push(warning);
                Err(UnitOutcome::Done(self.fallback(unit)))
            }
            CallOutcome::Stopped => Err(UnitOutcome::Stopped),
            CallOutcome::Fatal(error) => {
                // Set before waiting units wake up, so they do not retry
                halted.store(true, Ordering::SeqCst);
                Err(UnitOutcome::Fatal(error))
            }
        }
    }

    fn fallback(&self, unit: &TranslationUnit) -> UnitResult {
        UnitResult {
            unit_id: unit.id,
            texts: unit.originals.clone(),
            fallback: true,
        }
    }
}

enum CallOutcome {
    Translated(Vec<String>),
    Fallback(PipelineWarning),
    Stopped,
    Fatal(BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockBackend;
    use crate::translation::notation::GuardedText;
    use std::time::Duration;

    fn unit(id: usize, texts: &[&str]) -> TranslationUnit {
        TranslationUnit {
            id,
            page: 0,
            run_indices: (0..texts.len()).collect(),
            segments: texts.iter().map(|t| GuardedText::plain(*t)).collect(),
            originals: texts.iter().map(|t| t.to_string()).collect(),
            source_language: "en".into(),
            target_language: "zh".into(),
        }
    }

    fn fast_options() -> DispatchOptions {
        DispatchOptions {
            thread_count: 2,
            retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
            ..DispatchOptions::default()
        }
    }

    fn dispatcher(mock: MockBackend) -> Dispatcher {
        Dispatcher::new(
            Arc::new(mock),
            TranslationCache::in_memory(),
            fast_options(),
            CancellationFlag::new(),
        )
    }

    #[tokio::test]
    async fn test_dispatch_shouldTranslateInUnitOrder() {
        let mock = MockBackend::working().with_latency(0, 10);
        let d = dispatcher(mock);
        let units: Vec<_> = (0..8).map(|i| unit(i, &[&format!("t{}", i)])).collect();

        let report = d.dispatch(&units, None).await.unwrap();
        let texts: Vec<String> = report.results.iter().map(|r| r.texts[0].clone()).collect();
        let expected: Vec<String> = (0..8).map(|i| format!("[TRANSLATED] t{}", i)).collect();
        assert_eq!(texts, expected);
    }

    #[tokio::test]
    async fn test_dispatch_withRateLimits_shouldRetryThenSucceed() {
        let limited = BackendError::RateLimited {
            message: "slow".into(),
            retry_after: None,
        };
        let mock = MockBackend::working().with_failures(vec![limited.clone(), limited]);
        let d = dispatcher(mock.clone());

        let report = d.dispatch(&[unit(0, &["Hello"])], None).await.unwrap();
        assert_eq!(report.results[0].texts, vec!["[TRANSLATED] Hello"]);
        assert!(!report.results[0].fallback);
        assert_eq!(mock.call_count(), 3);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_withAuthFailure_shouldFailJob() {
        let mock = MockBackend::failing(BackendError::AuthenticationFailed("bad key".into()));
        let d = dispatcher(mock);
        let result = d.dispatch(&[unit(0, &["a"]), unit(1, &["b"])], None).await;
        assert!(matches!(
            result,
            Err(PipelineError::Backend(BackendError::AuthenticationFailed(_)))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_withExhaustedRetries_shouldFallBackWithWarning() {
        let mock = MockBackend::failing(BackendError::Unreachable("down".into()));
        let d = dispatcher(mock.clone());
        let report = d.dispatch(&[unit(0, &["Hello"])], None).await.unwrap();
        assert!(report.results[0].fallback);
        assert_eq!(report.results[0].texts, vec!["Hello"]);
        assert_eq!(report.warnings[0].kind, WarningKind::RetriesExhausted);
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_dispatch_sameTextTwice_shouldCallBackendOnce() {
        let mock = MockBackend::working();
        let d = dispatcher(mock.clone());
        d.dispatch(&[unit(0, &["Hello"])], None).await.unwrap();
        let report = d.dispatch(&[unit(0, &["Hello"])], None).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.results[0].texts, vec!["[TRANSLATED] Hello"]);
    }

    #[tokio::test]
    async fn test_dispatch_sameTextInParallel_shouldCallBackendOnce() {
        let mock = MockBackend::working().with_latency(20, 30);
        let cache = TranslationCache::in_memory();
        let d = Dispatcher::new(Arc::new(mock.clone()), cache.clone(), fast_options(), CancellationFlag::new());
        let mut header = unit(1, &["Journal of Physics"]);
        header.page = 1;

        let report = d
            .dispatch(&[unit(0, &["Journal of Physics"]), header], None)
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 1);
        assert_eq!(report.backend_calls, 1);
        for result in &report.results {
            assert_eq!(result.texts, vec!["[TRANSLATED] Journal of Physics"]);
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_repeatedSegmentsInUnit_shouldSendEachOnce() {
        let mock = MockBackend::working();
        let d = dispatcher(mock.clone());

        let report = d.dispatch(&[unit(0, &["Header", "Body", "Header"])], None).await.unwrap();

        assert_eq!(mock.requests(), vec![vec!["Header".to_string(), "Body".to_string()]]);
        assert_eq!(
            report.results[0].texts,
            vec!["[TRANSLATED] Header", "[TRANSLATED] Body", "[TRANSLATED] Header"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_whenSharedRequestFails_shouldFallBackEverywhere() {
        let mock = MockBackend::failing(BackendError::Unreachable("down".into())).with_latency(10, 20);
        let d = dispatcher(mock.clone());

        let report = d.dispatch(&[unit(0, &["Same"]), unit(1, &["Same"])], None).await.unwrap();

        assert!(report.results.iter().all(|r| r.fallback));
        assert_eq!(report.results[1].texts, vec!["Same"]);
    }

    #[tokio::test]
    async fn test_dispatch_withLostPlaceholder_shouldFallBackAndSkipCache() {
        let mock = MockBackend::echo("").with_transform(|t| t.replace("{v0}", ""));
        let cache = TranslationCache::in_memory();
        let d = Dispatcher::new(Arc::new(mock), cache.clone(), fast_options(), CancellationFlag::new());
        let mut u = unit(0, &["x"]);
        u.segments[0] = GuardedText {
            text: "Let {v0} be".into(),
            spans: vec!["$x$".into()],
        };
        u.originals[0] = "Let $x$ be".into();

        let report = d.dispatch(&[u], None).await.unwrap();
        assert!(report.results[0].fallback);
        assert_eq!(report.results[0].texts, vec!["Let $x$ be"]);
        assert_eq!(report.warnings[0].kind, WarningKind::RestorationFailure);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_whenCancelledUpfront_shouldSubmitNothing() {
        let mock = MockBackend::working();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let d = Dispatcher::new(Arc::new(mock.clone()), TranslationCache::in_memory(), fast_options(), cancel);
        let result = d.dispatch(&[unit(0, &["a"])], None).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_poolSize_shouldRespectBackendLimit() {
        let mock = MockBackend::working().with_capabilities(4, 1);
        let d = dispatcher(mock.clone());
        let units: Vec<_> = (0..4).map(|i| unit(i, &[&format!("t{}", i)])).collect();
        d.dispatch(&units, None).await.unwrap();
        assert_eq!(d.pool_size(), 1);
        assert_eq!(mock.peak_in_flight(), 1);
    }
}
