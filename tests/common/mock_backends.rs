/*!
 * Scripted backends for orchestration tests
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use pdftrans::errors::BackendError;
use pdftrans::providers::{BackendCapabilities, BackendOptions, TranslationBackend};

/// Backend whose calls block until the test opens the gate
///
/// Lets a test observe a job while calls are in flight.
#[derive(Debug, Clone)]
pub struct GateBackend {
    gate: Arc<Semaphore>,
    started: Arc<AtomicUsize>,
    capabilities: BackendCapabilities,
}

impl GateBackend {
    pub fn new(max_batch_size: usize, max_in_flight: usize) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            started: Arc::new(AtomicUsize::new(0)),
            capabilities: BackendCapabilities::new(max_batch_size, max_in_flight),
        }
    }

    /// Let every waiting and future call through
    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Calls that reached the backend
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` calls reached the backend
    pub async fn wait_started(&self, count: usize) {
        while self.started() < count {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl TranslationBackend for GateBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    async fn translate(
        &self,
        texts: &[String],
        _source_language: &str,
        _target_language: &str,
        _options: &BackendOptions,
    ) -> Result<Vec<String>, BackendError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        Ok(texts.iter().map(|t| format!("[GATED] {}", t)).collect())
    }
}
