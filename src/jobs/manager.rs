/*!
 * Job manager.
 *
 * Jobs are validated on submission, recorded as `Pending` and spawned on the
 * runtime. A semaphore bounds how many run at once; a job moves to `Running`
 * when it gets a slot. Every state change is published on a per-job watch
 * channel so callers can await completion. Outputs stay in the table until
 * the job is deleted.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use tokio::sync::{Semaphore, watch};
use uuid::Uuid;

use crate::app_config::{Config, ServiceSelection};
use crate::errors::{AppError, BackendError, JobError, PipelineError};
use crate::language_utils::validate_language_tag;
use crate::layout::OutputFont;
use crate::pdf::{LopdfPrimitive, OutputVariant, PdfPrimitive};
use crate::providers::{BackendRegistry, PairSupport, TranslationBackend};
use crate::translation::{
    CancellationFlag, DocumentPipeline, NotationGuard, PipelineOptions, PipelineOutput, ProgressFn,
    TranslationCache,
};

use super::models::{JobInfo, JobOutputs, JobRequest, JobSource, JobState, Progress};

/// One row of the job table
struct JobEntry {
    sequence: u64,
    info: JobInfo,
    outputs: Option<JobOutputs>,
    cancel: CancellationFlag,
    state: watch::Sender<JobState>,
}

impl JobEntry {
    fn set_state(&mut self, state: JobState) {
        self.info.state = state;
        let now = Utc::now().to_rfc3339();
        match state {
            JobState::Running => self.info.started_at = Some(now),
            s if s.is_terminal() => self.info.finished_at = Some(now),
            _ => {}
        }
        self.state.send_replace(state);
    }
}

struct ManagerInner {
    config: Config,
    registry: BackendRegistry,
    primitive: Arc<dyn PdfPrimitive>,
    cache: TranslationCache,
    guard: Arc<NotationGuard>,
    font: OutputFont,
    slots: Arc<Semaphore>,
    sequence: AtomicU64,
    jobs: RwLock<HashMap<String, JobEntry>>,
}

/// Runs document translations as background jobs
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("jobs", &self.inner.jobs.read().len())
            .field("max_concurrent_jobs", &self.inner.config.jobs.max_concurrent_jobs)
            .finish()
    }
}

impl JobManager {
    /// Manager with the built-in backends and the lopdf primitive
    pub fn new(config: Config, cache: TranslationCache) -> Result<Self, AppError> {
        Self::with_parts(
            config,
            cache,
            BackendRegistry::with_builtin(),
            Arc::new(LopdfPrimitive::new()),
        )
    }

    /// Manager with explicit collaborators
    pub fn with_parts(
        config: Config,
        cache: TranslationCache,
        registry: BackendRegistry,
        primitive: Arc<dyn PdfPrimitive>,
    ) -> Result<Self, AppError> {
        let guard = NotationGuard::new(&config.notation)
            .map_err(|e| PipelineError::Configuration(format!("invalid notation pattern: {}", e)))?;
        let font = OutputFont::load(config.layout.font_path.as_deref()).map_err(PipelineError::from)?;
        let slots = Arc::new(Semaphore::new(config.jobs.max_concurrent_jobs.max(1)));

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                registry,
                primitive,
                cache,
                guard: Arc::new(guard),
                font,
                slots,
                sequence: AtomicU64::new(0),
                jobs: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.inner.cache
    }

    /// Validate a request and start it as a job, returning the job id
    pub fn submit(&self, request: JobRequest) -> Result<String, JobError> {
        let backend = self.inner.prepare(&request)?;
        let config = &self.inner.config;

        let id = Uuid::new_v4().to_string();
        let thread_count = request
            .thread_count
            .unwrap_or(config.translation.common.thread_count)
            .max(1);
        let info = JobInfo {
            id: id.clone(),
            state: JobState::Pending,
            progress: Progress::default(),
            warnings: Vec::new(),
            cause: None,
            source_language: request.source_language.clone(),
            target_language: request.target_language.clone(),
            backend: backend.identity(),
            thread_count,
            pages: request.pages.to_string(),
            ignore_cache: request.ignore_cache || config.translation.common.ignore_cache,
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            finished_at: None,
            stats: None,
        };
        info!(
            "Job {} submitted: {} ({} -> {}) with {}",
            info.short_id(),
            request.source.describe(),
            info.source_language,
            info.target_language,
            info.backend
        );

        let cancel = CancellationFlag::new();
        let (state, _) = watch::channel(JobState::Pending);
        self.inner.jobs.write().insert(
            id.clone(),
            JobEntry {
                sequence: self.inner.sequence.fetch_add(1, Ordering::SeqCst),
                info,
                outputs: None,
                cancel: cancel.clone(),
                state,
            },
        );

        let inner = self.inner.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            inner.execute(job_id, request, backend, cancel, thread_count).await;
        });
        Ok(id)
    }

    /// Current snapshot of a job
    pub fn status(&self, id: &str) -> Result<JobInfo, JobError> {
        self.inner
            .jobs
            .read()
            .get(id)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Output bytes of a succeeded job
    pub fn fetch(&self, id: &str, variant: OutputVariant) -> Result<Bytes, JobError> {
        self.with_outputs(id, |outputs| {
            Ok(match variant {
                OutputVariant::Mono => outputs.mono.clone(),
                OutputVariant::Dual => outputs.dual.clone(),
            })
        })
    }

    /// Markdown export of a succeeded job
    pub fn fetch_markdown(&self, id: &str) -> Result<String, JobError> {
        self.with_outputs(id, |outputs| {
            outputs.markdown.clone().ok_or_else(|| JobError::NoOutput {
                id: id.to_string(),
                reason: "markdown export is disabled".to_string(),
            })
        })
    }

    fn with_outputs<T>(
        &self,
        id: &str,
        read: impl FnOnce(&JobOutputs) -> Result<T, JobError>,
    ) -> Result<T, JobError> {
        let jobs = self.inner.jobs.read();
        let entry = jobs.get(id).ok_or_else(|| JobError::NotFound(id.to_string()))?;
        let no_output = |reason: String| JobError::NoOutput {
            id: id.to_string(),
            reason,
        };
        match entry.info.state {
            JobState::Succeeded => entry
                .outputs
                .as_ref()
                .ok_or_else(|| no_output("outputs were not kept".to_string()))
                .and_then(read),
            JobState::Failed => Err(no_output(
                entry.info.cause.clone().unwrap_or_else(|| "failed".to_string()),
            )),
            JobState::Cancelled => Err(no_output("cancelled".to_string())),
            JobState::Pending | JobState::Running => Err(JobError::NotReady(id.to_string())),
        }
    }

    /// Request cancellation; returns the state right after the request
    ///
    /// Pending jobs are cancelled at once. Running jobs stop submitting work
    /// and become `Cancelled` once in-flight calls drain.
    pub fn cancel(&self, id: &str) -> Result<JobState, JobError> {
        let mut jobs = self.inner.jobs.write();
        let entry = jobs.get_mut(id).ok_or_else(|| JobError::NotFound(id.to_string()))?;
        match entry.info.state {
            JobState::Pending => {
                entry.cancel.cancel();
                entry.set_state(JobState::Cancelled);
                info!("Job {} cancelled before starting", entry.info.short_id());
            }
            JobState::Running => {
                entry.cancel.cancel();
                info!("Job {} cancellation requested", entry.info.short_id());
            }
            _ => debug!("Job {} already {}", entry.info.short_id(), entry.info.state),
        }
        Ok(entry.info.state)
    }

    /// Wait until a job reaches a terminal state
    pub async fn wait(&self, id: &str) -> Result<JobInfo, JobError> {
        let mut receiver = {
            let jobs = self.inner.jobs.read();
            let entry = jobs.get(id).ok_or_else(|| JobError::NotFound(id.to_string()))?;
            entry.state.subscribe()
        };
        receiver
            .wait_for(|state| state.is_terminal())
            .await
            .map_err(|_| JobError::NotFound(id.to_string()))?;
        self.status(id)
    }

    /// Remove a job and its outputs, cancelling it first when still live
    pub async fn delete(&self, id: &str) -> Result<JobInfo, JobError> {
        if !self.cancel(id)?.is_terminal() {
            self.wait(id).await?;
        }
        let entry = self
            .inner
            .jobs
            .write()
            .remove(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        info!("Job {} deleted", entry.info.short_id());
        Ok(entry.info)
    }

    /// Every job in submission order
    pub fn list(&self) -> Vec<JobInfo> {
        let jobs = self.inner.jobs.read();
        let mut entries: Vec<&JobEntry> = jobs.values().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries.into_iter().map(|entry| entry.info.clone()).collect()
    }
}

impl ManagerInner {
    /// Upfront validation; returns the backend the job will use
    fn prepare(&self, request: &JobRequest) -> Result<Arc<dyn TranslationBackend>, JobError> {
        let reject = |message: String| {
            warn!("Job rejected: {}", message);
            JobError::Rejected(message)
        };

        validate_language_tag(&request.source_language)
            .map_err(|e| reject(format!("invalid source language: {:#}", e)))?;
        validate_language_tag(&request.target_language)
            .map_err(|e| reject(format!("invalid target language: {:#}", e)))?;
        if request.thread_count == Some(0) {
            return Err(reject("thread count must be at least 1".to_string()));
        }
        if let JobSource::Path(path) = &request.source {
            if !path.is_file() {
                return Err(reject(format!("{} is not a readable file", path.display())));
            }
        }

        let service = request
            .service
            .as_deref()
            .unwrap_or(&self.config.translation.backend);
        let backend = ServiceSelection::parse(service)
            .and_then(|selection| {
                self.config
                    .translation
                    .settings_for(&selection, self.config.backend_options())
            })
            .and_then(|settings| self.registry.create(&settings))
            .map_err(|e| reject(format!("{:#}", e)))?;

        if backend.supports_pair(&request.source_language, &request.target_language) == PairSupport::Unsupported {
            let error = BackendError::UnsupportedLanguagePair {
                source_language: request.source_language.clone(),
                target_language: request.target_language.clone(),
            };
            return Err(reject(format!("{}: {}", backend.identity(), error)));
        }
        Ok(backend)
    }

    async fn execute(
        self: Arc<Self>,
        id: String,
        request: JobRequest,
        backend: Arc<dyn TranslationBackend>,
        cancel: CancellationFlag,
        thread_count: usize,
    ) {
        let _permit = match self.slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                self.finish(&id, Err(PipelineError::Internal(format!("job slots closed: {}", e))));
                return;
            }
        };
        if !self.start(&id, &cancel) {
            return;
        }

        let runner = self.clone();
        let job_id = id.clone();
        let handle = tokio::spawn(async move {
            runner
                .run_pipeline(&job_id, request, backend, &cancel, thread_count)
                .await
        });
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Internal(format!("job task failed: {}", e))),
        };
        self.finish(&id, result);
    }

    /// Pending -> Running, unless cancelled or deleted meanwhile
    fn start(&self, id: &str, cancel: &CancellationFlag) -> bool {
        let mut jobs = self.jobs.write();
        let Some(entry) = jobs.get_mut(id) else {
            return false;
        };
        if entry.info.state != JobState::Pending || cancel.is_cancelled() {
            return false;
        }
        entry.set_state(JobState::Running);
        info!("Job {} running", entry.info.short_id());
        true
    }

    async fn run_pipeline(
        self: &Arc<Self>,
        id: &str,
        request: JobRequest,
        backend: Arc<dyn TranslationBackend>,
        cancel: &CancellationFlag,
        thread_count: usize,
    ) -> Result<PipelineOutput, PipelineError> {
        let source = match request.source {
            JobSource::Bytes(bytes) => bytes,
            JobSource::Path(path) => tokio::fs::read(&path)
                .await
                .map(Bytes::from)
                .map_err(|e| PipelineError::Internal(format!("cannot read {}: {}", path.display(), e)))?,
        };

        let mut options = PipelineOptions::from_config(&self.config)
            .with_pages(request.pages)
            .with_thread_count(thread_count);
        options.source_language = request.source_language;
        options.target_language = request.target_language;
        options.ignore_cache |= request.ignore_cache;

        let pipeline = DocumentPipeline::new(
            self.primitive.clone(),
            backend,
            self.cache.clone(),
            self.guard.clone(),
            self.font.clone(),
        );
        let progress: ProgressFn = {
            let inner = self.clone();
            let id = id.to_string();
            Arc::new(move |completed, total| inner.set_progress(&id, completed, total))
        };
        pipeline.run(source, &options, cancel, Some(progress)).await
    }

    fn set_progress(&self, id: &str, completed: usize, total: usize) {
        if let Some(entry) = self.jobs.write().get_mut(id) {
            entry.info.progress = Progress { completed, total };
        }
    }

    fn finish(&self, id: &str, result: Result<PipelineOutput, PipelineError>) {
        let mut jobs = self.jobs.write();
        let Some(entry) = jobs.get_mut(id) else {
            debug!("Job {} finished after deletion", id);
            return;
        };
        let short_id = entry.info.short_id().to_string();

        match result {
            Ok(_) if entry.cancel.is_cancelled() => {
                entry.set_state(JobState::Cancelled);
                info!("Job {} cancelled", short_id);
            }
            Ok(output) => {
                let total = entry.info.progress.total.max(output.stats.units);
                entry.info.progress = Progress {
                    completed: total,
                    total,
                };
                entry.info.warnings = output.warnings;
                entry.info.stats = Some(output.stats);
                entry.outputs = Some(JobOutputs {
                    mono: output.mono,
                    dual: output.dual,
                    markdown: output.markdown,
                });
                entry.set_state(JobState::Succeeded);
                info!(
                    "Job {} succeeded with {} warnings",
                    short_id,
                    entry.info.warnings.len()
                );
            }
            Err(PipelineError::Cancelled) => {
                entry.set_state(JobState::Cancelled);
                info!("Job {} cancelled", short_id);
            }
            Err(e) => {
                error!("Job {} failed: {}", short_id, e);
                entry.info.cause = Some(e.to_string());
                entry.set_state(JobState::Failed);
            }
        }
    }
}
