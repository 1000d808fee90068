/*!
 * Integration tests for job submission, progress, cancellation and outputs
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;

use pdftrans::document::FootnoteMode;
use pdftrans::errors::JobError;
use pdftrans::file_utils::FileManager;
use pdftrans::jobs::{JobManager, JobRequest, JobSource, JobState};
use pdftrans::pdf::{LopdfPrimitive, OutputVariant};
use pdftrans::providers::mock::MockBackend;
use pdftrans::providers::{BackendRegistry, TranslationBackend};
use pdftrans::translation::TranslationCache;

use crate::common::{self, mock_backends::GateBackend};

fn manager_with(registry: BackendRegistry, max_concurrent_jobs: usize) -> JobManager {
    let mut config = common::test_config();
    config.jobs.max_concurrent_jobs = max_concurrent_jobs;
    JobManager::with_parts(
        config,
        TranslationCache::in_memory(),
        registry,
        Arc::new(LopdfPrimitive::new()),
    )
    .unwrap()
}

fn gated_manager(gate: &GateBackend, max_concurrent_jobs: usize) -> JobManager {
    let mut registry = BackendRegistry::with_builtin();
    let gate = gate.clone();
    registry.register("mock", move |_| Ok(Arc::new(gate.clone()) as Arc<dyn TranslationBackend>));
    manager_with(registry, max_concurrent_jobs)
}

fn paper_request() -> JobRequest {
    JobRequest::new(JobSource::Bytes(Bytes::from(common::paper_pdf())), "en", "zh")
}

#[tokio::test]
async fn test_job_withTwoPages_shouldSucceedWithBothOutputs() {
    let mock = MockBackend::working();
    let manager = manager_with(common::registry_with(mock.clone()), 2);

    let id = manager.submit(paper_request().with_thread_count(2)).unwrap();
    let info = manager.wait(&id).await.unwrap();

    assert_eq!(info.state, JobState::Succeeded, "cause: {:?}", info.cause);
    assert_eq!(info.progress.completed, 2);
    assert_eq!(info.progress.total, 2);
    assert_eq!(info.thread_count, 2);
    assert_eq!(info.backend, "mock");
    assert!(info.started_at.is_some());
    assert!(info.finished_at.is_some());
    assert_eq!(info.stats.as_ref().map(|s| s.notation_runs), Some(2));

    let mono = common::page_texts(&manager.fetch(&id, OutputVariant::Mono).unwrap());
    assert_eq!(mono.len(), 2);
    assert!(mono.iter().all(|page| page.contains("[TRANSLATED]")));
    assert!(mono[0].contains("E=mc"));
    assert!(mono[1].contains("p=mv"));

    let dual = common::page_texts(&manager.fetch(&id, OutputVariant::Dual).unwrap());
    assert_eq!(dual.len(), 4);
    assert!(mock.peak_in_flight() <= 2);
}

#[tokio::test]
async fn test_fetchMarkdown_shouldFollowMarkdownSetting() {
    let mut config = common::test_config();
    config.layout.markdown = Some(FootnoteMode::Drop);
    let exporting = JobManager::with_parts(
        config,
        TranslationCache::in_memory(),
        common::registry_with(MockBackend::working()),
        Arc::new(LopdfPrimitive::new()),
    )
    .unwrap();
    let id = exporting.submit(paper_request()).unwrap();
    exporting.wait(&id).await.unwrap();
    let markdown = exporting.fetch_markdown(&id).unwrap();
    assert!(markdown.contains("[TRANSLATED] The energy of a body"), "{}", markdown);

    let plain = manager_with(common::registry_with(MockBackend::working()), 1);
    let id = plain.submit(paper_request()).unwrap();
    plain.wait(&id).await.unwrap();
    assert!(plain.fetch(&id, OutputVariant::Mono).is_ok());
    assert!(matches!(plain.fetch_markdown(&id), Err(JobError::NoOutput { .. })));
}

#[tokio::test]
async fn test_job_withPathSource_shouldReadFileAndWriteOutputs() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_test_file(dir.path(), "paper.pdf", &common::paper_pdf())?;
    let manager = manager_with(common::registry_with(MockBackend::working()), 1);

    let id = manager.submit(JobRequest::new(JobSource::Path(input.clone()), "en", "de"))?;
    let info = manager.wait(&id).await?;
    assert_eq!(info.state, JobState::Succeeded);

    for variant in [OutputVariant::Mono, OutputVariant::Dual] {
        let path = FileManager::output_path(&input, None, variant);
        FileManager::write_atomic(&path, &manager.fetch(&id, variant)?)?;
    }
    let mono = std::fs::read(dir.path().join("paper-mono.pdf"))?;
    let dual = std::fs::read(dir.path().join("paper-dual.pdf"))?;
    assert_eq!(common::page_texts(&mono).len(), 2);
    assert_eq!(common::page_texts(&dual).len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_fetch_whileRunning_shouldReportNotReady() {
    let gate = GateBackend::new(8, 1);
    let manager = gated_manager(&gate, 1);

    let id = manager.submit(paper_request()).unwrap();
    gate.wait_started(1).await;

    assert_eq!(manager.status(&id).unwrap().state, JobState::Running);
    assert_eq!(
        manager.fetch(&id, OutputVariant::Mono),
        Err(JobError::NotReady(id.clone()))
    );

    gate.open();
    let info = manager.wait(&id).await.unwrap();
    assert_eq!(info.state, JobState::Succeeded);
    assert!(manager.fetch(&id, OutputVariant::Mono).is_ok());
}

#[tokio::test]
async fn test_cancel_runningJob_shouldDrainAndEndCancelled() {
    let gate = GateBackend::new(8, 1);
    let manager = gated_manager(&gate, 1);

    let id = manager.submit(paper_request().with_thread_count(1)).unwrap();
    gate.wait_started(1).await;

    assert_eq!(manager.cancel(&id).unwrap(), JobState::Running);
    gate.open();
    let info = manager.wait(&id).await.unwrap();

    assert_eq!(info.state, JobState::Cancelled);
    // The second unit was never started
    assert_eq!(gate.started(), 1);
    assert!(matches!(
        manager.fetch(&id, OutputVariant::Dual),
        Err(JobError::NoOutput { .. })
    ));
}

#[tokio::test]
async fn test_concurrencyLimit_shouldKeepSecondJobPending() {
    let gate = GateBackend::new(8, 1);
    let manager = gated_manager(&gate, 1);

    let first = manager.submit(paper_request()).unwrap();
    let second = manager.submit(paper_request()).unwrap();
    gate.wait_started(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(manager.status(&first).unwrap().state, JobState::Running);
    assert_eq!(manager.status(&second).unwrap().state, JobState::Pending);
    assert_eq!(gate.started(), 1);

    gate.open();
    assert_eq!(manager.wait(&first).await.unwrap().state, JobState::Succeeded);
    assert_eq!(manager.wait(&second).await.unwrap().state, JobState::Succeeded);
}

#[tokio::test]
async fn test_cancel_pendingJob_shouldCancelImmediately() {
    let gate = GateBackend::new(8, 1);
    let manager = gated_manager(&gate, 1);

    let first = manager.submit(paper_request()).unwrap();
    let second = manager.submit(paper_request()).unwrap();
    gate.wait_started(1).await;

    assert_eq!(manager.cancel(&second).unwrap(), JobState::Cancelled);
    assert_eq!(manager.status(&second).unwrap().state, JobState::Cancelled);

    gate.open();
    assert_eq!(manager.wait(&first).await.unwrap().state, JobState::Succeeded);
    // Only the first job's two units reached the backend
    assert_eq!(gate.started(), 2);
}

#[tokio::test]
async fn test_delete_shouldForgetJob() {
    let manager = manager_with(common::registry_with(MockBackend::working()), 1);
    let id = manager.submit(paper_request()).unwrap();
    manager.wait(&id).await.unwrap();

    let removed = manager.delete(&id).await.unwrap();
    assert_eq!(removed.state, JobState::Succeeded);
    assert_eq!(manager.status(&id), Err(JobError::NotFound(id.clone())));
    assert!(manager.list().is_empty());
}

#[tokio::test]
async fn test_list_shouldFollowSubmissionOrder() {
    let manager = manager_with(common::registry_with(MockBackend::working()), 2);
    let ids: Vec<String> = (0..3).map(|_| manager.submit(paper_request()).unwrap()).collect();
    for id in &ids {
        manager.wait(id).await.unwrap();
    }

    let listed: Vec<String> = manager.list().into_iter().map(|info| info.id).collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_submit_withUnknownService_shouldRejectWithoutCreatingJob() {
    let manager = manager_with(common::registry_with(MockBackend::working()), 1);

    let result = manager.submit(paper_request().with_service("babelfish"));

    assert!(matches!(result, Err(JobError::Rejected(_))));
    assert!(manager.list().is_empty());
}

#[tokio::test]
async fn test_job_withFatalBackendError_shouldFailWithCause() {
    let mock = MockBackend::failing(pdftrans::errors::BackendError::AuthenticationFailed(
        "invalid key".to_string(),
    ));
    let manager = manager_with(common::registry_with(mock), 1);

    let id = manager.submit(paper_request()).unwrap();
    let info = manager.wait(&id).await.unwrap();

    assert_eq!(info.state, JobState::Failed);
    assert!(info.cause.unwrap_or_default().contains("invalid key"));
}
