/*!
 * Job orchestration.
 *
 * A job wraps one document's pipeline run as a background task with a
 * `Pending -> Running -> {Succeeded | Failed | Cancelled}` lifecycle,
 * progress counters, cooperative cancellation and retained outputs.
 */

pub mod manager;
pub mod models;

pub use manager::JobManager;
pub use models::{JobInfo, JobOutputs, JobRequest, JobSource, JobState, Progress};
