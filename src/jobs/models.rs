/*!
 * Job records and the request/snapshot types of the job API.
 */

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::document::PageFilter;
use crate::errors::PipelineWarning;
use crate::translation::PipelineStats;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, waiting for a free slot
    Pending,
    Running,
    /// Both outputs produced
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// No further transition can happen
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Where a job reads its document from
#[derive(Debug, Clone)]
pub enum JobSource {
    Bytes(Bytes),
    /// Read when the job starts running
    Path(PathBuf),
}

impl JobSource {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

/// A translation request; unset fields fall back to the configuration
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source: JobSource,
    pub source_language: String,
    pub target_language: String,
    /// Service string `backend[:model]`
    pub service: Option<String>,
    pub thread_count: Option<usize>,
    pub pages: PageFilter,
    /// Skip cache lookups for this job
    pub ignore_cache: bool,
}

impl JobRequest {
    pub fn new(source: JobSource, source_language: &str, target_language: &str) -> Self {
        Self {
            source,
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            service: None,
            thread_count: None,
            pages: PageFilter::all(),
            ignore_cache: false,
        }
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = Some(thread_count);
        self
    }

    pub fn with_pages(mut self, pages: PageFilter) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_ignore_cache(mut self, ignore_cache: bool) -> Self {
        self.ignore_cache = ignore_cache;
        self
    }
}

/// Units resolved so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Completion in `[0, 1]`; an empty job counts as done
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Snapshot of a job returned by `status` and `list`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub state: JobState,
    pub progress: Progress,
    pub warnings: Vec<PipelineWarning>,
    /// Failure cause for `Failed` jobs
    pub cause: Option<String>,
    pub source_language: String,
    pub target_language: String,
    /// Backend identity, model included
    pub backend: String,
    pub thread_count: usize,
    pub pages: String,
    pub ignore_cache: bool,
    /// RFC 3339 timestamps
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    #[serde(skip)]
    pub stats: Option<PipelineStats>,
}

impl JobInfo {
    /// Short id for log lines
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

/// Outputs kept for a succeeded job
#[derive(Debug, Clone)]
pub struct JobOutputs {
    pub mono: Bytes,
    pub dual: Bytes,
    /// Present when Markdown export is configured
    pub markdown: Option<String>,
}
