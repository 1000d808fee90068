/*!
 * Error types for the pdftrans library.
 *
 * Fatal failures are modelled as `thiserror` enums. Recoverable problems that a
 * job absorbs (restoration failures, exhausted retries, layout overflow, cache
 * persistence hiccups) are not errors at all but `PipelineWarning` values that
 * travel with the job result.
 */

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a translation backend for one batch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The service asked us to slow down
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        /// Message from the service
        message: String,
        /// Server-provided delay before the next attempt, if any
        retry_after: Option<Duration>,
    },

    /// Credentials were missing or rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The service could not be reached or answered with a server error
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The backend cannot translate between the requested languages
    #[error("Unsupported language pair: {source_language} -> {target_language}")]
    UnsupportedLanguagePair {
        /// Source language tag
        source_language: String,
        /// Target language tag
        target_language: String,
    },

    /// The backend answered, but the answer cannot be used for this batch
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Whether the dispatcher may try the same batch again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unreachable(_))
    }

    /// Whether the failure aborts the whole job
    pub fn is_job_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_) | Self::UnsupportedLanguagePair { .. }
        )
    }

    /// Server-provided retry hint
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised while reading a source document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// The bytes are not a readable PDF document
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// The document is encrypted
    #[error("Document is encrypted")]
    Encrypted,

    /// The document has no pages
    #[error("Document has no pages")]
    NoPages,

    /// A page content stream could not be interpreted
    #[error("Failed to read page {page}: {message}")]
    Page {
        /// Zero-based page index
        page: usize,
        /// What went wrong
        message: String,
    },
}

/// Errors raised while producing an output document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The output font could not be loaded or embedded
    #[error("Font error: {0}")]
    Font(String),

    /// The output document could not be assembled
    #[error("Failed to write document: {0}")]
    Write(String),
}

/// Cache persistence failure. Never fatal: callers log it and carry on.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cache I/O error: {0}")]
pub struct CacheError(pub String);

impl From<anyhow::Error> for CacheError {
    fn from(error: anyhow::Error) -> Self {
        Self(format!("{:#}", error))
    }
}

/// Errors that end a document pipeline run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The source document could not be read
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// A job-fatal backend failure
    #[error("Backend error: {0}")]
    Backend(BackendError),

    /// The output could not be produced
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// The run was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Invalid job settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Anything else (a panicked worker, a closed channel)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors returned by the job manager API
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    /// No job with this id
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The job has not finished yet
    #[error("Job {0} has not finished")]
    NotReady(String),

    /// The job finished without outputs (failed or cancelled)
    #[error("Job {id} has no output: {reason}")]
    NoOutput {
        /// Job id
        id: String,
        /// Terminal state or failure cause
        reason: String,
    },

    /// The submission was refused before a job was created
    #[error("Job rejected: {0}")]
    Rejected(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a backend
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Error from a pipeline run
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Error from the job manager
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

/// Kind of a non-fatal pipeline issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Placeholders did not survive translation; the unit kept its original text
    RestorationFailure,
    /// Retryable backend errors outlasted the attempt ceiling
    RetriesExhausted,
    /// The backend returned an unusable batch
    InvalidResponse,
    /// Translated text did not fit even at the minimum scale
    LayoutOverflow,
    /// The persisted cache could not be read or written
    CacheUnavailable,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RestorationFailure => "notation restoration failure",
            Self::RetriesExhausted => "retries exhausted",
            Self::InvalidResponse => "invalid backend response",
            Self::LayoutOverflow => "layout overflow",
            Self::CacheUnavailable => "cache unavailable",
        };
        f.write_str(name)
    }
}

/// A recoverable issue recorded during a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineWarning {
    /// What happened
    pub kind: WarningKind,
    /// Zero-based page index, when the issue is tied to a page
    pub page: Option<usize>,
    /// Run index on the page, when the issue is tied to a run
    pub run: Option<usize>,
    /// Human readable detail
    pub message: String,
}

impl PipelineWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            page: None,
            run: None,
            message: message.into(),
        }
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn on_run(mut self, page: usize, run: usize) -> Self {
        self.page = Some(page);
        self.run = Some(run);
        self
    }
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.page, self.run) {
            (Some(page), Some(run)) => {
                write!(f, "{} (page {}, run {}): {}", self.kind, page + 1, run, self.message)
            }
            (Some(page), None) => write!(f, "{} (page {}): {}", self.kind, page + 1, self.message),
            _ => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}
