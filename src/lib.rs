/*!
 * # pdftrans - layout-preserving PDF translation
 *
 * A Rust library for translating PDF documents while keeping their layout,
 * formulas and notation intact.
 *
 * ## Features
 *
 * - Extract positioned text runs from PDF pages
 * - Protect formulas, inline math and code spans from translation
 * - Translate with pluggable backends:
 *   - Ollama (local LLM)
 *   - OpenAI-compatible APIs
 *   - Anthropic API
 *   - DeepL
 * - Bounded, ordered and cancellable dispatch with retries
 * - Memoized translations with a persistent SQLite cache
 * - Fit translations back into the source boxes and subset the output font
 * - Translated (mono) and bilingual (dual) outputs
 * - Background jobs with progress, cancellation and a global concurrency limit
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `document`: Document model shared by extraction, translation and layout
 * - `pdf`: The PDF primitive (extraction and output writing)
 * - `translation`: Notation guarding, units, cache, dispatch and the document pipeline
 * - `layout`: Fitting translated text and planning font subsets
 * - `jobs`: Job orchestration
 * - `providers`: Translation backends and their registry
 * - `database`: SQLite store behind the translation cache
 * - `file_utils`: File system operations
 * - `language_utils`: Language tag utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod database;
pub mod document;
pub mod errors;
pub mod file_utils;
pub mod jobs;
pub mod language_utils;
pub mod layout;
pub mod pdf;
pub mod providers;
pub mod text_utils;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use document::{Document, PageFilter, TextRun};
pub use errors::{AppError, BackendError, ExtractionError, JobError, PipelineError, RenderError};
pub use jobs::{JobInfo, JobManager, JobRequest, JobSource, JobState};
pub use language_utils::{is_unspaced_script, primary_language_code, validate_language_tag};
pub use pdf::{LopdfPrimitive, OutputVariant, PdfPrimitive};
pub use providers::{BackendRegistry, TranslationBackend};
pub use translation::{DocumentPipeline, PipelineOptions, PipelineOutput, TranslationCache};
