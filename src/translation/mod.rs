/*!
 * Translation of extracted documents.
 *
 * - `notation`: notation detection and placeholder guarding
 * - `units`: grouping runs into translation units
 * - `cache`: memoized translations with a SQLite write-through store
 * - `retry`: backoff policy for retryable backend failures
 * - `concurrency`: per-backend batch and in-flight defaults
 * - `dispatcher`: bounded, ordered, cancellable unit dispatch
 * - `pipeline`: one document from source bytes to mono and dual outputs
 */

pub use self::cache::{CacheKey, CacheStatistics, TranslationCache};
pub use self::dispatcher::{CancellationFlag, DispatchOptions, DispatchReport, Dispatcher, ProgressFn};
pub use self::notation::{GuardedText, NotationGuard};
pub use self::pipeline::{DocumentPipeline, PipelineOptions, PipelineOutput, PipelineStats};
pub use self::retry::RetryPolicy;
pub use self::units::{TranslationUnit, build_units};

pub mod cache;
pub mod concurrency;
pub mod dispatcher;
pub mod notation;
pub mod pipeline;
pub mod retry;
pub mod units;
