/*!
 * Translation backends.
 *
 * Every translation service implements `TranslationBackend`, a batch-in,
 * batch-out contract that the dispatcher drives without knowing which service
 * sits behind it. Backends are selected by name through the `BackendRegistry`:
 * - `noop`: returns its input unchanged
 * - `ollama`: local Ollama server
 * - `openai`: OpenAI and OpenAI-compatible servers (LM Studio, DeepSeek, ...)
 * - `anthropic`: Anthropic messages API
 * - `deepl`: DeepL REST API with native batching
 * - `mock`: configurable test double
 */

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use sha2::{Digest, Sha256};

use crate::errors::BackendError;
use crate::language_utils::LanguageTag;
use crate::text_utils::truncate_text;

pub mod batch_protocol;
pub mod registry;
pub mod noop;
pub mod ollama;
pub mod openai;
pub mod anthropic;
pub mod deepl;
pub mod mock;

pub use registry::{BackendRegistry, BUILTIN_BACKENDS};

/// Limits a backend declares to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Maximum number of segments in one `translate` call
    pub max_batch_size: usize,
    /// Maximum number of concurrent `translate` calls
    pub max_in_flight: usize,
}

impl BackendCapabilities {
    pub fn new(max_batch_size: usize, max_in_flight: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            max_in_flight: max_in_flight.max(1),
        }
    }
}

/// Whether a backend can handle a language pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSupport {
    Supported,
    Unsupported,
    /// The backend has no table; only a translation attempt will tell
    Unknown,
}

/// Per-request options that change what a backend produces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendOptions {
    /// Prompt template with `${lang_in}`, `${lang_out}` and `${text}` variables
    pub prompt_template: Option<String>,
    /// Sampling temperature for LLM backends
    pub temperature: Option<f32>,
}

impl BackendOptions {
    /// Short digest of the options that affect output, folded into cache keys
    pub fn fingerprint(&self) -> String {
        if self.prompt_template.is_none() && self.temperature.is_none() {
            return String::new();
        }
        let mut hasher = Sha256::new();
        if let Some(template) = &self.prompt_template {
            hasher.update(template.as_bytes());
        }
        hasher.update(b"\0");
        if let Some(temperature) = self.temperature {
            hasher.update(temperature.to_le_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());
        digest[..12].to_string()
    }
}

/// Resolved construction settings for one backend instance
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Registry identifier (`ollama`, `deepl`, ...)
    pub name: String,
    /// Model name, empty for backends without models
    pub model: String,
    /// API key, empty when not needed
    pub api_key: String,
    /// Base URL of the service
    pub endpoint: String,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Batch and concurrency limits
    pub capabilities: BackendCapabilities,
    /// Optional `source:target` pair table, `*` matches any language
    pub language_pairs: Vec<String>,
    /// Output-affecting options
    pub options: BackendOptions,
}

impl BackendSettings {
    /// Settings with no credentials or endpoint, mostly useful for local backends
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: String::new(),
            api_key: String::new(),
            endpoint: String::new(),
            timeout: Duration::from_secs(60),
            capabilities: BackendCapabilities::new(8, 4),
            language_pairs: Vec::new(),
            options: BackendOptions::default(),
        }
    }
}

/// Common trait for all translation services
///
/// `translate` receives guarded segments (notation replaced by `{vN}`
/// placeholders) and must return exactly one translation per segment, in
/// order. Implementations must be side-effect free from the caller's point
/// of view so the dispatcher can retry and cache freely.
#[async_trait]
pub trait TranslationBackend: Send + Sync + Debug {
    /// Registry name of the backend
    fn name(&self) -> &str;

    /// Model in use, empty when not applicable
    fn model(&self) -> &str {
        ""
    }

    /// Batch and concurrency limits
    fn capabilities(&self) -> BackendCapabilities;

    /// Identity used in cache keys; two backends with the same identity must
    /// produce interchangeable translations
    fn identity(&self) -> String {
        if self.model().is_empty() {
            self.name().to_string()
        } else {
            format!("{}:{}", self.name(), self.model())
        }
    }

    /// Declared support for a language pair
    fn supports_pair(&self, _source_language: &str, _target_language: &str) -> PairSupport {
        PairSupport::Unknown
    }

    /// Translate a batch of segments
    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
        options: &BackendOptions,
    ) -> Result<Vec<String>, BackendError>;
}

/// Cache identity of a backend running with the given options
pub fn cache_identity(backend: &dyn TranslationBackend, options: &BackendOptions) -> String {
    let fingerprint = options.fingerprint();
    if fingerprint.is_empty() {
        backend.identity()
    } else {
        format!("{}#{}", backend.identity(), fingerprint)
    }
}

/// Match a language pair against a `source:target` table
pub fn pair_table_support(table: &[String], source: &str, target: &str) -> PairSupport {
    if table.is_empty() {
        return PairSupport::Unknown;
    }
    let matches = |pattern: &str, tag: &str| {
        pattern == "*" || crate::language_utils::language_codes_match(pattern, tag)
    };
    let supported = table.iter().any(|entry| match entry.split_once(':') {
        Some((src, tgt)) => matches(src.trim(), source) && matches(tgt.trim(), target),
        None => false,
    });
    if supported {
        PairSupport::Supported
    } else {
        PairSupport::Unsupported
    }
}

/// Map a non-success HTTP response onto the backend error taxonomy
pub(crate) fn classify_http_error(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    source_language: &str,
    target_language: &str,
) -> BackendError {
    let message = format!("HTTP {}: {}", status, truncate_text(body, 200));
    match status.as_u16() {
        429 => BackendError::RateLimited {
            message,
            retry_after: parse_retry_after(headers),
        },
        401 | 403 => BackendError::AuthenticationFailed(message),
        400 | 422 if mentions_language(body) => BackendError::UnsupportedLanguagePair {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
        },
        408 | 500..=599 => BackendError::Unreachable(message),
        _ => BackendError::InvalidResponse(message),
    }
}

/// Map a transport-level failure (connect, timeout, body read)
pub(crate) fn classify_transport_error(error: &reqwest::Error) -> BackendError {
    if error.is_decode() {
        BackendError::InvalidResponse(error.to_string())
    } else {
        BackendError::Unreachable(error.to_string())
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn mentions_language(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("target_lang")
        || body.contains("source_lang")
        || body.contains("language pair")
        || body.contains("unsupported language")
}

/// Normalize a configured endpoint into a base URL without trailing slash
pub(crate) fn base_url(endpoint: &str, default: &str) -> anyhow::Result<String> {
    let endpoint = endpoint.trim();
    let endpoint = if endpoint.is_empty() { default } else { endpoint };
    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        url::Url::parse(endpoint)?
    } else {
        url::Url::parse(&format!("http://{}", endpoint))?
    };
    if url.host_str().is_none() {
        anyhow::bail!("Invalid host in endpoint: {}", endpoint);
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Build the shared HTTP client for a backend
pub(crate) fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?)
}

/// English name of a tag for prompts, falling back to the raw tag
pub(crate) fn language_display_name(tag: &str) -> String {
    match LanguageTag::parse(tag) {
        Ok(parsed) => match &parsed.region {
            Some(region) => format!("{} ({})", parsed.name(), region),
            None => parsed.name().to_string(),
        },
        Err(_) => tag.to_string(),
    }
}
