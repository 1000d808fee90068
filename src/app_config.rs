use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;

use crate::document::FootnoteMode;
use crate::language_utils;
use crate::layout::DualLayout;
use crate::providers::{BUILTIN_BACKENDS, BackendCapabilities, BackendOptions, BackendSettings};
use crate::translation::concurrency::BackendProfile;
use crate::translation::notation::{DEFAULT_FORMULA_FONT_PATTERN, DEFAULT_INLINE_PATTERNS};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language tag (ISO 639, optional region)
    pub source_language: String,

    /// Target language tag (ISO 639, optional region)
    pub target_language: String,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Notation detection
    #[serde(default)]
    pub notation: NotationConfig,

    /// Layout reconstruction
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Persistent translation cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Job orchestration
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Backend selection parsed from a service string such as `ollama:gemma2:9b`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSelection {
    /// Registry name, lowercase
    pub backend: String,
    /// Model override; everything after the first colon
    pub model: Option<String>,
}

impl ServiceSelection {
    pub fn parse(service: &str) -> Result<Self> {
        let service = service.trim();
        let (backend, model) = match service.split_once(':') {
            Some((backend, model)) => (backend, Some(model.trim())),
            None => (service, None),
        };
        let backend = backend.trim().to_lowercase();
        if backend.is_empty() {
            return Err(anyhow!("Empty backend name in service string '{}'", service));
        }
        Ok(Self {
            backend,
            model: model.filter(|m| !m.is_empty()).map(str::to_string),
        })
    }
}

impl std::fmt::Display for ServiceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{}:{}", self.backend, model),
            None => write!(f, "{}", self.backend),
        }
    }
}

/// Per-backend configuration entry
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    /// Registry name
    #[serde(rename = "type")]
    pub backend_type: String,

    /// Model name
    #[serde(default)]
    pub model: String,

    /// API key
    #[serde(default)]
    pub api_key: String,

    /// Service URL, empty for the backend default
    #[serde(default)]
    pub endpoint: String,

    /// Segments per request
    #[serde(default)]
    pub max_batch_size: usize,

    /// Concurrent requests
    #[serde(default)]
    pub max_in_flight: usize,

    /// Timeout seconds
    #[serde(default)]
    pub timeout_secs: u64,

    /// Supported `source:target` pairs, `*` as wildcard; empty means undeclared
    #[serde(default)]
    pub language_pairs: Vec<String>,
}

impl BackendConfig {
    /// Entry with the tuned defaults for a backend
    pub fn new(backend_type: &str) -> Self {
        let profile = BackendProfile::for_backend(backend_type);
        Self {
            backend_type: backend_type.to_lowercase(),
            model: default_model(backend_type),
            api_key: String::new(),
            endpoint: default_endpoint(backend_type),
            max_batch_size: profile.max_batch_size,
            max_in_flight: profile.max_in_flight,
            timeout_secs: profile.timeout_secs,
            language_pairs: Vec::new(),
        }
    }

    /// Capabilities, zero fields fall back to the backend profile
    pub fn capabilities(&self) -> BackendCapabilities {
        let profile = BackendProfile::for_backend(&self.backend_type);
        BackendCapabilities::new(
            non_zero_or(self.max_batch_size, profile.max_batch_size),
            non_zero_or(self.max_in_flight, profile.max_in_flight),
        )
    }

    fn timeout(&self) -> Duration {
        let profile = BackendProfile::for_backend(&self.backend_type);
        Duration::from_secs(non_zero_or(self.timeout_secs as usize, profile.timeout_secs as usize) as u64)
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Service string `backend[:model]`
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Configured backends
    #[serde(default)]
    pub available_backends: Vec<BackendConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all backends
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Worker pool size
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    /// Retries after the first attempt for retryable failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff, doubled on each retry (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Backoff ceiling (in milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Skip cache lookups; results are still written
    #[serde(default)]
    pub ignore_cache: bool,

    /// Prompt template for LLM backends, `${lang_in}`, `${lang_out}`, `${text}`
    #[serde(default)]
    pub prompt_template: Option<String>,

    /// Sampling temperature for LLM backends
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            thread_count: default_thread_count(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            ignore_cache: false,
            prompt_template: None,
            temperature: None,
        }
    }
}

/// Notation detection settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotationConfig {
    /// Regex on font names marking whole runs as notation
    #[serde(default = "default_formula_font_pattern")]
    pub formula_font_pattern: String,

    /// Regex on characters marking whole runs as notation
    #[serde(default)]
    pub formula_char_pattern: Option<String>,

    /// Regexes for inline spans replaced by placeholders
    #[serde(default = "default_inline_patterns")]
    pub inline_patterns: Vec<String>,
}

impl Default for NotationConfig {
    fn default() -> Self {
        Self {
            formula_font_pattern: default_formula_font_pattern(),
            formula_char_pattern: None,
            inline_patterns: default_inline_patterns(),
        }
    }
}

/// Layout reconstruction settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LayoutConfig {
    /// Smallest font scale before overflow is accepted
    #[serde(default = "default_min_font_scale")]
    pub min_font_scale: f32,

    /// Line height override; the target language decides when unset
    #[serde(default)]
    pub line_height: Option<f32>,

    /// Subset the embedded output font
    #[serde(default = "default_true")]
    pub subset_fonts: bool,

    /// How the dual output combines pages
    #[serde(default)]
    pub dual_layout: DualLayout,

    /// TrueType font for translated text; Helvetica when unset
    #[serde(default)]
    pub font_path: Option<PathBuf>,

    /// Also export Markdown, placing footnotes this way; no export when unset
    #[serde(default)]
    pub markdown: Option<FootnoteMode>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            min_font_scale: default_min_font_scale(),
            line_height: None,
            subset_fonts: true,
            dual_layout: DualLayout::default(),
            font_path: None,
            markdown: None,
        }
    }
}

/// Persistent cache settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Persist translations across runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database file; the local data directory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl CacheConfig {
    /// Resolved database location
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let base = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("Could not determine the local data directory"))?;
        Ok(base.join("pdftrans").join("cache.db"))
    }
}

/// Job orchestration settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobsConfig {
    /// Jobs running at the same time; others wait as Pending
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn non_zero_or(value: usize, fallback: usize) -> usize {
    if value == 0 { fallback } else { value }
}

fn default_backend() -> String {
    "ollama".to_string()
}

fn default_thread_count() -> usize {
    4
}

fn default_retry_count() -> u32 {
    4
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_min_font_scale() -> f32 {
    0.6
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_formula_font_pattern() -> String {
    DEFAULT_FORMULA_FONT_PATTERN.to_string()
}

fn default_inline_patterns() -> Vec<String> {
    DEFAULT_INLINE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_endpoint(backend: &str) -> String {
    match backend {
        "ollama" => "http://localhost:11434".to_string(),
        "openai" => "https://api.openai.com/v1".to_string(),
        "anthropic" => "https://api.anthropic.com".to_string(),
        _ => String::new(),
    }
}

fn default_model(backend: &str) -> String {
    match backend {
        "ollama" => "gemma2".to_string(),
        "openai" => "gpt-4o-mini".to_string(),
        "anthropic" => "claude-3-5-haiku-latest".to_string(),
        _ => String::new(),
    }
}

/// Backends that talk to a hosted API and need a key
fn requires_api_key(entry: &BackendConfig) -> bool {
    match entry.backend_type.as_str() {
        "anthropic" | "deepl" => true,
        "openai" => entry.endpoint.is_empty() || entry.endpoint.contains("api.openai.com"),
        _ => false,
    }
}

impl Config {
    /// Load the configuration file, creating it with defaults when missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let reader = BufReader::new(file);
            serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            warn!("Config file not found at '{}', creating default config.", path.display());
            let config = Config::default();
            let config_json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize default config to JSON")?;
            std::fs::write(path, config_json)
                .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;
            Ok(config)
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        language_utils::validate_language_tag(&self.source_language)
            .context("Invalid source language")?;
        language_utils::validate_language_tag(&self.target_language)
            .context("Invalid target language")?;

        let selection = self.translation.selection()?;
        if !BUILTIN_BACKENDS.contains(&selection.backend.as_str()) {
            return Err(anyhow!(
                "Unknown translation backend '{}', available: {}",
                selection.backend,
                BUILTIN_BACKENDS.join(", ")
            ));
        }

        let entry = self.translation.backend_config(&selection.backend);
        if requires_api_key(&entry) && entry.api_key.is_empty() {
            return Err(anyhow!(
                "Translation API key is required for the {} backend",
                selection.backend
            ));
        }

        let common = &self.translation.common;
        if common.thread_count == 0 {
            return Err(anyhow!("thread_count must be at least 1"));
        }
        if common.max_backoff_ms < common.retry_backoff_ms {
            return Err(anyhow!("max_backoff_ms must not be below retry_backoff_ms"));
        }
        if common.temperature.is_some_and(|t| !(0.0..=2.0).contains(&t)) {
            return Err(anyhow!("temperature must be between 0.0 and 2.0"));
        }

        regex::Regex::new(&self.notation.formula_font_pattern)
            .context("Invalid formula_font_pattern")?;
        if let Some(pattern) = &self.notation.formula_char_pattern {
            regex::Regex::new(pattern).context("Invalid formula_char_pattern")?;
        }
        for pattern in &self.notation.inline_patterns {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid inline notation pattern '{}'", pattern))?;
        }

        let scale = self.layout.min_font_scale;
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(anyhow!("min_font_scale must be in (0, 1], got {}", scale));
        }
        if self.layout.line_height.is_some_and(|h| h <= 0.0) {
            return Err(anyhow!("line_height must be positive"));
        }
        if let Some(font_path) = &self.layout.font_path {
            if !font_path.is_file() {
                return Err(anyhow!("Font file not found: {}", font_path.display()));
            }
        }

        if self.jobs.max_concurrent_jobs == 0 {
            return Err(anyhow!("max_concurrent_jobs must be at least 1"));
        }

        Ok(())
    }

    /// Options that change backend output, shared by every backend
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            prompt_template: self.translation.common.prompt_template.clone(),
            temperature: self.translation.common.temperature,
        }
    }

    /// Construction settings for the selected backend
    pub fn backend_settings(&self) -> Result<BackendSettings> {
        let selection = self.translation.selection()?;
        self.translation.settings_for(&selection, self.backend_options())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "zh".to_string(),
            translation: TranslationConfig::default(),
            notation: NotationConfig::default(),
            layout: LayoutConfig::default(),
            cache: CacheConfig::default(),
            jobs: JobsConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Parsed service string
    pub fn selection(&self) -> Result<ServiceSelection> {
        ServiceSelection::parse(&self.backend)
    }

    /// Entry for a backend, the tuned defaults when none is configured
    pub fn backend_config(&self, backend: &str) -> BackendConfig {
        self.available_backends
            .iter()
            .find(|b| b.backend_type.eq_ignore_ascii_case(backend))
            .cloned()
            .unwrap_or_else(|| BackendConfig::new(backend))
    }

    /// Construction settings for a selection; the selection's model wins over
    /// the configured one
    pub fn settings_for(
        &self,
        selection: &ServiceSelection,
        options: BackendOptions,
    ) -> Result<BackendSettings> {
        let entry = self.backend_config(&selection.backend);
        let model = selection
            .model
            .clone()
            .unwrap_or_else(|| entry.model.clone());
        Ok(BackendSettings {
            name: selection.backend.clone(),
            model,
            api_key: entry.api_key.clone(),
            endpoint: entry.endpoint.clone(),
            timeout: entry.timeout(),
            capabilities: entry.capabilities(),
            language_pairs: entry.language_pairs.clone(),
            options,
        })
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            available_backends: ["ollama", "openai", "anthropic", "deepl"]
                .iter()
                .map(|name| BackendConfig::new(name))
                .collect(),
            common: TranslationCommonConfig::default(),
        }
    }
}
