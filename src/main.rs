// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, debug, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pdftrans::app_config::{self, Config, ServiceSelection};
use pdftrans::document::{FootnoteMode, PageFilter};
use pdftrans::file_utils::FileManager;
use pdftrans::jobs::{JobInfo, JobManager, JobRequest, JobSource, JobState};
use pdftrans::layout::DualLayout;
use pdftrans::pdf::OutputVariant;
use pdftrans::translation::TranslationCache;

/// Interval between job status polls
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for DualLayout to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliDualLayout {
    Interleaved,
    SideBySide,
}

impl From<CliDualLayout> for DualLayout {
    fn from(layout: CliDualLayout) -> Self {
        match layout {
            CliDualLayout::Interleaved => DualLayout::Interleaved,
            CliDualLayout::SideBySide => DualLayout::SideBySide,
        }
    }
}

/// CLI Wrapper for FootnoteMode to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliFootnoteMode {
    Inline,
    Append,
    Drop,
}

impl From<CliFootnoteMode> for FootnoteMode {
    fn from(mode: CliFootnoteMode) -> Self {
        match mode {
            CliFootnoteMode::Inline => FootnoteMode::Inline,
            CliFootnoteMode::Append => FootnoteMode::Append,
            CliFootnoteMode::Drop => FootnoteMode::Drop,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate PDF documents
    Translate(TranslateArgs),

    /// Inspect or clear the persistent translation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config: PathBuf,
    },

    /// Generate shell completions for pdftrans
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show entry counts and database size
    Stats,
    /// Remove every cached translation
    Clear,
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// PDF files or directories to process
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Source language tag (e.g., 'en', 'fr', 'pt-BR')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language tag (e.g., 'zh', 'de')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Translation backend, optionally with a model (`ollama:gemma2`)
    #[arg(short, long)]
    backend: Option<String>,

    /// Model name, overrides the one in the service string
    #[arg(short, long)]
    model: Option<String>,

    /// Concurrent translation requests per document
    #[arg(long)]
    threads: Option<usize>,

    /// Pages to translate, 1-based (e.g., '1-3,7')
    #[arg(short, long)]
    pages: Option<PageFilter>,

    /// Output directory; defaults to each input's directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not read cached translations
    #[arg(long)]
    ignore_cache: bool,

    /// Embed the full output font instead of a subset
    #[arg(long)]
    no_subset: bool,

    /// How the dual output combines pages
    #[arg(long, value_enum)]
    dual_layout: Option<CliDualLayout>,

    /// Also write <name>.md; the value places footnotes
    #[arg(long, value_enum, num_args = 0..=1, default_missing_value = "append")]
    markdown: Option<CliFootnoteMode>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// pdftrans - layout-preserving PDF translation
///
/// Translates the text of PDF documents while keeping formulas and layout,
/// writing a translated copy and a bilingual copy of every input.
#[derive(Parser, Debug)]
#[command(name = "pdftrans")]
#[command(version)]
#[command(about = "Layout-preserving PDF translation")]
#[command(long_about = "pdftrans translates PDF documents with pluggable backends while keeping formulas and layout.

EXAMPLES:
    pdftrans translate paper.pdf                          # Translate using default config
    pdftrans translate -s en -t de paper.pdf              # English to German
    pdftrans translate -b openai -m gpt-4o paper.pdf      # Use a specific backend and model
    pdftrans translate -p 1-3 --threads 8 papers/         # First pages of every PDF in a directory
    pdftrans translate --dual-layout side-by-side a.pdf   # Original and translation side by side
    pdftrans translate --markdown drop paper.pdf          # Also export Markdown without footnotes
    pdftrans cache stats                                  # Show cache statistics
    pdftrans completions bash > pdftrans.bash             # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.

OUTPUTS:
    <name>-mono.pdf   translated document
    <name>-dual.pdf   original and translated pages combined
    <name>.md         Markdown export, with --markdown")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "pdftrans", &mut std::io::stdout());
            Ok(())
        }
        Commands::Cache { action, config } => run_cache(action, &config).await,
        Commands::Translate(args) => run_translate(args).await,
    }
}

/// Configuration with command line overrides applied
fn load_config(options: &TranslateArgs) -> Result<Config> {
    let mut config = Config::load_or_create(&options.config)?;

    if let Some(source_language) = &options.source_language {
        config.source_language = source_language.clone();
    }
    if let Some(target_language) = &options.target_language {
        config.target_language = target_language.clone();
    }
    if options.backend.is_some() || options.model.is_some() {
        let mut selection = match &options.backend {
            Some(service) => ServiceSelection::parse(service)?,
            None => config.translation.selection()?,
        };
        if let Some(model) = &options.model {
            selection.model = Some(model.clone());
        }
        config.translation.backend = selection.to_string();
    }
    if let Some(threads) = options.threads {
        config.translation.common.thread_count = threads;
    }
    if options.ignore_cache {
        config.translation.common.ignore_cache = true;
    }
    if options.no_subset {
        config.layout.subset_fonts = false;
    }
    if let Some(layout) = &options.dual_layout {
        config.layout.dual_layout = layout.clone().into();
    }
    if let Some(mode) = &options.markdown {
        config.layout.markdown = Some(mode.clone().into());
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.into());
    }

    let config = load_config(&options)?;
    log::set_max_level(config.log_level.into());

    let files = FileManager::find_pdfs(&options.inputs)?;
    if files.is_empty() {
        warn!("No PDF files found");
        return Ok(());
    }
    if let Some(output_dir) = &options.output {
        FileManager::ensure_dir(output_dir)?;
    }

    let (cache, cache_error) = TranslationCache::open(&config.cache);
    if let Some(e) = cache_error {
        warn!("Continuing without a persistent cache: {}", e);
    }
    let manager = JobManager::new(config.clone(), cache)?;

    let pages = options.pages.clone().unwrap_or_default();
    let mut jobs = Vec::with_capacity(files.len());
    for file in &files {
        let request = JobRequest::new(
            JobSource::Path(file.clone()),
            &config.source_language,
            &config.target_language,
        )
        .with_thread_count(config.translation.common.thread_count)
        .with_pages(pages.clone())
        .with_ignore_cache(config.translation.common.ignore_cache);
        let id = manager.submit(request)?;
        jobs.push((file.clone(), id));
    }
    info!(
        "Translating {} document(s) from {} to {}",
        jobs.len(),
        config.source_language,
        config.target_language
    );

    let finished = watch_jobs(&manager, &jobs).await?;

    let mut failed = 0;
    for ((file, id), info) in jobs.iter().zip(finished) {
        for warning in &info.warnings {
            warn!("{}: {}", file.display(), warning);
        }
        match info.state {
            JobState::Succeeded => {
                write_outputs(&manager, id, file, options.output.as_deref())?;
                if config.layout.markdown.is_some() {
                    let path = FileManager::markdown_path(file, options.output.as_deref());
                    FileManager::write_atomic(&path, manager.fetch_markdown(id)?.as_bytes())?;
                    info!("Success: {}", path.display());
                }
                if let Some(stats) = &info.stats {
                    debug!("{}: {}", file.display(), stats.summary());
                }
            }
            JobState::Cancelled => warn!("{}: cancelled", file.display()),
            _ => {
                failed += 1;
                error!(
                    "{}: {}",
                    file.display(),
                    info.cause.as_deref().unwrap_or("translation failed")
                );
            }
        }
    }

    let stats = manager.cache().stats();
    debug!(
        "Cache: {} entries, {} hits, {} misses ({:.0}% hit rate)",
        stats.entries,
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0
    );

    if failed > 0 {
        return Err(anyhow!("{} of {} document(s) failed", failed, jobs.len()));
    }
    Ok(())
}

/// Show one progress bar per job until every job is terminal
///
/// Ctrl-C cancels every job; the loop still waits for them to settle.
async fn watch_jobs(manager: &JobManager, jobs: &[(PathBuf, String)]) -> Result<Vec<JobInfo>> {
    let multi = MultiProgress::new();
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units {msg}")
        .or_else(|_| ProgressStyle::default_bar().template("{bar:40} {pos}/{len} {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░");

    let bars: Vec<ProgressBar> = jobs
        .iter()
        .map(|(file, _)| {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_style(style.clone());
            bar.set_message(display_name(file));
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        })
        .collect();

    let mut interrupted = false;
    loop {
        let mut infos = Vec::with_capacity(jobs.len());
        for ((_, id), bar) in jobs.iter().zip(&bars) {
            let info = manager.status(id)?;
            bar.set_length(info.progress.total as u64);
            bar.set_position(info.progress.completed as u64);
            if info.state.is_terminal() && !bar.is_finished() {
                bar.finish_with_message(format!(
                    "{} {}",
                    bar.message(),
                    info.state
                ));
            }
            infos.push(info);
        }
        if infos.iter().all(|info| info.state.is_terminal()) {
            return Ok(infos);
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("Failed to listen for Ctrl-C")?;
                interrupted = true;
                warn!("Interrupted, cancelling running jobs");
                for (_, id) in jobs {
                    manager.cancel(id)?;
                }
            }
        }
    }
}

fn write_outputs(manager: &JobManager, id: &str, input: &Path, output_dir: Option<&Path>) -> Result<()> {
    for variant in [OutputVariant::Mono, OutputVariant::Dual] {
        let bytes = manager.fetch(id, variant)?;
        let path = FileManager::output_path(input, output_dir, variant);
        FileManager::write_atomic(&path, &bytes)?;
        info!("Success: {}", path.display());
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

async fn run_cache(action: CacheAction, config_path: &Path) -> Result<()> {
    let config = Config::load_or_create(config_path)?;
    log::set_max_level(config.log_level.into());

    let (cache, cache_error) = TranslationCache::open(&config.cache);
    if let Some(e) = cache_error {
        return Err(anyhow!("Translation cache unavailable: {}", e));
    }
    match action {
        CacheAction::Stats => match cache.repository() {
            Some(repository) => {
                let stats = repository.get_cache_stats().await?;
                info!("{}", stats);
                info!("Location: {}", config.cache.database_path()?.display());
            }
            None => info!("Persistent cache disabled"),
        },
        CacheAction::Clear => {
            let removed = cache.clear().await?;
            info!("Removed {} cached translation(s)", removed);
        }
    }
    Ok(())
}
