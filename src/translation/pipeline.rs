/*!
 * Document pipeline.
 *
 * One run takes a source document through every stage:
 * 1. Extraction: positioned runs from the PDF primitive (blocking thread)
 * 2. Notation: whole-run classification, inline spans guarded per unit
 * 3. Dispatch: units resolved through the cache and the backend
 * 4. Layout: translated runs fitted into their boxes, subset plan built
 * 5. Output: mono and dual documents written by the primitive (blocking thread),
 *    plus an optional Markdown export
 *
 * Warnings from every stage are collected into the output; errors from any
 * stage end the run.
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, info, warn};

use crate::app_config::Config;
use crate::document::{Document, FootnoteMode, PageFilter, export_markdown};
use crate::errors::{PipelineError, PipelineWarning};
use crate::language_utils::is_unspaced_script;
use crate::layout::{DualLayout, LayoutOptions, LayoutReport, OutputFont, reconstruct};
use crate::pdf::{OutputVariant, PdfPrimitive, WriteRequest};
use crate::providers::{BackendOptions, TranslationBackend};

use super::cache::TranslationCache;
use super::dispatcher::{CancellationFlag, DispatchOptions, DispatchReport, Dispatcher, ProgressFn};
use super::notation::NotationGuard;
use super::retry::RetryPolicy;
use super::units::{TranslationUnit, build_units};

/// Settings for one document run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source_language: String,
    pub target_language: String,
    /// Pages to translate; others pass through
    pub pages: PageFilter,
    pub thread_count: usize,
    pub ignore_cache: bool,
    pub retry: RetryPolicy,
    pub backend_options: BackendOptions,
    pub min_font_scale: f32,
    pub line_height: Option<f32>,
    pub subset_fonts: bool,
    pub dual_layout: DualLayout,
    /// Export Markdown with this footnote placement
    pub markdown: Option<FootnoteMode>,
}

impl PipelineOptions {
    /// Options for a language pair with defaults elsewhere
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            pages: PageFilter::all(),
            thread_count: 4,
            ignore_cache: false,
            retry: RetryPolicy::default(),
            backend_options: BackendOptions::default(),
            min_font_scale: 0.6,
            line_height: None,
            subset_fonts: true,
            dual_layout: DualLayout::default(),
            markdown: None,
        }
    }

    /// Options taken from the configuration file
    pub fn from_config(config: &Config) -> Self {
        let common = &config.translation.common;
        Self {
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            pages: PageFilter::all(),
            thread_count: common.thread_count,
            ignore_cache: common.ignore_cache,
            retry: RetryPolicy::from_config(common),
            backend_options: config.backend_options(),
            min_font_scale: config.layout.min_font_scale,
            line_height: config.layout.line_height,
            subset_fonts: config.layout.subset_fonts,
            dual_layout: config.layout.dual_layout,
            markdown: config.layout.markdown,
        }
    }

    pub fn with_pages(mut self, pages: PageFilter) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_ignore_cache(mut self, ignore_cache: bool) -> Self {
        self.ignore_cache = ignore_cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_markdown(mut self, footnotes: FootnoteMode) -> Self {
        self.markdown = Some(footnotes);
        self
    }

    fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            thread_count: self.thread_count,
            retry: self.retry,
            ignore_cache: self.ignore_cache,
            backend_options: self.backend_options.clone(),
        }
    }

    fn layout_options(&self) -> LayoutOptions {
        LayoutOptions {
            target_language: self.target_language.clone(),
            min_scale: self.min_font_scale,
            line_height: self.line_height,
            subset_fonts: self.subset_fonts,
        }
    }
}

/// Counters describing a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub pages: usize,
    pub translated_pages: usize,
    pub runs: usize,
    pub notation_runs: usize,
    pub units: usize,
    pub cache_hits: usize,
    pub backend_calls: usize,
    pub laid_out: usize,
    pub duration: Duration,
}

impl PipelineStats {
    /// One-line description for logs
    pub fn summary(&self) -> String {
        format!(
            "{} pages ({} translated), {} runs ({} notation), {} units, {} cache hits, {} backend calls in {:.2}s",
            self.pages,
            self.translated_pages,
            self.runs,
            self.notation_runs,
            self.units,
            self.cache_hits,
            self.backend_calls,
            self.duration.as_secs_f32()
        )
    }
}

/// Output documents of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub mono: Bytes,
    pub dual: Bytes,
    pub markdown: Option<String>,
    pub warnings: Vec<PipelineWarning>,
    pub stats: PipelineStats,
}

/// Collaborators shared by every run of a process
#[derive(Clone)]
pub struct DocumentPipeline {
    primitive: Arc<dyn PdfPrimitive>,
    backend: Arc<dyn TranslationBackend>,
    cache: TranslationCache,
    guard: Arc<NotationGuard>,
    font: OutputFont,
}

impl std::fmt::Debug for DocumentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPipeline")
            .field("backend", &self.backend.identity())
            .field("cache", &self.cache)
            .field("font", &self.font.base_font())
            .finish()
    }
}

impl DocumentPipeline {
    pub fn new(
        primitive: Arc<dyn PdfPrimitive>,
        backend: Arc<dyn TranslationBackend>,
        cache: TranslationCache,
        guard: Arc<NotationGuard>,
        font: OutputFont,
    ) -> Self {
        Self {
            primitive,
            backend,
            cache,
            guard,
            font,
        }
    }

    pub fn backend(&self) -> &Arc<dyn TranslationBackend> {
        &self.backend
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// Translate one document into mono and dual outputs
    pub async fn run(
        &self,
        source: Bytes,
        options: &PipelineOptions,
        cancel: &CancellationFlag,
        progress: Option<ProgressFn>,
    ) -> Result<PipelineOutput, PipelineError> {
        let start = Instant::now();
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if matches!(self.font, OutputFont::Helvetica) && is_unspaced_script(&options.target_language) {
            warn!(
                "No output font configured for '{}'; characters outside WinAnsi will render as '?'",
                options.target_language
            );
        }

        let mut document = self.extract(source).await?;
        let mut stats = PipelineStats {
            pages: document.page_count(),
            runs: document.run_count(),
            ..PipelineStats::default()
        };
        select_pages(&mut document, &options.pages);
        stats.notation_runs = classify_runs(&mut document, &self.guard);

        let units = build_units(
            &document,
            &self.guard,
            self.backend.capabilities().max_batch_size,
            &options.source_language,
            &options.target_language,
        );
        stats.units = units.len();
        debug!(
            "{} pages, {} runs, {} notation runs, {} units",
            stats.pages, stats.runs, stats.notation_runs, stats.units
        );

        let dispatcher = Dispatcher::new(
            self.backend.clone(),
            self.cache.clone(),
            options.dispatch_options(),
            cancel.clone(),
        );
        let report = dispatcher.dispatch(&units, progress).await?;
        stats.cache_hits = report.cache_hits;
        stats.backend_calls = report.backend_calls;
        let mut warnings = apply_results(&mut document, &units, &report);

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let (layout, outputs) = self.render(document, options).await?;
        stats.laid_out = layout.laid_out;
        stats.translated_pages = layout.translated_pages;
        warnings.extend(layout.report.warnings);

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        stats.duration = start.elapsed();
        info!("Pipeline finished: {}", stats.summary());
        Ok(PipelineOutput {
            mono: outputs.mono,
            dual: outputs.dual,
            markdown: outputs.markdown,
            warnings,
            stats,
        })
    }

    async fn extract(&self, source: Bytes) -> Result<Document, PipelineError> {
        let primitive = self.primitive.clone();
        let document = tokio::task::spawn_blocking(move || primitive.extract(&source))
            .await
            .map_err(|e| PipelineError::Internal(format!("Extraction task failed: {}", e)))??;
        Ok(document)
    }

    async fn render(
        &self,
        mut document: Document,
        options: &PipelineOptions,
    ) -> Result<(RenderedLayout, RenderedOutputs), PipelineError> {
        let primitive = self.primitive.clone();
        let font = self.font.clone();
        let layout_options = options.layout_options();
        let dual_layout = options.dual_layout;
        let markdown = options.markdown;

        tokio::task::spawn_blocking(move || {
            let report = reconstruct(&mut document, &font, &layout_options);
            let translated_pages = document.pages.iter().filter(|p| p.is_translated()).count();
            let write = |variant| {
                let request = WriteRequest {
                    variant,
                    dual_layout,
                    font: &font,
                    plan: &report.plan,
                };
                primitive.write(&document, &request)
            };
            let outputs = RenderedOutputs {
                mono: write(OutputVariant::Mono)?,
                dual: write(OutputVariant::Dual)?,
                markdown: markdown.map(|footnotes| export_markdown(&document, footnotes)),
            };
            let layout = RenderedLayout {
                laid_out: report.laid_out,
                translated_pages,
                report,
            };
            Ok::<_, PipelineError>((layout, outputs))
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("Render task failed: {}", e)))?
    }
}

struct RenderedLayout {
    report: LayoutReport,
    laid_out: usize,
    translated_pages: usize,
}

struct RenderedOutputs {
    mono: Bytes,
    dual: Bytes,
    markdown: Option<String>,
}

/// Mark pages outside the filter as pass-through
fn select_pages(document: &mut Document, filter: &PageFilter) {
    for page in &mut document.pages {
        page.selected = filter.contains(page.index);
    }
    if !filter.is_all() {
        let selected = document.pages.iter().filter(|p| p.selected).count();
        if selected == 0 {
            warn!("Page filter selects none of the {} pages", document.page_count());
        }
    }
}

/// Flag whole-run notation; returns how many runs were flagged
fn classify_runs(document: &mut Document, guard: &NotationGuard) -> usize {
    let Document { pages, fonts, .. } = document;
    let mut flagged = 0;
    for page in pages.iter_mut().filter(|p| p.selected) {
        for run in &mut page.runs {
            let font_name = fonts.get(&run.font).map(|f| f.base_font.as_str()).unwrap_or("");
            run.notation = guard.classify_run(&run.text, font_name);
            if run.notation {
                flagged += 1;
            }
        }
    }
    flagged
}

/// Write dispatch results back to runs; fallback units keep their source text
fn apply_results(
    document: &mut Document,
    units: &[TranslationUnit],
    report: &DispatchReport,
) -> Vec<PipelineWarning> {
    for result in report.results.iter().filter(|r| !r.fallback) {
        let Some(unit) = units.get(result.unit_id) else {
            continue;
        };
        let Some(page) = document.pages.get_mut(unit.page) else {
            continue;
        };
        for (run_index, text) in unit.run_indices.iter().zip(&result.texts) {
            if let Some(run) = page.runs.get_mut(*run_index) {
                run.translated = Some(text.clone());
            }
        }
    }
    report.warnings.clone()
}
