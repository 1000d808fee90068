/*!
 * Layout reconstruction.
 *
 * After dispatch every translated run is fitted back into its source
 * geometry (`fit`), measured with the output font (`metrics`), and the
 * characters each font still has to draw are collected into a subset plan
 * (`subset`). The bounding boxes themselves are never touched.
 */

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::errors::{PipelineWarning, WarningKind};
use crate::language_utils::{is_unspaced_script, primary_language_code};
use crate::text_utils::truncate_text;

pub mod fit;
pub mod metrics;
pub mod subset;

pub use fit::{FitOptions, fit_run};
pub use metrics::{FontMetrics, OUTPUT_FONT_ID, OutputFont};
pub use subset::SubsetPlan;

/// How the dual output combines original and translated pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DualLayout {
    /// Original page followed by its translation; page count doubles
    #[default]
    Interleaved,
    /// Original and translation on one double-width page
    SideBySide,
}

impl fmt::Display for DualLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interleaved => write!(f, "interleaved"),
            Self::SideBySide => write!(f, "side_by_side"),
        }
    }
}

impl FromStr for DualLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "interleaved" => Ok(Self::Interleaved),
            "side_by_side" => Ok(Self::SideBySide),
            other => Err(anyhow!("Unknown dual layout '{}'", other)),
        }
    }
}

/// Line height multiplier for text in the target language
pub fn line_height_for(language: &str) -> f32 {
    match primary_language_code(language).as_deref() {
        Ok("zh") => 1.4,
        Ok("ja") => 1.1,
        Ok("ko") => 1.2,
        Ok("en") => 1.2,
        Ok("ar") => 1.0,
        Ok("ru" | "uk" | "ta") => 0.8,
        _ => 1.1,
    }
}

/// Settings for laying out a whole document
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOptions {
    pub target_language: String,
    /// Smallest scale applied before overflow is accepted
    pub min_scale: f32,
    /// Line height override
    pub line_height: Option<f32>,
    pub subset_fonts: bool,
}

impl LayoutOptions {
    fn fit_options(&self) -> FitOptions {
        FitOptions {
            min_scale: self.min_scale,
            line_height: self
                .line_height
                .unwrap_or_else(|| line_height_for(&self.target_language)),
            unspaced: is_unspaced_script(&self.target_language),
        }
    }
}

/// Layout outcome for a document
#[derive(Debug, Clone)]
pub struct LayoutReport {
    pub plan: SubsetPlan,
    pub warnings: Vec<PipelineWarning>,
    /// Runs that received a rendering
    pub laid_out: usize,
}

/// Fit every translated run, register the output font and plan subsetting
pub fn reconstruct(document: &mut Document, font: &OutputFont, options: &LayoutOptions) -> LayoutReport {
    let fit_options = options.fit_options();
    let mut warnings = Vec::new();
    let mut laid_out = 0;

    for page in document.pages.iter_mut().filter(|p| p.selected) {
        let mut used_output_font = false;
        for (run_index, run) in page.runs.iter_mut().enumerate() {
            let Some(translated) = run.translated.as_deref() else {
                continue;
            };
            let rendering = fit_run(translated, &run.bbox, &run.style, font, &fit_options);
            if rendering.overflow {
                let warning = PipelineWarning::new(
                    WarningKind::LayoutOverflow,
                    format!(
                        "'{}' does not fit at scale {:.2}",
                        truncate_text(translated, 40),
                        rendering.scale
                    ),
                )
                .on_run(page.index, run_index);
                warn!("{}", warning);
                warnings.push(warning);
            }
            run.rendering = Some(rendering);
            used_output_font = true;
            laid_out += 1;
        }
        if used_output_font {
            page.fonts.insert(font.id());
        }
    }

    let plan = SubsetPlan::build(document, &font.id(), options.subset_fonts);
    document.add_font(font.resource(plan.output_chars()));
    debug!(
        "Laid out {} runs, {} output characters, {} overflow warnings",
        laid_out,
        plan.output_chars().len(),
        warnings.len()
    );

    LayoutReport {
        plan,
        warnings,
        laid_out,
    }
}
