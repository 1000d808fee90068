use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in PDF user space (origin bottom-left, y up)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// Rectangle from two corners in any order
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Whether the horizontal extents overlap
    pub fn overlaps_horizontally(&self, other: &BoundingBox) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1
    }
}

/// Identifier of a font within a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FontId(pub String);

impl FontId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FontId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a font maps codes to glyphs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontKind {
    /// Single-byte font with an embedded or referenced program
    Simple,
    /// Two-byte CID-keyed font
    Composite,
    /// One of the 14 standard fonts, never embedded
    Standard,
}

/// A font referenced by the document, or added for translated text
#[derive(Debug, Clone, PartialEq)]
pub struct FontResource {
    pub id: FontId,
    /// `BaseFont` name, subset prefix included when present
    pub base_font: String,
    pub kind: FontKind,
    /// Glyph widths in 1/1000 em, keyed by character code
    pub widths: BTreeMap<u32, f32>,
    /// Width of codes missing from `widths`
    pub default_width: f32,
    /// Embedded font program
    pub program: Option<Bytes>,
}

impl FontResource {
    pub fn new(id: FontId, base_font: impl Into<String>, kind: FontKind) -> Self {
        Self {
            id,
            base_font: base_font.into(),
            kind,
            widths: BTreeMap::new(),
            default_width: if kind == FontKind::Composite { 1000.0 } else { 500.0 },
            program: None,
        }
    }

    /// Width of a code in 1/1000 em
    pub fn width(&self, code: u32) -> f32 {
        self.widths.get(&code).copied().unwrap_or(self.default_width)
    }

    /// Base font name without the `ABCDEF+` subset tag
    pub fn plain_name(&self) -> &str {
        strip_subset_prefix(&self.base_font)
    }
}

/// Drop a six-uppercase-letter subset tag (`ABCDEF+Name` -> `Name`)
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

/// Horizontal alignment of a run's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Alignment {
    #[default]
    Left,
    Center,
}

/// Visual attributes of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStyle {
    /// Effective font size in user space units
    pub font_size: f32,
    /// Vertical writing mode
    pub vertical: bool,
    pub alignment: Alignment,
}

impl RunStyle {
    pub fn new(font_size: f32) -> Self {
        Self {
            font_size,
            vertical: false,
            alignment: Alignment::Left,
        }
    }
}

/// Back-reference to a text-show operation that drew part of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentRef {
    /// Index of the operation in the page's decoded content
    pub op_index: usize,
    /// `TJ` adjustment producing the same horizontal advance as the show
    pub adjustment: f32,
}

/// One laid-out line of translated text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedLine {
    pub text: String,
    /// Start of the baseline in user space
    pub x: f32,
    pub y: f32,
    /// Advance width at the rendered size
    pub width: f32,
}

/// Layout result for a translated run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendering {
    pub lines: Vec<RenderedLine>,
    /// Font size after scaling
    pub font_size: f32,
    /// Applied scale factor, never below the configured minimum
    pub scale: f32,
    /// Text still does not fit at the minimum scale
    pub overflow: bool,
}

/// A positioned, styled span of source text
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    /// Geometry of the source text; never modified after extraction
    pub bbox: BoundingBox,
    pub font: FontId,
    pub style: RunStyle,
    /// Protected from translation as a whole
    pub notation: bool,
    pub translated: Option<String>,
    pub rendering: Option<Rendering>,
    pub content_refs: Vec<ContentRef>,
}

impl TextRun {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, font: FontId, style: RunStyle) -> Self {
        Self {
            text: text.into(),
            bbox,
            font,
            style,
            notation: false,
            translated: None,
            rendering: None,
            content_refs: Vec::new(),
        }
    }

    /// Whether the run should be sent for translation
    pub fn is_translatable(&self) -> bool {
        !self.notation && !self.text.trim().is_empty()
    }
}

/// One page of a document
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Zero-based page index
    pub index: usize,
    pub media_box: BoundingBox,
    pub runs: Vec<TextRun>,
    /// Fonts referenced on the page
    pub fonts: BTreeSet<FontId>,
    /// Selected for translation by the page filter
    pub selected: bool,
}

impl Page {
    pub fn new(index: usize, media_box: BoundingBox) -> Self {
        Self {
            index,
            media_box,
            runs: Vec::new(),
            fonts: BTreeSet::new(),
            selected: true,
        }
    }

    /// Add a run and record its font
    pub fn push_run(&mut self, run: TextRun) {
        self.fonts.insert(run.font.clone());
        self.runs.push(run);
    }

    /// Whether any run on the page received a translation
    pub fn is_translated(&self) -> bool {
        self.selected && self.runs.iter().any(|r| r.translated.is_some())
    }
}

/// An extracted document with its font table
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
    pub fonts: BTreeMap<FontId, FontResource>,
    /// Raw input, kept for primitives that rewrite the original file
    pub source: Bytes,
}

impl Document {
    pub fn new(source: Bytes) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Add a font, replacing any font with the same id
    pub fn add_font(&mut self, font: FontResource) {
        self.fonts.insert(font.id.clone(), font);
    }

    /// Base font name of a run's font, empty when unknown
    pub fn font_name(&self, id: &FontId) -> &str {
        self.fonts.get(id).map(|f| f.base_font.as_str()).unwrap_or("")
    }

    /// Number of runs across pages
    pub fn run_count(&self) -> usize {
        self.pages.iter().map(|p| p.runs.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripSubsetPrefix_shouldOnlyDropSixLetterTags() {
        assert_eq!(strip_subset_prefix("ABCDEF+CMMI10"), "CMMI10");
        assert_eq!(strip_subset_prefix("CMMI10"), "CMMI10");
        assert_eq!(strip_subset_prefix("Abc+Font"), "Abc+Font");
    }

    #[test]
    fn test_boundingBox_shouldNormalizeCorners() {
        let bbox = BoundingBox::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(bbox, BoundingBox { x0: 0.0, y0: 5.0, x1: 10.0, y1: 20.0 });
        assert_eq!(bbox.width(), 10.0);
        assert_eq!(bbox.height(), 15.0);
    }

    #[test]
    fn test_translatable_shouldSkipNotationAndBlankRuns() {
        let style = RunStyle::new(10.0);
        let mut run = TextRun::new("  ", BoundingBox::default(), FontId::new("F1"), style);
        assert!(!run.is_translatable());
        run.text = "Hello".into();
        assert!(run.is_translatable());
        run.notation = true;
        assert!(!run.is_translatable());
    }
}
