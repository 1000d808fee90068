use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ab_glyph::{Font, FontVec, GlyphId};
use bytes::Bytes;
use log::debug;

use crate::document::{FontId, FontKind, FontResource};
use crate::errors::RenderError;

/// Resource name of the font used for translated text
pub const OUTPUT_FONT_ID: &str = "PTF0";

/// Helvetica advance widths for codes 32..=126, from the standard AFM
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

const HELVETICA_DEFAULT_WIDTH: f32 = 556.0;

/// Advance widths used to measure translated text
pub trait FontMetrics: Send + Sync {
    /// Advance of a character in 1/1000 em
    fn advance(&self, ch: char) -> f32;

    /// Whether the font can draw the character
    fn has_glyph(&self, ch: char) -> bool;

    /// Width of a string at a font size
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        text.chars().map(|c| self.advance(c)).sum::<f32>() * font_size / 1000.0
    }
}

/// A parsed TrueType program
pub struct TrueTypeFont {
    /// PostScript-style name used as `BaseFont`
    pub name: String,
    /// The unmodified font file
    pub data: Bytes,
    font: FontVec,
    units_per_em: f32,
}

impl TrueTypeFont {
    pub fn from_bytes(name: impl Into<String>, data: Bytes) -> Result<Self, RenderError> {
        let font = FontVec::try_from_vec(data.to_vec())
            .map_err(|e| RenderError::Font(format!("invalid font program: {}", e)))?;
        let units_per_em = font.units_per_em().unwrap_or(1000.0);
        Ok(Self {
            name: name.into(),
            data,
            font,
            units_per_em,
        })
    }

    /// Glyph id drawing the character, 0 (`.notdef`) when missing
    pub fn glyph_id(&self, ch: char) -> u16 {
        self.font.glyph_id(ch).0
    }

    /// Advance of a glyph in 1/1000 em
    pub fn glyph_advance(&self, glyph: u16) -> f32 {
        self.font.h_advance_unscaled(GlyphId(glyph)) * 1000.0 / self.units_per_em
    }

    pub fn glyph_count(&self) -> usize {
        self.font.glyph_count()
    }

    /// Ascent in 1/1000 em
    pub fn ascent(&self) -> f32 {
        self.font.ascent_unscaled() * 1000.0 / self.units_per_em
    }

    /// Descent in 1/1000 em, negative below the baseline
    pub fn descent(&self) -> f32 {
        self.font.descent_unscaled() * 1000.0 / self.units_per_em
    }
}

impl fmt::Debug for TrueTypeFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrueTypeFont")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .field("glyphs", &self.glyph_count())
            .finish()
    }
}

/// Font used for translated text
#[derive(Debug, Clone)]
pub enum OutputFont {
    /// Standard-14 Helvetica with WinAnsi encoding, never embedded
    Helvetica,
    /// Embedded TrueType font, written as Type0 / Identity-H
    TrueType(Arc<TrueTypeFont>),
}

impl OutputFont {
    /// Load the configured font file, or fall back to Helvetica
    pub fn load(path: Option<&Path>) -> Result<Self, RenderError> {
        let Some(path) = path else {
            return Ok(Self::Helvetica);
        };
        let data = std::fs::read(path)
            .map_err(|e| RenderError::Font(format!("cannot read {}: {}", path.display(), e)))?;
        let name = path
            .file_stem()
            .map(|s| sanitize_font_name(&s.to_string_lossy()))
            .unwrap_or_else(|| "PdfTransFont".to_string());
        let font = TrueTypeFont::from_bytes(name, Bytes::from(data))?;
        debug!("Loaded output font {:?}", font);
        Ok(Self::TrueType(Arc::new(font)))
    }

    pub fn id(&self) -> FontId {
        FontId::new(OUTPUT_FONT_ID)
    }

    pub fn base_font(&self) -> &str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::TrueType(font) => &font.name,
        }
    }

    /// Font resource describing this font for the given characters
    pub fn resource(&self, used: &BTreeSet<char>) -> FontResource {
        match self {
            Self::Helvetica => {
                let mut resource = FontResource::new(self.id(), "Helvetica", FontKind::Standard);
                resource.default_width = HELVETICA_DEFAULT_WIDTH;
                resource.widths = used
                    .iter()
                    .filter_map(|c| winansi_code(*c).map(|code| (code as u32, self.advance(*c))))
                    .collect();
                resource
            }
            Self::TrueType(font) => {
                let mut resource = FontResource::new(self.id(), font.name.clone(), FontKind::Composite);
                let widths: BTreeMap<u32, f32> = used
                    .iter()
                    .map(|c| {
                        let glyph = font.glyph_id(*c);
                        (glyph as u32, font.glyph_advance(glyph))
                    })
                    .collect();
                resource.widths = widths;
                resource.program = Some(font.data.clone());
                resource
            }
        }
    }
}

impl FontMetrics for OutputFont {
    fn advance(&self, ch: char) -> f32 {
        match self {
            Self::Helvetica => helvetica_width(ch as u32),
            Self::TrueType(font) => font.glyph_advance(font.glyph_id(ch)),
        }
    }

    fn has_glyph(&self, ch: char) -> bool {
        match self {
            Self::Helvetica => winansi_code(ch).is_some(),
            Self::TrueType(font) => font.glyph_id(ch) != 0,
        }
    }
}

/// Helvetica advance of a WinAnsi code in 1/1000 em
pub fn helvetica_width(code: u32) -> f32 {
    match code {
        32..=126 => HELVETICA_WIDTHS[(code - 32) as usize] as f32,
        _ => HELVETICA_DEFAULT_WIDTH,
    }
}

/// WinAnsi code of a character, for the Latin-1 range
pub fn winansi_code(ch: char) -> Option<u8> {
    match ch as u32 {
        code @ (32..=126 | 160..=255) => Some(code as u8),
        _ => None,
    }
}

fn sanitize_font_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect();
    if cleaned.is_empty() {
        "PdfTransFont".to_string()
    } else {
        cleaned
    }
}
