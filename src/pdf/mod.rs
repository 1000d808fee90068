/*!
 * PDF primitive.
 *
 * The pipeline only talks to `PdfPrimitive`: extract a `Document` from bytes
 * and write a laid-out `Document` back as mono or dual output.
 * `LopdfPrimitive` is the concrete adapter:
 *
 * - `content`: text-state interpreter turning show operations into glyph chunks
 * - `cmap`: ToUnicode CMap parsing
 * - `fonts`: font dictionaries in, output font objects out
 * - `extract`: chunks to lines to paragraph runs
 * - `writer`: page rewriting and output assembly
 * - `truetype`: `glyf`/`loca` subsetting of the output font
 */

use bytes::Bytes;
use lopdf::{Dictionary, Object, ObjectId};

use crate::document::Document;
use crate::errors::{ExtractionError, RenderError};
use crate::layout::{DualLayout, OutputFont, SubsetPlan};

pub mod cmap;
pub mod content;
pub mod extract;
pub mod fonts;
pub mod truetype;
pub mod writer;

pub use extract::LopdfPrimitive;

/// Which output document to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputVariant {
    /// Translated pages only; pages without translation pass through
    Mono,
    /// Original and translated pages combined
    Dual,
}

impl std::fmt::Display for OutputVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mono => write!(f, "mono"),
            Self::Dual => write!(f, "dual"),
        }
    }
}

/// Everything a primitive needs to write one output
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub variant: OutputVariant,
    pub dual_layout: DualLayout,
    pub font: &'a OutputFont,
    pub plan: &'a SubsetPlan,
}

/// Reads and writes paginated documents
pub trait PdfPrimitive: Send + Sync {
    /// Positioned runs, fonts and page geometry of a document
    fn extract(&self, bytes: &[u8]) -> Result<Document, ExtractionError>;

    /// Serialize a laid-out document
    fn write(&self, document: &Document, request: &WriteRequest<'_>) -> Result<Bytes, RenderError>;
}

/// Follow a reference, leaving direct objects alone
pub(crate) fn resolve<'a>(doc: &'a lopdf::Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Dictionary behind an object, through one reference
pub(crate) fn resolve_dict<'a>(doc: &'a lopdf::Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object) {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Numeric value of an integer or real
pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

pub(crate) fn name(object: &Object) -> Option<&[u8]> {
    match object {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// Look up a key on a page, falling back to inherited values
pub(crate) fn inherited<'a>(doc: &'a lopdf::Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?;
        current = resolve_dict(doc, parent)?;
    }
    None
}

/// Page rectangle from `MediaBox`, US Letter when missing
pub(crate) fn media_box(doc: &lopdf::Document, page_id: ObjectId) -> [f32; 4] {
    let values: Option<Vec<f32>> = inherited(doc, page_id, b"MediaBox").and_then(|o| match resolve(doc, o) {
        Object::Array(items) => items.iter().map(|i| number(resolve(doc, i))).collect(),
        _ => None,
    });
    match values.as_deref() {
        Some([x0, y0, x1, y1]) => [x0.min(*x1), y0.min(*y1), x0.max(*x1), y0.max(*y1)],
        _ => [0.0, 0.0, 612.0, 792.0],
    }
}
