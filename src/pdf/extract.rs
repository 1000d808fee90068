/*!
 * Text extraction with lopdf.
 *
 * Each page's content is interpreted into glyph chunks (one per show
 * operation), chunks on the same baseline in the same font are joined into
 * lines, and vertically adjacent lines of the same font and size that
 * overlap horizontally are merged into paragraph runs.
 */

use std::collections::HashMap;

use bytes::Bytes;
use log::{debug, warn};
use lopdf::ObjectId;
use lopdf::content::{Content, Operation};

use crate::document::{
    Alignment, BoundingBox, ContentRef, Document, FontId, Page, RunStyle, TextRun,
};
use crate::errors::{ExtractionError, RenderError};

use super::content::{GlyphChunk, TextInterpreter};
use super::fonts::{LoadedFont, page_fonts};
use super::writer::write_document;
use super::{PdfPrimitive, WriteRequest, media_box};

/// Share of the font size below the baseline
const DESCENT_RATIO: f32 = 0.2;

/// `PdfPrimitive` backed by `lopdf`
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfPrimitive;

impl LopdfPrimitive {
    pub fn new() -> Self {
        Self
    }
}

impl PdfPrimitive for LopdfPrimitive {
    fn extract(&self, bytes: &[u8]) -> Result<Document, ExtractionError> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(ExtractionError::Encrypted);
        }
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(ExtractionError::NoPages);
        }

        let mut document = Document::new(Bytes::copy_from_slice(bytes));
        for (index, page_id) in page_ids.into_iter().enumerate() {
            let page = extract_page(&doc, page_id, index, &mut document)?;
            document.pages.push(page);
        }
        debug!(
            "Extracted {} pages, {} runs, {} fonts",
            document.page_count(),
            document.run_count(),
            document.fonts.len()
        );
        Ok(document)
    }

    fn write(&self, document: &Document, request: &WriteRequest<'_>) -> Result<Bytes, RenderError> {
        write_document(document, request)
    }
}

/// Decoded operations of a page, the same list extraction and writing index into
pub(crate) fn page_operations(doc: &lopdf::Document, page_id: ObjectId) -> Result<Vec<Operation>, String> {
    let data = doc.get_page_content(page_id).map_err(|e| e.to_string())?;
    Content::decode(&data)
        .map(|content| content.operations)
        .map_err(|e| e.to_string())
}

fn extract_page(
    doc: &lopdf::Document,
    page_id: ObjectId,
    index: usize,
    document: &mut Document,
) -> Result<Page, ExtractionError> {
    doc.get_dictionary(page_id).map_err(|e| ExtractionError::Page {
        page: index,
        message: e.to_string(),
    })?;

    let [x0, y0, x1, y1] = media_box(doc, page_id);
    let mut page = Page::new(index, BoundingBox::new(x0, y0, x1, y1));

    let operations = match page_operations(doc, page_id) {
        Ok(operations) => operations,
        Err(e) => {
            warn!("Page {} content cannot be read, passing it through: {}", index + 1, e);
            return Ok(page);
        }
    };

    let fonts = page_fonts(doc, page_id);
    let chunks = TextInterpreter::new(&fonts).run(&operations);
    for run in group_runs(&chunks, &fonts) {
        page.push_run(run);
    }
    for font in fonts.into_values() {
        if page.fonts.contains(&font.resource.id) && !document.fonts.contains_key(&font.resource.id) {
            document.add_font(font.resource);
        }
    }
    Ok(page)
}

/// Chunks of one baseline in one font
#[derive(Debug, Clone)]
struct Line {
    font: Vec<u8>,
    text: String,
    x0: f32,
    x1: f32,
    baseline: f32,
    size: f32,
    vertical: bool,
    refs: Vec<ContentRef>,
}

impl Line {
    fn start(chunk: &GlyphChunk) -> Self {
        Self {
            font: chunk.font.clone(),
            text: chunk.text.clone(),
            x0: chunk.x0,
            x1: chunk.x1,
            baseline: chunk.baseline,
            size: chunk.size,
            vertical: chunk.vertical,
            refs: vec![ContentRef {
                op_index: chunk.op_index,
                adjustment: chunk.adjustment,
            }],
        }
    }

    fn accepts(&self, chunk: &GlyphChunk) -> bool {
        let size = self.size.max(1.0);
        chunk.font == self.font
            && chunk.vertical == self.vertical
            && (chunk.baseline - self.baseline).abs() < size * 0.3
            && similar_size(chunk.size, self.size)
            && chunk.x0 >= self.x1 - size * 0.5
            && chunk.x0 - self.x1 < size * 1.5
    }

    fn push(&mut self, chunk: &GlyphChunk) {
        let gap = chunk.x0 - self.x1;
        if gap > self.size * 0.15 && !self.text.ends_with(' ') && !chunk.text.starts_with(' ') {
            self.text.push(' ');
        }
        self.text.push_str(&chunk.text);
        self.x1 = self.x1.max(chunk.x1);
        self.refs.push(ContentRef {
            op_index: chunk.op_index,
            adjustment: chunk.adjustment,
        });
    }

    fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.x0,
            self.baseline - self.size * DESCENT_RATIO,
            self.x1,
            self.baseline + self.size * (1.0 - DESCENT_RATIO),
        )
    }
}

fn similar_size(a: f32, b: f32) -> bool {
    (a - b).abs() <= a.max(b) * 0.1
}

/// A paragraph under construction
struct Paragraph {
    lines: Vec<Line>,
}

impl Paragraph {
    fn last(&self) -> &Line {
        &self.lines[self.lines.len() - 1]
    }

    fn accepts(&self, line: &Line) -> bool {
        let last = self.last();
        let drop = last.baseline - line.baseline;
        line.font == last.font
            && !line.vertical
            && !last.vertical
            && similar_size(line.size, last.size)
            && drop > last.size * 0.5
            && drop < last.size * 2.0
            && line.bbox().overlaps_horizontally(&last.bbox())
    }

    fn into_run(self, font_id: FontId) -> TextRun {
        let mut text = String::new();
        for line in &self.lines {
            let piece = line.text.trim();
            if text.ends_with('-') && piece.starts_with(|c: char| c.is_lowercase()) {
                text.pop();
            } else if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(piece);
        }

        let bbox = self
            .lines
            .iter()
            .map(Line::bbox)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default();
        let first = &self.lines[0];
        let mut style = RunStyle::new(first.size);
        style.vertical = first.vertical;
        style.alignment = alignment(&self.lines);

        let mut run = TextRun::new(text, bbox, font_id, style);
        run.content_refs = self.lines.into_iter().flat_map(|l| l.refs).collect();
        run
    }
}

/// Centered when left edges wander but centers line up
fn alignment(lines: &[Line]) -> Alignment {
    if lines.len() < 2 {
        return Alignment::Left;
    }
    let size = lines[0].size.max(1.0);
    let lefts_differ = lines.iter().any(|l| (l.x0 - lines[0].x0).abs() > size);
    let center = |l: &Line| (l.x0 + l.x1) / 2.0;
    let centers_match = lines.iter().all(|l| (center(l) - center(&lines[0])).abs() < size * 0.5);
    if lefts_differ && centers_match {
        Alignment::Center
    } else {
        Alignment::Left
    }
}

fn group_runs(chunks: &[GlyphChunk], fonts: &HashMap<Vec<u8>, LoadedFont>) -> Vec<TextRun> {
    let mut lines: Vec<Line> = Vec::new();
    for chunk in chunks.iter().filter(|c| !c.text.trim().is_empty()) {
        match lines.last_mut() {
            Some(line) if line.accepts(chunk) => line.push(chunk),
            _ => lines.push(Line::start(chunk)),
        }
    }

    let mut paragraphs: Vec<Paragraph> = Vec::new();
    for line in lines {
        match paragraphs.last_mut() {
            Some(paragraph) if paragraph.accepts(&line) => paragraph.lines.push(line),
            _ => paragraphs.push(Paragraph { lines: vec![line] }),
        }
    }

    paragraphs
        .into_iter()
        .map(|paragraph| {
            let font_id = fonts
                .get(&paragraph.last().font)
                .map(|f| f.resource.id.clone())
                .unwrap_or_else(|| FontId::new(String::from_utf8_lossy(&paragraph.last().font).into_owned()));
            paragraph.into_run(font_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(op_index: usize, font: &str, text: &str, x0: f32, x1: f32, baseline: f32) -> GlyphChunk {
        GlyphChunk {
            op_index,
            font: font.as_bytes().to_vec(),
            text: text.into(),
            x0,
            x1,
            baseline,
            size: 10.0,
            vertical: false,
            adjustment: -(x1 - x0) * 100.0,
        }
    }

    #[test]
    fn test_groupRuns_shouldBuildParagraphsAndSplitOnFont() {
        let chunks = vec![
            chunk(0, "F1", "The quick", 100.0, 150.0, 700.0),
            chunk(1, "F1", "brown", 153.0, 180.0, 700.0),
            chunk(2, "F1", "fox jumps", 100.0, 150.0, 688.0),
            chunk(3, "F2", "x", 152.0, 157.0, 688.0),
            chunk(4, "F1", "Far away heading", 100.0, 190.0, 500.0),
        ];
        let runs = group_runs(&chunks, &HashMap::new());

        let texts: Vec<&str> = runs.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["The quick brown fox jumps", "x", "Far away heading"]);
        let ops: Vec<usize> = runs[0].content_refs.iter().map(|r| r.op_index).collect();
        assert_eq!(ops, vec![0, 1, 2]);
        assert_eq!(runs[0].bbox.x0, 100.0);
        assert_eq!(runs[0].bbox.x1, 180.0);
        assert_eq!(runs[0].bbox.y1, 708.0);
        assert_eq!(runs[0].bbox.y0, 686.0);
        assert_eq!(runs[1].font, FontId::new("F2"));
    }

    #[test]
    fn test_groupRuns_shouldJoinHyphenatedWordsAndDropBlankChunks() {
        let chunks = vec![
            chunk(0, "F1", "trans-", 100.0, 130.0, 700.0),
            chunk(1, "F1", "   ", 131.0, 140.0, 700.0),
            chunk(2, "F1", "lation", 100.0, 130.0, 688.0),
        ];
        let runs = group_runs(&chunks, &HashMap::new());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "translation");
        assert_eq!(runs[0].content_refs.len(), 2);
    }

    #[test]
    fn test_alignment_shouldDetectCenteredBlocks() {
        let chunks = vec![
            chunk(0, "F1", "A centered title", 100.0, 200.0, 700.0),
            chunk(1, "F1", "subtitle", 125.0, 175.0, 688.0),
        ];
        let runs = group_runs(&chunks, &HashMap::new());
        assert_eq!(runs[0].style.alignment, Alignment::Center);
    }

    #[test]
    fn test_extract_withGarbage_shouldBeMalformed() {
        let result = LopdfPrimitive::new().extract(b"definitely not a pdf");
        assert!(matches!(result, Err(ExtractionError::Malformed(_))));
    }
}
