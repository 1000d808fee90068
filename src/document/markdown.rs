/*!
 * Markdown export of a translated document.
 *
 * Every run becomes one block in extraction order. Runs set noticeably
 * larger than the body text become headings; small runs low on the page are
 * footnotes, and runs inside the bottom margin are page footers. Notation
 * runs are written verbatim. Footnotes and footers are kept in place,
 * collected into a trailing section, or dropped, per `FootnoteMode`.
 */

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use super::model::{Document, Page, TextRun};

/// Headings are at least this much larger than the body size
const HEADING_RATIO: f32 = 1.15;
/// Footnotes are at most this large relative to the body size
const FOOTNOTE_RATIO: f32 = 0.9;
/// Share of the page height, from the bottom, where footnotes may sit
const FOOTNOTE_ZONE: f32 = 0.25;
/// Share of the page height, from the bottom, holding page footers
const FOOTER_ZONE: f32 = 0.06;

/// Where footnotes and page footers go in the Markdown output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootnoteMode {
    /// Left where they appear on the page
    Inline,
    /// Moved to a `Footnotes` section at the end
    #[default]
    Append,
    /// Removed
    Drop,
}

impl fmt::Display for FootnoteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => write!(f, "inline"),
            Self::Append => write!(f, "append"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

impl FromStr for FootnoteMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "append" => Ok(Self::Append),
            "drop" => Ok(Self::Drop),
            other => Err(anyhow!("Invalid markdown footnote mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockKind {
    Heading(usize),
    Paragraph,
    Footnote,
    PageFooter,
}

impl BlockKind {
    fn label(&self) -> &'static str {
        match self {
            Self::PageFooter => "Page Footer",
            _ => "Footnote",
        }
    }
}

struct CollectedNote {
    page_number: usize,
    kind: BlockKind,
    text: String,
}

/// Render the document as Markdown, translated text preferred
pub fn export_markdown(document: &Document, footnotes: FootnoteMode) -> String {
    let body_size = body_font_size(document);
    let mut blocks: Vec<String> = Vec::new();
    let mut notes: Vec<CollectedNote> = Vec::new();

    for page in &document.pages {
        for run in &page.runs {
            let text = block_text(page, run);
            if text.is_empty() {
                continue;
            }
            let kind = classify(page, run, body_size);
            match kind {
                BlockKind::Heading(level) => blocks.push(format!("{} {}", "#".repeat(level), text)),
                BlockKind::Paragraph => blocks.push(text),
                BlockKind::Footnote | BlockKind::PageFooter => match footnotes {
                    FootnoteMode::Inline => blocks.push(text),
                    FootnoteMode::Append => notes.push(CollectedNote {
                        page_number: page.index + 1,
                        kind,
                        text,
                    }),
                    FootnoteMode::Drop => {}
                },
            }
        }
    }

    promote_primary_heading(&mut blocks);
    let mut markdown = blocks.join("\n\n");
    if !notes.is_empty() {
        if !markdown.is_empty() {
            markdown.push_str("\n\n");
        }
        markdown.push_str(&footnote_section(&notes));
    }
    if !markdown.ends_with('\n') {
        markdown.push('\n');
    }
    markdown
}

/// Text a run contributes, on one line
fn block_text(page: &Page, run: &TextRun) -> String {
    let text = match (&run.translated, page.selected) {
        (Some(translated), true) => translated.as_str(),
        _ => run.text.as_str(),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Font size carrying the most characters, rounded to half points
fn body_font_size(document: &Document) -> f32 {
    let mut weights: HashMap<i32, usize> = HashMap::new();
    for run in document.pages.iter().flat_map(|p| &p.runs) {
        if run.notation {
            continue;
        }
        let key = (run.style.font_size * 2.0).round() as i32;
        *weights.entry(key).or_default() += run.text.chars().filter(|c| !c.is_whitespace()).count();
    }
    weights
        .into_iter()
        .max_by(|(size_a, weight_a), (size_b, weight_b)| weight_a.cmp(weight_b).then(size_b.cmp(size_a)))
        .map(|(size, _)| size as f32 / 2.0)
        .unwrap_or(0.0)
}

fn classify(page: &Page, run: &TextRun, body_size: f32) -> BlockKind {
    if run.notation || body_size <= 0.0 {
        return BlockKind::Paragraph;
    }
    let height = page.media_box.height();
    let from_bottom = run.bbox.y1 - page.media_box.y0;
    if height > 0.0 && from_bottom <= height * FOOTER_ZONE {
        return BlockKind::PageFooter;
    }

    let ratio = run.style.font_size / body_size;
    if height > 0.0 && ratio <= FOOTNOTE_RATIO && from_bottom <= height * FOOTNOTE_ZONE {
        BlockKind::Footnote
    } else if ratio >= 1.6 {
        BlockKind::Heading(1)
    } else if ratio >= 1.3 {
        BlockKind::Heading(2)
    } else if ratio >= HEADING_RATIO {
        BlockKind::Heading(3)
    } else {
        BlockKind::Paragraph
    }
}

/// Without a top-level heading, the first `##` heading becomes one
fn promote_primary_heading(blocks: &mut [String]) {
    if blocks.iter().any(|b| b.starts_with("# ")) {
        return;
    }
    if let Some(block) = blocks.iter_mut().find(|b| b.starts_with("## ")) {
        block.replace_range(..3, "# ");
    }
}

fn footnote_section(notes: &[CollectedNote]) -> String {
    let mut lines = vec!["### Footnotes".to_string(), String::new()];
    for note in notes {
        lines.push(format!("**Page {} · {}**", note.page_number, note.kind.label()));
        lines.push(String::new());
        lines.push(note.text.clone());
        lines.push(String::new());
    }
    let mut section = lines.join("\n").trim_end().to_string();
    section.push('\n');
    section
}
