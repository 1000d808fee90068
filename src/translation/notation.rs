/*!
 * Notation protection.
 *
 * Formulas and markup must reach the output untouched. Two mechanisms cover
 * that:
 * - whole runs drawn in a math font, or made only of notation characters,
 *   are classified as notation and never translated
 * - inline spans matching the configured patterns are swapped for `{v0}`,
 *   `{v1}`, ... placeholders before translation and put back afterwards
 *
 * Restoration is strict: every placeholder must come back exactly once.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::app_config::NotationConfig;
use crate::document::model::strip_subset_prefix;

/// Font names of LaTeX and math font families
pub const DEFAULT_FORMULA_FONT_PATTERN: &str = r"^(CM[^R]|MS.M|XY|MT|BL|RM|EU|LA|RS|LINE|LCIRCLE|TeX-|rsfs|txsy|wasy|stmary|.*Mono|.*Code|.*Ital|.*Sym|.*Math)";

/// `$...$` and `\(...\)` inline math
pub const DEFAULT_INLINE_PATTERNS: &[&str] = &[r"\$[^$\n]+\$", r"\\\(.+?\\\)"];

/// Placeholders as a translator may hand them back: `{v1}`, `{ v 1 }`, `{V1}`
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\{\s*v([\d\s]+)\}").expect("valid placeholder regex"));

/// Why guarded text could not be restored
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestorationError {
    #[error("placeholder {{v{0}}} is missing")]
    Missing(usize),

    #[error("placeholder {{v{0}}} appears more than once")]
    Duplicated(usize),

    #[error("placeholder {{v{index}}} is out of range (only {count} spans)")]
    OutOfRange { index: usize, count: usize },
}

/// Text ready for translation plus what its placeholders stand for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuardedText {
    /// Source with notation replaced by placeholders
    pub text: String,
    /// Protected spans; `spans[i]` replaces `{vi}`
    pub spans: Vec<String>,
}

impl GuardedText {
    /// Text without any protected span
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spans: Vec::new(),
        }
    }
}

/// Detects and protects non-translatable notation
#[derive(Debug, Clone)]
pub struct NotationGuard {
    font_pattern: Regex,
    char_pattern: Option<Regex>,
    /// Inline patterns and literal placeholders as one alternation
    inline: Regex,
}

impl NotationGuard {
    pub fn new(config: &NotationConfig) -> Result<Self, regex::Error> {
        let font_pattern = Regex::new(&config.formula_font_pattern)?;
        let char_pattern = config
            .formula_char_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;

        // Literal placeholder-shaped text in the source is guarded too, so it
        // cannot be confused with the placeholders we insert.
        let mut alternatives: Vec<String> = config
            .inline_patterns
            .iter()
            .map(|p| format!("(?:{})", p))
            .collect();
        alternatives.push(format!("(?:{})", PLACEHOLDER_RE.as_str()));
        let inline = Regex::new(&alternatives.join("|"))?;

        Ok(Self {
            font_pattern,
            char_pattern,
            inline,
        })
    }

    /// Whether a font name belongs to a formula font family
    pub fn is_notation_font(&self, font_name: &str) -> bool {
        let name = strip_subset_prefix(font_name);
        !name.is_empty() && self.font_pattern.is_match(name)
    }

    /// Whether a character is notation on its own
    pub fn is_notation_char(&self, ch: char) -> bool {
        if let Some(pattern) = &self.char_pattern {
            let mut buf = [0u8; 4];
            if pattern.is_match(ch.encode_utf8(&mut buf)) {
                return true;
            }
        }
        is_math_char(ch)
    }

    /// Whether a whole run is notation
    pub fn classify_run(&self, text: &str, font_name: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        if self.is_notation_font(font_name) {
            return true;
        }
        text.chars()
            .filter(|c| !c.is_whitespace())
            .all(|c| self.is_notation_char(c))
    }

    /// Replace notation spans with numbered placeholders, left to right
    pub fn guard(&self, text: &str) -> GuardedText {
        let mut spans = Vec::new();
        let guarded = self.inline.replace_all(text, |caps: &regex::Captures| {
            let placeholder = format!("{{v{}}}", spans.len());
            spans.push(caps[0].to_string());
            placeholder
        });
        GuardedText {
            text: guarded.into_owned(),
            spans,
        }
    }

    /// Put protected spans back into a translation
    pub fn restore(&self, translated: &str, spans: &[String]) -> Result<String, RestorationError> {
        restore_placeholders(translated, spans)
    }
}

/// Put protected spans back, checking each placeholder appears exactly once
pub fn restore_placeholders(translated: &str, spans: &[String]) -> Result<String, RestorationError> {
    let mut seen = vec![false; spans.len()];
    for caps in PLACEHOLDER_RE.captures_iter(translated) {
        let index = placeholder_index(&caps[1]);
        match index {
            Some(i) if i < spans.len() => {
                if seen[i] {
                    return Err(RestorationError::Duplicated(i));
                }
                seen[i] = true;
            }
            _ => {
                return Err(RestorationError::OutOfRange {
                    index: index.unwrap_or(usize::MAX),
                    count: spans.len(),
                });
            }
        }
    }
    if let Some(missing) = seen.iter().position(|s| !s) {
        return Err(RestorationError::Missing(missing));
    }

    let restored = PLACEHOLDER_RE.replace_all(translated, |caps: &regex::Captures| {
        placeholder_index(&caps[1])
            .and_then(|i| spans.get(i))
            .cloned()
            .unwrap_or_default()
    });
    Ok(restored.into_owned())
}

fn placeholder_index(digits: &str) -> Option<usize> {
    digits
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .parse()
        .ok()
}

/// Math operators, math alphanumerics, arrows, Greek, modifier letters and
/// undecodable glyphs
fn is_math_char(ch: char) -> bool {
    matches!(ch as u32,
        0x0370..=0x03FF        // Greek and Coptic
        | 0x02B0..=0x02FF      // Spacing modifier letters
        | 0x2190..=0x21FF      // Arrows
        | 0x2200..=0x22FF      // Mathematical operators
        | 0x2300..=0x23FF      // Miscellaneous technical
        | 0x27C0..=0x27FF      // Misc math symbols A, supplemental arrows A
        | 0x2900..=0x2AFF      // Supplemental arrows B, misc math B, supplemental operators
        | 0x1D400..=0x1D7FF    // Mathematical alphanumeric symbols
        | 0xFFFD
    ) || matches!(ch, '+' | '=' | '<' | '>' | '^' | '_' | '|' | '~' | '±' | '×' | '÷' | '¬')
}
