use crate::document::{Alignment, BoundingBox, RenderedLine, Rendering, RunStyle};

use super::metrics::FontMetrics;

/// Scale decrement between fitting attempts
pub const SCALE_STEP: f32 = 0.05;

/// Baseline offset below the top of the box, in font sizes
const ASCENT_RATIO: f32 = 0.8;

const EPSILON: f32 = 0.01;

/// Fitting parameters for one target language
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Smallest scale before overflow is accepted
    pub min_scale: f32,
    /// Distance between baselines, in font sizes
    pub line_height: f32,
    /// Wrap between any two characters instead of at spaces
    pub unspaced: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            min_scale: 0.6,
            line_height: 1.2,
            unspaced: false,
        }
    }
}

/// Lay out translated text inside a run's bounding box
///
/// The font size is reduced in `SCALE_STEP` steps until the wrapped text
/// fits, but never below `min_scale`. Text that still does not fit is laid
/// out at the minimum scale and flagged as overflowing.
pub fn fit_run(
    text: &str,
    bbox: &BoundingBox,
    style: &RunStyle,
    font: &dyn FontMetrics,
    options: &FitOptions,
) -> Rendering {
    let min_scale = options.min_scale.clamp(EPSILON, 1.0);
    let max_width = bbox.width().max(EPSILON);
    // Extracted boxes can be a little shorter than the nominal size
    let max_height = bbox.height().max(style.font_size);

    let mut scale = 1.0f32;
    loop {
        let size = style.font_size * scale;
        let lines = wrap(text, font, size, max_width, options.unspaced);
        let widest = lines.iter().map(|l| font.text_width(l, size)).fold(0.0, f32::max);
        let height = block_height(lines.len(), size, options.line_height);
        let fits = widest <= max_width + EPSILON && height <= max_height + EPSILON;

        let at_minimum = scale <= min_scale + EPSILON / 10.0;
        if fits || at_minimum {
            return Rendering {
                lines: position(lines, bbox, style, font, size, options.line_height),
                font_size: size,
                scale,
                overflow: !fits,
            };
        }
        scale = (scale - SCALE_STEP).max(min_scale);
    }
}

fn block_height(line_count: usize, size: f32, line_height: f32) -> f32 {
    match line_count {
        0 => 0.0,
        n => size + (n - 1) as f32 * size * line_height,
    }
}

fn position(
    lines: Vec<String>,
    bbox: &BoundingBox,
    style: &RunStyle,
    font: &dyn FontMetrics,
    size: f32,
    line_height: f32,
) -> Vec<RenderedLine> {
    let first_baseline = bbox.y1 - size * ASCENT_RATIO;
    lines
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let width = font.text_width(&text, size);
            let x = match style.alignment {
                Alignment::Left => bbox.x0,
                Alignment::Center => bbox.x0 + ((bbox.width() - width) / 2.0).max(0.0),
            };
            RenderedLine {
                text,
                x,
                y: first_baseline - i as f32 * size * line_height,
                width,
            }
        })
        .collect()
}

/// Greedy line breaking; explicit newlines always break
pub fn wrap(text: &str, font: &dyn FontMetrics, size: f32, max_width: f32, unspaced: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        if unspaced {
            wrap_chars(paragraph.trim(), font, size, max_width, &mut lines);
        } else {
            wrap_words(paragraph, font, size, max_width, &mut lines);
        }
    }
    lines.retain(|l| !l.is_empty());
    lines
}

fn wrap_words(paragraph: &str, font: &dyn FontMetrics, size: f32, max_width: f32, lines: &mut Vec<String>) {
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if font.text_width(&candidate, size) <= max_width + EPSILON {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if font.text_width(word, size) <= max_width + EPSILON {
            current = word.to_string();
        } else {
            // A single word wider than the box is broken between characters
            let mut pieces = Vec::new();
            wrap_chars(word, font, size, max_width, &mut pieces);
            current = pieces.pop().unwrap_or_default();
            lines.extend(pieces);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
}

fn wrap_chars(paragraph: &str, font: &dyn FontMetrics, size: f32, max_width: f32, lines: &mut Vec<String>) {
    let mut current = String::new();
    let mut width = 0.0;
    for ch in paragraph.chars() {
        let advance = font.advance(ch) * size / 1000.0;
        if !current.is_empty() && width + advance > max_width + EPSILON {
            lines.push(current.trim_end().to_string());
            current.clear();
            width = 0.0;
            if ch.is_whitespace() {
                continue;
            }
        }
        current.push(ch);
        width += advance;
    }
    if !current.trim().is_empty() {
        lines.push(current.trim_end().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character is half an em wide
    struct Fixed;

    impl FontMetrics for Fixed {
        fn advance(&self, _ch: char) -> f32 {
            500.0
        }

        fn has_glyph(&self, _ch: char) -> bool {
            true
        }
    }

    fn bbox(width: f32, height: f32) -> BoundingBox {
        BoundingBox::new(100.0, 500.0, 100.0 + width, 500.0 + height)
    }

    #[test]
    fn test_fitRun_shortText_shouldKeepScaleAndAlignLeft() {
        let r = fit_run("abcd", &bbox(100.0, 10.0), &RunStyle::new(10.0), &Fixed, &FitOptions::default());
        assert_eq!(r.scale, 1.0);
        assert!(!r.overflow);
        assert_eq!(r.lines.len(), 1);
        assert_eq!(r.lines[0].x, 100.0);
        assert_eq!(r.lines[0].width, 20.0);
        assert!((r.lines[0].y - 502.0).abs() < 1e-4);
    }

    #[test]
    fn test_fitRun_centered_shouldOffsetLine() {
        let mut style = RunStyle::new(10.0);
        style.alignment = Alignment::Center;
        let r = fit_run("abcd", &bbox(100.0, 10.0), &style, &Fixed, &FitOptions::default());
        assert_eq!(r.lines[0].x, 140.0);
    }

    #[test]
    fn test_fitRun_slightlyLong_shouldScaleDown() {
        // 24 chars * 5pt = 120pt in a 100pt box, single line
        let r = fit_run(
            "abcdefghijklmnopqrstuvwx",
            &bbox(100.0, 10.0),
            &RunStyle::new(10.0),
            &Fixed,
            &FitOptions::default(),
        );
        assert!(!r.overflow);
        assert!(r.scale < 1.0 && r.scale >= 0.6);
        assert!(r.lines.iter().all(|l| l.width <= 100.0 + EPSILON));
    }

    #[test]
    fn test_fitRun_tooLong_shouldOverflowAtMinimumScale() {
        let text = "word ".repeat(60);
        let r = fit_run(&text, &bbox(100.0, 10.0), &RunStyle::new(10.0), &Fixed, &FitOptions::default());
        assert!(r.overflow);
        assert!((r.scale - 0.6).abs() < 1e-4);
        assert!((r.font_size - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_fitRun_paragraph_shouldWrapWithLineHeight() {
        let options = FitOptions {
            line_height: 1.5,
            ..FitOptions::default()
        };
        let r = fit_run("aaaa bbbb cccc", &bbox(30.0, 40.0), &RunStyle::new(10.0), &Fixed, &options);
        assert_eq!(r.scale, 1.0);
        let texts: Vec<&str> = r.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa", "bbbb", "cccc"]);
        assert!((r.lines[0].y - r.lines[1].y - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_wrap_unspaced_shouldBreakBetweenCharacters() {
        let lines = wrap("一二三四五六", &Fixed, 10.0, 20.0, true);
        assert_eq!(lines, vec!["一二三四", "五六"]);
    }

    #[test]
    fn test_wrap_longWord_shouldSplit() {
        let lines = wrap("abcdefgh ij", &Fixed, 10.0, 20.0, false);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }
}
