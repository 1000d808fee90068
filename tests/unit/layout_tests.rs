/*!
 * Tests for fitting translated text with the output font
 */

use pdftrans::document::{BoundingBox, RunStyle};
use pdftrans::layout::metrics::FontMetrics;
use pdftrans::layout::{FitOptions, OutputFont, fit_run, line_height_for};

#[test]
fn test_fitRun_withHelvetica_shouldStayInsideBox() {
    let bbox = BoundingBox::new(72.0, 600.0, 272.0, 660.0);
    let options = FitOptions {
        line_height: line_height_for("de"),
        ..FitOptions::default()
    };

    let rendering = fit_run(
        "Die Energie eines Körpers ist proportional zu seiner Masse",
        &bbox,
        &RunStyle::new(12.0),
        &OutputFont::Helvetica,
        &options,
    );

    assert!(!rendering.overflow);
    assert!(rendering.lines.len() > 1);
    for line in &rendering.lines {
        assert!(line.x >= bbox.x0);
        assert!(line.x + line.width <= bbox.x1 + 0.01, "{:?}", line);
        assert!(line.y <= bbox.y1 && line.y >= bbox.y0, "{:?}", line);
    }
}

#[test]
fn test_helvetica_shouldMeasureWithStandardWidths() {
    let font = OutputFont::Helvetica;
    // 'H' is 722 and 'i' is 222 thousandths of an em
    assert!((font.text_width("Hi", 10.0) - 9.44).abs() < 1e-3);
    assert!(font.has_glyph('é'));
    assert!(!font.has_glyph('中'));
}
