/*!
 * Text-state interpreter for page content streams.
 *
 * Walks decoded operations, tracks the graphics and text state that affects
 * glyph placement, and emits one `GlyphChunk` per text-show operation with
 * its decoded text, user-space geometry and the `TJ` displacement that would
 * move the text cursor by the same amount.
 */

use std::collections::HashMap;

use lopdf::Object;
use lopdf::content::Operation;

use super::fonts::LoadedFont;
use super::number;

/// Affine transform `[a b c d e f]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix([f32; 6]);

impl Matrix {
    pub const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn new(values: [f32; 6]) -> Self {
        Self(values)
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self` applied first, then `other`
    pub fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    /// Length of the transformed unit y vector
    pub fn vertical_scale(&self) -> f32 {
        let [_, _, c, d, _, _] = self.0;
        (c * c + d * d).sqrt()
    }
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    let values: Vec<f32> = operands.iter().map(number).collect::<Option<_>>()?;
    let values: [f32; 6] = values.try_into().ok()?;
    Some(Matrix(values))
}

/// Graphics state parameters that affect text
#[derive(Debug, Clone)]
struct TextState {
    ctm: Matrix,
    char_spacing: f32,
    word_spacing: f32,
    /// `Tz` / 100
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
    font: Option<Vec<u8>>,
    font_size: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            font: None,
            font_size: 0.0,
        }
    }
}

/// Text drawn by one show operation
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphChunk {
    /// Index of the show operation
    pub op_index: usize,
    /// Font resource name on the page
    pub font: Vec<u8>,
    pub text: String,
    /// Baseline start and end in user space
    pub x0: f32,
    pub x1: f32,
    pub baseline: f32,
    /// Effective font size in user space
    pub size: f32,
    pub vertical: bool,
    /// Numbers-only `TJ` operand with the same cursor advance
    pub adjustment: f32,
}

/// Interprets content operations against a page's fonts
pub struct TextInterpreter<'a> {
    fonts: &'a HashMap<Vec<u8>, LoadedFont>,
    state: TextState,
    stack: Vec<TextState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
}

impl<'a> TextInterpreter<'a> {
    pub fn new(fonts: &'a HashMap<Vec<u8>, LoadedFont>) -> Self {
        Self {
            fonts,
            state: TextState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
        }
    }

    /// Chunks for every text-show operation, in content order
    pub fn run(mut self, operations: &[Operation]) -> Vec<GlyphChunk> {
        let mut chunks = Vec::new();
        for (index, op) in operations.iter().enumerate() {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(state) = self.stack.pop() {
                        self.state = state;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_operands(operands) {
                        self.state.ctm = m.then(&self.state.ctm);
                    }
                }
                "BT" => {
                    self.text_matrix = Matrix::IDENTITY;
                    self.line_matrix = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let [Object::Name(font), size] = operands {
                        self.state.font = Some(font.clone());
                        self.state.font_size = number(size).unwrap_or(0.0);
                    }
                }
                "Tc" => self.set(operands, |s, v| s.char_spacing = v),
                "Tw" => self.set(operands, |s, v| s.word_spacing = v),
                "Tz" => self.set(operands, |s, v| s.horizontal_scale = v / 100.0),
                "TL" => self.set(operands, |s, v| s.leading = v),
                "Ts" => self.set(operands, |s, v| s.rise = v),
                "Td" => {
                    if let [tx, ty] = operands {
                        self.move_line(number(tx).unwrap_or(0.0), number(ty).unwrap_or(0.0));
                    }
                }
                "TD" => {
                    if let [tx, ty] = operands {
                        let ty = number(ty).unwrap_or(0.0);
                        self.state.leading = -ty;
                        self.move_line(number(tx).unwrap_or(0.0), ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_operands(operands) {
                        self.text_matrix = m;
                        self.line_matrix = m;
                    }
                }
                "T*" => self.next_line(),
                "Tj" => {
                    if let [string @ Object::String(..)] = operands {
                        chunks.extend(self.show(index, std::slice::from_ref(string)));
                    }
                }
                "TJ" => {
                    if let [Object::Array(items)] = operands {
                        chunks.extend(self.show(index, items));
                    }
                }
                "'" => {
                    self.next_line();
                    if let [string @ Object::String(..)] = operands {
                        chunks.extend(self.show(index, std::slice::from_ref(string)));
                    }
                }
                "\"" => {
                    if let [aw, ac, string @ Object::String(..)] = operands {
                        self.state.word_spacing = number(aw).unwrap_or(0.0);
                        self.state.char_spacing = number(ac).unwrap_or(0.0);
                        self.next_line();
                        chunks.extend(self.show(index, std::slice::from_ref(string)));
                    }
                }
                _ => {}
            }
        }
        chunks
    }

    fn set(&mut self, operands: &[Object], apply: impl Fn(&mut TextState, f32)) {
        if let Some(value) = operands.first().and_then(number) {
            apply(&mut self.state, value);
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.state.leading);
    }

    /// Advance the text matrix over a show operand and describe what it drew
    fn show(&mut self, op_index: usize, items: &[Object]) -> Option<GlyphChunk> {
        let font_name = self.state.font.clone()?;
        let fonts = self.fonts;
        let font = fonts.get(&font_name);
        let size = self.state.font_size;
        let scale = self.state.horizontal_scale;
        let vertical = font.is_some_and(|f| f.vertical);

        let start = self.text_matrix.then(&self.state.ctm);
        let (x0, baseline) = start.apply(0.0, self.state.rise);
        let effective_size = size * start.vertical_scale();

        let mut text = String::new();
        let mut advance = 0.0f32;
        for item in items {
            match item {
                Object::String(bytes, _) => {
                    let glyphs = match font {
                        Some(font) => font.decode(bytes),
                        None => Vec::new(),
                    };
                    for glyph in glyphs {
                        let spacing = self.state.char_spacing
                            + if glyph.is_space { self.state.word_spacing } else { 0.0 };
                        let step = if vertical {
                            glyph.width / 1000.0 * size + spacing
                        } else {
                            (glyph.width / 1000.0 * size + spacing) * scale
                        };
                        advance += step;
                        self.advance_cursor(step, vertical);
                        text.push_str(&glyph.text);
                    }
                }
                other => {
                    if let Some(n) = number(other) {
                        let step = if vertical {
                            -n / 1000.0 * size
                        } else {
                            -n / 1000.0 * size * scale
                        };
                        advance += step;
                        self.advance_cursor(step, vertical);
                    }
                }
            }
        }

        let end = self.text_matrix.then(&self.state.ctm);
        let (x1, _) = end.apply(0.0, self.state.rise);
        let denominator = if vertical { size } else { size * scale };
        let adjustment = if denominator.abs() > f32::EPSILON {
            -advance * 1000.0 / denominator
        } else {
            0.0
        };

        Some(GlyphChunk {
            op_index,
            font: font_name,
            text,
            x0: x0.min(x1),
            x1: x0.max(x1),
            baseline,
            size: effective_size,
            vertical,
            adjustment,
        })
    }

    fn advance_cursor(&mut self, step: f32, vertical: bool) {
        let translation = if vertical {
            Matrix::translate(0.0, -step)
        } else {
            Matrix::translate(step, 0.0)
        };
        self.text_matrix = translation.then(&self.text_matrix);
    }
}
