/*!
 * Output assembly.
 *
 * The source file is reloaded and each translated page is rewritten: the
 * show operations behind translated runs are replaced by an empty `TJ` with
 * the same advance, so the rest of the page (graphics, notation, untranslated
 * text) keeps its position, and the laid-out translation is drawn on top in
 * the output font. Pages are then collected into a flat page tree.
 */

use std::collections::HashMap;

use bytes::Bytes;
use log::debug;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, dictionary};

use crate::document::{Document, Page};
use crate::errors::RenderError;
use crate::layout::{DualLayout, OUTPUT_FONT_ID, OutputFont};

use super::extract::page_operations;
use super::fonts::{embed_output_font, encode_text};
use super::{OutputVariant, WriteRequest, inherited, media_box, resolve_dict};

/// Page attributes that may be inherited from the page tree
const INHERITABLE: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

fn write_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Write(e.to_string())
}

/// Serialize `document` as the requested output variant
pub fn write_document(document: &Document, request: &WriteRequest<'_>) -> Result<Bytes, RenderError> {
    let mut doc = lopdf::Document::load_mem(&document.source).map_err(write_error)?;
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in &page_ids {
        materialize_inherited(&mut doc, *page_id)?;
    }

    let translated = document.pages.iter().any(Page::is_translated);
    let font_id = if translated {
        Some(embed_output_font(&mut doc, request.font, request.plan)?)
    } else {
        None
    };

    let mut kids: Vec<ObjectId> = Vec::with_capacity(page_ids.len() * 2);
    for (index, page_id) in page_ids.iter().copied().enumerate() {
        let page = document.pages.get(index).filter(|p| p.is_translated());
        let rewrite = match (page, font_id) {
            (Some(page), Some(font_id)) => rewrite_page(&mut doc, page_id, page, request.font, font_id)?,
            _ => None,
        };

        // Dual output always pairs every source page with a translated
        // counterpart; untranslated pages get an unmodified one.
        match (request.variant, request.dual_layout) {
            (OutputVariant::Mono, _) => {
                if let Some(rewrite) = rewrite {
                    let dict = page_dict_mut(&mut doc, page_id)?;
                    dict.set("Contents", rewrite.translated);
                    dict.set("Resources", rewrite.resources);
                }
                kids.push(page_id);
            }
            (OutputVariant::Dual, DualLayout::Interleaved) => {
                let mut copy = page_dict_mut(&mut doc, page_id)?.clone();
                if let Some(rewrite) = rewrite {
                    copy.set("Contents", rewrite.translated);
                    copy.set("Resources", rewrite.resources);
                }
                copy.remove(b"Annots");
                kids.push(page_id);
                kids.push(doc.add_object(copy));
            }
            (OutputVariant::Dual, DualLayout::SideBySide) => {
                let [x0, y0, x1, y1] = media_box(&doc, page_id);
                let width = x1 - x0;
                let (contents, resources) = match rewrite {
                    Some(rewrite) => {
                        let operations = side_by_side(rewrite.original_ops, rewrite.translated_ops, width);
                        (Object::Reference(add_content(&mut doc, operations)?), Some(rewrite.resources))
                    }
                    None => match page_operations(&doc, page_id) {
                        Ok(original) => {
                            let operations = side_by_side(original.clone(), original, width);
                            (Object::Reference(add_content(&mut doc, operations)?), None)
                        }
                        Err(_) => (duplicated_contents(&mut doc, page_id, width)?, None),
                    },
                };

                let dict = page_dict_mut(&mut doc, page_id)?;
                dict.set("Contents", contents);
                if let Some(resources) = resources {
                    dict.set("Resources", resources);
                }
                dict.set(
                    "MediaBox",
                    vec![
                        Object::Real(x0),
                        Object::Real(y0),
                        Object::Real(x1 + width),
                        Object::Real(y1),
                    ],
                );
                dict.remove(b"CropBox");
                kids.push(page_id);
            }
        }
    }

    rebuild_page_tree(&mut doc, &kids)?;
    doc.prune_objects();

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(write_error)?;
    debug!("Wrote {} output: {} pages, {} bytes", request.variant, kids.len(), out.len());
    Ok(Bytes::from(out))
}

/// Replacement content for a translated page
struct PageRewrite {
    original_ops: Vec<Operation>,
    translated_ops: Vec<Operation>,
    /// Stream holding `translated_ops`
    translated: ObjectId,
    resources: Dictionary,
}

fn rewrite_page(
    doc: &mut lopdf::Document,
    page_id: ObjectId,
    page: &Page,
    font: &OutputFont,
    font_id: ObjectId,
) -> Result<Option<PageRewrite>, RenderError> {
    let Ok(original_ops) = page_operations(doc, page_id) else {
        debug!("Page {} content unreadable, left untranslated", page.index + 1);
        return Ok(None);
    };

    let mut removed: HashMap<usize, f32> = HashMap::new();
    for run in page.runs.iter().filter(|r| r.translated.is_some() && r.rendering.is_some()) {
        for content_ref in &run.content_refs {
            removed.insert(content_ref.op_index, content_ref.adjustment);
        }
    }
    if removed.is_empty() {
        return Ok(None);
    }

    let mut translated_ops = vec![Operation::new("q", vec![])];
    let stripped = strip_shows(&original_ops, &removed);
    let depth = unbalanced_saves(&stripped);
    translated_ops.extend(stripped);
    translated_ops.extend((0..=depth).map(|_| Operation::new("Q", vec![])));
    translated_ops.extend(draw_translations(page, font));

    let translated = add_content(doc, translated_ops.clone())?;
    let resources = resources_with_font(doc, page_id, font_id);
    Ok(Some(PageRewrite {
        original_ops,
        translated_ops,
        translated,
        resources,
    }))
}

/// `left` on the original page area, `right` shifted one page width right
fn side_by_side(left: Vec<Operation>, right: Vec<Operation>, width: f32) -> Vec<Operation> {
    let mut operations = balanced(left);
    operations.push(Operation::new("q", vec![]));
    operations.push(translate_x(width));
    operations.extend(balanced(right));
    operations.push(Operation::new("Q", vec![]));
    operations
}

/// Wrap in `q`/`Q`, closing any save the content leaves open
fn balanced(operations: Vec<Operation>) -> Vec<Operation> {
    let depth = unbalanced_saves(&operations);
    let mut out = Vec::with_capacity(operations.len() + depth + 2);
    out.push(Operation::new("q", vec![]));
    out.extend(operations);
    out.extend((0..=depth).map(|_| Operation::new("Q", vec![])));
    out
}

fn translate_x(dx: f32) -> Operation {
    Operation::new(
        "cm",
        vec![1.into(), 0.into(), 0.into(), 1.into(), Object::Real(dx), 0.into()],
    )
}

/// Side-by-side contents for a page whose streams cannot be decoded: the
/// original streams are referenced twice around wrapper streams.
fn duplicated_contents(doc: &mut lopdf::Document, page_id: ObjectId, width: f32) -> Result<Object, RenderError> {
    let streams: Vec<Object> = match page_dict_mut(doc, page_id)?.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(object) => vec![object.clone()],
        Err(_) => Vec::new(),
    };
    let open = add_content(doc, vec![Operation::new("q", vec![])])?;
    let shift = add_content(
        doc,
        vec![Operation::new("Q", vec![]), Operation::new("q", vec![]), translate_x(width)],
    )?;
    let close = add_content(doc, vec![Operation::new("Q", vec![])])?;

    let mut parts = vec![Object::Reference(open)];
    parts.extend(streams.iter().cloned());
    parts.push(Object::Reference(shift));
    parts.extend(streams);
    parts.push(Object::Reference(close));
    Ok(Object::Array(parts))
}

/// Replace the shows at `removed` indices with equal-advance `TJ` operations
fn strip_shows(operations: &[Operation], removed: &HashMap<usize, f32>) -> Vec<Operation> {
    let mut out = Vec::with_capacity(operations.len());
    for (index, op) in operations.iter().enumerate() {
        let Some(adjustment) = removed.get(&index) else {
            out.push(op.clone());
            continue;
        };
        let skip = Operation::new("TJ", vec![Object::Array(vec![Object::Real(*adjustment)])]);
        match op.operator.as_str() {
            "'" => {
                out.push(Operation::new("T*", vec![]));
                out.push(skip);
            }
            "\"" => {
                if let [word_spacing, char_spacing, ..] = op.operands.as_slice() {
                    out.push(Operation::new("Tw", vec![word_spacing.clone()]));
                    out.push(Operation::new("Tc", vec![char_spacing.clone()]));
                }
                out.push(Operation::new("T*", vec![]));
                out.push(skip);
            }
            _ => out.push(skip),
        }
    }
    out
}

/// Saves left open at the end of the content
fn unbalanced_saves(operations: &[Operation]) -> usize {
    operations.iter().fold(0usize, |depth, op| match op.operator.as_str() {
        "q" => depth + 1,
        "Q" => depth.saturating_sub(1),
        _ => depth,
    })
}

fn draw_translations(page: &Page, font: &OutputFont) -> Vec<Operation> {
    let mut ops = vec![Operation::new("BT", vec![]), Operation::new("g", vec![0.into()])];
    for run in &page.runs {
        let (Some(_), Some(rendering)) = (&run.translated, &run.rendering) else {
            continue;
        };
        ops.push(Operation::new(
            "Tf",
            vec![OUTPUT_FONT_ID.into(), Object::Real(rendering.font_size)],
        ));
        for line in &rendering.lines {
            ops.push(Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    Object::Real(line.x),
                    Object::Real(line.y),
                ],
            ));
            ops.push(Operation::new("Tj", vec![encode_text(font, &line.text)]));
        }
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

fn add_content(doc: &mut lopdf::Document, operations: Vec<Operation>) -> Result<ObjectId, RenderError> {
    let data = Content { operations }.encode().map_err(write_error)?;
    let mut stream = Stream::new(Dictionary::new(), data);
    // Left uncompressed on failure
    let _ = stream.compress();
    Ok(doc.add_object(stream))
}

/// The page's resources with the output font registered
fn resources_with_font(doc: &lopdf::Document, page_id: ObjectId, font_id: ObjectId) -> Dictionary {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|o| resolve_dict(doc, o))
        .cloned()
        .unwrap_or_default();
    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .cloned()
        .unwrap_or_default();
    fonts.set(OUTPUT_FONT_ID, font_id);
    resources.set("Font", fonts);
    resources
}

fn page_dict_mut(doc: &mut lopdf::Document, page_id: ObjectId) -> Result<&mut Dictionary, RenderError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(write_error)
}

/// Copy inherited attributes onto the page so it can move to a new parent
fn materialize_inherited(doc: &mut lopdf::Document, page_id: ObjectId) -> Result<(), RenderError> {
    let values: Vec<(&[u8], Object)> = INHERITABLE
        .iter()
        .filter_map(|key| inherited(doc, page_id, key).map(|value| (*key, value.clone())))
        .collect();
    let dict = page_dict_mut(doc, page_id)?;
    for (key, value) in values {
        if !dict.has(key) {
            dict.set(key.to_vec(), value);
        }
    }
    Ok(())
}

/// Replace the page tree with one node holding `kids` in order
fn rebuild_page_tree(doc: &mut lopdf::Document, kids: &[ObjectId]) -> Result<(), RenderError> {
    let pages_id = doc.new_object_id();
    for kid in kids {
        page_dict_mut(doc, *kid)?.set("Parent", pages_id);
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => kids.len() as i64,
        }),
    );

    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(write_error)?;
    doc.get_object_mut(root_id)
        .and_then(Object::as_dict_mut)
        .map_err(write_error)?
        .set("Pages", pages_id);
    Ok(())
}
