/*!
 * Font handling for the lopdf adapter.
 *
 * Reading: page font dictionaries become `LoadedFont`s that turn string
 * bytes into codes, Unicode text and advance widths.
 * Writing: the output font is added to the document, as Standard-14
 * Helvetica or as an embedded Type0 / Identity-H TrueType font with `W`
 * widths and a `ToUnicode` CMap.
 */

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bytes::Bytes;
use log::debug;
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat, dictionary};
use sha2::{Digest, Sha256};

use crate::document::{FontId, FontKind, FontResource};
use crate::errors::RenderError;
use crate::layout::metrics::{TrueTypeFont, helvetica_width, winansi_code};
use crate::layout::{OutputFont, SubsetPlan};

use super::cmap::{ToUnicodeMap, utf16_hex};
use super::{inherited, name, number, resolve, resolve_dict, truetype};

const STANDARD_FONTS: &[&str] = &[
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
    "Symbol",
    "ZapfDingbats",
];

/// One decoded glyph of a shown string
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGlyph {
    pub code: u32,
    pub text: String,
    /// Advance in 1/1000 em
    pub width: f32,
    /// Single-byte code 32, which receives word spacing
    pub is_space: bool,
}

/// A page font ready to decode strings
#[derive(Debug, Clone)]
pub struct LoadedFont {
    pub resource: FontResource,
    pub vertical: bool,
    to_unicode: Option<ToUnicodeMap>,
}

impl LoadedFont {
    /// Single-byte font without a ToUnicode map
    pub fn simple(resource: FontResource) -> Self {
        Self {
            resource,
            vertical: false,
            to_unicode: None,
        }
    }

    /// Read a font dictionary
    pub fn load(doc: &lopdf::Document, id: FontId, dict: &Dictionary) -> Self {
        let subtype = dict.get(b"Subtype").ok().and_then(name).unwrap_or_default();
        let base_font = dict
            .get(b"BaseFont")
            .ok()
            .and_then(|o| name(resolve(doc, o)))
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_default();

        let composite = subtype == b"Type0";
        let descendant = if composite {
            dict.get(b"DescendantFonts")
                .ok()
                .and_then(|o| match resolve(doc, o) {
                    Object::Array(items) => items.first(),
                    _ => None,
                })
                .and_then(|o| resolve_dict(doc, o))
        } else {
            None
        };

        let descriptor_holder = descendant.unwrap_or(dict);
        let descriptor = descriptor_holder
            .get(b"FontDescriptor")
            .ok()
            .and_then(|o| resolve_dict(doc, o));
        let program = descriptor.and_then(|d| font_program(doc, d));

        let kind = if composite {
            FontKind::Composite
        } else if program.is_none() && STANDARD_FONTS.contains(&base_font.as_str()) {
            FontKind::Standard
        } else {
            FontKind::Simple
        };

        let mut resource = FontResource::new(id, base_font, kind);
        resource.program = program;
        match descendant {
            Some(cid_font) => read_cid_widths(doc, cid_font, &mut resource),
            None => read_simple_widths(doc, dict, &mut resource),
        }

        let vertical = composite
            && dict
                .get(b"Encoding")
                .ok()
                .and_then(|o| name(resolve(doc, o)))
                .is_some_and(|n| n.ends_with(b"-V"));

        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| match resolve(doc, o) {
                Object::Stream(stream) => stream
                    .decompressed_content()
                    .ok()
                    .or_else(|| Some(stream.content.clone())),
                _ => None,
            })
            .map(|data| ToUnicodeMap::parse(&data))
            .filter(|map| !map.is_empty());

        Self {
            resource,
            vertical,
            to_unicode,
        }
    }

    fn code_len(&self) -> usize {
        if self.resource.kind == FontKind::Composite { 2 } else { 1 }
    }

    /// Split a string into glyphs
    pub fn decode(&self, bytes: &[u8]) -> Vec<DecodedGlyph> {
        let default_len = self.code_len();
        let codes = match &self.to_unicode {
            Some(map) if self.resource.kind == FontKind::Composite => map.codes(bytes, default_len),
            _ => ToUnicodeMap::default().codes(bytes, default_len),
        };

        codes
            .into_iter()
            .map(|code| {
                let text = match self.to_unicode.as_ref().and_then(|m| m.get(code)) {
                    Some(text) => text.to_string(),
                    None if self.resource.kind == FontKind::Composite => "\u{FFFD}".to_string(),
                    None => single_byte_char(code).to_string(),
                };
                DecodedGlyph {
                    code,
                    text,
                    width: self.resource.width(code),
                    is_space: default_len == 1 && code == 32,
                }
            })
            .collect()
    }
}

/// WinAnsi / Latin-1 character of a single-byte code
fn single_byte_char(code: u32) -> char {
    match code {
        0x80 => '€',
        0x85 => '…',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        0x99 => '™',
        0x00..=0xFF => char::from_u32(code).unwrap_or('\u{FFFD}'),
        _ => '\u{FFFD}',
    }
}

fn font_program(doc: &lopdf::Document, descriptor: &Dictionary) -> Option<Bytes> {
    for key in [&b"FontFile2"[..], &b"FontFile3"[..], &b"FontFile"[..]] {
        if let Ok(Object::Stream(stream)) = descriptor.get(key).map(|o| resolve(doc, o)) {
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            return Some(Bytes::from(data));
        }
    }
    None
}

fn read_simple_widths(doc: &lopdf::Document, dict: &Dictionary, resource: &mut FontResource) {
    let first_char = dict
        .get(b"FirstChar")
        .ok()
        .and_then(|o| number(resolve(doc, o)))
        .unwrap_or(0.0) as u32;
    if let Ok(Object::Array(widths)) = dict.get(b"Widths").map(|o| resolve(doc, o)) {
        for (offset, width) in widths.iter().enumerate() {
            if let Some(w) = number(resolve(doc, width)) {
                resource.widths.insert(first_char + offset as u32, w);
            }
        }
        return;
    }

    if resource.kind == FontKind::Standard {
        if resource.base_font.starts_with("Courier") {
            resource.default_width = 600.0;
        } else {
            resource.widths = (32..=126).map(|code| (code, helvetica_width(code))).collect();
            resource.default_width = helvetica_width(0);
        }
    }
}

fn read_cid_widths(doc: &lopdf::Document, cid_font: &Dictionary, resource: &mut FontResource) {
    if let Some(dw) = cid_font.get(b"DW").ok().and_then(|o| number(resolve(doc, o))) {
        resource.default_width = dw;
    }
    let Ok(Object::Array(items)) = cid_font.get(b"W").map(|o| resolve(doc, o)) else {
        return;
    };

    let mut i = 0;
    while i < items.len() {
        let Some(first) = number(resolve(doc, &items[i])) else {
            i += 1;
            continue;
        };
        match items.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(widths)) => {
                for (offset, width) in widths.iter().enumerate() {
                    if let Some(w) = number(resolve(doc, width)) {
                        resource.widths.insert(first as u32 + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = number(last).unwrap_or(first) as u32;
                let width = items
                    .get(i + 2)
                    .and_then(|o| number(resolve(doc, o)))
                    .unwrap_or(resource.default_width);
                for code in (first as u32)..=last.min(first as u32 + 0xFFFF) {
                    resource.widths.insert(code, width);
                }
                i += 3;
            }
            None => break,
        }
    }
}

/// Fonts of a page by resource name
pub fn page_fonts(doc: &lopdf::Document, page_id: ObjectId) -> HashMap<Vec<u8>, LoadedFont> {
    let mut fonts = HashMap::new();
    let Some(resources) = inherited(doc, page_id, b"Resources").and_then(|o| resolve_dict(doc, o)) else {
        return fonts;
    };
    let Some(font_dict) = resources.get(b"Font").ok().and_then(|o| resolve_dict(doc, o)) else {
        return fonts;
    };

    for (resource_name, object) in font_dict.iter() {
        let Some(dict) = resolve_dict(doc, object) else {
            continue;
        };
        let label = String::from_utf8_lossy(resource_name);
        let id = match object {
            Object::Reference((num, generation)) => FontId::new(format!("{}#{}.{}", label, num, generation)),
            _ => FontId::new(format!("{}@{}.{}", label, page_id.0, page_id.1)),
        };
        fonts.insert(resource_name.clone(), LoadedFont::load(doc, id, dict));
    }
    fonts
}

/// Encode a line of text as a show operand for the output font
pub fn encode_text(font: &OutputFont, text: &str) -> Object {
    match font {
        OutputFont::Helvetica => {
            let bytes: Vec<u8> = text.chars().map(|c| winansi_code(c).unwrap_or(b'?')).collect();
            Object::String(bytes, StringFormat::Literal)
        }
        OutputFont::TrueType(ttf) => {
            let bytes: Vec<u8> = text
                .chars()
                .flat_map(|c| ttf.glyph_id(c).to_be_bytes())
                .collect();
            Object::String(bytes, StringFormat::Hexadecimal)
        }
    }
}

/// Add the output font's objects, returning the font dictionary id
pub fn embed_output_font(
    doc: &mut lopdf::Document,
    font: &OutputFont,
    plan: &SubsetPlan,
) -> Result<ObjectId, RenderError> {
    match font {
        OutputFont::Helvetica => Ok(doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        })),
        OutputFont::TrueType(ttf) => embed_truetype(doc, ttf, plan),
    }
}

fn embed_truetype(doc: &mut lopdf::Document, ttf: &TrueTypeFont, plan: &SubsetPlan) -> Result<ObjectId, RenderError> {
    let chars = plan.output_chars();
    let glyphs: BTreeMap<u16, char> = chars.iter().map(|c| (ttf.glyph_id(*c), *c)).collect();
    let glyph_ids: BTreeSet<u16> = glyphs.keys().copied().collect();

    let (program, base_font) = if plan.enabled {
        let subset = truetype::subset(&ttf.data, &glyph_ids)?;
        (subset, format!("{}+{}", subset_tag(&glyph_ids), ttf.name))
    } else {
        (ttf.data.to_vec(), ttf.name.clone())
    };
    let is_truetype = truetype::has_table(&program, b"glyf");
    debug!(
        "Embedding {} ({} glyphs, {} bytes)",
        base_font,
        glyph_ids.len(),
        program.len()
    );

    let length = program.len() as i64;
    let mut file_stream = Stream::new(dictionary! { "Length1" => length }, program);
    if !is_truetype {
        file_stream.dict.set("Subtype", Object::Name(b"OpenType".to_vec()));
    }
    // Left uncompressed on failure
    let _ = file_stream.compress();
    let file_id = doc.add_object(file_stream);

    let mut descriptor = dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(base_font.clone().into_bytes()),
        "Flags" => 32,
        "FontBBox" => vec![0.into(), Object::Real(ttf.descent()), 1000.into(), Object::Real(ttf.ascent())],
        "ItalicAngle" => 0,
        "Ascent" => Object::Real(ttf.ascent()),
        "Descent" => Object::Real(ttf.descent()),
        "CapHeight" => 700,
        "StemV" => 80,
    };
    descriptor.set(if is_truetype { "FontFile2" } else { "FontFile3" }, file_id);
    let descriptor_id = doc.add_object(descriptor);

    let widths: Vec<Object> = glyph_ids
        .iter()
        .flat_map(|gid| {
            [
                Object::Integer(*gid as i64),
                Object::Array(vec![Object::Real(ttf.glyph_advance(*gid))]),
            ]
        })
        .collect();

    let mut cid_font = dictionary! {
        "Type" => "Font",
        "Subtype" => if is_truetype { "CIDFontType2" } else { "CIDFontType0" },
        "BaseFont" => Object::Name(base_font.clone().into_bytes()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
        "W" => widths,
    };
    if is_truetype {
        cid_font.set("CIDToGIDMap", "Identity");
    }
    let cid_font_id = doc.add_object(cid_font);

    let to_unicode_id = doc.add_object(Stream::new(Dictionary::new(), to_unicode_cmap(&glyphs).into_bytes()));

    Ok(doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(base_font.into_bytes()),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![cid_font_id.into()],
        "ToUnicode" => to_unicode_id,
    }))
}

/// Six uppercase letters derived from the glyph set
fn subset_tag(glyphs: &BTreeSet<u16>) -> String {
    let mut hasher = Sha256::new();
    for gid in glyphs {
        hasher.update(gid.to_be_bytes());
    }
    hasher
        .finalize()
        .iter()
        .take(6)
        .map(|b| (b'A' + b % 26) as char)
        .collect()
}

fn to_unicode_cmap(glyphs: &BTreeMap<u16, char>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<(&u16, &char)> = glyphs.iter().filter(|(gid, _)| **gid != 0).collect();
    for block in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (gid, ch) in block {
            cmap.push_str(&format!("<{:04X}> <{}>\n", gid, utf16_hex(&ch.to_string())));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}
