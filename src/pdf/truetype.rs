/*!
 * TrueType subsetting.
 *
 * Glyph ids stay stable: unused glyphs keep their slot but lose their
 * outline, so `Identity` CID-to-GID mappings keep working. `.notdef` and
 * the components of kept composite glyphs are always retained. Fonts
 * without a `glyf` table (CFF flavoured OpenType) are returned unchanged.
 */

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU16;

use ttf_parser::{Face, GlyphId, Tag, loca};

use crate::errors::RenderError;

const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

/// Tables dropped from subsets; they describe glyphs that no longer exist
const DROPPED_TABLES: &[&[u8; 4]] = &[b"DSIG", b"hdmx", b"VDMX", b"LTSH", b"kern", b"GPOS", b"GSUB"];

fn font_error(message: impl Into<String>) -> RenderError {
    RenderError::Font(message.into())
}

fn parse_face(data: &[u8]) -> Result<Face<'_>, RenderError> {
    Face::parse(data, 0).map_err(|e| font_error(format!("unreadable font: {}", e)))
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, RenderError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| font_error(format!("truncated glyph at offset {}", offset)))
}

/// Raw tables by tag, in directory order
fn read_tables(face: &Face<'_>) -> BTreeMap<[u8; 4], Vec<u8>> {
    let raw = face.raw_face();
    raw.table_records
        .into_iter()
        .filter_map(|record| raw.table(record.tag).map(|table| (record.tag.to_bytes(), table.to_vec())))
        .collect()
}

/// Whether the font has a table with this tag
pub fn has_table(data: &[u8], tag: &[u8; 4]) -> bool {
    Face::parse(data, 0).is_ok_and(|face| face.raw_face().table(Tag::from_bytes(tag)).is_some())
}

/// Outline bytes of one glyph; empty glyphs have none
fn glyph_data<'a>(locations: &loca::Table<'a>, glyf: &'a [u8], gid: u16) -> &'a [u8] {
    locations
        .glyph_range(GlyphId(gid))
        .and_then(|range| glyf.get(range))
        .unwrap_or(&[])
}

/// Component glyph ids of a composite glyph
fn components(glyph: &[u8]) -> Result<Vec<u16>, RenderError> {
    if glyph.len() < 10 || (read_u16(glyph, 0)? as i16) >= 0 {
        return Ok(Vec::new());
    }
    let mut result = Vec::new();
    let mut offset = 10;
    loop {
        let flags = read_u16(glyph, offset)?;
        result.push(read_u16(glyph, offset + 2)?);
        offset += 4;
        offset += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            offset += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            offset += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            offset += 8;
        }
        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
    Ok(result)
}

fn checksum(table: &[u8]) -> u32 {
    table.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

fn pad4(bytes: &mut Vec<u8>) {
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
}

/// Keep only the outlines of `keep` (plus `.notdef` and components)
pub fn subset(data: &[u8], keep: &BTreeSet<u16>) -> Result<Vec<u8>, RenderError> {
    let face = parse_face(data)?;
    let raw = face.raw_face();
    let (Some(loca_data), Some(glyf)) = (
        raw.table(Tag::from_bytes(b"loca")),
        raw.table(Tag::from_bytes(b"glyf")),
    ) else {
        return Ok(data.to_vec());
    };

    let glyph_count = face.number_of_glyphs();
    let locations = NonZeroU16::new(glyph_count)
        .and_then(|count| loca::Table::parse(count, face.tables().head.index_to_location_format, loca_data))
        .ok_or_else(|| font_error("unreadable loca table"))?;

    let mut kept: BTreeSet<u16> = keep.iter().copied().filter(|g| *g < glyph_count).collect();
    kept.insert(0);
    let mut pending: Vec<u16> = kept.iter().copied().collect();
    while let Some(gid) = pending.pop() {
        for component in components(glyph_data(&locations, glyf, gid))? {
            if component < glyph_count && kept.insert(component) {
                pending.push(component);
            }
        }
    }

    let mut new_glyf = Vec::new();
    let mut new_loca = Vec::with_capacity((glyph_count as usize + 1) * 4);
    for gid in 0..glyph_count {
        new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());
        if kept.contains(&gid) {
            new_glyf.extend_from_slice(glyph_data(&locations, glyf, gid));
            pad4(&mut new_glyf);
        }
    }
    new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());

    let mut tables = read_tables(&face);
    let head = tables
        .get_mut(b"head")
        .filter(|head| head.len() >= 54)
        .ok_or_else(|| font_error("truncated head table"))?;
    head[8..12].copy_from_slice(&[0; 4]);
    head[50..52].copy_from_slice(&1u16.to_be_bytes());

    tables.insert(*b"glyf", new_glyf);
    tables.insert(*b"loca", new_loca);
    for tag in DROPPED_TABLES {
        tables.remove(*tag);
    }

    let version = data
        .get(0..4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| font_error("truncated font header"))?;
    Ok(assemble(version, tables))
}

/// Write an sfnt file from tables, fixing checksums
fn assemble(version: u32, tables: BTreeMap<[u8; 4], Vec<u8>>) -> Vec<u8> {
    let count = tables.len() as u16;
    let mut entry_selector = 0u16;
    while (1u16 << (entry_selector + 1)) <= count {
        entry_selector += 1;
    }
    let search_range = (1u16 << entry_selector) * 16;

    let mut out = Vec::new();
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(&search_range.to_be_bytes());
    out.extend_from_slice(&entry_selector.to_be_bytes());
    out.extend_from_slice(&(count * 16 - search_range).to_be_bytes());

    let mut offset = 12 + tables.len() * 16;
    let mut body = Vec::new();
    let mut head_offset = None;
    for (tag, table) in &tables {
        out.extend_from_slice(tag);
        out.extend_from_slice(&checksum(table).to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(table.len() as u32).to_be_bytes());
        if tag == b"head" {
            head_offset = Some(offset);
        }
        body.extend_from_slice(table);
        pad4(&mut body);
        offset = 12 + tables.len() * 16 + body.len();
    }
    out.extend_from_slice(&body);

    if let Some(head) = head_offset {
        let adjustment = 0xB1B0_AFBAu32.wrapping_sub(checksum(&out));
        out[head + 8..head + 12].copy_from_slice(&adjustment.to_be_bytes());
    }
    out
}
