/*!
 * ToUnicode CMap parsing.
 *
 * Only the parts needed to decode text are read: code space ranges (to split
 * a string into codes) and `bfchar` / `bfrange` mappings to UTF-16BE.
 */

use std::collections::HashMap;

/// A range of valid codes of one byte length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeSpace {
    start: u32,
    end: u32,
    len: usize,
}

/// Code to Unicode mapping of one font
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicodeMap {
    spaces: Vec<CodeSpace>,
    map: HashMap<u32, String>,
}

impl ToUnicodeMap {
    /// Parse a decoded CMap stream; unknown syntax is skipped
    pub fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut spaces = Vec::new();
        let mut map = HashMap::new();
        let mut i = 0;

        while i < tokens.len() {
            match tokens[i].as_str() {
                "begincodespacerange" => {
                    i += 1;
                    while i + 1 < tokens.len() && tokens[i] != "endcodespacerange" {
                        let (start, end) = (hex_bytes(&tokens[i]), hex_bytes(&tokens[i + 1]));
                        if !start.is_empty() && start.len() == end.len() {
                            spaces.push(CodeSpace {
                                start: to_code(&start),
                                end: to_code(&end),
                                len: start.len(),
                            });
                        }
                        i += 2;
                    }
                }
                "beginbfchar" => {
                    i += 1;
                    while i + 1 < tokens.len() && tokens[i] != "endbfchar" {
                        let source = to_code(&hex_bytes(&tokens[i]));
                        if let Some(text) = utf16_text(&hex_bytes(&tokens[i + 1])) {
                            map.insert(source, text);
                        }
                        i += 2;
                    }
                }
                "beginbfrange" => {
                    i += 1;
                    while i + 2 < tokens.len() && tokens[i] != "endbfrange" {
                        let low = to_code(&hex_bytes(&tokens[i]));
                        let high = to_code(&hex_bytes(&tokens[i + 1]));
                        if tokens[i + 2] == "[" {
                            i += 3;
                            let mut code = low;
                            while i < tokens.len() && tokens[i] != "]" {
                                if let Some(text) = utf16_text(&hex_bytes(&tokens[i])) {
                                    if code <= high {
                                        map.insert(code, text);
                                    }
                                }
                                code = code.saturating_add(1);
                                i += 1;
                            }
                            i += 1;
                        } else {
                            let first = utf16_text(&hex_bytes(&tokens[i + 2]))
                                .and_then(|t| t.chars().last().map(|c| (t.clone(), c)));
                            if let Some((prefix, last)) = first {
                                let stem: String = {
                                    let mut chars: Vec<char> = prefix.chars().collect();
                                    chars.pop();
                                    chars.into_iter().collect()
                                };
                                for (offset, code) in (low..=high.min(low.saturating_add(0xFFFF))).enumerate() {
                                    if let Some(c) = char::from_u32(last as u32 + offset as u32) {
                                        map.insert(code, format!("{}{}", stem, c));
                                    }
                                }
                            }
                            i += 3;
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }

        Self { spaces, map }
    }

    /// Split a string into codes of the lengths the code space allows
    ///
    /// Without a code space, `default_len` bytes form one code.
    pub fn codes(&self, bytes: &[u8], default_len: usize) -> Vec<u32> {
        let mut codes = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let len = self.code_len(bytes, offset).unwrap_or(default_len).max(1);
            let end = (offset + len).min(bytes.len());
            codes.push(to_code(&bytes[offset..end]));
            offset = end;
        }
        codes
    }

    fn code_len(&self, bytes: &[u8], offset: usize) -> Option<usize> {
        (1..=4).find(|len| {
            offset + len <= bytes.len() && {
                let code = to_code(&bytes[offset..offset + len]);
                self.spaces
                    .iter()
                    .any(|s| s.len == *len && code >= s.start && code <= s.end)
            }
        })
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn tokenize(data: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(data);
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let mut token = String::from("<");
                for next in chars.by_ref() {
                    token.push(next);
                    if next == '>' {
                        break;
                    }
                }
                tokens.push(token);
            }
            '[' | ']' => tokens.push(c.to_string()),
            '%' => {
                for next in chars.by_ref() {
                    if next == '\n' || next == '\r' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {}
            _ => {
                let mut token = c.to_string();
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '<' | '[' | ']') {
                        break;
                    }
                    token.push(next);
                    chars.next();
                }
                tokens.push(token);
            }
        }
    }
    tokens
}

fn hex_bytes(token: &str) -> Vec<u8> {
    let Some(inner) = token.strip_prefix('<').and_then(|t| t.strip_suffix('>')) else {
        return Vec::new();
    };
    let digits: Vec<u8> = inner
        .chars()
        .filter_map(|c| c.to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn to_code(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_text(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect();
    Some(char::decode_utf16(units).map(|r| r.unwrap_or('\u{FFFD}')).collect())
}

/// UTF-16BE hex for a CMap destination
pub(crate) fn utf16_hex(text: &str) -> String {
    text.encode_utf16().map(|u| format!("{:04X}", u)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "/CIDInit /ProcSet findresource begin
        12 dict begin begincmap
        1 begincodespacerange <0000> <FFFF> endcodespacerange
        2 beginbfchar
        <0003> <0020>
        <0011> <D835DC00>
        endbfchar
        2 beginbfrange
        <0024> <0026> <0041>
        <0030> <0031> [<0066006C> <4E2D>]
        endbfrange
        endcmap";

    #[test]
    fn test_parse_shouldReadCharsAndRanges() {
        let cmap = ToUnicodeMap::parse(SAMPLE.as_bytes());
        assert_eq!(cmap.get(0x03), Some(" "));
        assert_eq!(cmap.get(0x11), Some("\u{1D400}"));
        assert_eq!(cmap.get(0x25), Some("B"));
        assert_eq!(cmap.get(0x26), Some("C"));
        assert_eq!(cmap.get(0x30), Some("fl"));
        assert_eq!(cmap.get(0x31), Some("中"));
        assert_eq!(cmap.get(0x27), None);
    }

    #[test]
    fn test_codes_shouldFollowCodeSpace() {
        let cmap = ToUnicodeMap::parse(SAMPLE.as_bytes());
        assert_eq!(cmap.codes(&[0x00, 0x24, 0x00, 0x25], 1), vec![0x24, 0x25]);

        let empty = ToUnicodeMap::default();
        assert_eq!(empty.codes(&[0x41, 0x42], 1), vec![0x41, 0x42]);
        assert_eq!(empty.codes(&[0x00, 0x41], 2), vec![0x41]);
    }

    #[test]
    fn test_utf16Hex_shouldEncodeSurrogates() {
        assert_eq!(utf16_hex("A"), "0041");
        assert_eq!(utf16_hex("\u{1D400}"), "D835DC00");
    }
}
