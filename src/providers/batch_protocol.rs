/*!
 * Prompt construction and segment markers for LLM backends.
 *
 * LLMs receive a batch as one message where every segment is preceded by a
 * `<<SEG_n>>` marker and the batch is closed by `<<END>>`. The reply is
 * expected to use the same markers, which lets us split it back into exactly
 * one translation per segment.
 */

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::BackendError;

use super::language_display_name;

static SEGMENT_MARKER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<\s*SEG_(\d+)\s*>>").expect("valid segment marker regex"));

/// A leading chain-of-thought block emitted by reasoning models
static REASONING_BLOCK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*<think>.*?</think>").expect("valid reasoning block regex"));

static END_MARKER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<\s*END\s*>>").expect("valid end marker regex"));

/// System prompt shared by LLM backends
pub const SYSTEM_PROMPT: &str = "You are a professional, authentic machine translation engine.";

/// Default user prompt template
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Translate the following source text from ${lang_in} to ${lang_out}. \
Keep the formula notation {v*} unchanged. \
Each segment starts with a marker like <<SEG_0>>; repeat every marker exactly once, in order, \
followed by the translation of that segment, and finish with <<END>>. \
Output the translation directly without any additional text.\n\
Source Text:\n${text}\nTranslated Text:";

/// Build the user message for a batch
pub fn build_prompt(
    template: Option<&str>,
    texts: &[String],
    source_language: &str,
    target_language: &str,
) -> String {
    let template = template.unwrap_or(DEFAULT_PROMPT_TEMPLATE);
    template
        .replace("${lang_in}", &language_display_name(source_language))
        .replace("${lang_out}", &language_display_name(target_language))
        .replace("${text}", &encode_segments(texts))
}

/// Wrap segments with markers
pub fn encode_segments(texts: &[String]) -> String {
    let mut encoded = String::new();
    for (index, text) in texts.iter().enumerate() {
        encoded.push_str(&format!("<<SEG_{}>>\n{}\n", index, text));
    }
    encoded.push_str("<<END>>");
    encoded
}

/// Drop one leading `<think>...</think>` block; later tags are kept as text
pub fn strip_reasoning(response: &str) -> &str {
    match REASONING_BLOCK_REGEX.find(response) {
        Some(block) => &response[block.end()..],
        None => response,
    }
}

/// Split a model reply into one translation per segment
pub fn decode_segments(response: &str, expected: usize) -> Result<Vec<String>, BackendError> {
    let response = strip_reasoning(response);
    let body = match END_MARKER_REGEX.find(response) {
        Some(end) => &response[..end.start()],
        None => response,
    };

    let markers: Vec<_> = SEGMENT_MARKER_REGEX.captures_iter(body).collect();

    // Models often drop the markers when there is a single segment.
    if markers.is_empty() {
        if expected == 1 && !body.trim().is_empty() {
            return Ok(vec![body.trim().to_string()]);
        }
        return Err(BackendError::InvalidResponse(format!(
            "no segment markers in response for {} segments",
            expected
        )));
    }

    let mut segments: BTreeMap<usize, String> = BTreeMap::new();
    for (position, capture) in markers.iter().enumerate() {
        let (Some(whole), Some(number)) = (capture.get(0), capture.get(1)) else {
            continue;
        };
        let index: usize = number.as_str().parse().map_err(|_| {
            BackendError::InvalidResponse(format!("bad segment marker {}", whole.as_str()))
        })?;
        let end = markers
            .get(position + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(body.len());
        let text = body[whole.end()..end].trim().to_string();
        if segments.insert(index, text).is_some() {
            return Err(BackendError::InvalidResponse(format!(
                "segment {} appears more than once",
                index
            )));
        }
    }

    if segments.len() != expected || segments.keys().enumerate().any(|(i, k)| i != *k) {
        return Err(BackendError::InvalidResponse(format!(
            "expected segments 0..{}, got {:?}",
            expected,
            segments.keys().collect::<Vec<_>>()
        )));
    }

    Ok(segments.into_values().collect())
}
