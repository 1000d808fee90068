use anyhow::{Result, anyhow};
use isolang::Language;

/// Language tag utilities
///
/// Documents and backends use tags such as `en`, `zh-CN`, `pt_BR` or `fre`.
/// The primary subtag is validated against ISO 639-1 / ISO 639-2 through
/// `isolang`; an optional region subtag is kept as-is for the backends
/// that care about it (DeepL, script variants of Chinese).

/// ISO 639-2/B codes that differ from their ISO 639-2/T counterpart
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// A parsed language tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageTag {
    /// ISO 639 language
    pub language: Language,
    /// Region or script subtag, upper-cased (e.g. `CN`, `TW`, `BR`)
    pub region: Option<String>,
}

impl LanguageTag {
    /// Parse a tag like `en`, `eng`, `zh-CN` or `pt_br`
    pub fn parse(tag: &str) -> Result<Self> {
        let trimmed = tag.trim();
        let mut parts = trimmed.splitn(2, ['-', '_']);
        let primary = parts.next().unwrap_or_default().to_lowercase();
        let region = parts
            .next()
            .filter(|r| !r.is_empty())
            .map(|r| r.to_uppercase());

        let language = lookup_language(&primary)
            .ok_or_else(|| anyhow!("Invalid language code: {}", tag))?;

        Ok(Self { language, region })
    }

    /// ISO 639-1 code when one exists, ISO 639-3 otherwise
    pub fn primary_code(&self) -> String {
        self.language
            .to_639_1()
            .map(str::to_string)
            .unwrap_or_else(|| self.language.to_639_3().to_string())
    }

    /// English name of the language
    pub fn name(&self) -> &'static str {
        self.language.to_name()
    }
}

fn lookup_language(code: &str) -> Option<Language> {
    match code.len() {
        2 => Language::from_639_1(code),
        3 => {
            let terminological = BIBLIOGRAPHIC_CODES
                .iter()
                .find(|(bibliographic, _)| *bibliographic == code)
                .map(|(_, t)| *t)
                .unwrap_or(code);
            Language::from_639_3(terminological)
        }
        _ => None,
    }
}

/// Validate a language tag, returning an error naming the offending tag
pub fn validate_language_tag(tag: &str) -> Result<()> {
    LanguageTag::parse(tag).map(|_| ())
}

/// Normalize a tag to its primary ISO 639-1 code (falling back to 639-3)
pub fn primary_language_code(tag: &str) -> Result<String> {
    Ok(LanguageTag::parse(tag)?.primary_code())
}

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    Ok(LanguageTag::parse(code)?.language.to_639_3().to_string())
}

/// Check if two language codes name the same language, ignoring regions
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (LanguageTag::parse(code1), LanguageTag::parse(code2)) {
        (Ok(a), Ok(b)) => a.language == b.language,
        _ => false,
    }
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    Ok(LanguageTag::parse(code)?.name().to_string())
}

/// Whether text in this language is written without spaces between words
pub fn is_unspaced_script(tag: &str) -> bool {
    matches!(
        primary_language_code(tag).as_deref(),
        Ok("zh" | "ja" | "th" | "lo" | "km" | "my")
    )
}
