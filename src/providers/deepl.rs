use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::language_utils::LanguageTag;
use crate::text_utils::truncate_text;

use super::{
    BackendCapabilities, BackendOptions, BackendSettings, PairSupport, TranslationBackend,
    base_url, classify_http_error, classify_transport_error, http_client, pair_table_support,
};

const DEFAULT_ENDPOINT: &str = "https://api-free.deepl.com";

/// DeepL accepts at most 50 texts per request
pub const DEEPL_MAX_BATCH: usize = 50;

/// Primary languages DeepL translates from
const SOURCE_LANGUAGES: &[&str] = &[
    "ar", "bg", "cs", "da", "de", "el", "en", "es", "et", "fi", "fr", "hu", "id", "it", "ja",
    "ko", "lt", "lv", "nb", "nl", "pl", "pt", "ro", "ru", "sk", "sl", "sv", "tr", "uk", "zh",
];

/// Primary languages DeepL translates into
const TARGET_LANGUAGES: &[&str] = SOURCE_LANGUAGES;

/// DeepL REST backend
#[derive(Debug)]
pub struct DeepL {
    client: Client,
    api_key: String,
    endpoint: String,
    capabilities: BackendCapabilities,
    language_pairs: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DeepLRequest<'a> {
    text: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,
    target_lang: String,
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

impl DeepL {
    /// Create a new DeepL backend from resolved settings
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        if settings.api_key.is_empty() {
            return Err(anyhow!("Translation API key is required for the DeepL backend"));
        }
        // Free-tier keys end in ":fx" and live on a separate host
        let default_endpoint = if settings.api_key.ends_with(":fx") {
            DEFAULT_ENDPOINT
        } else {
            "https://api.deepl.com"
        };
        Ok(Self {
            client: http_client(settings.timeout)?,
            api_key: settings.api_key.clone(),
            endpoint: base_url(&settings.endpoint, default_endpoint)?,
            capabilities: BackendCapabilities::new(
                settings.capabilities.max_batch_size.min(DEEPL_MAX_BATCH),
                settings.capabilities.max_in_flight,
            ),
            language_pairs: settings.language_pairs.clone(),
        })
    }
}

/// Source language code in DeepL's format (no regional variants)
fn deepl_source_code(tag: &str) -> Option<String> {
    let parsed = LanguageTag::parse(tag).ok()?;
    let code = parsed.primary_code();
    SOURCE_LANGUAGES
        .contains(&code.as_str())
        .then(|| code.to_uppercase())
}

/// Target language code in DeepL's format (`EN-US`, `PT-BR`, `ZH-HANS`, ...)
fn deepl_target_code(tag: &str) -> Option<String> {
    let parsed = LanguageTag::parse(tag).ok()?;
    let code = parsed.primary_code();
    if !TARGET_LANGUAGES.contains(&code.as_str()) {
        return None;
    }
    let region = parsed.region.as_deref();
    let target = match (code.as_str(), region) {
        ("en", Some("GB" | "UK")) => "EN-GB".to_string(),
        ("en", _) => "EN-US".to_string(),
        ("pt", Some("PT")) => "PT-PT".to_string(),
        ("pt", _) => "PT-BR".to_string(),
        ("zh", Some("TW" | "HK" | "HANT")) => "ZH-HANT".to_string(),
        ("zh", _) => "ZH-HANS".to_string(),
        (other, _) => other.to_uppercase(),
    };
    Some(target)
}

#[async_trait]
impl TranslationBackend for DeepL {
    fn name(&self) -> &str {
        "deepl"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn supports_pair(&self, source_language: &str, target_language: &str) -> PairSupport {
        if deepl_source_code(source_language).is_none() || deepl_target_code(target_language).is_none() {
            return PairSupport::Unsupported;
        }
        match pair_table_support(&self.language_pairs, source_language, target_language) {
            PairSupport::Unsupported => PairSupport::Unsupported,
            _ => PairSupport::Supported,
        }
    }

    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
        _options: &BackendOptions,
    ) -> Result<Vec<String>, BackendError> {
        let unsupported = || BackendError::UnsupportedLanguagePair {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
        };
        let target_lang = deepl_target_code(target_language).ok_or_else(unsupported)?;
        let source_lang = Some(deepl_source_code(source_language).ok_or_else(unsupported)?);

        let request = DeepLRequest {
            text: texts,
            source_lang,
            target_lang,
        };

        let response = self
            .client
            .post(format!("{}/v2/translate", self.endpoint))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let error_text = response.text().await.unwrap_or_default();
            error!("DeepL API error ({}): {}", status, truncate_text(&error_text, 500));
            // 456: character quota exhausted, nothing else will succeed either
            if status.as_u16() == 456 {
                return Err(BackendError::AuthenticationFailed(format!(
                    "DeepL quota exceeded: {}",
                    truncate_text(&error_text, 200)
                )));
            }
            return Err(classify_http_error(
                status,
                &headers,
                &error_text,
                source_language,
                target_language,
            ));
        }

        let parsed: DeepLResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse DeepL response: {}", e)))?;

        if parsed.translations.len() != texts.len() {
            return Err(BackendError::InvalidResponse(format!(
                "DeepL returned {} translations for {} texts",
                parsed.translations.len(),
                texts.len()
            )));
        }

        Ok(parsed.translations.into_iter().map(|t| t.text).collect())
    }
}
