use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;

use super::batch_protocol::{SYSTEM_PROMPT, build_prompt, decode_segments};
use super::{
    BackendCapabilities, BackendOptions, BackendSettings, TranslationBackend, base_url,
    classify_http_error, classify_transport_error, http_client,
};
use crate::text_utils::truncate_text;

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";

/// Anthropic messages API backend
#[derive(Debug)]
pub struct Anthropic {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API base URL
    endpoint: String,
    /// Model name
    model: String,
    /// Declared limits
    capabilities: BackendCapabilities,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

/// Anthropic message format
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    pub content: Vec<AnthropicContent>,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content, absent for non-text blocks
    #[serde(default)]
    pub text: String,
}

impl AnthropicRequest {
    /// Create a new Anthropic request
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: None,
            temperature: None,
            max_tokens,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(AnthropicMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Anthropic {
    /// Create a new Anthropic backend from resolved settings
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        if settings.api_key.is_empty() {
            return Err(anyhow!("Translation API key is required for the Anthropic backend"));
        }
        Ok(Self {
            client: http_client(settings.timeout)?,
            api_key: settings.api_key.clone(),
            endpoint: base_url(&settings.endpoint, DEFAULT_ENDPOINT)?,
            model: settings.model.clone(),
            capabilities: settings.capabilities,
        })
    }

    /// Complete a messages request
    pub async fn complete(
        &self,
        request: &AnthropicRequest,
        source_language: &str,
        target_language: &str,
    ) -> Result<AnthropicResponse, BackendError> {
        let api_url = format!("{}/v1/messages", self.endpoint);

        let response = self
            .client
            .post(&api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Anthropic API error ({}): {}", status, truncate_text(&error_text, 500));
            return Err(classify_http_error(
                status,
                &headers,
                &error_text,
                source_language,
                target_language,
            ));
        }

        response
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse Anthropic response: {}", e)))
    }

    /// Extract text from Anthropic response
    pub fn extract_text_from_response(response: &AnthropicResponse) -> String {
        response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

#[async_trait]
impl TranslationBackend for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
        options: &BackendOptions,
    ) -> Result<Vec<String>, BackendError> {
        let prompt = build_prompt(
            options.prompt_template.as_deref(),
            texts,
            source_language,
            target_language,
        );
        let mut request = AnthropicRequest::new(&self.model, 4096)
            .system(SYSTEM_PROMPT)
            .add_message("user", prompt);
        if let Some(temperature) = options.temperature {
            request = request.temperature(temperature);
        }

        let response = self.complete(&request, source_language, target_language).await?;
        decode_segments(&Self::extract_text_from_response(&response), texts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractText_shouldJoinTextBlocks() {
        let response: AnthropicResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"<<SEG_0>> Hallo"},{"type":"text","text":" <<END>>"}]}"#,
        )
        .unwrap();
        assert_eq!(
            Anthropic::extract_text_from_response(&response),
            "<<SEG_0>> Hallo <<END>>"
        );
    }

    #[test]
    fn test_fromSettings_withoutKey_shouldFail() {
        assert!(Anthropic::from_settings(&BackendSettings::named("anthropic")).is_err());
    }
}
