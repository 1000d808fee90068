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

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completions backend
#[derive(Debug)]
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// API key, may be empty for local servers
    api_key: String,
    /// Base URL including the `/v1` prefix
    base_url: String,
    /// Model name
    model: String,
    /// Declared limits
    capabilities: BackendCapabilities,
}

/// OpenAI chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

/// OpenAI chat completion request
#[derive(Debug, Serialize, Default)]
pub struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    /// Completion choices
    pub choices: Vec<OpenAIChoice>,
}

/// One completion choice
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    /// Generated message
    pub message: OpenAIMessage,
}

impl OpenAIRequest {
    /// Create a new request for a model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(OpenAIMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the completion token limit
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl OpenAI {
    /// Create a new OpenAI-compatible backend from resolved settings
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        let base_url = base_url(&settings.endpoint, DEFAULT_ENDPOINT)?;
        if settings.api_key.is_empty() && base_url == DEFAULT_ENDPOINT {
            return Err(anyhow!("Translation API key is required for the OpenAI backend"));
        }
        Ok(Self {
            client: http_client(settings.timeout)?,
            api_key: settings.api_key.clone(),
            base_url,
            model: settings.model.clone(),
            capabilities: settings.capabilities,
        })
    }

    /// Complete a chat request
    pub async fn complete(
        &self,
        request: &OpenAIRequest,
        source_language: &str,
        target_language: &str,
    ) -> Result<OpenAIResponse, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self.client.post(&url).json(request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let response = builder
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
            error!("OpenAI API error ({}): {}", status, truncate_text(&error_text, 500));
            return Err(classify_http_error(
                status,
                &headers,
                &error_text,
                source_language,
                target_language,
            ));
        }

        response
            .json::<OpenAIResponse>()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse OpenAI response: {}", e)))
    }

    /// Extract text from an OpenAI response
    pub fn extract_text_from_response(response: &OpenAIResponse) -> String {
        response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TranslationBackend for OpenAI {
    fn name(&self) -> &str {
        "openai"
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
        let mut request = OpenAIRequest::new(&self.model)
            .add_message("system", SYSTEM_PROMPT)
            .add_message("user", prompt);
        if let Some(temperature) = options.temperature {
            request = request.temperature(temperature);
        }

        let response = self.complete(&request, source_language, target_language).await?;
        decode_segments(&Self::extract_text_from_response(&response), texts.len())
    }
}
