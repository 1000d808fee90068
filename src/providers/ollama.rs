use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;

use super::batch_protocol::{SYSTEM_PROMPT, build_prompt, decode_segments};
use super::{
    BackendCapabilities, BackendOptions, BackendSettings, TranslationBackend, base_url,
    classify_http_error, classify_transport_error, http_client,
};
use crate::text_utils::truncate_text;

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Ollama backend talking to the local `/api/chat` endpoint
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Model name
    model: String,
    /// Declared limits
    capabilities: BackendCapabilities,
}

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    stream: bool,
}

/// Chat response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Response message
    pub message: ChatMessage,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
}

impl ChatRequest {
    /// Create a new chat request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: None,
            stream: false,
        }
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options
            .get_or_insert_with(GenerationOptions::default)
            .temperature = Some(temperature);
        self
    }
}

impl Ollama {
    /// Create a new Ollama backend from resolved settings
    pub fn from_settings(settings: &BackendSettings) -> Result<Self> {
        Ok(Self {
            base_url: base_url(&settings.endpoint, DEFAULT_ENDPOINT)?,
            client: http_client(settings.timeout)?,
            model: settings.model.clone(),
            capabilities: settings.capabilities,
        })
    }

    /// Send a chat request
    pub async fn chat(
        &self,
        request: &ChatRequest,
        source_language: &str,
        target_language: &str,
    ) -> Result<ChatResponse, BackendError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let response_text = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !status.is_success() {
            error!("Ollama API error ({}): {}", status, truncate_text(&response_text, 500));
            return Err(classify_http_error(
                status,
                &headers,
                &response_text,
                source_language,
                target_language,
            ));
        }

        parse_chat_response(&response_text)
    }
}

/// Parse a chat reply, accepting both a single object and a JSONL stream
fn parse_chat_response(response_text: &str) -> Result<ChatResponse, BackendError> {
    if let Ok(chat_response) = serde_json::from_str::<ChatResponse>(response_text) {
        return Ok(chat_response);
    }

    debug!(
        "Ollama reply is not a single JSON object, trying JSONL: {}",
        truncate_text(response_text, 200)
    );

    let mut content = String::new();
    let mut model = String::new();
    let mut done = false;
    let mut parsed_any = false;
    for line in response_text.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(chunk) = serde_json::from_str::<ChatResponse>(line) else {
            continue;
        };
        parsed_any = true;
        content.push_str(&chunk.message.content);
        if !chunk.model.is_empty() {
            model = chunk.model;
        }
        done |= chunk.done;
    }

    if !parsed_any {
        return Err(BackendError::InvalidResponse(format!(
            "unparseable Ollama response: {}",
            truncate_text(response_text, 200)
        )));
    }

    Ok(ChatResponse {
        model,
        message: ChatMessage {
            role: "assistant".to_string(),
            content,
        },
        done,
    })
}

#[async_trait]
impl TranslationBackend for Ollama {
    fn name(&self) -> &str {
        "ollama"
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
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt,
            },
        ];

        let mut request = ChatRequest::new(&self.model, messages);
        if let Some(temperature) = options.temperature {
            request = request.temperature(temperature);
        }

        let response = self.chat(&request, source_language, target_language).await?;
        decode_segments(&response.message.content, texts.len())
    }
}
