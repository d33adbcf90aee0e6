// src/providers/llm.rs
// LLM provider abstraction used for summarization and the agent lanes
// Default: chat completions via Ollama

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the model for a JSON object.
    pub json_output: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: None, json_output: false }
    }
}

impl CompletionOptions {
    pub fn json(temperature: f32) -> Self {
        Self { temperature, max_tokens: None, json_output: true }
    }
}

/// LLM Provider trait - implement this to support new models
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LlmConfig {
    pub ollama_url: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
        }
    }
}

/// Error types for LLM operations
#[derive(Debug, Clone)]
pub enum LlmError {
    ConnectionFailed(String),
    InvalidResponse(String),
    GenerationFailed(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "LLM connection failed: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid LLM response: {}", msg),
            Self::GenerationFailed(msg) => write!(f, "Generation failed: {}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

/// Ollama-based chat provider
pub struct OllamaProvider {
    url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    content: String,
}

impl OllamaProvider {
    pub fn new(config: LlmConfig) -> Self {
        info!(url = %config.ollama_url, model = %config.model, "Initializing Ollama provider");
        Self {
            url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model,
            client: reqwest::Client::new(),
        }
    }

    pub async fn health_check(&self) -> Result<(), LlmError> {
        let health_url = format!("{}/api/tags", self.url);
        self.client
            .get(&health_url)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionFailed(format!("Cannot reach Ollama at {}: {}", self.url, e)))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        debug!(model = %self.model, messages = messages.len(), json = options.json_output, "Completing with Ollama");

        let req = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            format: options.json_output.then_some("json"),
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&req)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(model = %self.model, status = %status, "Ollama chat request failed");
            return Err(LlmError::GenerationFailed(format!("Ollama returned status {}", status)));
        }

        let body: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        info!(model = %self.model, response_len = body.message.content.len(), "Completion done");
        Ok(body.message.content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

static FENCED_JSON: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").ok());

/// Pull a JSON object out of a model reply. Handles bare JSON, fenced code
/// blocks and objects embedded in surrounding prose.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(caps) = FENCED_JSON.as_ref().and_then(|re| re.captures(trimmed)) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&caps[1]) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
