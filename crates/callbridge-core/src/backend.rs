//! Chat-completion backend bridge (Groq, OpenAI-compatible wire format).
//!
//! One blocking-style request per turn: system prompt + user text in, reply
//! text out. All transport and HTTP failures are mapped into `BackendError`
//! before they leave this module so the retry policy can classify them.
//!
//! API key: `CALLBRIDGE_API_KEY` (or `GROQ_API_KEY`) in `.env`. Default
//! model: `llama-3.1-8b-instant`.

use crate::config::BackendSettings;
use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// The AI backend capability: prompt in, reply text out.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_text: &str)
        -> Result<String, BackendError>;
}

// OpenAI-compatible request/response
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Map an HTTP status to the backend error taxonomy.
pub fn classify_status(status: u16) -> BackendError {
    match status {
        401 | 403 => BackendError::Unauthorized(status),
        400 | 422 => BackendError::Malformed(format!("HTTP {status}")),
        429 => BackendError::RateLimited,
        other => BackendError::Http(other),
    }
}

/// Groq chat-completions bridge. Keeps replies short (low max_tokens) since
/// everything it returns is spoken aloud.
pub struct GroqBridge {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GroqBridge {
    /// Create a bridge with an explicit API key and the default model.
    pub fn new(api_key: String) -> Self {
        Self::with_settings(api_key, &BackendSettings::default())
    }

    /// Create a bridge from configuration (model, URL, timeouts).
    pub fn with_settings(api_key: String, settings: &BackendSettings) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.trim().to_string(),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: settings
                .api_url
                .clone()
                .unwrap_or_else(|| GROQ_API_BASE.to_string()),
            client,
        }
    }

    /// Build from environment. Priority: `CALLBRIDGE_API_KEY` > `GROQ_API_KEY`.
    /// Returns `None` if no key is found.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("CALLBRIDGE_API_KEY")
            .or_else(|_| std::env::var("GROQ_API_KEY"))
            .ok()?
            .trim()
            .to_string();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key))
    }

    /// Override the model (e.g. `llama-3.1-8b-instant`).
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait]
impl ChatBackend for GroqBridge {
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_text.to_string(),
                },
            ],
            temperature: 0.7,
            max_tokens: 150,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(classify_status(status.as_u16()));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| BackendError::BadReply(e.to_string()))?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::BadReply("no choices in reply".to_string()))?;
        Ok(reply.trim().to_string())
    }
}

/// Placeholder backend: echoes a canned reply. Use for wiring the voice loop
/// without an API key.
#[derive(Debug, Default)]
pub struct PlaceholderBackend {
    /// If set, return this instead of the default message.
    pub reply: Option<String>,
}

impl PlaceholderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
        }
    }
}

#[async_trait]
impl ChatBackend for PlaceholderBackend {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_text: &str,
    ) -> Result<String, BackendError> {
        if let Some(ref r) = self.reply {
            return Ok(r.clone());
        }
        Ok(format!(
            "[backend placeholder: heard \"{}\" — configure CALLBRIDGE_API_KEY]",
            user_text
        ))
    }
}
