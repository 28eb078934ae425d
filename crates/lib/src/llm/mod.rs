//! LLM abstraction and OpenAI-compatible client.
//!
//! The orchestrator only needs "send messages, get text back"; [`LlmClient`] is that seam so
//! tests can plug in fakes. Whether a client exists at all is decided once, at startup.

mod openai;

pub use openai::OpenAiClient;

use crate::config::{self, LlmConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm request timed out after {0:?}")]
    Timeout(Duration),
    #[error("llm api error: {0}")]
    Api(String),
    #[error("llm returned empty content")]
    EmptyContent,
    #[error("llm returned unparseable content: {0}")]
    Parse(String),
}

impl LlmError {
    /// True when the call succeeded but the content was unusable (empty or not the expected JSON).
    pub fn is_content_error(&self) -> bool {
        matches!(self, Self::EmptyContent | Self::Parse(_))
    }
}

/// One chat message (role + content).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model id, for logs.
    fn model(&self) -> &str;

    /// Non-streaming completion; returns the assistant's text. Empty text is [`LlmError::EmptyContent`].
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError>;
}

/// Build the LLM client from config, or None (fallback mode) when no valid API key is configured.
pub fn client_from_config(config: &LlmConfig) -> Option<Arc<dyn LlmClient>> {
    match config::resolve_llm_api_key(config) {
        Ok(key) => {
            log::info!("llm: using model {} at {}", config.model, config.base_url);
            Some(Arc::new(OpenAiClient::new(
                Some(config.base_url.clone()),
                key,
                config.model.clone(),
                config.temperature,
                config.timeout(),
            )))
        }
        Err(e) => {
            log::info!("llm: disabled, orchestrator runs in fallback mode ({})", e);
            None
        }
    }
}

/// Pull a JSON object out of model output: strips markdown fences and surrounding prose.
pub fn extract_json_object(content: &str) -> Result<serde_json::Value, LlmError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if v.is_object() {
            return Ok(v);
        }
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => serde_json::from_str(&trimmed[s..=e])
            .map_err(|err| LlmError::Parse(err.to_string())),
        _ => Err(LlmError::Parse("no json object in model output".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_plain_and_fenced_json() {
        let v = extract_json_object(r#"{"score": 70}"#).unwrap();
        assert_eq!(v["score"], 70);
        let v = extract_json_object("```json\n{\"score\": 40, \"category\": \"cold\"}\n```").unwrap();
        assert_eq!(v["category"], "cold");
        let v = extract_json_object("Here you go: {\"a\": {\"b\": 1}} hope it helps").unwrap();
        assert_eq!(v["a"]["b"], 1);
    }

    #[test]
    fn extract_rejects_empty_and_garbage() {
        assert!(matches!(extract_json_object("  "), Err(LlmError::EmptyContent)));
        assert!(matches!(
            extract_json_object("I cannot help with that"),
            Err(LlmError::Parse(_))
        ));
        assert!(matches!(
            extract_json_object("{not json}"),
            Err(LlmError::Parse(_))
        ));
        assert!(extract_json_object("[1, 2]").is_err());
    }

    #[test]
    fn content_errors_are_classified() {
        assert!(LlmError::EmptyContent.is_content_error());
        assert!(LlmError::Parse("x".into()).is_content_error());
        assert!(!LlmError::Api("500".into()).is_content_error());
        assert!(!LlmError::Timeout(Duration::from_secs(1)).is_content_error());
    }

    #[test]
    fn missing_key_disables_client() {
        let config = LlmConfig {
            api_key: None,
            key_prefix: "this-prefix-never-matches-".to_string(),
            ..LlmConfig::default()
        };
        assert!(client_from_config(&config).is_none());
    }
}
