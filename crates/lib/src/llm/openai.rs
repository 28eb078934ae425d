//! OpenAI-compatible chat completions client (`POST {base}/chat/completions`, bearer auth).

use crate::llm::{ChatMessage, LlmClient, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<String>,
        api_key: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("llm: building http client with timeout failed ({}), using defaults", e);
                reqwest::Client::new()
            });
        Self {
            base_url,
            api_key,
            model,
            temperature,
            timeout,
            client,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: false,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: OpenAiChatResponse = res.json().await.map_err(|e| self.transport_error(e))?;
        let content = data
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(content)
    }
}

impl OpenAiClient {
    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            LlmError::Request(e)
        }
    }
}

// --- OpenAI wire types ---

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> OpenAiClient {
        OpenAiClient::new(
            Some(format!("{}/v1/", server.uri())),
            "sk-test".to_string(),
            "gpt-test".to_string(),
            0.2,
            timeout,
        )
    }

    #[tokio::test]
    async fn chat_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"score\": 90}"}}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let out = client
            .chat(vec![ChatMessage::user("score this")])
            .await
            .unwrap();
        assert_eq!(out, "{\"score\": 90}");
        assert_eq!(client.model(), "gpt-test");
    }

    #[tokio::test]
    async fn empty_choices_is_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .chat(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent), "{}", err);
    }

    #[tokio::test]
    async fn unauthorized_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .chat(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api(ref m) if m.contains("401")), "{}", err);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_millis(50))
            .chat(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)), "{}", err);
    }
}
