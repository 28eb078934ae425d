//! Outbound webhooks: best-effort JSON POST plus the payloads sent to configured bots.
//!
//! Bot payloads keep the Portuguese field names the receiving automations already expect.

use crate::state::Bot;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook timed out after {0:?}")]
    Timeout(Duration),
    #[error("webhook returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid webhook url {0:?}")]
    InvalidUrl(String),
    #[error("bot {0} is inactive")]
    InactiveBot(String),
}

/// JSON POST sender shared by the executor and the bot commands.
#[derive(Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl WebhookClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("webhook: building http client with timeout failed ({}), using defaults", e);
                reqwest::Client::new()
            });
        Self { client, timeout }
    }

    /// POST `payload` as JSON. Any 2xx is success and returns the status code.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<u16, WebhookError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|_| WebhookError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WebhookError::InvalidUrl(url.to_string()));
        }
        let res = self
            .client
            .post(parsed)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WebhookError::Timeout(self.timeout)
                } else {
                    WebhookError::Request(e)
                }
            })?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(WebhookError::Status {
                status: status.as_u16(),
                body,
            });
        }
        log::debug!("webhook: {} -> {}", url, status);
        Ok(status.as_u16())
    }

    /// POST `payload` to a bot's webhook. Inactive bots are not contacted.
    pub async fn send_to_bot<T: Serialize + ?Sized>(
        &self,
        bot: &Bot,
        payload: &T,
    ) -> Result<u16, WebhookError> {
        if !bot.active {
            log::info!("webhook: skipping inactive bot {} ({})", bot.name, bot.id);
            return Err(WebhookError::InactiveBot(bot.name.clone()));
        }
        self.post_json(&bot.webhook_url, payload).await
    }
}

/// Payload sent by `bots test`: a fixed sample conversation tagged as a test.
pub fn connectivity_test_payload(bot: &Bot) -> serde_json::Value {
    json!({
        "teste": true,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "mensagem": format!("Teste de conectividade do bot {}", bot.name),
        "dados": {
            "conversa_id": "test-123",
            "contato": {
                "nome": "Cliente Teste",
                "telefone": "+5511999999999",
            },
            "mensagem": "Olá, esta é uma mensagem de teste",
        },
    })
}

/// One simulated customer message to push through a bot.
#[derive(Debug, Clone, Default)]
pub struct ChatSimulation {
    pub conversation_id: String,
    pub contact_name: String,
    pub contact_phone: Option<String>,
    pub message: String,
    pub agent: Option<String>,
    pub company: Option<String>,
}

impl ChatSimulation {
    /// A simulated message with a fresh `sim-<uuid>` conversation id.
    pub fn new(contact_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            conversation_id: format!("sim-{}", uuid::Uuid::new_v4()),
            contact_name: contact_name.into(),
            message: message.into(),
            ..Self::default()
        }
    }
}

pub fn simulation_payload(bot: &Bot, sim: &ChatSimulation) -> serde_json::Value {
    json!({
        "conversa_id": sim.conversation_id,
        "contato": {
            "nome": sim.contact_name,
            "telefone": sim.contact_phone,
        },
        "mensagem": sim.message,
        "agente": sim.agent,
        "empresa": sim.company,
        "metadata": {
            "bot_id": bot.id,
            "bot_nome": bot.name,
            "simulacao": true,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bot(url: &str) -> Bot {
        Bot {
            id: "1".to_string(),
            name: "Triagem".to_string(),
            webhook_url: url.to_string(),
            active: true,
            description: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn posts_json_and_returns_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({"teste": true, "dados": {"conversa_id": "test-123"}})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/hook", server.uri());
        let status = WebhookClient::default()
            .post_json(&url, &connectivity_test_payload(&bot(&url)))
            .await
            .unwrap();
        assert_eq!(status, 202);
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = WebhookClient::default()
            .post_json(&server.uri(), &json!({}))
            .await
            .unwrap_err();
        assert!(
            matches!(err, WebhookError::Status { status: 500, ref body } if body == "boom"),
            "{}",
            err
        );
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let client = WebhookClient::default();
        for url in ["not a url", "ftp://example.com/hook", ""] {
            let err = client.post_json(url, &json!({})).await.unwrap_err();
            assert!(matches!(err, WebhookError::InvalidUrl(_)), "{}", url);
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_request_error() {
        // port 9 (discard) on localhost is not listening in test environments
        let err = WebhookClient::new(Duration::from_secs(2))
            .post_json("http://127.0.0.1:9/hook", &json!({}))
            .await
            .unwrap_err();
        assert!(
            matches!(err, WebhookError::Request(_) | WebhookError::Timeout(_)),
            "{}",
            err
        );
    }

    #[tokio::test]
    async fn inactive_bot_is_not_contacted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut paused = bot(&server.uri());
        paused.active = false;
        let err = WebhookClient::default()
            .send_to_bot(&paused, &connectivity_test_payload(&paused))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InactiveBot(ref name) if name == "Triagem"));
    }

    #[tokio::test]
    async fn active_bot_receives_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let active = bot(&format!("{}/bot", server.uri()));
        let status = WebhookClient::default()
            .send_to_bot(&active, &connectivity_test_payload(&active))
            .await
            .unwrap();
        assert_eq!(status, 200);
    }

    #[test]
    fn simulations_get_distinct_ids() {
        let a = ChatSimulation::new("Rita", "oi");
        let b = ChatSimulation::new("Rita", "oi");
        assert!(a.conversation_id.starts_with("sim-"));
        assert_ne!(a.conversation_id, b.conversation_id);
        assert_eq!(a.contact_name, "Rita");
        assert!(a.company.is_none());
    }

    #[test]
    fn simulation_payload_shape() {
        let sim = ChatSimulation {
            conversation_id: "c-9".to_string(),
            contact_name: "Rita".to_string(),
            contact_phone: Some("+5511988887777".to_string()),
            message: "Quero um orçamento".to_string(),
            agent: Some("Ana".to_string()),
            company: None,
        };
        let payload = simulation_payload(&bot("https://hooks.example/bot"), &sim);
        assert_eq!(payload["conversa_id"], "c-9");
        assert_eq!(payload["contato"]["nome"], "Rita");
        assert_eq!(payload["mensagem"], "Quero um orçamento");
        assert_eq!(payload["agente"], "Ana");
        assert!(payload["empresa"].is_null());
        assert_eq!(payload["metadata"]["bot_id"], "1");
        assert_eq!(payload["metadata"]["simulacao"], true);
    }
}
