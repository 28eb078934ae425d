//! HTTP client for the Chatwoot proxy: `{base}?endpoint=<name>&account_id=<id>`.

use crate::chatwoot::normalize::extract_records;
use crate::chatwoot::{ChatwootApi, ChatwootError, ConversationUpdate, Resource};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

/// Client for the Chatwoot proxy.
#[derive(Clone)]
pub struct ProxyClient {
    base_url: String,
    client: reqwest::Client,
}

impl ProxyClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim().to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("chatwoot: building http client with timeout failed ({}), using defaults", e);
                reqwest::Client::new()
            });
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one request to the proxy and return the decoded JSON body (Null when the body is empty).
    async fn request(
        &self,
        method: Method,
        account_id: u64,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ChatwootError> {
        let account = account_id.to_string();
        let mut req = self
            .client
            .request(method.clone(), &self.base_url)
            .query(&[("endpoint", endpoint), ("account_id", account.as_str())]);
        if let Some(body) = body {
            req = req.json(body);
        }
        log::debug!("chatwoot: {} {}", method, endpoint);
        let res = req.send().await.map_err(|e| send_error(e, endpoint))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChatwootError::Api(format!("{} {} {}", endpoint, status, body)));
        }
        let text = res.text().await.map_err(|e| send_error(e, endpoint))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ChatwootError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

fn send_error(e: reqwest::Error, endpoint: &str) -> ChatwootError {
    if e.is_timeout() {
        ChatwootError::Timeout(endpoint.to_string())
    } else {
        ChatwootError::Request(e)
    }
}

#[async_trait]
impl ChatwootApi for ProxyClient {
    async fn fetch_collection(
        &self,
        account_id: u64,
        resource: Resource,
    ) -> Result<Vec<Value>, ChatwootError> {
        let payload = self
            .request(Method::GET, account_id, &resource.endpoint(), None)
            .await?;
        Ok(extract_records(payload, resource.label()))
    }

    async fn update_conversation(
        &self,
        account_id: u64,
        conversation_id: u64,
        update: &ConversationUpdate,
    ) -> Result<(), ChatwootError> {
        let body = serde_json::to_value(update).map_err(|e| ChatwootError::Decode {
            endpoint: "conversations".to_string(),
            message: e.to_string(),
        })?;
        let endpoint = format!("conversations/{}", conversation_id);
        self.request(Method::PATCH, account_id, &endpoint, Some(&body))
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        account_id: u64,
        conversation_id: u64,
        content: &str,
    ) -> Result<(), ChatwootError> {
        let endpoint = format!("conversations/{}/messages", conversation_id);
        let body = json!({
            "content": content,
            "message_type": "outgoing",
            "private": false,
        });
        self.request(Method::POST, account_id, &endpoint, Some(&body))
            .await?;
        Ok(())
    }

    async fn update_contact(
        &self,
        account_id: u64,
        contact_id: u64,
        additional_attributes: &Value,
    ) -> Result<(), ChatwootError> {
        let endpoint = format!("contacts/{}", contact_id);
        let body = json!({ "additional_attributes": additional_attributes });
        self.request(Method::PATCH, account_id, &endpoint, Some(&body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatwoot::{fetch_typed, Agent, ConversationStatus};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ProxyClient {
        ProxyClient::new(format!("{}/proxy", server.uri()), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn fetch_collection_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proxy"))
            .and(query_param("endpoint", "agents"))
            .and(query_param("account_id", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"payload": [
                    {"id": 1, "name": "Ana", "availability_status": "online"},
                    {"id": 2, "name": "Bruno", "availability_status": "offline"}
                ]}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let agents: Vec<Agent> = fetch_typed(&client, 3, Resource::Agents).await.unwrap();
        assert_eq!(agents.len(), 2);
        assert!(agents[0].is_online());
        assert_eq!(agents[1].name, "Bruno");
    }

    #[tokio::test]
    async fn messages_endpoint_is_nested_under_conversation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("endpoint", "conversations/9/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"payload": [{"id": 1}]})),
            )
            .mount(&server)
            .await;

        let records = client_for(&server)
            .fetch_collection(1, Resource::Messages(9))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_collection(1, Resource::Teams)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatwootError::Api(ref m) if m.contains("502")), "{}", err);
    }

    #[tokio::test]
    async fn slow_proxy_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = ProxyClient::new(server.uri(), Duration::from_millis(50));
        let err = client
            .fetch_collection(1, Resource::Contacts)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatwootError::Timeout(ref e) if e == "contacts"), "{}", err);
    }

    #[tokio::test]
    async fn invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_collection(1, Resource::Conversations)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatwootError::Decode { .. }), "{}", err);
    }

    #[tokio::test]
    async fn update_conversation_patches_status() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(query_param("endpoint", "conversations/5"))
            .and(body_json(json!({"status": "resolved"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5})))
            .expect(1)
            .mount(&server)
            .await;

        let update = ConversationUpdate {
            status: Some(ConversationStatus::Resolved),
            ..ConversationUpdate::default()
        };
        client_for(&server)
            .update_conversation(1, 5, &update)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_message_posts_outgoing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("endpoint", "conversations/5/messages"))
            .and(body_json(json!({
                "content": "Olá!",
                "message_type": "outgoing",
                "private": false
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).send_message(1, 5, "Olá!").await.unwrap();
    }
}
