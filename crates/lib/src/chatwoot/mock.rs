//! In-memory Chatwoot used for demos and tests. Records every mutation it receives.

use crate::chatwoot::normalize::extract_records;
use crate::chatwoot::{ChatwootApi, ChatwootError, ConversationUpdate, Resource};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// A mutation the mock received, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    ConversationUpdated {
        conversation_id: u64,
        update: ConversationUpdate,
    },
    MessageSent {
        conversation_id: u64,
        content: String,
    },
    ContactUpdated {
        contact_id: u64,
        additional_attributes: Value,
    },
}

/// Serves raw payloads per endpoint (run through the same normalizer as the real client).
pub struct MockChatwoot {
    payloads: RwLock<HashMap<String, Value>>,
    failing_endpoints: RwLock<HashSet<String>>,
    failing_conversations: RwLock<HashSet<u64>>,
    mutations: RwLock<Vec<Mutation>>,
}

impl Default for MockChatwoot {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChatwoot {
    /// Empty mock: every list endpoint returns no records.
    pub fn new() -> Self {
        Self {
            payloads: RwLock::new(HashMap::new()),
            failing_endpoints: RwLock::new(HashSet::new()),
            failing_conversations: RwLock::new(HashSet::new()),
            mutations: RwLock::new(Vec::new()),
        }
    }

    /// Mock preloaded with a small support desk. Payloads use different envelope shapes on purpose.
    pub fn with_sample_data() -> Self {
        let now = chrono::Utc::now().timestamp();
        let mut payloads = HashMap::new();
        payloads.insert(
            "conversations".to_string(),
            json!({"data": {"payload": [
                {
                    "id": 101,
                    "status": "open",
                    "inbox_id": 1,
                    "unread_count": 2,
                    "created_at": now - 600,
                    "meta": {"sender": {"id": 501, "name": "Maria Souza", "phone_number": "+5511988887777"}},
                    "messages": [
                        {"id": 1, "content": "Olá, preciso de ajuda urgente com meu pedido", "message_type": 0, "created_at": now - 600}
                    ]
                },
                {
                    "id": 102,
                    "status": "resolved",
                    "inbox_id": 1,
                    "unread_count": 0,
                    "created_at": now - 86_400 * 2,
                    "meta": {
                        "sender": {"id": 502, "name": "João Lima", "email": "joao@example.com"},
                        "assignee": {"id": 1, "name": "Ana"}
                    },
                    "messages": [
                        {"id": 2, "content": "Qual o preço do plano anual?", "message_type": 0, "created_at": now - 86_400 * 2},
                        {"id": 3, "content": "O plano anual custa R$ 1.200.", "message_type": 1, "created_at": now - 86_400 * 2 + 420},
                        {"id": 4, "content": "Obrigado!", "message_type": 0, "created_at": now - 86_400 * 2 + 600}
                    ]
                },
                {
                    "id": 103,
                    "status": "pending",
                    "inbox_id": 2,
                    "unread_count": 1,
                    "created_at": now - 3_600,
                    "meta": {"sender": {"id": 503, "name": "Carla Dias"}},
                    "messages": [
                        {"id": 5, "content": "Tenho uma dúvida sobre a integração", "message_type": 0, "created_at": now - 3_600}
                    ]
                }
            ]}}),
        );
        payloads.insert(
            "agents".to_string(),
            json!([
                {"id": 1, "name": "Ana", "email": "ana@example.com", "availability_status": "online", "specialties": ["vendas"]},
                {"id": 2, "name": "Bruno", "email": "bruno@example.com", "availability_status": "busy", "specialties": ["suporte"]},
                {"id": 3, "name": "Clara", "email": "clara@example.com", "availability_status": "offline"}
            ]),
        );
        payloads.insert(
            "contacts".to_string(),
            json!({"payload": [
                {"id": 501, "name": "Maria Souza", "phone_number": "+5511988887777"},
                {"id": 502, "name": "João Lima", "email": "joao@example.com", "additional_attributes": {"company_name": "Lima & Cia"}},
                {"id": 503, "name": "Carla Dias"}
            ]}),
        );
        payloads.insert(
            "teams".to_string(),
            json!({"data": [
                {"id": 1, "name": "Vendas", "description": "Equipe comercial", "is_member": true},
                {"id": 2, "name": "Suporte", "description": "Atendimento técnico", "is_member": false}
            ]}),
        );
        payloads.insert(
            "inboxes".to_string(),
            json!({"inboxes": [
                {"id": 1, "name": "WhatsApp", "channel_type": "Channel::Whatsapp"},
                {"id": 2, "name": "Site", "channel_type": "Channel::WebWidget"}
            ]}),
        );
        payloads.insert(
            "labels".to_string(),
            json!({"payload": [
                {"id": 1, "title": "vip", "color": "#FFD700"},
                {"id": 2, "title": "billing", "color": null}
            ]}),
        );
        payloads.insert(
            "contacts/502/notes".to_string(),
            json!([
                {"id": 10, "content": "Cliente pediu proposta do plano anual", "created_at": now - 86_400, "user": {"id": 1, "name": "Ana"}}
            ]),
        );
        Self {
            payloads: RwLock::new(payloads),
            ..Self::new()
        }
    }

    /// Replace the raw payload served for a resource.
    pub async fn set_payload(&self, resource: Resource, payload: Value) {
        self.payloads
            .write()
            .await
            .insert(resource.endpoint(), payload);
    }

    /// Make every fetch of this resource fail.
    pub async fn fail_resource(&self, resource: Resource) {
        self.failing_endpoints
            .write()
            .await
            .insert(resource.endpoint());
    }

    /// Make every mutation on this conversation fail.
    pub async fn fail_conversation(&self, conversation_id: u64) {
        self.failing_conversations
            .write()
            .await
            .insert(conversation_id);
    }

    /// Mutations received so far, in call order.
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.mutations.read().await.clone()
    }

    async fn check_conversation(&self, conversation_id: u64) -> Result<(), ChatwootError> {
        if self
            .failing_conversations
            .read()
            .await
            .contains(&conversation_id)
        {
            return Err(ChatwootError::Unavailable(format!(
                "conversation {} rejected the update",
                conversation_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatwootApi for MockChatwoot {
    async fn fetch_collection(
        &self,
        _account_id: u64,
        resource: Resource,
    ) -> Result<Vec<Value>, ChatwootError> {
        let endpoint = resource.endpoint();
        if self.failing_endpoints.read().await.contains(&endpoint) {
            return Err(ChatwootError::Unavailable(format!("{} is down", endpoint)));
        }
        let payload = self
            .payloads
            .read()
            .await
            .get(&endpoint)
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(extract_records(payload, resource.label()))
    }

    async fn update_conversation(
        &self,
        _account_id: u64,
        conversation_id: u64,
        update: &ConversationUpdate,
    ) -> Result<(), ChatwootError> {
        self.check_conversation(conversation_id).await?;
        self.mutations
            .write()
            .await
            .push(Mutation::ConversationUpdated {
                conversation_id,
                update: update.clone(),
            });
        Ok(())
    }

    async fn send_message(
        &self,
        _account_id: u64,
        conversation_id: u64,
        content: &str,
    ) -> Result<(), ChatwootError> {
        self.check_conversation(conversation_id).await?;
        self.mutations.write().await.push(Mutation::MessageSent {
            conversation_id,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn update_contact(
        &self,
        _account_id: u64,
        contact_id: u64,
        additional_attributes: &Value,
    ) -> Result<(), ChatwootError> {
        self.mutations.write().await.push(Mutation::ContactUpdated {
            contact_id,
            additional_attributes: additional_attributes.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatwoot::{fetch_typed, Conversation, Inbox, Label, Note, Team};

    #[tokio::test]
    async fn sample_data_normalizes_across_shapes() {
        let mock = MockChatwoot::with_sample_data();
        let conversations: Vec<Conversation> =
            fetch_typed(&mock, 1, Resource::Conversations).await.unwrap();
        let teams: Vec<Team> = fetch_typed(&mock, 1, Resource::Teams).await.unwrap();
        let inboxes: Vec<Inbox> = fetch_typed(&mock, 1, Resource::Inboxes).await.unwrap();
        assert_eq!(conversations.len(), 3);
        assert_eq!(teams.len(), 2);
        assert_eq!(inboxes.len(), 2);
        let labels: Vec<Label> = fetch_typed(&mock, 1, Resource::Labels).await.unwrap();
        assert_eq!(labels[1].title, "billing");
        assert_eq!(labels[1].color, None);
        let notes: Vec<Note> = fetch_typed(&mock, 1, Resource::Notes(502)).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].user.as_ref().map(|u| u.name.as_str()), Some("Ana"));
        assert!(fetch_typed::<Note>(&mock, 1, Resource::Notes(501))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn failing_resource_and_conversation() {
        let mock = MockChatwoot::with_sample_data();
        mock.fail_resource(Resource::Agents).await;
        assert!(mock.fetch_collection(1, Resource::Agents).await.is_err());
        assert!(mock.fetch_collection(1, Resource::Teams).await.is_ok());

        mock.fail_conversation(7).await;
        assert!(mock.send_message(1, 7, "oi").await.is_err());
        mock.send_message(1, 8, "oi").await.unwrap();
        assert_eq!(
            mock.mutations().await,
            vec![Mutation::MessageSent {
                conversation_id: 8,
                content: "oi".to_string()
            }]
        );
    }
}
