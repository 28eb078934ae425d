//! Chatwoot access through the proxy.
//!
//! [`ChatwootApi`] is the single seam: [`ProxyClient`] talks HTTP to the proxy and
//! [`MockChatwoot`] serves in-memory fixtures. Callers pick one; nothing swaps silently on error.

mod client;
mod mock;
pub mod normalize;
mod types;

pub use client::ProxyClient;
pub use mock::{MockChatwoot, Mutation};
pub use normalize::{extract_records, parse_records};
pub use types::{
    Agent, Availability, Contact, Conversation, ConversationMeta, ConversationStatus, Inbox,
    Label, Message, MessageType, Note, Team,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A list endpoint on the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Conversations,
    Agents,
    Contacts,
    Teams,
    Inboxes,
    Labels,
    /// Messages of one conversation.
    Messages(u64),
    /// Notes on one contact.
    Notes(u64),
}

impl Resource {
    /// Value of the proxy's `endpoint` query parameter.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Messages(id) => format!("conversations/{}/messages", id),
            Self::Notes(id) => format!("contacts/{}/notes", id),
            other => other.label().to_string(),
        }
    }

    /// Short name used in logs and failure reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Conversations => "conversations",
            Self::Agents => "agents",
            Self::Contacts => "contacts",
            Self::Teams => "teams",
            Self::Inboxes => "inboxes",
            Self::Labels => "labels",
            Self::Messages(_) => "messages",
            Self::Notes(_) => "notes",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatwootError {
    #[error("chatwoot proxy request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chatwoot proxy timed out on {0}")]
    Timeout(String),
    #[error("chatwoot proxy api error: {0}")]
    Api(String),
    #[error("chatwoot proxy returned invalid json for {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("chatwoot unavailable: {0}")]
    Unavailable(String),
}

/// Fields to change on a conversation; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConversationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

/// Read and mutate Chatwoot data for one account.
#[async_trait]
pub trait ChatwootApi: Send + Sync {
    /// Fetch a list endpoint and return its records, already unwrapped from the envelope.
    async fn fetch_collection(
        &self,
        account_id: u64,
        resource: Resource,
    ) -> Result<Vec<serde_json::Value>, ChatwootError>;

    /// PATCH `conversations/{id}`.
    async fn update_conversation(
        &self,
        account_id: u64,
        conversation_id: u64,
        update: &ConversationUpdate,
    ) -> Result<(), ChatwootError>;

    /// POST an outgoing message to `conversations/{id}/messages`.
    async fn send_message(
        &self,
        account_id: u64,
        conversation_id: u64,
        content: &str,
    ) -> Result<(), ChatwootError>;

    /// PATCH `contacts/{id}` with additional attributes.
    async fn update_contact(
        &self,
        account_id: u64,
        contact_id: u64,
        additional_attributes: &serde_json::Value,
    ) -> Result<(), ChatwootError>;
}

/// Fetch a list endpoint and deserialize its records, dropping malformed ones.
pub async fn fetch_typed<T: DeserializeOwned>(
    api: &dyn ChatwootApi,
    account_id: u64,
    resource: Resource,
) -> Result<Vec<T>, ChatwootError> {
    let records = api.fetch_collection(account_id, resource).await?;
    Ok(parse_records(records, resource.label()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_endpoints() {
        assert_eq!(Resource::Conversations.endpoint(), "conversations");
        assert_eq!(Resource::Inboxes.endpoint(), "inboxes");
        assert_eq!(
            Resource::Messages(42).endpoint(),
            "conversations/42/messages"
        );
        assert_eq!(Resource::Messages(42).label(), "messages");
        assert_eq!(Resource::Notes(501).endpoint(), "contacts/501/notes");
    }

    #[test]
    fn conversation_update_serializes_only_set_fields() {
        let update = ConversationUpdate {
            status: Some(ConversationStatus::Resolved),
            ..ConversationUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"status": "resolved"})
        );
    }
}
