//! Domain events the orchestrator reacts to. Wire form: `{"event": "<kind>", ...fields}`.

use crate::chatwoot::{Agent, Contact, Conversation, ConversationStatus, Message};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ConversationCreated {
        conversation: Conversation,
        #[serde(default)]
        contact: Option<Contact>,
        #[serde(default)]
        available_agents: Vec<Agent>,
    },
    MessageCreated {
        conversation: Conversation,
        message: Message,
        #[serde(default)]
        contact: Option<Contact>,
        #[serde(default)]
        available_agents: Vec<Agent>,
    },
    ConversationStatusChanged {
        conversation: Conversation,
        new_status: ConversationStatus,
        #[serde(default)]
        contact: Option<Contact>,
        #[serde(default)]
        available_agents: Vec<Agent>,
    },
    AgentAssigned {
        conversation: Conversation,
        agent_id: u64,
        #[serde(default)]
        contact: Option<Contact>,
        #[serde(default)]
        available_agents: Vec<Agent>,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConversationCreated { .. } => "conversation_created",
            Self::MessageCreated { .. } => "message_created",
            Self::ConversationStatusChanged { .. } => "conversation_status_changed",
            Self::AgentAssigned { .. } => "agent_assigned",
        }
    }

    pub fn conversation(&self) -> &Conversation {
        match self {
            Self::ConversationCreated { conversation, .. }
            | Self::MessageCreated { conversation, .. }
            | Self::ConversationStatusChanged { conversation, .. }
            | Self::AgentAssigned { conversation, .. } => conversation,
        }
    }

    /// Explicit contact, else the conversation's sender.
    pub fn contact(&self) -> Option<&Contact> {
        let explicit = match self {
            Self::ConversationCreated { contact, .. }
            | Self::MessageCreated { contact, .. }
            | Self::ConversationStatusChanged { contact, .. }
            | Self::AgentAssigned { contact, .. } => contact.as_ref(),
        };
        explicit.or_else(|| self.conversation().contact())
    }

    pub fn available_agents(&self) -> &[Agent] {
        match self {
            Self::ConversationCreated {
                available_agents, ..
            }
            | Self::MessageCreated {
                available_agents, ..
            }
            | Self::ConversationStatusChanged {
                available_agents, ..
            }
            | Self::AgentAssigned {
                available_agents, ..
            } => available_agents,
        }
    }
}
