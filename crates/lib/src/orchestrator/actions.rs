//! Automation actions produced by the orchestrator. Created, executed, discarded.

use crate::chatwoot::{Conversation, ConversationStatus};
use crate::orchestrator::analysis::LeadCategory;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl From<LeadCategory> for Priority {
    fn from(category: LeadCategory) -> Self {
        match category {
            LeadCategory::Hot => Self::High,
            LeadCategory::Warm => Self::Medium,
            LeadCategory::Cold => Self::Low,
        }
    }
}

/// What to do. Each variant carries only the fields it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    AutoReply {
        conversation_id: u64,
        content: String,
    },
    AssignAgent {
        conversation_id: u64,
        agent_id: u64,
        #[serde(default)]
        reason: String,
    },
    /// `tags` are added to `current_labels`, the labels the conversation already carries.
    AddTag {
        conversation_id: u64,
        tags: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        current_labels: Vec<String>,
    },
    UpdateStatus {
        conversation_id: u64,
        status: ConversationStatus,
    },
    TriggerWebhook {
        url: String,
        payload: serde_json::Value,
    },
    EnrichContact {
        contact_id: u64,
        data: serde_json::Map<String, serde_json::Value>,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        vip_status: bool,
    },
}

impl ActionKind {
    pub fn add_tag(conversation: &Conversation, tags: Vec<String>) -> Self {
        Self::AddTag {
            conversation_id: conversation.id,
            tags,
            current_labels: conversation.labels.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AutoReply { .. } => "auto_reply",
            Self::AssignAgent { .. } => "assign_agent",
            Self::AddTag { .. } => "add_tag",
            Self::UpdateStatus { .. } => "update_status",
            Self::TriggerWebhook { .. } => "trigger_webhook",
            Self::EnrichContact { .. } => "enrich_contact",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationAction {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default)]
    pub priority: Priority,
}

impl AutomationAction {
    pub fn new(kind: ActionKind, priority: Priority) -> Self {
        Self { kind, priority }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}
