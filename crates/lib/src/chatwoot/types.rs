//! Chatwoot records as returned by the proxy.
//!
//! Deserialization is lenient: missing or null fields fall back to defaults, timestamps accept
//! unix seconds or RFC 3339 strings, message types accept Chatwoot's integer codes or names.

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Unix seconds from a number, a numeric string, or an RFC 3339 string. Unparseable values read as None.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(RawTimestamp::Int(n)) => Some(n),
        Some(RawTimestamp::Float(f)) => Some(f as i64),
        Some(RawTimestamp::Text(s)) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|d| d.timestamp())
            })
        }
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u64),
    Text(String),
}

fn lenient_optional_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Num(n)) => Some(n),
        Some(RawId::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Conversation status as Chatwoot reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Open,
    Pending,
    Snoozed,
    Resolved,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Snoozed => "snoozed",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a message. Chatwoot sends 0..=3 from the REST API and names from webhooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Incoming,
    Outgoing,
    Activity,
    Template,
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Code(1)) => Self::Outgoing,
            Some(Raw::Code(2)) => Self::Activity,
            Some(Raw::Code(3)) => Self::Template,
            Some(Raw::Code(_)) | None => Self::Incoming,
            Some(Raw::Name(name)) => match name.to_ascii_lowercase().as_str() {
                "outgoing" => Self::Outgoing,
                "activity" => Self::Activity,
                "template" => Self::Template,
                _ => Self::Incoming,
            },
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub private: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<i64>,
}

impl Message {
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Agent availability. Anything Chatwoot adds later reads as offline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Online,
    Busy,
    #[default]
    #[serde(other)]
    Offline,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub availability_status: Availability,
    #[serde(default, deserialize_with = "null_as_default")]
    pub specialties: Vec<String>,
}

impl Agent {
    pub fn is_online(&self) -> bool {
        self.availability_status == Availability::Online
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub additional_attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_attributes: serde_json::Map<String, serde_json::Value>,
}

impl Contact {
    /// Compact JSON view used in webhook payloads.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "email": self.email,
            "phone_number": self.phone_number,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_member: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inbox {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub channel_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Private note on a contact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<i64>,
    /// Agent who wrote the note.
    #[serde(default)]
    pub user: Option<Agent>,
}

/// Sender, assignee and team attached to a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    #[serde(default)]
    pub sender: Option<Contact>,
    #[serde(default)]
    pub assignee: Option<Agent>,
    #[serde(default)]
    pub team: Option<Team>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ConversationStatus,
    #[serde(default, deserialize_with = "lenient_optional_id")]
    pub inbox_id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: ConversationMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<Message>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unread_count: u32,
    #[serde(default)]
    pub messages_count: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<i64>,
}

impl Conversation {
    pub fn contact(&self) -> Option<&Contact> {
        self.meta.sender.as_ref()
    }

    /// Number of messages, preferring the upstream counter when it is larger than the embedded list.
    pub fn message_count(&self) -> usize {
        let counted = self.messages_count.map(|c| c as usize).unwrap_or(0);
        counted.max(self.messages.len())
    }

    /// All non-private message contents joined by spaces, in order.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .filter(|m| !m.private)
            .filter_map(|m| m.content.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Copy of the conversation that includes `message` if it is not already present.
    pub fn with_message(&self, message: &Message) -> Conversation {
        let mut out = self.clone();
        if !out.messages.iter().any(|m| m.id == message.id) {
            out.messages.push(message.clone());
            if let Some(count) = out.messages_count.as_mut() {
                *count += 1;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversation_tolerates_nulls_and_missing_fields() {
        let conv: Conversation = serde_json::from_value(json!({
            "id": 12,
            "status": null,
            "meta": null,
            "messages": null,
            "labels": null,
            "inbox_id": "3",
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(conv.status, ConversationStatus::Open);
        assert!(conv.messages.is_empty());
        assert_eq!(conv.inbox_id, Some(3));
        assert_eq!(conv.created_at, Some(1714557600));
        assert_eq!(conv.unread_count, 0);
    }

    #[test]
    fn message_type_accepts_codes_and_names() {
        let m: Message = serde_json::from_value(json!({"id": 1, "message_type": 1})).unwrap();
        assert_eq!(m.message_type, MessageType::Outgoing);
        let m: Message =
            serde_json::from_value(json!({"id": 2, "message_type": "incoming"})).unwrap();
        assert_eq!(m.message_type, MessageType::Incoming);
        let m: Message = serde_json::from_value(json!({"id": 3, "message_type": 2})).unwrap();
        assert_eq!(m.message_type, MessageType::Activity);
        let m: Message = serde_json::from_value(json!({"id": 4})).unwrap();
        assert_eq!(m.message_type, MessageType::Incoming);
    }

    #[test]
    fn unknown_availability_reads_offline() {
        let a: Agent = serde_json::from_value(json!({
            "id": 1, "name": "Ana", "availability_status": "on_break"
        }))
        .unwrap();
        assert_eq!(a.availability_status, Availability::Offline);
        let a: Agent =
            serde_json::from_value(json!({"id": 2, "availability_status": "online"})).unwrap();
        assert!(a.is_online());
    }

    #[test]
    fn transcript_skips_private_and_empty_messages() {
        let conv: Conversation = serde_json::from_value(json!({
            "id": 1,
            "messages": [
                {"id": 1, "content": "Olá"},
                {"id": 2, "content": "nota interna", "private": true},
                {"id": 3, "content": "  "},
                {"id": 4, "content": "quanto custa?"}
            ]
        }))
        .unwrap();
        assert_eq!(conv.transcript(), "Olá quanto custa?");
    }

    #[test]
    fn with_message_does_not_duplicate() {
        let conv = Conversation {
            id: 1,
            messages: vec![Message {
                id: 5,
                content: Some("oi".into()),
                ..Message::default()
            }],
            messages_count: Some(1),
            ..Conversation::default()
        };
        let same = conv.with_message(&conv.messages[0]);
        assert_eq!(same.message_count(), 1);
        let next = conv.with_message(&Message {
            id: 6,
            content: Some("tudo bem?".into()),
            ..Message::default()
        });
        assert_eq!(next.message_count(), 2);
        assert_eq!(next.messages_count, Some(2));
    }
}
