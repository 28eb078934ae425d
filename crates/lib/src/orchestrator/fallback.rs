//! Deterministic rules used when no model is configured or a model call fails.

use crate::chatwoot::{Contact, Conversation, ConversationStatus, Message};
use crate::config::{KeywordConfig, OrchestratorConfig};
use crate::orchestrator::actions::{ActionKind, AutomationAction, Priority};
use crate::orchestrator::analysis::{ContactEnrichment, LeadCategory, LeadScore, RoutingDecision};
use crate::orchestrator::events::DomainEvent;
use serde_json::json;

pub const DEFAULT_ROUTE_CHANNEL: &str = "general";
pub const NEEDS_TRIAGE_TAG: &str = "needs_triage";
pub const ENRICHMENT_UNAVAILABLE_TAG: &str = "enrichment_unavailable";

const KEYWORD_CONFIDENCE: f32 = 0.6;

/// Case-insensitive substring match against any of `words`. Empty words never match.
pub fn contains_any(text: &str, words: &[String]) -> bool {
    let text = text.to_lowercase();
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .any(|w| !w.is_empty() && text.contains(&w))
}

/// Urgency keywords found in `text`, in configured order.
pub fn urgency_matches(text: &str, keywords: &KeywordConfig) -> Vec<String> {
    let lower = text.to_lowercase();
    keywords
        .urgency
        .iter()
        .filter(|w| {
            let w = w.trim().to_lowercase();
            !w.is_empty() && lower.contains(&w)
        })
        .cloned()
        .collect()
}

/// Keyword lead score. Urgency or problem words beat pricing, pricing beats questions;
/// gratitude overrides everything.
pub fn basic_lead_score(text: &str, keywords: &KeywordConfig) -> LeadScore {
    let (mut score, mut category, mut reasoning) = if contains_any(text, &keywords.urgency)
        || contains_any(text, &keywords.problem)
    {
        (80, LeadCategory::Hot, "urgency or problem keywords")
    } else if contains_any(text, &keywords.pricing) {
        (70, LeadCategory::Hot, "pricing keywords")
    } else if contains_any(text, &keywords.question) {
        (60, LeadCategory::Warm, "question keywords")
    } else {
        (50, LeadCategory::Warm, "no keywords matched")
    };
    if contains_any(text, &keywords.gratitude) {
        score = 30;
        category = LeadCategory::Cold;
        reasoning = "gratitude keywords";
    }
    LeadScore {
        score,
        category,
        confidence: KEYWORD_CONFIDENCE,
        reasoning: format!("keyword scoring: {}", reasoning),
    }
}

/// Replies are never drafted without a model.
pub fn auto_reply() -> Option<String> {
    None
}

pub fn default_route() -> RoutingDecision {
    RoutingDecision {
        agent_id: None,
        channel: DEFAULT_ROUTE_CHANNEL.to_string(),
        priority: Priority::Medium,
        tags: vec![DEFAULT_ROUTE_CHANNEL.to_string()],
        reasoning: "default routing".to_string(),
    }
}

pub fn empty_enrichment() -> ContactEnrichment {
    ContactEnrichment {
        data: serde_json::Map::new(),
        tags: vec![ENRICHMENT_UNAVAILABLE_TAG.to_string()],
        vip_status: false,
    }
}

/// Webhook action for a configured target; unset targets are skipped.
pub fn webhook_action(
    target: Option<&str>,
    what: &str,
    payload: serde_json::Value,
    priority: Priority,
) -> Option<AutomationAction> {
    match target.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Some(AutomationAction::new(
            ActionKind::TriggerWebhook {
                url: url.to_string(),
                payload,
            },
            priority,
        )),
        None => {
            log::debug!("orchestrator: no {} webhook configured, skipping", what);
            None
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn resolved_payload(conversation: &Conversation, contact: Option<&Contact>) -> serde_json::Value {
    json!({
        "event": "conversation_resolved",
        "conversation_id": conversation.id,
        "status": ConversationStatus::Resolved,
        "labels": conversation.labels,
        "contact": contact.map(Contact::summary),
        "timestamp": now_rfc3339(),
    })
}

pub fn urgent_payload(
    conversation: &Conversation,
    message: &Message,
    contact: Option<&Contact>,
    matched: &[String],
) -> serde_json::Value {
    json!({
        "event": "urgent_message",
        "conversation_id": conversation.id,
        "message": {"id": message.id, "content": message.text()},
        "matched_keywords": matched,
        "contact": contact.map(Contact::summary),
        "timestamp": now_rfc3339(),
    })
}

pub fn assigned_payload(
    conversation: &Conversation,
    agent_id: u64,
    contact: Option<&Contact>,
    lead: &LeadScore,
) -> serde_json::Value {
    json!({
        "event": "agent_assigned",
        "conversation_id": conversation.id,
        "agent_id": agent_id,
        "contact": contact.map(Contact::summary),
        "lead_score": lead,
        "timestamp": now_rfc3339(),
    })
}

/// Webhook wiring for a status change; only `resolved` produces an action.
pub fn status_changed_actions(
    conversation: &Conversation,
    new_status: ConversationStatus,
    contact: Option<&Contact>,
    config: &OrchestratorConfig,
) -> Vec<AutomationAction> {
    if new_status != ConversationStatus::Resolved {
        return Vec::new();
    }
    webhook_action(
        config.webhooks.conversation_resolved.as_deref(),
        "conversation resolved",
        resolved_payload(conversation, contact),
        Priority::Medium,
    )
    .into_iter()
    .collect()
}

/// Urgent-message webhook when the message contains an urgency keyword.
pub fn urgent_message_actions(
    conversation: &Conversation,
    message: &Message,
    contact: Option<&Contact>,
    config: &OrchestratorConfig,
) -> Vec<AutomationAction> {
    let matched = urgency_matches(message.text(), &config.keywords);
    if matched.is_empty() {
        return Vec::new();
    }
    webhook_action(
        config.webhooks.urgent_message.as_deref(),
        "urgent message",
        urgent_payload(conversation, message, contact, &matched),
        Priority::High,
    )
    .into_iter()
    .collect()
}

pub fn agent_assigned_actions(
    conversation: &Conversation,
    agent_id: u64,
    contact: Option<&Contact>,
    lead: &LeadScore,
    config: &OrchestratorConfig,
) -> Vec<AutomationAction> {
    webhook_action(
        config.webhooks.agent_assigned.as_deref(),
        "agent assigned",
        assigned_payload(conversation, agent_id, contact, lead),
        Priority::High,
    )
    .into_iter()
    .collect()
}

/// Actions for an event when the model path failed. Makes no model calls.
pub fn generic_event_actions(event: &DomainEvent, config: &OrchestratorConfig) -> Vec<AutomationAction> {
    let contact = event.contact();
    match event {
        DomainEvent::ConversationCreated { conversation, .. } => vec![AutomationAction::new(
            ActionKind::add_tag(conversation, vec![NEEDS_TRIAGE_TAG.to_string()]),
            Priority::Medium,
        )],
        DomainEvent::MessageCreated {
            conversation,
            message,
            ..
        } => urgent_message_actions(conversation, message, contact, config),
        DomainEvent::ConversationStatusChanged {
            conversation,
            new_status,
            ..
        } => status_changed_actions(conversation, *new_status, contact, config),
        DomainEvent::AgentAssigned {
            conversation,
            agent_id,
            ..
        } => {
            let lead = basic_lead_score(&conversation.transcript(), &config.keywords);
            agent_assigned_actions(conversation, *agent_id, contact, &lead, config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookTargets;

    fn keywords() -> KeywordConfig {
        KeywordConfig::default()
    }

    #[test]
    fn keyword_scoring_rules() {
        let k = keywords();
        let urgent = basic_lead_score("Preciso de ajuda urgente", &k);
        assert_eq!((urgent.score, urgent.category), (80, LeadCategory::Hot));
        assert_eq!(urgent.confidence, 0.6);

        let problem = basic_lead_score("Tenho um PROBLEMA com o boleto", &k);
        assert_eq!((problem.score, problem.category), (80, LeadCategory::Hot));

        let pricing = basic_lead_score("Qual o preço do plano anual?", &k);
        assert_eq!((pricing.score, pricing.category), (70, LeadCategory::Hot));

        let question = basic_lead_score("Tenho uma dúvida sobre o produto", &k);
        assert_eq!((question.score, question.category), (60, LeadCategory::Warm));

        let neutral = basic_lead_score("Bom dia", &k);
        assert_eq!((neutral.score, neutral.category), (50, LeadCategory::Warm));
    }

    #[test]
    fn gratitude_overrides_other_rules() {
        let s = basic_lead_score("Resolvido o problema urgente, obrigado!", &keywords());
        assert_eq!((s.score, s.category), (30, LeadCategory::Cold));
        assert!(s.reasoning.contains("gratitude"));
    }

    #[test]
    fn scoring_is_deterministic() {
        let k = keywords();
        let a = basic_lead_score("quanto custa? obrigada", &k);
        let b = basic_lead_score("quanto custa? obrigada", &k);
        assert_eq!(a, b);
    }

    #[test]
    fn default_route_and_enrichment() {
        let route = default_route();
        assert_eq!(route.channel, "general");
        assert_eq!(route.priority, Priority::Medium);
        assert_eq!(route.tags, vec!["general"]);
        assert!(route.agent_id.is_none());

        let e = empty_enrichment();
        assert!(e.is_empty());
        assert_eq!(e.tags, vec![ENRICHMENT_UNAVAILABLE_TAG]);
    }

    #[test]
    fn unset_webhook_is_skipped() {
        assert!(webhook_action(None, "x", json!({}), Priority::High).is_none());
        assert!(webhook_action(Some("  "), "x", json!({}), Priority::High).is_none());
        let action = webhook_action(Some("https://hooks.example/x"), "x", json!({}), Priority::High)
            .unwrap();
        assert_eq!(action.name(), "trigger_webhook");
        assert_eq!(action.priority, Priority::High);
    }

    #[test]
    fn urgency_matches_are_case_insensitive() {
        let found = urgency_matches("EMERGÊNCIA no servidor, urgente!", &keywords());
        assert_eq!(found, vec!["urgente", "emergência"]);
        assert!(urgency_matches("tudo certo", &keywords()).is_empty());
    }

    #[test]
    fn generic_fallback_tags_new_conversations_for_triage() {
        let event = DomainEvent::ConversationCreated {
            conversation: Conversation {
                id: 9,
                ..Conversation::default()
            },
            contact: None,
            available_agents: Vec::new(),
        };
        let actions = generic_event_actions(&event, &OrchestratorConfig::default());
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::AddTag {
                conversation_id: 9,
                tags: vec![NEEDS_TRIAGE_TAG.to_string()],
                current_labels: Vec::new(),
            }
        );
    }

    #[test]
    fn generic_fallback_agent_assigned_carries_keyword_score() {
        let config = OrchestratorConfig {
            webhooks: WebhookTargets {
                agent_assigned: Some("https://hooks.example/assigned".to_string()),
                ..WebhookTargets::default()
            },
            ..OrchestratorConfig::default()
        };
        let event = DomainEvent::AgentAssigned {
            conversation: Conversation {
                id: 4,
                messages: vec![Message {
                    id: 1,
                    content: Some("qual o valor?".to_string()),
                    ..Message::default()
                }],
                ..Conversation::default()
            },
            agent_id: 12,
            contact: None,
            available_agents: Vec::new(),
        };
        let actions = generic_event_actions(&event, &config);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].priority, Priority::High);
        match &actions[0].kind {
            ActionKind::TriggerWebhook { url, payload } => {
                assert_eq!(url, "https://hooks.example/assigned");
                assert_eq!(payload["agent_id"], 12);
                assert_eq!(payload["lead_score"]["score"], 70);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }
}
