//! Applies automation actions through the Chatwoot API and the webhook sender.
//!
//! Actions run one at a time in the order given. A failing action is logged and recorded in the
//! report; the rest of the batch still runs.

use crate::chatwoot::{ChatwootApi, ChatwootError, ConversationUpdate};
use crate::orchestrator::{ActionKind, AutomationAction};
use crate::webhook::{WebhookClient, WebhookError};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Chatwoot(#[from] ChatwootError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Applied,
    Failed,
    /// Dry run: logged, not sent.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub action: &'static str,
    pub status: OutcomeStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub outcomes: Vec<ActionOutcome>,
    /// True once every action was attempted.
    pub completed: bool,
}

impl ExecutionReport {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .count()
    }

    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Applied)
            .count()
    }
}

pub struct ActionExecutor {
    api: Arc<dyn ChatwootApi>,
    webhooks: WebhookClient,
    account_id: u64,
    dry_run: bool,
}

impl ActionExecutor {
    pub fn new(api: Arc<dyn ChatwootApi>, webhooks: WebhookClient, account_id: u64) -> Self {
        Self {
            api,
            webhooks,
            account_id,
            dry_run: false,
        }
    }

    /// Log actions instead of applying them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn execute(&self, actions: &[AutomationAction]) -> ExecutionReport {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            let outcome = if self.dry_run {
                log::info!("executor: dry run {} {:?}", action.name(), action.kind);
                ActionOutcome {
                    action: action.name(),
                    status: OutcomeStatus::Simulated,
                    detail: describe(&action.kind),
                }
            } else {
                match self.apply(&action.kind).await {
                    Ok(()) => {
                        log::info!("executor: {} applied ({})", action.name(), describe(&action.kind));
                        ActionOutcome {
                            action: action.name(),
                            status: OutcomeStatus::Applied,
                            detail: describe(&action.kind),
                        }
                    }
                    Err(e) => {
                        log::warn!("executor: {} failed: {}", action.name(), e);
                        ActionOutcome {
                            action: action.name(),
                            status: OutcomeStatus::Failed,
                            detail: e.to_string(),
                        }
                    }
                }
            };
            outcomes.push(outcome);
        }
        ExecutionReport {
            outcomes,
            completed: true,
        }
    }

    async fn apply(&self, kind: &ActionKind) -> Result<(), ExecutionError> {
        let account = self.account_id;
        match kind {
            ActionKind::AutoReply {
                conversation_id,
                content,
            } => {
                self.api
                    .send_message(account, *conversation_id, content)
                    .await?
            }
            ActionKind::AssignAgent {
                conversation_id,
                agent_id,
                ..
            } => {
                let update = ConversationUpdate {
                    assignee_id: Some(*agent_id),
                    ..ConversationUpdate::default()
                };
                self.api
                    .update_conversation(account, *conversation_id, &update)
                    .await?
            }
            ActionKind::AddTag {
                conversation_id,
                tags,
                current_labels,
            } => {
                let update = ConversationUpdate {
                    labels: Some(merge_labels(current_labels, tags)),
                    ..ConversationUpdate::default()
                };
                self.api
                    .update_conversation(account, *conversation_id, &update)
                    .await?
            }
            ActionKind::UpdateStatus {
                conversation_id,
                status,
            } => {
                let update = ConversationUpdate {
                    status: Some(*status),
                    ..ConversationUpdate::default()
                };
                self.api
                    .update_conversation(account, *conversation_id, &update)
                    .await?
            }
            ActionKind::EnrichContact {
                contact_id,
                data,
                tags,
                vip_status,
            } => {
                let mut attributes = data.clone();
                if !tags.is_empty() {
                    attributes.insert("enrichment_tags".to_string(), json!(tags));
                }
                attributes.insert("vip".to_string(), json!(vip_status));
                self.api
                    .update_contact(account, *contact_id, &serde_json::Value::Object(attributes))
                    .await?
            }
            ActionKind::TriggerWebhook { url, payload } => {
                self.webhooks.post_json(url, payload).await?;
            }
        }
        Ok(())
    }
}

/// Label set to send: the current labels followed by the new tags, without duplicates.
fn merge_labels(current: &[String], tags: &[String]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::with_capacity(current.len() + tags.len());
    for label in current.iter().chain(tags).map(|l| l.trim()) {
        if !label.is_empty() && !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    labels
}

fn describe(kind: &ActionKind) -> String {
    match kind {
        ActionKind::AutoReply { conversation_id, .. } => {
            format!("reply sent to conversation {}", conversation_id)
        }
        ActionKind::AssignAgent {
            conversation_id,
            agent_id,
            ..
        } => format!("conversation {} assigned to agent {}", conversation_id, agent_id),
        ActionKind::AddTag {
            conversation_id,
            tags,
            ..
        } => format!("conversation {} labelled {}", conversation_id, tags.join(", ")),
        ActionKind::UpdateStatus {
            conversation_id,
            status,
        } => format!("conversation {} set to {}", conversation_id, status),
        ActionKind::EnrichContact { contact_id, .. } => format!("contact {} enriched", contact_id),
        ActionKind::TriggerWebhook { url, .. } => format!("webhook posted to {}", url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatwoot::{ConversationStatus, MockChatwoot, Mutation};
    use crate::orchestrator::Priority;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn action(kind: ActionKind) -> AutomationAction {
        AutomationAction::new(kind, Priority::Medium)
    }

    fn executor(api: Arc<MockChatwoot>) -> ActionExecutor {
        ActionExecutor::new(api, WebhookClient::new(Duration::from_secs(2)), 1)
    }

    #[tokio::test]
    async fn applies_each_kind_through_the_api() {
        let api = Arc::new(MockChatwoot::new());
        let report = executor(api.clone())
            .execute(&[
                action(ActionKind::AddTag {
                    conversation_id: 7,
                    tags: vec!["lead_hot".into()],
                    current_labels: Vec::new(),
                }),
                action(ActionKind::AssignAgent {
                    conversation_id: 7,
                    agent_id: 2,
                    reason: String::new(),
                }),
                action(ActionKind::UpdateStatus {
                    conversation_id: 7,
                    status: ConversationStatus::Pending,
                }),
                action(ActionKind::AutoReply {
                    conversation_id: 7,
                    content: "Olá!".into(),
                }),
                action(ActionKind::EnrichContact {
                    contact_id: 501,
                    data: serde_json::from_value(json!({"company": "Lima & Cia"})).unwrap(),
                    tags: vec!["b2b".into()],
                    vip_status: true,
                }),
            ])
            .await;
        assert!(report.completed);
        assert_eq!(report.applied(), 5);

        let mutations = api.mutations().await;
        assert_eq!(mutations.len(), 5);
        assert_eq!(
            mutations[1],
            Mutation::ConversationUpdated {
                conversation_id: 7,
                update: ConversationUpdate {
                    assignee_id: Some(2),
                    ..ConversationUpdate::default()
                }
            }
        );
        assert_eq!(
            mutations[3],
            Mutation::MessageSent {
                conversation_id: 7,
                content: "Olá!".into()
            }
        );
        assert_eq!(
            mutations[4],
            Mutation::ContactUpdated {
                contact_id: 501,
                additional_attributes: json!({
                    "company": "Lima & Cia",
                    "enrichment_tags": ["b2b"],
                    "vip": true
                })
            }
        );
    }

    #[tokio::test]
    async fn failing_action_does_not_stop_the_batch() {
        let api = Arc::new(MockChatwoot::new());
        api.fail_conversation(1).await;
        let report = executor(api.clone())
            .execute(&[
                action(ActionKind::AddTag {
                    conversation_id: 1,
                    tags: vec!["x".into()],
                    current_labels: Vec::new(),
                }),
                action(ActionKind::AddTag {
                    conversation_id: 2,
                    tags: vec!["y".into()],
                    current_labels: Vec::new(),
                }),
            ])
            .await;
        assert!(report.completed);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Failed);
        assert_eq!(report.outcomes[1].status, OutcomeStatus::Applied);
        assert_eq!(api.mutations().await.len(), 1);
    }

    #[tokio::test]
    async fn webhook_failures_are_non_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ok"))
            .and(body_json(json!({"event": "conversation_resolved"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let api = Arc::new(MockChatwoot::new());
        let report = executor(api.clone())
            .execute(&[
                action(ActionKind::TriggerWebhook {
                    url: "http://127.0.0.1:9/unreachable".into(),
                    payload: json!({}),
                }),
                action(ActionKind::TriggerWebhook {
                    url: format!("{}/broken", server.uri()),
                    payload: json!({}),
                }),
                action(ActionKind::TriggerWebhook {
                    url: format!("{}/ok", server.uri()),
                    payload: json!({"event": "conversation_resolved"}),
                }),
                action(ActionKind::UpdateStatus {
                    conversation_id: 3,
                    status: ConversationStatus::Resolved,
                }),
            ])
            .await;
        assert!(report.completed);
        let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                OutcomeStatus::Failed,
                OutcomeStatus::Failed,
                OutcomeStatus::Applied,
                OutcomeStatus::Applied
            ]
        );
        assert!(report.outcomes[1].detail.contains("503"));
        assert_eq!(api.mutations().await.len(), 1);
    }

    #[tokio::test]
    async fn add_tag_keeps_existing_labels() {
        use crate::chatwoot::{Conversation, Message, ProxyClient};
        use crate::config::OrchestratorConfig;
        use crate::orchestrator::{DomainEvent, Orchestrator};
        use wiremock::matchers::query_param;

        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(query_param("endpoint", "conversations/12"))
            .and(body_json(json!({"labels": ["vip", "billing", "lead_hot", "general"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 12})))
            .expect(1)
            .mount(&server)
            .await;

        let event = DomainEvent::ConversationCreated {
            conversation: Conversation {
                id: 12,
                labels: vec!["vip".into(), "billing".into()],
                messages: vec![Message {
                    id: 1,
                    content: Some("Preciso de ajuda urgente".into()),
                    ..Message::default()
                }],
                ..Conversation::default()
            },
            contact: None,
            available_agents: Vec::new(),
        };
        let actions = Orchestrator::new(None, OrchestratorConfig::default())
            .process_event(&event)
            .await;
        let api = Arc::new(ProxyClient::new(server.uri(), Duration::from_secs(2)));
        let report = ActionExecutor::new(api, WebhookClient::new(Duration::from_secs(2)), 1)
            .execute(&actions)
            .await;
        assert_eq!(report.applied(), 1, "{:?}", report);
    }

    #[test]
    fn merged_labels_skip_duplicates_and_blanks() {
        let current = vec!["vip".to_string(), "lead_cold".to_string()];
        let tags = vec!["lead_cold".to_string(), " ".to_string(), "support".to_string()];
        assert_eq!(
            merge_labels(&current, &tags),
            vec!["vip", "lead_cold", "support"]
        );
    }

    #[tokio::test]
    async fn dry_run_has_no_side_effects() {
        let api = Arc::new(MockChatwoot::new());
        let report = executor(api.clone())
            .dry_run(true)
            .execute(&[action(ActionKind::AutoReply {
                conversation_id: 1,
                content: "oi".into(),
            })])
            .await;
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Simulated);
        assert!(api.mutations().await.is_empty());
    }
}
