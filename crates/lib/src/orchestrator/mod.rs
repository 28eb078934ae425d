//! Event-to-action orchestrator: turns a [`DomainEvent`] into a list of [`AutomationAction`]s.
//!
//! With an LLM client the sub-analyses ask the model; without one (or when a call fails) the
//! keyword rules in [`fallback`] decide. `process_event` always returns a list.

pub mod actions;
pub mod analysis;
pub mod events;
pub mod fallback;

pub use actions::{ActionKind, AutomationAction, Priority};
pub use analysis::{Analyst, ContactEnrichment, LeadCategory, LeadScore, RoutingDecision};
pub use events::DomainEvent;

use crate::chatwoot::{Agent, Contact, Conversation, Message, MessageType};
use crate::config::OrchestratorConfig;
use crate::llm::{LlmClient, LlmError};
use std::sync::Arc;

/// Conversations with more messages than this get their lead re-scored on each new message.
const RESCORE_MIN_MESSAGES: usize = 3;

pub struct Orchestrator {
    analyst: Analyst,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, config: OrchestratorConfig) -> Self {
        if let Some(client) = llm.as_deref() {
            log::info!("orchestrator: ai analysis enabled (model {})", client.model());
        } else {
            log::info!("orchestrator: running in fallback mode");
        }
        let analyst = Analyst::new(llm, config.keywords.clone(), config.company_name.clone());
        Self { analyst, config }
    }

    pub fn ai_enabled(&self) -> bool {
        self.analyst.ai_enabled()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Decide the actions for one event. Model failures degrade to the generic fallback.
    pub async fn process_event(&self, event: &DomainEvent) -> Vec<AutomationAction> {
        log::debug!(
            "orchestrator: processing {} for conversation {}",
            event.kind(),
            event.conversation().id
        );
        let actions = match self.analyze(event).await {
            Ok(actions) => actions,
            Err(e) => {
                log::warn!(
                    "orchestrator: {} analysis failed ({}), using generic fallback",
                    event.kind(),
                    e
                );
                fallback::generic_event_actions(event, &self.config)
            }
        };
        log::info!(
            "orchestrator: {} -> {} action(s)",
            event.kind(),
            actions.len()
        );
        actions
    }

    /// Lead score for a conversation; the keyword score when the model is unavailable.
    pub async fn lead_score(&self, conversation: &Conversation) -> LeadScore {
        match self.analyst.lead_score(conversation).await {
            Ok(score) => score,
            Err(e) => {
                log::warn!("orchestrator: lead score failed ({}), using keyword score", e);
                self.analyst.basic_lead_score(conversation)
            }
        }
    }

    async fn analyze(&self, event: &DomainEvent) -> Result<Vec<AutomationAction>, LlmError> {
        let contact = event.contact();
        match event {
            DomainEvent::ConversationCreated {
                conversation,
                available_agents,
                ..
            } => {
                self.on_conversation_created(conversation, contact, available_agents)
                    .await
            }
            DomainEvent::MessageCreated {
                conversation,
                message,
                ..
            } => self.on_message_created(conversation, message, contact).await,
            DomainEvent::ConversationStatusChanged {
                conversation,
                new_status,
                ..
            } => Ok(fallback::status_changed_actions(
                conversation,
                *new_status,
                contact,
                &self.config,
            )),
            DomainEvent::AgentAssigned {
                conversation,
                agent_id,
                ..
            } => {
                let lead = self.analyst.lead_score(conversation).await?;
                Ok(fallback::agent_assigned_actions(
                    conversation,
                    *agent_id,
                    contact,
                    &lead,
                    &self.config,
                ))
            }
        }
    }

    async fn on_conversation_created(
        &self,
        conversation: &Conversation,
        contact: Option<&Contact>,
        agents: &[Agent],
    ) -> Result<Vec<AutomationAction>, LlmError> {
        let enrich = async {
            match contact {
                Some(c) => self.analyst.enrichment(c, conversation).await.map(Some),
                None => Ok(None),
            }
        };
        let reply = async {
            if self.config.auto_reply_enabled {
                self.analyst.auto_reply(conversation, contact).await
            } else {
                Ok(None)
            }
        };
        let (lead, route, enrichment, reply) = tokio::join!(
            self.analyst.lead_score(conversation),
            self.analyst.routing(conversation, agents),
            enrich,
            reply
        );
        let (lead, route, enrichment, reply) = (lead?, route?, enrichment?, reply?);

        let mut actions = Vec::new();

        let mut tags = vec![format!("lead_{}", lead.category.as_str())];
        for tag in route.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        actions.push(AutomationAction::new(
            ActionKind::add_tag(conversation, tags),
            Priority::from(lead.category),
        ));

        if let (Some(contact), Some(enrichment)) = (contact, enrichment) {
            if !enrichment.is_empty() {
                let priority = if enrichment.vip_status {
                    Priority::High
                } else {
                    Priority::Low
                };
                actions.push(AutomationAction::new(
                    ActionKind::EnrichContact {
                        contact_id: contact.id,
                        data: enrichment.data,
                        tags: enrichment.tags,
                        vip_status: enrichment.vip_status,
                    },
                    priority,
                ));
            }
        }

        match route.agent_id {
            Some(agent_id) if agents.iter().any(|a| a.id == agent_id) => {
                actions.push(AutomationAction::new(
                    ActionKind::AssignAgent {
                        conversation_id: conversation.id,
                        agent_id,
                        reason: route.reasoning.clone(),
                    },
                    route.priority,
                ));
            }
            Some(agent_id) => {
                log::warn!(
                    "orchestrator: routing picked agent {} which is not available, not assigning",
                    agent_id
                );
            }
            None => {}
        }

        if let Some(content) = reply {
            actions.push(AutomationAction::new(
                ActionKind::AutoReply {
                    conversation_id: conversation.id,
                    content,
                },
                Priority::Medium,
            ));
        }

        Ok(actions)
    }

    async fn on_message_created(
        &self,
        conversation: &Conversation,
        message: &Message,
        contact: Option<&Contact>,
    ) -> Result<Vec<AutomationAction>, LlmError> {
        let conversation = conversation.with_message(message);
        let mut actions = Vec::new();

        if conversation.message_count() > RESCORE_MIN_MESSAGES {
            let lead = self.analyst.lead_score(&conversation).await?;
            actions.push(AutomationAction::new(
                ActionKind::add_tag(
                    &conversation,
                    vec![format!("lead_{}", lead.category.as_str())],
                ),
                Priority::from(lead.category),
            ));
        }

        if self.config.auto_reply_enabled && message.message_type == MessageType::Incoming {
            if let Some(content) = self.analyst.auto_reply(&conversation, contact).await? {
                actions.push(AutomationAction::new(
                    ActionKind::AutoReply {
                        conversation_id: conversation.id,
                        content,
                    },
                    Priority::Medium,
                ));
            }
        }

        actions.extend(fallback::urgent_message_actions(
            &conversation,
            message,
            contact,
            &self.config,
        ));
        Ok(actions)
    }
}
