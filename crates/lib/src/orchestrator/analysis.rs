//! LLM-backed sub-analyses: lead scoring, reply drafting, routing and contact enrichment.
//!
//! Every analysis has a deterministic counterpart in [`crate::orchestrator::fallback`]. Without a
//! client the counterpart is used directly; when the model answers with empty or unparseable
//! content the counterpart is used too. Transport, API and timeout errors are returned so the
//! orchestrator can switch the whole event to the generic fallback.

use crate::chatwoot::{Agent, Contact, Conversation};
use crate::config::KeywordConfig;
use crate::llm::{extract_json_object, ChatMessage, LlmClient, LlmError};
use crate::orchestrator::actions::Priority;
use crate::orchestrator::fallback;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadCategory {
    #[serde(alias = "quente")]
    Hot,
    #[serde(alias = "morno")]
    Warm,
    #[serde(alias = "frio")]
    Cold,
}

impl LeadCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    /// 0..=100
    pub score: u8,
    pub category: LeadCategory,
    /// 0.0..=1.0
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
}

/// Lead score as the model returns it, before clamping.
#[derive(Debug, Deserialize)]
struct LeadScoreReply {
    score: f64,
    category: LeadCategory,
    #[serde(default = "default_model_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn default_model_confidence() -> f64 {
    0.5
}

impl From<LeadScoreReply> for LeadScore {
    fn from(r: LeadScoreReply) -> Self {
        Self {
            score: r.score.round().clamp(0.0, 100.0) as u8,
            category: r.category,
            confidence: r.confidence.clamp(0.0, 1.0) as f32,
            reasoning: r.reasoning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    #[serde(default)]
    pub agent_id: Option<u64>,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

fn default_channel() -> String {
    fallback::DEFAULT_ROUTE_CHANNEL.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactEnrichment {
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "vipStatus")]
    pub vip_status: bool,
}

impl ContactEnrichment {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && !self.vip_status
    }
}

#[derive(Debug, Deserialize)]
struct AutoReplyDraft {
    #[serde(default, alias = "shouldReply")]
    should_reply: bool,
    #[serde(default)]
    reply: Option<String>,
}

const LEAD_SCORE_PROMPT: &str = "You score sales leads for a customer support team. \
Read the conversation and answer with a JSON object only: \
{\"score\": 0-100, \"category\": \"hot\"|\"warm\"|\"cold\", \"confidence\": 0-1, \"reasoning\": \"short explanation\"}.";

const AUTO_REPLY_PROMPT: &str = "You draft first replies for a customer support team. \
Only draft a reply when a short, safe, factual answer is possible without account data. \
Answer with a JSON object only: {\"should_reply\": true|false, \"reply\": \"text in the customer's language\"}.";

const ROUTING_PROMPT: &str = "You route support conversations to agents. \
Pick an agent id from the list only when one clearly fits (online, matching specialty). \
Answer with a JSON object only: {\"agent_id\": number|null, \"channel\": \"sales\"|\"support\"|\"billing\"|\"general\", \
\"priority\": \"low\"|\"medium\"|\"high\", \"tags\": [\"...\"], \"reasoning\": \"short explanation\"}.";

const ENRICHMENT_PROMPT: &str = "You enrich CRM contacts from support conversations. \
Extract only facts the customer stated (company, role, interest, location). \
Answer with a JSON object only: {\"data\": {\"key\": \"value\"}, \"tags\": [\"...\"], \"vip_status\": true|false}.";

/// Runs the sub-analyses against an optional LLM client.
pub struct Analyst {
    llm: Option<Arc<dyn LlmClient>>,
    keywords: KeywordConfig,
    company_name: Option<String>,
}

impl Analyst {
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        keywords: KeywordConfig,
        company_name: Option<String>,
    ) -> Self {
        Self {
            llm,
            keywords,
            company_name,
        }
    }

    pub fn ai_enabled(&self) -> bool {
        self.llm.is_some()
    }

    pub fn keywords(&self) -> &KeywordConfig {
        &self.keywords
    }

    /// Keyword score of the conversation transcript.
    pub fn basic_lead_score(&self, conversation: &Conversation) -> LeadScore {
        fallback::basic_lead_score(&conversation.transcript(), &self.keywords)
    }

    pub async fn lead_score(&self, conversation: &Conversation) -> Result<LeadScore, LlmError> {
        let Some(llm) = self.llm.as_deref() else {
            return Ok(self.basic_lead_score(conversation));
        };
        let result = ask::<LeadScoreReply>(llm, LEAD_SCORE_PROMPT, describe_conversation(conversation))
            .await
            .map(LeadScore::from);
        recover("lead score", result, || self.basic_lead_score(conversation))
    }

    pub async fn auto_reply(
        &self,
        conversation: &Conversation,
        contact: Option<&Contact>,
    ) -> Result<Option<String>, LlmError> {
        let Some(llm) = self.llm.as_deref() else {
            return Ok(fallback::auto_reply());
        };
        let mut prompt = String::new();
        if let Some(company) = self.company_name.as_deref() {
            prompt.push_str(&format!("Company: {}\n", company));
        }
        if let Some(name) = contact.and_then(|c| c.name.as_deref()) {
            prompt.push_str(&format!("Customer name: {}\n", name));
        }
        prompt.push_str(&describe_conversation(conversation));
        let result = ask::<AutoReplyDraft>(llm, AUTO_REPLY_PROMPT, prompt)
            .await
            .map(|d| match d.reply {
                Some(reply) if d.should_reply && !reply.trim().is_empty() => {
                    Some(reply.trim().to_string())
                }
                _ => None,
            });
        recover("auto reply", result, fallback::auto_reply)
    }

    pub async fn routing(
        &self,
        conversation: &Conversation,
        agents: &[Agent],
    ) -> Result<RoutingDecision, LlmError> {
        let Some(llm) = self.llm.as_deref() else {
            return Ok(fallback::default_route());
        };
        let mut prompt = describe_conversation(conversation);
        prompt.push_str("\nAgents:\n");
        for a in agents {
            prompt.push_str(&format!(
                "- id {}: {} ({:?}) specialties: {}\n",
                a.id,
                a.name,
                a.availability_status,
                a.specialties.join(", ")
            ));
        }
        let result = ask::<RoutingDecision>(llm, ROUTING_PROMPT, prompt).await;
        recover("routing", result, fallback::default_route)
    }

    pub async fn enrichment(
        &self,
        contact: &Contact,
        conversation: &Conversation,
    ) -> Result<ContactEnrichment, LlmError> {
        let Some(llm) = self.llm.as_deref() else {
            return Ok(fallback::empty_enrichment());
        };
        let known = serde_json::to_string(&contact.additional_attributes).unwrap_or_default();
        let prompt = format!(
            "Contact: {} (email: {}, phone: {})\nKnown attributes: {}\n{}",
            contact.name.as_deref().unwrap_or("unknown"),
            contact.email.as_deref().unwrap_or("-"),
            contact.phone_number.as_deref().unwrap_or("-"),
            known,
            describe_conversation(conversation)
        );
        let result = ask::<ContactEnrichment>(llm, ENRICHMENT_PROMPT, prompt).await;
        recover("enrichment", result, fallback::empty_enrichment)
    }
}

/// Conversation as plain text for prompts.
fn describe_conversation(conversation: &Conversation) -> String {
    let mut out = format!(
        "Conversation {} (status {}, {} messages)\n",
        conversation.id,
        conversation.status,
        conversation.message_count()
    );
    for m in conversation.messages.iter().filter(|m| !m.private) {
        let text = m.text().trim();
        if text.is_empty() {
            continue;
        }
        out.push_str(&format!("[{:?}] {}\n", m.message_type, text));
    }
    out
}

async fn ask<T: DeserializeOwned>(
    llm: &dyn LlmClient,
    system: &str,
    user: String,
) -> Result<T, LlmError> {
    let content = llm
        .chat(vec![ChatMessage::system(system), ChatMessage::user(user)])
        .await?;
    let value = extract_json_object(&content)?;
    serde_json::from_value(value).map_err(|e| LlmError::Parse(e.to_string()))
}

/// Content errors degrade to the fallback value; transport errors propagate.
fn recover<T>(
    what: &str,
    result: Result<T, LlmError>,
    fallback: impl FnOnce() -> T,
) -> Result<T, LlmError> {
    match result {
        Ok(v) => Ok(v),
        Err(e) if e.is_content_error() => {
            log::warn!("orchestrator: {} model output unusable ({}), using fallback", what, e);
            Ok(fallback())
        }
        Err(e) => Err(e),
    }
}
