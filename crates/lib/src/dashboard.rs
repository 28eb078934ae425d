//! Dashboard aggregation: concurrent fetch of the four list endpoints plus derived metrics.

use crate::chatwoot::{
    fetch_typed, Agent, ChatwootApi, ChatwootError, Contact, Conversation, ConversationStatus,
    MessageType, Resource, Team,
};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Derived from the conversation and agent lists on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub open: usize,
    pub resolved: usize,
    pub pending: usize,
    pub snoozed: usize,
    pub agents_online: usize,
    /// Percent, rounded.
    pub resolution_rate: u32,
    /// None when no conversation has an incoming message followed by a reply.
    pub avg_response_time_minutes: Option<f64>,
    pub conversations_without_reply: usize,
    pub total_conversations_today: usize,
}

/// `round(resolved / total * 100)`, 0 when there are no conversations.
pub fn resolution_rate(resolved: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((resolved as f64 / total as f64) * 100.0).round() as u32
}

/// Minutes from the first incoming message to the first outgoing message after it.
fn first_response_minutes(conversation: &Conversation) -> Option<f64> {
    let mut timed: Vec<_> = conversation
        .messages
        .iter()
        .filter(|m| !m.private)
        .filter_map(|m| m.created_at.map(|t| (t, m.message_type)))
        .collect();
    timed.sort_by_key(|(t, _)| *t);
    let asked = timed
        .iter()
        .find(|(_, kind)| *kind == MessageType::Incoming)
        .map(|(t, _)| *t)?;
    let answered = timed
        .iter()
        .find(|(t, kind)| *kind == MessageType::Outgoing && *t >= asked)
        .map(|(t, _)| *t)?;
    Some((answered - asked) as f64 / 60.0)
}

/// Mean first-response time over conversations that have one, rounded to 0.1 minute.
pub fn average_response_minutes(conversations: &[Conversation]) -> Option<f64> {
    let delays: Vec<f64> = conversations
        .iter()
        .filter_map(first_response_minutes)
        .collect();
    if delays.is_empty() {
        return None;
    }
    let mean = delays.iter().sum::<f64>() / delays.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

fn local_date(unix_secs: i64) -> Option<NaiveDate> {
    Local
        .timestamp_opt(unix_secs, 0)
        .single()
        .map(|d| d.date_naive())
}

pub fn compute_metrics(
    conversations: &[Conversation],
    agents: &[Agent],
    today: NaiveDate,
) -> DashboardMetrics {
    let mut m = DashboardMetrics::default();
    for c in conversations {
        match c.status {
            ConversationStatus::Open => m.open += 1,
            ConversationStatus::Resolved => m.resolved += 1,
            ConversationStatus::Pending => m.pending += 1,
            ConversationStatus::Snoozed => m.snoozed += 1,
        }
        if c.unread_count > 0 {
            m.conversations_without_reply += 1;
        }
        if c.created_at.and_then(local_date) == Some(today) {
            m.total_conversations_today += 1;
        }
    }
    m.agents_online = agents.iter().filter(|a| a.is_online()).count();
    m.resolution_rate = resolution_rate(m.resolved, conversations.len());
    m.avg_response_time_minutes = average_response_minutes(conversations);
    m
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceFailure {
    pub resource: &'static str,
    pub error: String,
}

/// One dashboard snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub conversations: Vec<Conversation>,
    pub agents: Vec<Agent>,
    pub contacts: Vec<Contact>,
    pub teams: Vec<Team>,
    pub metrics: DashboardMetrics,
    /// Resources that failed this refresh; their collections are empty.
    pub failures: Vec<ResourceFailure>,
    /// Set only when every resource failed.
    pub error: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

fn settle<T>(
    resource: Resource,
    result: Result<Vec<T>, ChatwootError>,
    failures: &mut Vec<ResourceFailure>,
) -> Vec<T> {
    match result {
        Ok(records) => records,
        Err(e) => {
            log::warn!("dashboard: loading {} failed: {}", resource.label(), e);
            failures.push(ResourceFailure {
                resource: resource.label(),
                error: e.to_string(),
            });
            Vec::new()
        }
    }
}

/// Fetch conversations, agents, contacts and teams concurrently. Never fails: a failing resource
/// comes back empty and is listed in `failures`.
pub async fn load_all(api: &dyn ChatwootApi, account_id: u64) -> DashboardData {
    let (conversations, agents, contacts, teams) = tokio::join!(
        fetch_typed::<Conversation>(api, account_id, Resource::Conversations),
        fetch_typed::<Agent>(api, account_id, Resource::Agents),
        fetch_typed::<Contact>(api, account_id, Resource::Contacts),
        fetch_typed::<Team>(api, account_id, Resource::Teams),
    );
    let mut failures = Vec::new();
    let conversations = settle(Resource::Conversations, conversations, &mut failures);
    let agents = settle(Resource::Agents, agents, &mut failures);
    let contacts = settle(Resource::Contacts, contacts, &mut failures);
    let teams = settle(Resource::Teams, teams, &mut failures);

    let error = if failures.len() == 4 {
        Some(format!(
            "could not load dashboard data: {}",
            failures
                .iter()
                .map(|f| format!("{}: {}", f.resource, f.error))
                .collect::<Vec<_>>()
                .join("; ")
        ))
    } else {
        None
    };

    let metrics = compute_metrics(&conversations, &agents, Local::now().date_naive());
    log::debug!(
        "dashboard: loaded {} conversations, {} agents, {} contacts, {} teams ({} failed)",
        conversations.len(),
        agents.len(),
        contacts.len(),
        teams.len(),
        failures.len()
    );
    DashboardData {
        conversations,
        agents,
        contacts,
        teams,
        metrics,
        failures,
        error,
        loaded_at: Utc::now(),
    }
}

struct Applied {
    request_id: u64,
    data: Option<DashboardData>,
}

/// Latest dashboard snapshot. Refreshes are numbered; a result older than the last applied one is dropped.
pub struct DashboardStore {
    api: Arc<dyn ChatwootApi>,
    account_id: u64,
    next_request: AtomicU64,
    applied: RwLock<Applied>,
}

impl DashboardStore {
    pub fn new(api: Arc<dyn ChatwootApi>, account_id: u64) -> Self {
        Self {
            api,
            account_id,
            next_request: AtomicU64::new(1),
            applied: RwLock::new(Applied {
                request_id: 0,
                data: None,
            }),
        }
    }

    /// Reserve the id for a new refresh.
    pub fn begin_refresh(&self) -> u64 {
        self.next_request.fetch_add(1, Ordering::SeqCst)
    }

    /// Store `data` unless a newer refresh was already applied. Returns whether it was stored.
    pub async fn apply(&self, request_id: u64, data: DashboardData) -> bool {
        let mut applied = self.applied.write().await;
        if request_id < applied.request_id {
            log::debug!(
                "dashboard: discarding stale refresh {} (have {})",
                request_id,
                applied.request_id
            );
            return false;
        }
        applied.request_id = request_id;
        applied.data = Some(data);
        true
    }

    /// Load fresh data and return the newest snapshot.
    pub async fn refresh(&self) -> Option<DashboardData> {
        let id = self.begin_refresh();
        let data = load_all(self.api.as_ref(), self.account_id).await;
        if self.apply(id, data.clone()).await {
            Some(data)
        } else {
            self.snapshot().await
        }
    }

    pub async fn snapshot(&self) -> Option<DashboardData> {
        self.applied.read().await.data.clone()
    }
}
