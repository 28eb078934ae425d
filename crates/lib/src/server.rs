//! Automation server: health, dashboard snapshot, and event intake.
//!
//! `POST /events` runs the orchestrator on a [`DomainEvent`] and executes the resulting actions.

use crate::chatwoot::ChatwootApi;
use crate::config::Config;
use crate::dashboard::DashboardStore;
use crate::executor::{ActionExecutor, ExecutionReport};
use crate::llm::LlmClient;
use crate::orchestrator::{AutomationAction, DomainEvent, Orchestrator};
use crate::webhook::WebhookClient;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Shared handler state.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub executor: Arc<ActionExecutor>,
    pub dashboard: Arc<DashboardStore>,
}

impl ServerState {
    pub fn new(
        config: Config,
        api: Arc<dyn ChatwootApi>,
        llm: Option<Arc<dyn LlmClient>>,
        dry_run: bool,
    ) -> Self {
        let account_id = config.chatwoot.account_id;
        let orchestrator = Orchestrator::new(llm, config.orchestrator.clone());
        let executor = ActionExecutor::new(api.clone(), WebhookClient::default(), account_id)
            .dry_run(dry_run);
        let dashboard = DashboardStore::new(api, account_id);
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            executor: Arc::new(executor),
            dashboard: Arc::new(dashboard),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub actions: Vec<AutomationAction>,
    pub report: ExecutionReport,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/dashboard", get(dashboard_http))
        .route("/events", post(events_http))
        .with_state(state)
}

/// Bind to `server.bind:server.port` and serve until SIGINT/SIGTERM.
pub async fn run_server(state: ServerState) -> Result<()> {
    let bind_addr = format!("{}:{}", state.config.server.bind.trim(), state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "server: listening on {} (ai {})",
        bind_addr,
        if state.orchestrator.ai_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited")?;
    log::info!("server: stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM. A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("server: cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("server: cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("server: shutdown signal received");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.config.server.port,
        "ai": state.orchestrator.ai_enabled(),
    }))
}

/// GET /dashboard refreshes and returns the newest snapshot.
async fn dashboard_http(State(state): State<ServerState>) -> Response {
    match state.dashboard.refresh().await {
        Some(data) => Json(data).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "dashboard not loaded"})),
        )
            .into_response(),
    }
}

/// POST /events: decide and execute actions for one event.
async fn events_http(
    State(state): State<ServerState>,
    Json(event): Json<DomainEvent>,
) -> Json<EventResponse> {
    let actions = state.orchestrator.process_event(&event).await;
    let report = state.executor.execute(&actions).await;
    if report.failed() > 0 {
        log::warn!(
            "server: {} of {} action(s) failed for {}",
            report.failed(),
            actions.len(),
            event.kind()
        );
    }
    Json(EventResponse { actions, report })
}
