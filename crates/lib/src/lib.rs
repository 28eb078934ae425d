//! Atendo core library: Chatwoot proxy access, dashboard metrics, the event-to-action
//! orchestrator and the action executor, used by the CLI and the automation server.

pub mod chatwoot;
pub mod config;
pub mod dashboard;
pub mod executor;
pub mod init;
pub mod llm;
pub mod orchestrator;
pub mod server;
pub mod state;
pub mod webhook;
