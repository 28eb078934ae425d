//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.atendo/config.json`) and environment.
//! Every section is optional; missing keys fall back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Chatwoot proxy endpoint and account.
    #[serde(default)]
    pub chatwoot: ChatwootConfig,

    /// LLM provider settings. Without a valid API key the orchestrator runs in fallback mode.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Keyword lists, webhook targets and auto-reply switch.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Automation server bind and port.
    #[serde(default)]
    pub server: ServerConfig,

    /// Override for the local state file (bots, user data). Relative paths resolve against the config file's parent.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

/// Chatwoot proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatwootConfig {
    /// Proxy base URL; requests go to `{proxyBaseUrl}?endpoint=...&account_id=...`. Overridden by ATENDO_PROXY_URL.
    #[serde(default)]
    pub proxy_base_url: Option<String>,

    /// Chatwoot account id (default 1).
    #[serde(default = "default_account_id")]
    pub account_id: u64,

    /// Per-request timeout in seconds (default 10).
    #[serde(default = "default_proxy_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_account_id() -> u64 {
    1
}

fn default_proxy_timeout_secs() -> u64 {
    10
}

impl Default for ChatwootConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: None,
            account_id: default_account_id(),
            timeout_secs: default_proxy_timeout_secs(),
        }
    }
}

impl ChatwootConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// OpenAI-compatible chat completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// API base (default "https://api.openai.com/v1"); `/chat/completions` is appended.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model id passed as-is to the provider (default "gpt-4o-mini").
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key. Overridden by ATENDO_LLM_API_KEY, then OPENAI_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,

    /// A key not starting with this prefix is treated as absent (default "sk-").
    #[serde(default = "default_llm_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Per-call timeout in seconds (default 30).
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_key_prefix() -> String {
    "sk-".to_string()
}

fn default_llm_temperature() -> f32 {
    0.3
}

fn default_llm_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            key_prefix: default_llm_key_prefix(),
            temperature: default_llm_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Orchestrator behaviour: auto-reply switch, keyword lists, webhook targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// When false, no auto_reply actions are produced even if the model drafts one.
    #[serde(default = "default_true")]
    pub auto_reply_enabled: bool,

    /// Company name given to the model when drafting replies.
    #[serde(default)]
    pub company_name: Option<String>,

    #[serde(default)]
    pub keywords: KeywordConfig,

    #[serde(default)]
    pub webhooks: WebhookTargets,
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_reply_enabled: true,
            company_name: None,
            keywords: KeywordConfig::default(),
            webhooks: WebhookTargets::default(),
        }
    }
}

/// Keyword lists for urgency detection and fallback lead scoring. Matching is case-insensitive substring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordConfig {
    /// Raises the urgent-message webhook and scores a lead hot.
    #[serde(default = "default_urgency_keywords")]
    pub urgency: Vec<String>,
    #[serde(default = "default_problem_keywords")]
    pub problem: Vec<String>,
    #[serde(default = "default_pricing_keywords")]
    pub pricing: Vec<String>,
    #[serde(default = "default_question_keywords")]
    pub question: Vec<String>,
    #[serde(default = "default_gratitude_keywords")]
    pub gratitude: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_urgency_keywords() -> Vec<String> {
    words(&["urgente", "emergência"])
}

fn default_problem_keywords() -> Vec<String> {
    words(&["problema"])
}

fn default_pricing_keywords() -> Vec<String> {
    words(&["preço", "valor", "custo", "orçamento"])
}

fn default_question_keywords() -> Vec<String> {
    words(&["informação", "dúvida", "como"])
}

fn default_gratitude_keywords() -> Vec<String> {
    words(&["obrigado", "obrigada"])
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            urgency: default_urgency_keywords(),
            problem: default_problem_keywords(),
            pricing: default_pricing_keywords(),
            question: default_question_keywords(),
            gratitude: default_gratitude_keywords(),
        }
    }
}

/// Webhook URLs the orchestrator targets. Unset targets are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTargets {
    #[serde(default)]
    pub conversation_resolved: Option<String>,
    #[serde(default)]
    pub urgent_message: Option<String>,
    #[serde(default)]
    pub agent_assigned: Option<String>,
}

/// Automation server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for HTTP (default 15252).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    15252
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

/// Configuration problems that select a degraded mode rather than aborting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no llm api key configured (set ATENDO_LLM_API_KEY, OPENAI_API_KEY or llm.apiKey)")]
    MissingApiKey,
    #[error("llm api key does not start with the expected prefix {0:?}")]
    InvalidApiKey(String),
    #[error("chatwoot proxy url not configured (set chatwoot.proxyBaseUrl or ATENDO_PROXY_URL)")]
    MissingProxyUrl,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Check a candidate key against the provider prefix. Empty or mis-prefixed keys are rejected.
pub fn validate_api_key(candidate: Option<&str>, prefix: &str) -> Result<String, ConfigError> {
    let key = candidate
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(ConfigError::MissingApiKey)?;
    if !prefix.is_empty() && !key.starts_with(prefix) {
        return Err(ConfigError::InvalidApiKey(prefix.to_string()));
    }
    Ok(key.to_string())
}

/// Resolve the LLM API key: ATENDO_LLM_API_KEY, then OPENAI_API_KEY, then config.
pub fn resolve_llm_api_key(config: &LlmConfig) -> Result<String, ConfigError> {
    let candidate = non_empty_env("ATENDO_LLM_API_KEY")
        .or_else(|| non_empty_env("OPENAI_API_KEY"))
        .or_else(|| config.api_key.clone());
    validate_api_key(candidate.as_deref(), &config.key_prefix)
}

/// Resolve the proxy base URL: env ATENDO_PROXY_URL overrides config.
pub fn resolve_proxy_url(config: &ChatwootConfig) -> Result<String, ConfigError> {
    non_empty_env("ATENDO_PROXY_URL")
        .or_else(|| {
            config
                .proxy_base_url
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .ok_or(ConfigError::MissingProxyUrl)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("ATENDO_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".atendo").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve the local state file: `statePath` if set (relative to the config file's parent), otherwise `state.json` next to the config.
pub fn resolve_state_path(config: &Config, config_path: &Path) -> PathBuf {
    let parent = config_parent(config_path);
    match &config.state_path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                parent.join(p)
            }
        }
        _ => parent.join("state.json"),
    }
}

/// Load config from the given path (or ATENDO_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.chatwoot.account_id, 1);
        assert_eq!(config.chatwoot.timeout_secs, 10);
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.llm.key_prefix, "sk-");
        assert_eq!(config.server.port, 15252);
        assert!(config.orchestrator.auto_reply_enabled);
        assert!(config
            .orchestrator
            .keywords
            .urgency
            .iter()
            .any(|k| k == "urgente"));
    }

    #[test]
    fn camel_case_keys_are_read() {
        let config: Config = serde_json::from_str(
            r#"{
                "chatwoot": { "proxyBaseUrl": "https://proxy.example/api", "accountId": 7 },
                "orchestrator": {
                    "autoReplyEnabled": false,
                    "keywords": { "urgency": ["urgent", "asap"] },
                    "webhooks": { "conversationResolved": "https://hooks.example/resolved" }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.chatwoot.proxy_base_url.as_deref(),
            Some("https://proxy.example/api")
        );
        assert_eq!(config.chatwoot.account_id, 7);
        assert!(!config.orchestrator.auto_reply_enabled);
        assert_eq!(config.orchestrator.keywords.urgency, vec!["urgent", "asap"]);
        // untouched lists keep their defaults
        assert!(!config.orchestrator.keywords.gratitude.is_empty());
        assert_eq!(
            config.orchestrator.webhooks.conversation_resolved.as_deref(),
            Some("https://hooks.example/resolved")
        );
        assert!(config.orchestrator.webhooks.urgent_message.is_none());
    }

    #[test]
    fn api_key_validation() {
        assert_eq!(validate_api_key(None, "sk-"), Err(ConfigError::MissingApiKey));
        assert_eq!(
            validate_api_key(Some("   "), "sk-"),
            Err(ConfigError::MissingApiKey)
        );
        assert_eq!(
            validate_api_key(Some("your-api-key-here"), "sk-"),
            Err(ConfigError::InvalidApiKey("sk-".to_string()))
        );
        assert_eq!(
            validate_api_key(Some(" sk-abc123 "), "sk-"),
            Ok("sk-abc123".to_string())
        );
        assert_eq!(validate_api_key(Some("local"), ""), Ok("local".to_string()));
    }

    #[test]
    fn resolve_state_path_default_and_override() {
        let path = Path::new("/home/user/.atendo/config.json");
        let mut config = Config::default();
        assert_eq!(
            resolve_state_path(&config, path),
            PathBuf::from("/home/user/.atendo/state.json")
        );
        config.state_path = Some(PathBuf::from("data/state.json"));
        assert_eq!(
            resolve_state_path(&config, path),
            PathBuf::from("/home/user/.atendo/data/state.json")
        );
        config.state_path = Some(PathBuf::from("/var/lib/atendo/state.json"));
        assert_eq!(
            resolve_state_path(&config, path),
            PathBuf::from("/var/lib/atendo/state.json")
        );
    }
}
