//! Local state file: configured webhook bots and the signed-in user's profile.
//!
//! Stored as versioned JSON (default `~/.atendo/state.json`). Files written before the
//! `version` field existed read as version 0 and are migrated on load.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub const CURRENT_STATE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is not valid json: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid bot: {0}")]
    InvalidBot(String),
    #[error("bot not found: {0}")]
    NotFound(String),
}

/// Bot ids were numbers in older files and strings since.
fn lenient_string_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Text(String),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => n.to_string(),
        Some(Raw::Text(s)) => s,
        None => String::new(),
    })
}

fn default_active() -> bool {
    true
}

/// A webhook bot configured by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    #[serde(default, deserialize_with = "lenient_string_id")]
    pub id: String,
    pub name: String,
    #[serde(alias = "webhook")]
    pub webhook_url: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    /// Missing in files from before versioning; read as 0.
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub bots: Vec<Bot>,
    #[serde(default)]
    pub user_data: Option<serde_json::Value>,
    #[serde(default)]
    pub user_type: Option<String>,
}

impl Default for LocalState {
    fn default() -> Self {
        Self {
            version: CURRENT_STATE_VERSION,
            bots: Vec::new(),
            user_data: None,
            user_type: None,
        }
    }
}

impl LocalState {
    /// Bring an older state up to [`CURRENT_STATE_VERSION`]. Returns true when anything changed.
    pub fn migrate(&mut self) -> bool {
        if self.version >= CURRENT_STATE_VERSION {
            return false;
        }
        // 0 -> 1: every bot gets a stable id
        for bot in self.bots.iter_mut().filter(|b| b.id.trim().is_empty()) {
            bot.id = uuid::Uuid::new_v4().to_string();
        }
        log::info!(
            "state: migrated state from version {} to {}",
            self.version,
            CURRENT_STATE_VERSION
        );
        self.version = CURRENT_STATE_VERSION;
        true
    }
}

/// Only http(s) URLs are accepted as bot targets.
pub fn validate_webhook_url(url: &str) -> Result<(), StateError> {
    match reqwest::Url::parse(url.trim()) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => Ok(()),
        _ => Err(StateError::InvalidBot(format!(
            "webhook url must be http(s): {:?}",
            url
        ))),
    }
}

/// In-memory state backed by a JSON file; every mutation is written through.
pub struct StateStore {
    path: PathBuf,
    state: RwLock<LocalState>,
}

impl StateStore {
    /// Load from `path`. A missing file starts empty; an unreadable or invalid file is an error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(s) => {
                let mut state: LocalState =
                    serde_json::from_str(&s).map_err(|e| StateError::Parse {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                let migrated = state.migrate();
                let store = Self {
                    path,
                    state: RwLock::new(state),
                };
                if migrated {
                    let state = store.snapshot().await;
                    store.write_file(&state).await?;
                }
                return Ok(store);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("state: no state file at {}, starting empty", path.display());
                LocalState::default()
            }
            Err(source) => return Err(StateError::Io { path, source }),
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, state: &LocalState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state).map_err(|e| StateError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&self.path, json).await.map_err(io_err)
    }

    /// Apply `change` to a copy of the state, write the copy, then swap it in.
    /// On any error the in-memory state is left as it was.
    async fn update<T>(
        &self,
        change: impl FnOnce(&mut LocalState) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let out = change(&mut next)?;
        self.write_file(&next).await?;
        *state = next;
        Ok(out)
    }

    pub async fn snapshot(&self) -> LocalState {
        self.state.read().await.clone()
    }

    pub async fn bots(&self) -> Vec<Bot> {
        self.state.read().await.bots.clone()
    }

    pub async fn get_bot(&self, id: &str) -> Option<Bot> {
        let state = self.state.read().await;
        state.bots.iter().find(|b| b.id == id).cloned()
    }

    /// Add a bot with a fresh id and persist.
    pub async fn add_bot(
        &self,
        name: &str,
        webhook_url: &str,
        description: Option<String>,
    ) -> Result<Bot, StateError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StateError::InvalidBot("name is empty".to_string()));
        }
        validate_webhook_url(webhook_url)?;
        let bot = Bot {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            webhook_url: webhook_url.trim().to_string(),
            active: true,
            description: description.filter(|d| !d.trim().is_empty()),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.update(|state| {
            state.bots.push(bot.clone());
            Ok(())
        })
        .await?;
        log::info!("state: added bot {} ({})", bot.name, bot.id);
        Ok(bot)
    }

    /// Remove a bot by id and persist. Returns the removed bot.
    pub async fn remove_bot(&self, id: &str) -> Result<Bot, StateError> {
        let bot = self
            .update(|state| {
                let idx = state
                    .bots
                    .iter()
                    .position(|b| b.id == id)
                    .ok_or_else(|| StateError::NotFound(id.to_string()))?;
                Ok(state.bots.remove(idx))
            })
            .await?;
        log::info!("state: removed bot {} ({})", bot.name, bot.id);
        Ok(bot)
    }

    pub async fn set_bot_active(&self, id: &str, active: bool) -> Result<(), StateError> {
        self.update(|state| {
            let bot = state
                .bots
                .iter_mut()
                .find(|b| b.id == id)
                .ok_or_else(|| StateError::NotFound(id.to_string()))?;
            bot.active = active;
            Ok(())
        })
        .await
    }

    /// Replace the signed-in user's profile. `None` clears a field.
    pub async fn set_user(
        &self,
        user_data: Option<serde_json::Value>,
        user_type: Option<String>,
    ) -> Result<(), StateError> {
        self.update(|state| {
            state.user_data = user_data;
            state.user_type = user_type;
            Ok(())
        })
        .await
    }
}
