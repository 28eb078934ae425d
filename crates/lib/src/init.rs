//! Initialize the configuration directory: create ~/.atendo with a default config and empty state.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;
use crate::state::LocalState;

/// Ensure `atendo init` has run (config file exists).
pub fn require_initialized(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `atendo init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Create the config directory and default files if they do not exist.
/// - Writes `config.json` with every section at its default if missing.
/// - Writes an empty, current-version state file at the resolved state path if missing.
///
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&config::Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let state_path = config::resolve_state_path(&config, config_path);
    if !state_path.exists() {
        if let Some(parent) = state_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory {}", parent.display()))?;
        }
        let state = serde_json::to_string_pretty(&LocalState::default())
            .context("serializing empty state")?;
        std::fs::write(&state_path, state)
            .with_context(|| format!("writing state file {}", state_path.display()))?;
        log::info!("created state file at {}", state_path.display());
    }

    Ok(config_dir.to_path_buf())
}
