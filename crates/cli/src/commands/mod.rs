pub mod chat;
pub mod history;
pub mod onboard;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use convorelay_agent::Relay;
use convorelay_config::RelayConfig;
use convorelay_core::history::HistoryStore;
use convorelay_memory::SqliteHistory;
use convorelay_providers::OllamaClient;

/// Where the config file lives unless `--config` says otherwise.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| RelayConfig::config_dir().join("config.toml"))
}

/// Load and validate the config, with process env overrides.
///
/// `channel` replaces the configured channel before validation, so commands
/// that never touch Telegram do not require a bot token.
pub fn load_config(
    explicit: Option<&Path>,
    channel: Option<&str>,
) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let path = config_path(explicit);
    let config = RelayConfig::load_with_env(&path, |key| match (key, channel) {
        ("CONVORELAY_CHANNEL", Some(channel)) => Some(channel.to_string()),
        _ => std::env::var(key).ok(),
    })
    .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

pub async fn open_store(
    config: &RelayConfig,
) -> Result<Arc<dyn HistoryStore>, Box<dyn std::error::Error>> {
    let store = SqliteHistory::open(&config.history_path)
        .await
        .map_err(|e| format!("Failed to open history at {}: {e}", config.history_path.display()))?;
    Ok(Arc::new(store))
}

pub async fn build_relay(config: Arc<RelayConfig>) -> Result<Relay, Box<dyn std::error::Error>> {
    let store = open_store(&config).await?;
    let client = Arc::new(OllamaClient::from_config(&config)?);
    Ok(Relay::new(store, client, config))
}
