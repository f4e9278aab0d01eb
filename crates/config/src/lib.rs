//! Configuration loading, validation, and management for convorelay.
//!
//! Loads configuration from `~/.convorelay/config.toml` (or an explicit
//! path) with environment variable overrides. Validates all settings at
//! startup; an invalid configuration stops the process before any message
//! is handled. The result is read-only for the rest of the process lifetime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on `window_size`; larger windows are almost certainly a typo.
pub const MAX_WINDOW_SIZE: usize = 1000;

/// The root configuration structure.
///
/// Maps directly to `~/.convorelay/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Chat endpoint of the language-model backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Backend model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// System prompt prefixed to every context window (may be empty)
    #[serde(default)]
    pub persona: String,

    /// How many recent turns are sent with each request
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Bound on a single backend request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Answer used when the backend's response has no answer field
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Name the bot introduces itself with on /start
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// SQLite database holding the conversation history
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Which transport to run: "telegram" or "cli"
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Telegram transport settings
    #[serde(default)]
    pub telegram: TelegramSettings,
}

fn default_backend_url() -> String {
    "http://localhost:11434/api/chat".into()
}
fn default_model() -> String {
    "gpt-oss:20b".into()
}
fn default_window_size() -> usize {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_fallback_reply() -> String {
    "I didn't understand your question.".into()
}
fn default_bot_name() -> String {
    "Benjamin".into()
}
fn default_history_path() -> PathBuf {
    RelayConfig::config_dir().join("history.db")
}
fn default_channel() -> String {
    "telegram".into()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    /// Bot token from @BotFather
    #[serde(default)]
    pub bot_token: String,

    /// Allowlist of user IDs. Empty = deny all. ["*"] = allow all.
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Server-side long-poll timeout for getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}
fn default_poll_timeout_secs() -> u64 {
    30
}
fn default_api_base() -> String {
    "https://api.telegram.org".into()
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_users: default_allowed_users(),
            poll_timeout_secs: default_poll_timeout_secs(),
            api_base: default_api_base(),
        }
    }
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = if self.bot_token.is_empty() {
            "None"
        } else {
            "[REDACTED]"
        };
        f.debug_struct("TelegramSettings")
            .field("bot_token", &token)
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl RelayConfig {
    /// Load from `path`, then apply overrides from `env`, then validate.
    ///
    /// Recognized variables:
    /// - `BOT_TOKEN`, `BOT_NAME`, `BOT_PERSONA`
    /// - `OLLAMA_URL`, `OLLAMA_MODEL`
    /// - `CONVORELAY_WINDOW_SIZE`, `CONVORELAY_HISTORY_PATH`, `CONVORELAY_CHANNEL`
    pub fn load_with_env<F>(path: &Path, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::read_file(path)?;
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = env("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(name) = env("BOT_NAME") {
            self.bot_name = name;
        }
        if let Some(persona) = env("BOT_PERSONA") {
            self.persona = persona;
        }
        if let Some(url) = env("OLLAMA_URL") {
            self.backend_url = url;
        }
        if let Some(model) = env("OLLAMA_MODEL") {
            self.model = model;
        }
        if let Some(raw) = env("CONVORELAY_WINDOW_SIZE") {
            self.window_size = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CONVORELAY_WINDOW_SIZE must be a non-negative integer, got '{raw}'"
                ))
            })?;
        }
        if let Some(path) = env("CONVORELAY_HISTORY_PATH") {
            self.history_path = PathBuf::from(path);
        }
        if let Some(channel) = env("CONVORELAY_CHANNEL") {
            self.channel = channel.trim().to_lowercase();
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".convorelay")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.trim().is_empty() {
            return Err(ConfigError::Missing("backend_url".into()));
        }
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "backend_url must be an http(s) URL, got '{}'",
                self.backend_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing("model".into()));
        }
        if self.bot_name.trim().is_empty() {
            return Err(ConfigError::Missing("bot_name".into()));
        }
        // Sent as the reply when the backend answer is absent; must be non-blank.
        if self.fallback_reply.trim().is_empty() {
            return Err(ConfigError::Missing("fallback_reply".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be > 0".into(),
            ));
        }
        if self.window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "window_size must be at most {MAX_WINDOW_SIZE}"
            )));
        }
        match self.channel.as_str() {
            "telegram" => {
                if self.telegram.bot_token.trim().is_empty() {
                    return Err(ConfigError::Missing("telegram.bot_token (or BOT_TOKEN)".into()));
                }
            }
            "cli" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown channel '{other}', expected \"telegram\" or \"cli\""
                )));
            }
        }
        Ok(())
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            model: default_model(),
            persona: String::new(),
            window_size: default_window_size(),
            request_timeout_secs: default_request_timeout_secs(),
            fallback_reply: default_fallback_reply(),
            bot_name: default_bot_name(),
            history_path: default_history_path(),
            channel: default_channel(),
            telegram: TelegramSettings::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Missing required config option: {0}")]
    Missing(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
