//! Telegram channel adapter.
//!
//! Talks to the Bot API directly over HTTPS:
//! - `getUpdates` long polling for inbound messages
//! - `sendMessage` for replies (split at Telegram's 4096-character limit)
//! - `sendChatAction` for the typing indicator
//!
//! Only text messages from private chats are forwarded. The sender's
//! numeric Telegram ID is the stable user id.

use async_trait::async_trait;
use convorelay_config::TelegramSettings;
use convorelay_core::channel::{allowlist_permits, Channel, ChannelId, ChannelMessage};
use convorelay_core::error::ChannelError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Telegram rejects longer messages.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Longest pause between failed polls.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// Allowed user IDs. Empty = deny all, ["*"] = allow all.
    pub allowed_users: Vec<String>,
    /// Server-side long-poll timeout.
    pub poll_timeout_secs: u64,
    /// Bot API base URL (overridable for tests and self-hosted API servers).
    pub api_base: String,
}

impl From<&TelegramSettings> for TelegramConfig {
    fn from(settings: &TelegramSettings) -> Self {
        Self {
            bot_token: settings.bot_token.clone(),
            allowed_users: settings.allowed_users.clone(),
            poll_timeout_secs: settings.poll_timeout_secs,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Telegram channel adapter.
pub struct TelegramChannel {
    config: TelegramConfig,
    channel_id: ChannelId,
    client: reqwest::Client,
    poller: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Result<Self, ChannelError> {
        // Must outlive the server-side long-poll wait.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()
            .map_err(|e| ChannelError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            config,
            channel_id: ChannelId("telegram".into()),
            client,
            poller: tokio::sync::Mutex::new(None),
        })
    }

    fn method_url(config: &TelegramConfig, method: &str) -> String {
        format!("{}/bot{}/{}", config.api_base, config.bot_token, method)
    }

    /// POST a Bot API method and unwrap its `{ok, result}` envelope.
    async fn call<T: DeserializeOwned>(
        client: &reqwest::Client,
        config: &TelegramConfig,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, ChannelError> {
        let response = client
            .post(Self::method_url(config, method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("{method}: {}", e.without_url())))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(format!("{method}: {e}")))?;

        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ChannelError::DeliveryFailed {
                channel: "telegram".into(),
                reason: envelope
                    .description
                    .unwrap_or_else(|| format!("{method} returned ok=false")),
            }),
        }
    }

    /// Long-poll until the receiver is dropped or the task is aborted.
    async fn poll_loop(
        client: reqwest::Client,
        config: TelegramConfig,
        tx: mpsc::Sender<Result<ChannelMessage, ChannelError>>,
    ) {
        let mut offset: i64 = 0;
        let mut backoff = Duration::from_secs(1);

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": config.poll_timeout_secs,
                "allowed_updates": ["message"],
            });

            let updates: Vec<Update> =
                match Self::call(&client, &config, "getUpdates", &body).await {
                    Ok(updates) => {
                        backoff = Duration::from_secs(1);
                        updates
                    }
                    Err(e) => {
                        warn!(error = %e, retry_in_secs = backoff.as_secs(), "Telegram poll failed");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(msg) = to_channel_message(update) else {
                    continue;
                };
                if !allowlist_permits(&config.allowed_users, &msg.sender_id) {
                    debug!(sender_id = %msg.sender_id, "Dropping message from non-allowed user");
                    continue;
                }
                if tx.send(Ok(msg)).await.is_err() {
                    info!("Telegram receiver dropped; stopping poll loop");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        if self.config.bot_token.is_empty() {
            return Err(ChannelError::NotConfigured("telegram bot_token is empty".into()));
        }

        info!("Telegram channel starting (long polling)");
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(Self::poll_loop(
            self.client.clone(),
            self.config.clone(),
            tx,
        ));
        if let Some(previous) = self.poller.lock().await.replace(handle) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn send(
        &self,
        chat_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        for (i, chunk) in split_message(content, MAX_MESSAGE_CHARS).into_iter().enumerate() {
            let mut body = serde_json::json!({ "chat_id": chat_id, "text": chunk });
            // Only the first part threads onto the user's message.
            if let (0, Some(reply_to)) = (i, reply_to) {
                body["reply_to_message_id"] = serde_json::json!(reply_to);
            }
            let _: serde_json::Value =
                Self::call(&self.client, &self.config, "sendMessage", &body).await?;
        }
        debug!(chat_id = %chat_id, chars = content.len(), "Telegram reply sent");
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        let _: bool = Self::call(&self.client, &self.config, "sendChatAction", &body).await?;
        Ok(())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        allowlist_permits(&self.config.allowed_users, sender_id)
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Telegram channel stopping");
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

/// Keep private-chat text messages that have a sender; drop everything else.
fn to_channel_message(update: Update) -> Option<ChannelMessage> {
    let message = update.message?;
    if message.chat.kind != "private" {
        return None;
    }
    let from = message.from?;
    let text = message.text.filter(|t| !t.is_empty())?;

    Some(ChannelMessage {
        channel_id: ChannelId("telegram".into()),
        sender_id: from.id.to_string(),
        sender_name: from.username.or(from.first_name),
        content: text,
        chat_id: message.chat.id.to_string(),
        message_id: Some(message.message_id.to_string()),
    })
}

/// Split `text` into pieces of at most `limit` characters.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(limit).map(|c| c.iter().collect()).collect()
}

// --- Bot API types ---

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    #[serde(default)]
    from: Option<TgUser>,
    chat: TgChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}
