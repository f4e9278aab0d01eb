//! The per-message orchestration.
//!
//! One inbound user message moves through:
//!
//! ```text
//! RECEIVED -> HISTORY_APPENDED(user) -> WINDOW_BUILT -> BACKEND_CALLED -> {REPLIED | FAILED}
//! FAILED -> HISTORY_APPENDED(assistant, error-text) -> REPLIED(error-text)
//! ```
//!
//! Exactly one reply comes out per message. Backend failures become
//! ordinary assistant text, and that text is what gets recorded.
//! History failures are logged and never block the reply.

use std::sync::Arc;

use convorelay_config::RelayConfig;
use convorelay_core::history::HistoryStore;
use convorelay_core::message::Role;
use convorelay_core::provider::{CompletionClient, ContextWindow};
use tracing::{debug, info, warn};

use crate::context::ContextAssembler;
use crate::locks::UserLocks;

/// Returned for empty input; the backend is not called and nothing is recorded.
pub const EMPTY_INPUT_REPLY: &str = "Send me some text and I'll answer.";

pub struct Relay {
    store: Arc<dyn HistoryStore>,
    client: Arc<dyn CompletionClient>,
    assembler: ContextAssembler,
    config: Arc<RelayConfig>,
    locks: UserLocks,
}

impl Relay {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        client: Arc<dyn CompletionClient>,
        config: Arc<RelayConfig>,
    ) -> Self {
        Self {
            assembler: ContextAssembler::new(store.clone()),
            store,
            client,
            config,
            locks: UserLocks::new(),
        }
    }

    /// Answer to the `/start` command.
    pub fn greeting(&self) -> String {
        format!("Hi, I'm {}! How are you?", self.config.bot_name)
    }

    /// Process one message from `user_id` and return the text to send back.
    ///
    /// Messages of the same user are handled one at a time; different
    /// users proceed concurrently.
    pub async fn handle(&self, user_id: &str, text: &str) -> String {
        if text.is_empty() {
            debug!(user_id = %user_id, "Ignoring empty input");
            return EMPTY_INPUT_REPLY.to_string();
        }

        let _guard = self.locks.lock(user_id).await;
        info!(user_id = %user_id, chars = text.len(), "Message received");

        // Read before recording the new turn so it is not counted twice;
        // the per-user lock keeps the pair atomic for this user.
        let window = self.window_for(user_id, text).await;

        let user_recorded = match self.store.append(user_id, Role::User, text).await {
            Ok(_) => true,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to record user turn");
                false
            }
        };

        let reply = match self.client.complete(&window).await {
            Ok(reply) => reply.content,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    kind = %e.kind(),
                    error = %e,
                    "Backend call failed; replying with error text"
                );
                e.user_message()
            }
        };

        // An answer is only recorded after the question it answers.
        if !user_recorded {
            debug!(user_id = %user_id, "User turn missing; not recording the reply");
        } else if let Err(e) = self.store.append(user_id, Role::Assistant, &reply).await {
            warn!(user_id = %user_id, error = %e, "Failed to record assistant turn");
        }

        debug!(user_id = %user_id, chars = reply.len(), "Reply ready");
        reply
    }

    /// Build the context window, falling back to persona + input when
    /// history cannot be read.
    async fn window_for(&self, user_id: &str, text: &str) -> ContextWindow {
        let persona = &self.config.persona;
        match self
            .assembler
            .build(user_id, text, persona, self.config.window_size)
            .await
        {
            Ok(window) => window,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "History unavailable; answering without it"
                );
                ContextAssembler::assemble(persona, Vec::new(), text)
            }
        }
    }
}
