//! Completion client trait — the abstraction over the language-model backend.
//!
//! A client takes one context window, sends it to the backend as a single
//! non-streaming request and returns the answer or a named failure.
//!
//! Implementations: Ollama `/api/chat`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::CompletionError;
use crate::message::{Role, Turn};

/// One entry of a context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMessage {
    pub role: Role,
    pub content: String,
}

impl WindowMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<Turn> for WindowMessage {
    fn from(turn: Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content,
        }
    }
}

/// The ordered message list sent to the backend for one request:
/// persona, recent turns oldest-first, then the new user input.
///
/// Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub messages: Vec<WindowMessage>,
}

impl ContextWindow {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Build the backend request body for this window.
    pub fn to_request(&self, model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: self.messages.clone(),
            stream: false,
        }
    }
}

/// Wire shape of a chat request: `{model, messages: [{role, content}], stream}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WindowMessage>,
    pub stream: bool,
}

/// A successful backend answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// The text returned to the user
    pub content: String,

    /// Which model answered, if the backend said so
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Reply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
        }
    }
}

/// The core CompletionClient trait.
///
/// One call is one request: no retry, no streaming.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// A human-readable name for this client (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send the window and wait, bounded, for the answer.
    async fn complete(&self, window: &ContextWindow) -> std::result::Result<Reply, CompletionError>;

    /// Whether the backend answers at all.
    async fn health_check(&self) -> std::result::Result<bool, CompletionError> {
        Ok(true)
    }
}
