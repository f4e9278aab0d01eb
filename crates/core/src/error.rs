//! Error types for the convorelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; configuration errors live
//! in the config crate.

use thiserror::Error;

// --- Bounded context errors ---

/// Persistence failures of the history store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Refusing to record an empty {role} turn")]
    EmptyContent { role: String },
}

/// The class of a failed completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    Timeout,
    Unreachable,
    MalformedResponse,
}

impl std::fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::MalformedResponse => "malformed_response",
        };
        f.write_str(s)
    }
}

/// Failures talking to the language-model backend.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("Backend did not answer within {after_secs}s")]
    Timeout { after_secs: u64 },

    #[error("Backend unreachable: {detail}")]
    Unreachable { detail: String },

    #[error("Malformed backend response: {detail}")]
    MalformedResponse { detail: String },
}

impl CompletionError {
    pub fn kind(&self) -> CompletionErrorKind {
        match self {
            Self::Timeout { .. } => CompletionErrorKind::Timeout,
            Self::Unreachable { .. } => CompletionErrorKind::Unreachable,
            Self::MalformedResponse { .. } => CompletionErrorKind::MalformedResponse,
        }
    }

    /// The apology shown to the user in place of a model answer.
    ///
    /// This exact text is also recorded as the assistant turn, so later
    /// context windows match what the user saw.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { after_secs } => {
                format!("❌ The model server did not answer in time (gave up after {after_secs}s).")
            }
            Self::Unreachable { detail } => {
                format!("❌ Unable to reach the model server: {detail}")
            }
            Self::MalformedResponse { detail } => {
                format!("❌ Could not process the model server's answer: {detail}")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}
