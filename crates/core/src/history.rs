//! History store trait — durable, append-only per-user turn log.
//!
//! Storage is unbounded; reads are always windowed to a recent suffix.
//! There is deliberately no update or delete.

use async_trait::async_trait;
use crate::error::StoreError;
use crate::message::{Role, Turn};

/// The core HistoryStore trait.
///
/// Implementations: SQLite (durable), in-memory (tests / ephemeral sessions).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Record one turn and return it with its assigned timestamp and seq.
    ///
    /// Success means the write is durable. User and assistant turns must
    /// have non-empty content.
    async fn append(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> std::result::Result<Turn, StoreError>;

    /// The last `limit` turns of `user_id`, oldest first.
    ///
    /// Empty when the user has no history or `limit == 0`.
    async fn recent(
        &self,
        user_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<Turn>, StoreError>;
}

/// Reject empty user/assistant content before it reaches storage.
pub fn check_content(role: Role, content: &str) -> std::result::Result<(), StoreError> {
    if role != Role::System && content.is_empty() {
        return Err(StoreError::EmptyContent {
            role: role.to_string(),
        });
    }
    Ok(())
}
