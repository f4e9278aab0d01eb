//! In-memory history — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use convorelay_core::error::StoreError;
use convorelay_core::history::{check_content, HistoryStore};
use convorelay_core::message::{Role, Turn};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::clock::TurnClock;

/// Keeps every user's turns in a Vec. Nothing survives the process.
pub struct InMemoryHistory {
    streams: RwLock<HashMap<String, Vec<Turn>>>,
    clock: TurnClock,
    next_seq: std::sync::atomic::AtomicI64,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            clock: TurnClock::new(),
            next_seq: std::sync::atomic::AtomicI64::new(1),
        }
    }

    /// Total turns stored across all users.
    pub async fn len(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, user_id: &str, role: Role, content: &str) -> Result<Turn, StoreError> {
        check_content(role, content)?;

        // Assign under the write lock so seq and timestamp follow push order.
        let mut streams = self.streams.write().await;
        let turn = Turn {
            seq: self
                .next_seq
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: self.clock.next(),
        };
        streams
            .entry(user_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(turn)
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let streams = self.streams.read().await;
        let Some(stream) = streams.get(user_id) else {
            return Ok(Vec::new());
        };
        let start = stream.len().saturating_sub(limit);
        Ok(stream[start..].to_vec())
    }
}
