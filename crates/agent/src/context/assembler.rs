//! Builds the message list for one completion request.

use std::sync::Arc;

use convorelay_core::error::StoreError;
use convorelay_core::history::HistoryStore;
use convorelay_core::message::{Role, Turn};
use convorelay_core::provider::{ContextWindow, WindowMessage};
use tracing::debug;

/// Reads a bounded history suffix and frames it with persona and input.
pub struct ContextAssembler {
    store: Arc<dyn HistoryStore>,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Fetch the last `window_size` turns of `user_id` and assemble the window.
    ///
    /// Store failures are returned to the caller; deciding to degrade is
    /// orchestration policy.
    pub async fn build(
        &self,
        user_id: &str,
        new_input: &str,
        persona: &str,
        window_size: usize,
    ) -> Result<ContextWindow, StoreError> {
        let history = self.store.recent(user_id, window_size).await?;
        debug!(
            user_id = %user_id,
            history_turns = history.len(),
            window_size,
            "Assembling context window"
        );
        Ok(Self::assemble(persona, history, new_input))
    }

    /// Pure framing step: persona first, history in the given order, input last.
    ///
    /// The persona goes in verbatim, even when empty.
    pub fn assemble(persona: &str, history: Vec<Turn>, new_input: &str) -> ContextWindow {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(WindowMessage::new(Role::System, persona));
        messages.extend(history.into_iter().map(WindowMessage::from));
        messages.push(WindowMessage::new(Role::User, new_input));
        ContextWindow { messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convorelay_memory::InMemoryHistory;

    async fn store_with(turns: &[(Role, &str)]) -> Arc<InMemoryHistory> {
        let store = Arc::new(InMemoryHistory::new());
        for (role, content) in turns {
            store.append("42", *role, content).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn empty_history_gives_persona_and_input() {
        let assembler = ContextAssembler::new(store_with(&[]).await);
        let window = assembler.build("42", "hi", "P", 10).await.unwrap();
        assert_eq!(
            window.messages,
            vec![
                WindowMessage::new(Role::System, "P"),
                WindowMessage::new(Role::User, "hi"),
            ]
        );
    }

    #[tokio::test]
    async fn window_length_is_bounded_by_window_size() {
        let store = store_with(&[
            (Role::User, "1"),
            (Role::Assistant, "2"),
            (Role::User, "3"),
            (Role::Assistant, "4"),
            (Role::User, "5"),
        ])
        .await;
        let assembler = ContextAssembler::new(store);

        for (size, expected) in [(0, 2), (3, 5), (5, 7), (20, 7)] {
            let window = assembler.build("42", "next", "P", size).await.unwrap();
            assert_eq!(window.len(), expected, "window_size = {size}");
        }

        let window = assembler.build("42", "next", "P", 2).await.unwrap();
        let contents: Vec<&str> = window.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["P", "4", "5", "next"]);
    }

    #[tokio::test]
    async fn empty_persona_is_kept_verbatim() {
        let assembler = ContextAssembler::new(store_with(&[]).await);
        let window = assembler.build("42", "hi", "", 10).await.unwrap();
        assert_eq!(window.messages[0], WindowMessage::new(Role::System, ""));
    }

    #[tokio::test]
    async fn input_is_not_trimmed_or_rewritten() {
        let assembler = ContextAssembler::new(store_with(&[]).await);
        let window = assembler.build("42", "  hi\n", "P", 10).await.unwrap();
        assert_eq!(window.messages[1].content, "  hi\n");
    }

    #[tokio::test]
    async fn build_is_deterministic() {
        let assembler =
            ContextAssembler::new(store_with(&[(Role::User, "a"), (Role::Assistant, "b")]).await);
        let first = assembler.build("42", "c", "P", 10).await.unwrap();
        let second = assembler.build("42", "c", "P", 10).await.unwrap();
        assert_eq!(first, second);
    }
}
