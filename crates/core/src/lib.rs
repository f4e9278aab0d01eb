//! # convorelay core
//!
//! Domain types, traits, and error definitions for the convorelay
//! conversation relay. This crate has **no framework dependencies**: it
//! defines the model that the store, backend client, and transport crates
//! implement against.
//!
//! The three seams are traits:
//! - [`HistoryStore`]: durable append-only per-user turns
//! - [`CompletionClient`]: one bounded request to the language model
//! - [`Channel`]: the messaging platform

pub mod error;
pub mod message;
pub mod history;
pub mod provider;
pub mod channel;

// Re-export key types at crate root for ergonomics
pub use error::{ChannelError, CompletionError, CompletionErrorKind, StoreError};
pub use message::{Role, Turn};
pub use history::HistoryStore;
pub use provider::{ChatRequest, CompletionClient, ContextWindow, Reply, WindowMessage};
pub use channel::{Channel, ChannelId, ChannelMessage};
