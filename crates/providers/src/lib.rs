//! Language-model backend clients for convorelay.
//!
//! All clients implement the `convorelay_core::CompletionClient` trait.

pub mod ollama;

pub use ollama::OllamaClient;
