//! # convorelay agent
//!
//! Conversation memory and completion orchestration: decides what context
//! goes to the backend, records both sides of every exchange, and turns
//! backend failures into replies the user can read.

pub mod context;
pub mod locks;
pub mod relay;

pub use context::ContextAssembler;
pub use locks::UserLocks;
pub use relay::{Relay, EMPTY_INPUT_REPLY};
