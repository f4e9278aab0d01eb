//! Messaging transports for convorelay.
//!
//! Each channel turns platform traffic into `ChannelMessage`s for the relay
//! and carries replies back.
//!
//! Available channels:
//! - **Telegram**: Bot API long polling, private chats only
//! - **CLI**: interactive terminal chat (stdin/stdout)

pub mod cli;
pub mod telegram;

pub use cli::CliChannel;
pub use telegram::{TelegramChannel, TelegramConfig};
