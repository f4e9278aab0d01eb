//! `convorelay chat` — one message through the full relay.
//!
//! The exchange is recorded like any other, so a follow-up `chat` with the
//! same `--user` sees it in its context window.

use std::path::Path;
use std::sync::Arc;

pub async fn run(
    config_path: Option<&Path>,
    message: &str,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(super::load_config(config_path, Some("cli"))?);
    let relay = super::build_relay(config).await?;

    let reply = relay.handle(user, message).await;
    println!("{reply}");

    Ok(())
}
