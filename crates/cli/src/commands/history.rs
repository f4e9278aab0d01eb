//! `convorelay history` — print a user's recent turns.

use std::path::Path;

use convorelay_core::history::HistoryStore;
use convorelay_core::message::Turn;

pub async fn run(
    config_path: Option<&Path>,
    user: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path, Some("cli"))?;
    let store = super::open_store(&config).await?;

    let turns = store.recent(user, limit).await?;
    if turns.is_empty() {
        println!("No history for user {user}.");
        return Ok(());
    }

    println!("🧠 Last {} turn(s) for {user}", turns.len());
    println!("==============================");
    for turn in &turns {
        println!("{}", format_turn(turn));
    }

    Ok(())
}

fn format_turn(turn: &Turn) -> String {
    let when = chrono::DateTime::from_timestamp(turn.timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| turn.timestamp.to_string());
    format!("[{when}] {:>9}: {}", turn.role.as_str(), turn.content)
}
