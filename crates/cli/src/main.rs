//! convorelay CLI, the main entry point.
//!
//! Commands:
//! - `onboard`  — Write the default config file
//! - `run`      — Start the relay on the configured channel
//! - `chat`     — Send a single message through the relay
//! - `history`  — Print a user's recent turns

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "convorelay",
    about = "convorelay — a chat relay that remembers conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.convorelay/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard,

    /// Start the relay and answer messages until Ctrl-C
    Run {
        /// Override the configured channel ("telegram" or "cli")
        #[arg(long)]
        channel: Option<String>,
    },

    /// Send one message through the relay and print the reply
    Chat {
        /// The message text
        #[arg(short, long)]
        message: String,

        /// History partition to use
        #[arg(short, long, default_value = "local_user")]
        user: String,
    },

    /// Show a user's recent conversation turns
    History {
        /// User ID (the Telegram numeric ID, or "local_user" for the CLI)
        #[arg(short, long)]
        user: String,

        /// How many turns to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Run { channel } => commands::run::run(config_path, channel).await?,
        Commands::Chat { message, user } => {
            commands::chat::run(config_path, &message, &user).await?
        }
        Commands::History { user, limit } => {
            commands::history::run(config_path, &user, limit).await?
        }
    }

    Ok(())
}
