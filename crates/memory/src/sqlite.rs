//! SQLite history store.
//!
//! One table, `turns`, holds every user's stream:
//! - `id` (autoincrement) is the insertion order and doubles as `Turn::seq`
//! - `(user_id, timestamp, id)` is indexed so the recent-suffix read is a
//!   bounded index scan however long a stream grows
//!
//! Writes go through `synchronous = FULL`, so an acknowledged append has
//! reached the disk.

use async_trait::async_trait;
use convorelay_core::error::StoreError;
use convorelay_core::history::{check_content, HistoryStore};
use convorelay_core::message::{Role, Turn};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::clock::TurnClock;

/// A durable SQLite history store.
pub struct SqliteHistory {
    pool: SqlitePool,
    clock: TurnClock,
    /// Serializes timestamp assignment and insert so seq order matches time order.
    write_lock: tokio::sync::Mutex<()>,
}

impl SqliteHistory {
    /// Open (or create) the database file at `path`.
    ///
    /// Parent directories are created as needed.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite history store initialized at {}", path.display());
        Ok(store)
    }

    /// An ephemeral in-process database.
    ///
    /// Every pooled connection to `:memory:` would see its own database,
    /// so the pool is pinned to a single connection that never expires.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite options: {e}")))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        Self::from_pool(pool).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        Self::run_migrations(&pool).await?;

        let floor: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(timestamp), 0) FROM turns")
            .fetch_one(&pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("max timestamp: {e}")))?;

        Ok(Self {
            pool,
            clock: TurnClock::starting_at(floor),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                timestamp  INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_user_recent ON turns(user_id, timestamp, id)",
        )
        .execute(pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("recency index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, StoreError> {
        let seq: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let role_str: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let timestamp: i64 = row
            .try_get("timestamp")
            .map_err(|e| StoreError::QueryFailed(format!("timestamp column: {e}")))?;

        let role: Role = role_str
            .parse()
            .map_err(|e| StoreError::QueryFailed(format!("turn {seq}: {e}")))?;

        Ok(Turn {
            seq,
            user_id,
            role,
            content,
            timestamp,
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, user_id: &str, role: Role, content: &str) -> Result<Turn, StoreError> {
        check_content(role, content)?;

        let _guard = self.write_lock.lock().await;
        let timestamp = self.clock.next();

        let result = sqlx::query(
            "INSERT INTO turns (user_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;

        let seq = result.last_insert_rowid();
        debug!(user_id = %user_id, role = %role, seq, "Appended turn");

        Ok(Turn {
            seq,
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            timestamp,
        })
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, role, content, timestamp FROM (
                SELECT id, user_id, role, content, timestamp
                FROM turns
                WHERE user_id = ?1
                ORDER BY timestamp DESC, id DESC
                LIMIT ?2
            )
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("recent turns: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }
}
