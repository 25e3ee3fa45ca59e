//! SQLite-backed domain store.
//!
//! Split into focused submodules:
//! - `users` — the verified phone-number → user mapping
//! - `reminders` — standalone reminder lifecycle and recurrence advancement
//! - `tasks` — task CRUD and the due-soon window query
//! - `meetings` — meeting CRUD, confirm/cancel, due-soon window
//! - `grocery` — grocery lists and items, substring check-off
//! - `audit` — the bot traffic audit log

mod grocery;
mod meetings;
mod records;
mod reminders;
mod tasks;
mod users;

pub mod audit;

pub use records::{
    GroceryItem, GroceryList, MeetingRecord, NewMeeting, NewReminder, NewTask, ReminderRecord,
    TaskRecord, UserRecord,
};

use dhikra_core::error::DhikraError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Persistent domain store backed by SQLite.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new store, running migrations on first use.
    pub async fn new(db_path: &str) -> Result<Self, DhikraError> {
        // Ensure parent directory exists.
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DhikraError::Store(format!("failed to create data dir: {e}")))?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| DhikraError::Store(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| DhikraError::Store(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;

        info!("domain store initialized at {db_path}");

        Ok(Self { pool })
    }

    /// In-memory store for tests and ephemeral runs. Pinned to a single
    /// connection because each sqlite `:memory:` connection is its own
    /// database.
    pub async fn in_memory() -> Result<Self, DhikraError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DhikraError::Store(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| DhikraError::Store(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DhikraError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| DhikraError::Store(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] =
            &[("001_init", include_str!("../migrations/001_init.sql"))];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        DhikraError::Store(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| DhikraError::Store(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    DhikraError::Store(format!("failed to record migration {name}: {e}"))
                })?;
        }
        Ok(())
    }
}
