//! Audit log — records every message through the bot, both directions.

use dhikra_core::error::DhikraError;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// An entry to write to the audit log.
pub struct AuditEntry {
    pub direction: AuditDirection,
    pub phone: String,
    /// Resolved user id, when the phone mapped to a verified user.
    pub user_id: Option<String>,
    /// Intent tag for handled messages.
    pub intent: Option<String>,
    pub body: String,
}

/// Which way the message flowed.
pub enum AuditDirection {
    In,
    Out,
}

impl AuditDirection {
    fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// Audit logger backed by SQLite.
pub struct AuditLogger {
    pool: SqlitePool,
}

impl AuditLogger {
    /// Create a new audit logger sharing the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write an entry to the audit log.
    pub async fn log(&self, entry: &AuditEntry) -> Result<(), DhikraError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO audit_log (id, direction, phone, user_id, intent, body) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(entry.direction.as_str())
        .bind(&entry.phone)
        .bind(&entry.user_id)
        .bind(&entry.intent)
        .bind(&entry.body)
        .execute(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("audit log write failed: {e}")))?;

        debug!(
            "audit: {} {} [{}] {}",
            entry.direction.as_str(),
            entry.phone,
            entry.intent.as_deref().unwrap_or("-"),
            truncate(&entry.body, 80)
        );

        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
