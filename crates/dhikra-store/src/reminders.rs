//! Reminder lifecycle: creation, the due query, recurrence advancement,
//! deactivation, and snooze.

use super::records::{NewReminder, ReminderRecord};
use super::Store;
use chrono::{DateTime, Utc};
use dhikra_core::error::DhikraError;
use dhikra_core::intent::Recurrence;
use uuid::Uuid;

type ReminderRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    bool,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<String>,
);

const REMINDER_COLUMNS: &str = "id, user_id, title, description, reminder_type, reminder_time, \
     next_reminder_at, is_active, recurrence_end_date, last_sent_at, phone_number";

fn from_row(row: ReminderRow) -> ReminderRecord {
    let (
        id,
        user_id,
        title,
        description,
        reminder_type,
        reminder_time,
        next_reminder_at,
        is_active,
        recurrence_end_date,
        last_sent_at,
        phone_number,
    ) = row;
    ReminderRecord {
        id,
        user_id,
        title,
        description,
        recurrence: Recurrence::from_tag(&reminder_type),
        reminder_time,
        next_reminder_at,
        is_active,
        recurrence_end_date,
        last_sent_at,
        phone_number,
    }
}

impl Store {
    /// Create an active reminder whose first fire time is `reminder_time`.
    pub async fn create_reminder(&self, new: &NewReminder) -> Result<String, DhikraError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO reminders \
             (id, user_id, title, description, reminder_type, reminder_time, \
              next_reminder_at, is_active, recurrence_end_date, phone_number) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.recurrence.tag())
        .bind(new.reminder_time)
        .bind(new.reminder_time)
        .bind(new.recurrence_end_date)
        .bind(&new.phone_number)
        .execute(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("create reminder failed: {e}")))?;
        Ok(id)
    }

    /// Find one reminder by id.
    pub async fn find_reminder(&self, id: &str) -> Result<Option<ReminderRecord>, DhikraError> {
        let row: Option<ReminderRow> =
            sqlx::query_as(&format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DhikraError::Store(format!("find reminder failed: {e}")))?;
        Ok(row.map(from_row))
    }

    /// All reminders the sweep must fire now: active, due, and deliverable
    /// (a missing phone number means there is nowhere to send).
    pub async fn due_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReminderRecord>, DhikraError> {
        let rows: Vec<ReminderRow> = sqlx::query_as(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders \
             WHERE is_active = 1 AND phone_number IS NOT NULL \
             AND next_reminder_at IS NOT NULL AND next_reminder_at <= ? \
             ORDER BY next_reminder_at ASC",
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("due reminders failed: {e}")))?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Record a successful send and schedule the next occurrence.
    pub async fn advance_reminder(
        &self,
        id: &str,
        next: DateTime<Utc>,
        sent_at: DateTime<Utc>,
    ) -> Result<(), DhikraError> {
        sqlx::query("UPDATE reminders SET next_reminder_at = ?, last_sent_at = ? WHERE id = ?")
            .bind(next)
            .bind(sent_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DhikraError::Store(format!("advance reminder failed: {e}")))?;
        Ok(())
    }

    /// Retire a reminder, recording the send time when one happened.
    /// Scoped to the owner; returns whether a row changed.
    pub async fn deactivate_reminder(
        &self,
        id: &str,
        user_id: &str,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DhikraError> {
        let result = match sent_at {
            Some(at) => {
                sqlx::query(
                    "UPDATE reminders SET is_active = 0, last_sent_at = ? \
                     WHERE id = ? AND user_id = ?",
                )
                .bind(at)
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query("UPDATE reminders SET is_active = 0 WHERE id = ? AND user_id = ?")
                    .bind(id)
                    .bind(user_id)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(|e| DhikraError::Store(format!("deactivate reminder failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Push a reminder's next fire time forward (snooze button). Scoped
    /// to the owner; returns whether a row changed.
    pub async fn snooze_reminder(
        &self,
        id: &str,
        user_id: &str,
        until: DateTime<Utc>,
    ) -> Result<bool, DhikraError> {
        let result = sqlx::query(
            "UPDATE reminders SET next_reminder_at = ?, is_active = 1 \
             WHERE id = ? AND user_id = ?",
        )
        .bind(until)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("snooze reminder failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Active reminders for a user, soonest first.
    pub async fn list_active_reminders(
        &self,
        user_id: &str,
    ) -> Result<Vec<ReminderRecord>, DhikraError> {
        let rows: Vec<ReminderRow> = sqlx::query_as(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders \
             WHERE user_id = ? AND is_active = 1 \
             ORDER BY next_reminder_at ASC",
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("list reminders failed: {e}")))?;
        Ok(rows.into_iter().map(from_row).collect())
    }
}
