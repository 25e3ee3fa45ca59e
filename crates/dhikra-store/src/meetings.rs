//! Meeting CRUD, the due-soon window, and the confirm/cancel button
//! mutations.

use super::records::{MeetingRecord, NewMeeting};
use super::Store;
use chrono::{DateTime, Duration, Utc};
use dhikra_core::error::DhikraError;
use uuid::Uuid;

type MeetingRow = (
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    Option<String>,
    String,
    bool,
);

const MEETING_COLUMNS: &str =
    "id, user_id, title, description, start_time, location, status, whatsapp_reminder";

fn from_row(row: MeetingRow) -> MeetingRecord {
    let (id, user_id, title, description, start_time, location, status, whatsapp_reminder) = row;
    MeetingRecord {
        id,
        user_id,
        title,
        description,
        start_time,
        location,
        status,
        whatsapp_reminder,
    }
}

impl Store {
    /// Create a scheduled meeting with the WhatsApp notice armed.
    pub async fn create_meeting(&self, new: &NewMeeting) -> Result<String, DhikraError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO meetings \
             (id, user_id, title, description, start_time, location, status, whatsapp_reminder) \
             VALUES (?, ?, ?, ?, ?, ?, 'scheduled', 1)",
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.start_time)
        .bind(&new.location)
        .execute(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("create meeting failed: {e}")))?;
        Ok(id)
    }

    /// Upcoming meetings starting inside `[now, now + window]` whose
    /// notice has not yet been sent. Cancelled meetings never match
    /// because cancellation deletes the row.
    pub async fn meetings_due_in_window(
        &self,
        now: DateTime<Utc>,
        window_mins: i64,
    ) -> Result<Vec<MeetingRecord>, DhikraError> {
        let until = now + Duration::minutes(window_mins);
        let rows: Vec<MeetingRow> = sqlx::query_as(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings \
             WHERE whatsapp_reminder = 1 AND start_time >= ? AND start_time <= ? \
             ORDER BY start_time ASC",
        ))
        .bind(now)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("meetings due in window failed: {e}")))?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Disarm the notice after a successful send.
    pub async fn clear_meeting_reminder_flag(&self, id: &str) -> Result<(), DhikraError> {
        sqlx::query("UPDATE meetings SET whatsapp_reminder = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DhikraError::Store(format!("clear meeting flag failed: {e}")))?;
        Ok(())
    }

    /// Confirm attendance (confirm button). Scoped to the owner; returns
    /// whether a row changed.
    pub async fn confirm_meeting(&self, id: &str, user_id: &str) -> Result<bool, DhikraError> {
        let result =
            sqlx::query("UPDATE meetings SET status = 'confirmed' WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(|e| DhikraError::Store(format!("confirm meeting failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a meeting (cancel button). Removes the row outright, but
    /// only when `user_id` owns it; returns whether a row was deleted.
    pub async fn cancel_meeting(&self, id: &str, user_id: &str) -> Result<bool, DhikraError> {
        let result = sqlx::query("DELETE FROM meetings WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DhikraError::Store(format!("cancel meeting failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Find one meeting by id.
    pub async fn find_meeting(&self, id: &str) -> Result<Option<MeetingRecord>, DhikraError> {
        let row: Option<MeetingRow> =
            sqlx::query_as(&format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DhikraError::Store(format!("find meeting failed: {e}")))?;
        Ok(row.map(from_row))
    }
}
