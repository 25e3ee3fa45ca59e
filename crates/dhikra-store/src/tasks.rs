//! Task CRUD and the due-soon window used by the sweep.

use super::records::{NewTask, TaskRecord};
use super::Store;
use chrono::{DateTime, Duration, Utc};
use dhikra_core::error::DhikraError;
use dhikra_core::intent::Priority;
use uuid::Uuid;

type TaskRow = (
    String,
    String,
    String,
    Option<String>,
    Option<DateTime<Utc>>,
    String,
    String,
    bool,
);

const TASK_COLUMNS: &str =
    "id, user_id, title, description, due_date, priority, status, whatsapp_reminder";

fn from_row(row: TaskRow) -> TaskRecord {
    let (id, user_id, title, description, due_date, priority, status, whatsapp_reminder) = row;
    TaskRecord {
        id,
        user_id,
        title,
        description,
        due_date,
        priority: Priority::from_tag(&priority),
        status,
        whatsapp_reminder,
    }
}

impl Store {
    /// Create a pending task with the WhatsApp due-soon notice armed.
    pub async fn create_task(&self, new: &NewTask) -> Result<String, DhikraError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO tasks \
             (id, user_id, title, description, due_date, priority, status, whatsapp_reminder) \
             VALUES (?, ?, ?, ?, ?, ?, 'pending', 1)",
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.due_date)
        .bind(new.priority.tag())
        .execute(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("create task failed: {e}")))?;
        Ok(id)
    }

    /// Pending tasks whose due date falls inside `[now, now + window]`
    /// and whose due-soon notice has not yet been sent.
    pub async fn tasks_due_in_window(
        &self,
        now: DateTime<Utc>,
        window_mins: i64,
    ) -> Result<Vec<TaskRecord>, DhikraError> {
        let until = now + Duration::minutes(window_mins);
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status = 'pending' AND whatsapp_reminder = 1 \
             AND due_date IS NOT NULL AND due_date >= ? AND due_date <= ? \
             ORDER BY due_date ASC",
        ))
        .bind(now)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("tasks due in window failed: {e}")))?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Disarm the due-soon notice after a successful send.
    pub async fn clear_task_reminder_flag(&self, id: &str) -> Result<(), DhikraError> {
        sqlx::query("UPDATE tasks SET whatsapp_reminder = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DhikraError::Store(format!("clear task flag failed: {e}")))?;
        Ok(())
    }

    /// Mark a task done (done button or future UI). Scoped to the owner;
    /// returns whether a row changed.
    pub async fn complete_task(&self, id: &str, user_id: &str) -> Result<bool, DhikraError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'completed', whatsapp_reminder = 0 \
             WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("complete task failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Push a task's due date forward and re-arm its notice (snooze button).
    /// Scoped to the owner; returns whether a row changed.
    pub async fn snooze_task(
        &self,
        id: &str,
        user_id: &str,
        until: DateTime<Utc>,
    ) -> Result<bool, DhikraError> {
        let result =
            sqlx::query("UPDATE tasks SET due_date = ?, whatsapp_reminder = 1 WHERE id = ? AND user_id = ?")
                .bind(until)
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(|e| DhikraError::Store(format!("snooze task failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Pending tasks for a user, soonest due first (undated last).
    pub async fn list_pending_tasks(&self, user_id: &str) -> Result<Vec<TaskRecord>, DhikraError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE user_id = ? AND status = 'pending' \
             ORDER BY due_date IS NULL, due_date ASC",
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DhikraError::Store(format!("list tasks failed: {e}")))?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Find one task by id.
    pub async fn find_task(&self, id: &str) -> Result<Option<TaskRecord>, DhikraError> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DhikraError::Store(format!("find task failed: {e}")))?;
        Ok(row.map(from_row))
    }
}
