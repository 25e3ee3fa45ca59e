//! Typed domain records. Every row crosses the store boundary as one of
//! these; column order in the submodule queries matches field order here.

use chrono::{DateTime, Utc};
use dhikra_core::intent::{Priority, Recurrence};
use serde::{Deserialize, Serialize};

/// A registered user, keyed by verified phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub phone: String,
    pub display_name: Option<String>,
    pub verified: bool,
}

/// A standalone reminder, possibly recurring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub recurrence: Recurrence,
    /// The original anchor time the user asked for.
    pub reminder_time: DateTime<Utc>,
    /// When the next notification fires; `None` once exhausted.
    pub next_reminder_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub recurrence_end_date: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    /// Delivery target. Reminders without one are skipped by the sweep.
    pub phone_number: Option<String>,
}

/// Input for creating a reminder.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub recurrence: Recurrence,
    pub reminder_time: DateTime<Utc>,
    pub recurrence_end_date: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
}

/// A to-do item with an optional due date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: String,
    /// Set while a WhatsApp due-soon notice is still owed; cleared after
    /// the first successful send so the sweep never notifies twice.
    pub whatsapp_reminder: bool,
}

/// Input for creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
}

/// A scheduled meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub location: Option<String>,
    pub status: String,
    pub whatsapp_reminder: bool,
}

/// Input for creating a meeting.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub location: Option<String>,
}

/// A grocery list. The most recently created list per user acts as the
/// default target for adds and check-offs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroceryList {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One item on a grocery list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroceryItem {
    pub id: String,
    pub list_id: String,
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub is_checked: bool,
    pub added_via: String,
}
