use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// Every action the bot knows how to perform.
///
/// The wire tags match what the extraction prompt asks the model to emit,
/// so `ParsedIntent` deserializes straight from the completion JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateReminder,
    CreateTask,
    AddGroceryItem,
    CheckGroceryItem,
    ShowGroceryList,
    CreateMeeting,
    ListTasks,
    ListReminders,
    Help,
    Greeting,
    #[default]
    Unknown,
}

impl Intent {
    /// Short tag used in audit rows and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CreateReminder => "create_reminder",
            Self::CreateTask => "create_task",
            Self::AddGroceryItem => "add_grocery_item",
            Self::CheckGroceryItem => "check_grocery_item",
            Self::ShowGroceryList => "show_grocery_list",
            Self::CreateMeeting => "create_meeting",
            Self::ListTasks => "list_tasks",
            Self::ListReminders => "list_reminders",
            Self::Help => "help",
            Self::Greeting => "greeting",
            Self::Unknown => "unknown",
        }
    }
}

/// How often a reminder repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Recurrence {
    /// The next occurrence one unit after `current`, or `None` for
    /// one-shot reminders. Month and year steps go through
    /// [`chrono::Months`] so end-of-month dates clamp instead of
    /// overflowing.
    pub fn advance(&self, current: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::None => None,
            Self::Daily => Some(current + Duration::days(1)),
            Self::Weekly => Some(current + Duration::days(7)),
            Self::Monthly => current.checked_add_months(Months::new(1)),
            Self::Yearly => current.checked_add_months(Months::new(12)),
        }
    }

    /// Storage tag for the `reminder_type` column.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::None => "once",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Parse a storage tag back; anything unrecognized is one-shot.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "yearly" => Self::Yearly,
            _ => Self::None,
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

/// Structured output of the intent extractor.
///
/// Every field except `intent` and `confidence` is optional; the router
/// decides what a given intent actually requires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedIntent {
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Absolute ISO-8601 datetime resolved by the model against "now".
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    /// Model self-assessment in [0, 1]. Advisory: carried through for
    /// audit and logging, not thresholded by the router.
    #[serde(default)]
    pub confidence: f64,
}

impl ParsedIntent {
    /// The fallback result used whenever extraction cannot produce
    /// anything trustworthy: unknown intent, zero confidence.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Clamp confidence into [0, 1]; NaN collapses to 0.
    pub fn clamped(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        self
    }

    /// The parsed datetime as a UTC timestamp, if present and valid.
    pub fn datetime_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.datetime.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }
}
