use crate::{
    intent::ParsedIntent,
    message::{Button, GroceryLine},
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

/// Outbound messaging seam.
///
/// The production implementation talks to the WhatsApp Cloud API; tests
/// substitute a recorder. All senders are best-effort: they return `false`
/// on failure instead of an error so one bad send never aborts a batch.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, to: &str, body: &str) -> bool;

    /// Send a message with up to three reply buttons.
    async fn send_buttons(&self, to: &str, body: &str, buttons: &[Button]) -> bool;

    /// Deliver a due reminder. With an id, done/snooze buttons are
    /// attached so the user can act from the notification.
    async fn send_reminder_notification(
        &self,
        to: &str,
        title: &str,
        reminder_id: Option<&str>,
    ) -> bool {
        let body = format!("⏰ تذكير | Reminder:\n{title}");
        match reminder_id {
            Some(id) => {
                let buttons = [
                    Button::new(format!("done_{id}"), "تم ✅"),
                    Button::new(format!("snooze_{id}"), "تأجيل ⏰"),
                ];
                self.send_buttons(to, &body, &buttons).await
            }
            None => self.send_text(to, &body).await,
        }
    }

    /// Deliver a task-due notice with done/snooze buttons.
    async fn send_task_reminder(&self, to: &str, task_id: &str, title: &str) -> bool {
        let body = format!("📋 مهمة مستحقة | Task due soon:\n{title}");
        let buttons = [
            Button::new(format!("task_done_{task_id}"), "تم ✅"),
            Button::new(format!("task_snooze_{task_id}"), "تأجيل ⏰"),
        ];
        self.send_buttons(to, &body, &buttons).await
    }

    /// Deliver a meeting-soon notice with confirm/cancel buttons.
    async fn send_meeting_reminder(
        &self,
        to: &str,
        meeting_id: &str,
        title: &str,
        starts_at: &str,
    ) -> bool {
        let body = format!("📅 اجتماع قريب | Meeting soon:\n{title}\n🕐 {starts_at}");
        let buttons = [
            Button::new(format!("meeting_confirm_{meeting_id}"), "تأكيد ✅"),
            Button::new(format!("meeting_cancel_{meeting_id}"), "إلغاء ❌"),
        ];
        self.send_buttons(to, &body, &buttons).await
    }

    /// Render and send a grocery list, unchecked items first.
    async fn send_grocery_list(&self, to: &str, list_name: &str, items: &[GroceryLine]) -> bool {
        let mut body = format!("🛒 {list_name}\n");
        if items.is_empty() {
            body.push_str("القائمة فارغة | The list is empty");
        } else {
            for line in items {
                let mark = if line.checked { "✅" } else { "⬜" };
                let qty = if line.quantity == 1.0 {
                    String::new()
                } else {
                    format!(" ×{}", line.quantity)
                };
                let unit = line
                    .unit
                    .as_deref()
                    .map(|u| format!(" {u}"))
                    .unwrap_or_default();
                body.push_str(&format!("{mark} {}{qty}{unit}\n", line.name));
            }
        }
        self.send_text(to, body.trim_end()).await
    }
}

/// Intent-extraction seam.
#[async_trait]
pub trait IntentParser: Send + Sync {
    /// Parse free text into a structured intent.
    ///
    /// Total: implementations never fail, they fall back to
    /// [`ParsedIntent::unknown`]. `now` carries the user-local clock so
    /// relative time expressions resolve to absolute datetimes.
    async fn parse(&self, text: &str, now: DateTime<FixedOffset>) -> ParsedIntent;
}
