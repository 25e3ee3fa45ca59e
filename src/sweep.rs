//! Reminder Scheduler — the cron-driven notification sweep.
//!
//! One sweep makes three sequential passes (reminders, tasks, meetings).
//! Every item is handled in isolation: a failed send or store write is
//! counted and logged, never propagated, so one bad row cannot starve the
//! rest of the batch. Failed sends leave the record untouched and are
//! naturally retried on the next sweep.

use chrono::{DateTime, FixedOffset, Utc};
use dhikra_core::config::SweepConfig;
use dhikra_core::traits::Messenger;
use dhikra_store::Store;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-category counts for one sweep, returned in the cron response.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub reminders: u32,
    pub tasks: u32,
    pub meetings: u32,
    pub errors: u32,
}

/// Run one full sweep at `now`.
pub async fn run_sweep(
    store: &Store,
    messenger: &Arc<dyn Messenger>,
    config: &SweepConfig,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> SweepReport {
    let mut report = SweepReport::default();

    sweep_reminders(store, messenger, now, &mut report).await;
    sweep_tasks(store, messenger, config, now, &mut report).await;
    sweep_meetings(store, messenger, config, offset, now, &mut report).await;

    info!(
        "sweep done: {} reminders, {} tasks, {} meetings, {} errors",
        report.reminders, report.tasks, report.meetings, report.errors
    );
    report
}

async fn sweep_reminders(
    store: &Store,
    messenger: &Arc<dyn Messenger>,
    now: DateTime<Utc>,
    report: &mut SweepReport,
) {
    let due = match store.due_reminders(now).await {
        Ok(due) => due,
        Err(e) => {
            error!("reminder sweep query failed: {e}");
            report.errors += 1;
            return;
        }
    };

    for reminder in due {
        let Some(phone) = reminder.phone_number.as_deref() else {
            continue;
        };

        if !messenger
            .send_reminder_notification(phone, &reminder.title, Some(&reminder.id))
            .await
        {
            warn!("reminder {} send failed, will retry next sweep", reminder.id);
            report.errors += 1;
            continue;
        }

        // Advance from the occurrence that just fired, not from `now`,
        // so a late sweep does not drift the schedule.
        let fired_at = reminder.next_reminder_at.unwrap_or(now);
        let next = reminder.recurrence.advance(fired_at);

        let result = match next {
            Some(next)
                if reminder
                    .recurrence_end_date
                    .map(|end| next <= end)
                    .unwrap_or(true) =>
            {
                store.advance_reminder(&reminder.id, next, now).await
            }
            _ => store
                .deactivate_reminder(&reminder.id, &reminder.user_id, Some(now))
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => report.reminders += 1,
            Err(e) => {
                error!("reminder {} update failed: {e}", reminder.id);
                report.errors += 1;
            }
        }
    }
}

async fn sweep_tasks(
    store: &Store,
    messenger: &Arc<dyn Messenger>,
    config: &SweepConfig,
    now: DateTime<Utc>,
    report: &mut SweepReport,
) {
    let due = match store
        .tasks_due_in_window(now, config.task_lookahead_mins)
        .await
    {
        Ok(due) => due,
        Err(e) => {
            error!("task sweep query failed: {e}");
            report.errors += 1;
            return;
        }
    };

    for task in due {
        let phone = match store.user_phone(&task.user_id).await {
            Ok(Some(phone)) => phone,
            Ok(None) => {
                warn!("task {} has no deliverable phone, skipping", task.id);
                continue;
            }
            Err(e) => {
                error!("task {} phone lookup failed: {e}", task.id);
                report.errors += 1;
                continue;
            }
        };

        if !messenger
            .send_task_reminder(&phone, &task.id, &task.title)
            .await
        {
            warn!("task {} send failed, will retry next sweep", task.id);
            report.errors += 1;
            continue;
        }

        match store.clear_task_reminder_flag(&task.id).await {
            Ok(()) => report.tasks += 1,
            Err(e) => {
                error!("task {} flag clear failed: {e}", task.id);
                report.errors += 1;
            }
        }
    }
}

async fn sweep_meetings(
    store: &Store,
    messenger: &Arc<dyn Messenger>,
    config: &SweepConfig,
    offset: FixedOffset,
    now: DateTime<Utc>,
    report: &mut SweepReport,
) {
    let due = match store
        .meetings_due_in_window(now, config.meeting_lookahead_mins)
        .await
    {
        Ok(due) => due,
        Err(e) => {
            error!("meeting sweep query failed: {e}");
            report.errors += 1;
            return;
        }
    };

    for meeting in due {
        let phone = match store.user_phone(&meeting.user_id).await {
            Ok(Some(phone)) => phone,
            Ok(None) => {
                warn!("meeting {} has no deliverable phone, skipping", meeting.id);
                continue;
            }
            Err(e) => {
                error!("meeting {} phone lookup failed: {e}", meeting.id);
                report.errors += 1;
                continue;
            }
        };

        let starts_at = meeting
            .start_time
            .with_timezone(&offset)
            .format("%H:%M")
            .to_string();

        if !messenger
            .send_meeting_reminder(&phone, &meeting.id, &meeting.title, &starts_at)
            .await
        {
            warn!("meeting {} send failed, will retry next sweep", meeting.id);
            report.errors += 1;
            continue;
        }

        match store.clear_meeting_reminder_flag(&meeting.id).await {
            Ok(()) => report.meetings += 1,
            Err(e) => {
                error!("meeting {} flag clear failed: {e}", meeting.id);
                report.errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use dhikra_core::intent::{Priority, Recurrence};
    use dhikra_core::message::Button;
    use dhikra_store::{NewMeeting, NewReminder, NewTask};
    use std::sync::Mutex;

    struct MockMessenger {
        sent: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl MockMessenger {
        fn new(fail: bool) -> (Arc<dyn Messenger>, Arc<Mutex<Vec<String>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let mock = Arc::new(Self {
                sent: Arc::clone(&sent),
                fail,
            });
            (mock, sent)
        }
    }

    #[async_trait]
    impl Messenger for MockMessenger {
        async fn send_text(&self, _to: &str, body: &str) -> bool {
            if self.fail {
                return false;
            }
            self.sent.lock().unwrap().push(body.to_string());
            true
        }

        async fn send_buttons(&self, _to: &str, body: &str, _buttons: &[Button]) -> bool {
            if self.fail {
                return false;
            }
            self.sent.lock().unwrap().push(body.to_string());
            true
        }
    }

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    async fn seeded() -> (Store, String) {
        let store = Store::in_memory().await.unwrap();
        let user = store
            .create_user("966500000001", Some("Test"), true)
            .await
            .unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn test_task_notification_sent_at_most_once() {
        let (store, user) = seeded().await;
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        store
            .create_task(&NewTask {
                user_id: user,
                title: "submit report".to_string(),
                description: None,
                due_date: Some(now + Duration::minutes(20)),
                priority: Priority::High,
            })
            .await
            .unwrap();

        let (messenger, sent) = MockMessenger::new(false);
        let config = SweepConfig::default();

        let first = run_sweep(&store, &messenger, &config, offset(), now).await;
        assert_eq!(first.tasks, 1);
        assert_eq!(first.errors, 0);

        // Second sweep inside the same window: flag already cleared.
        let second = run_sweep(&store, &messenger, &config, offset(), now).await;
        assert_eq!(second.tasks, 0);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_weekly_reminder_advances_then_expires() {
        let (store, user) = seeded().await;
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let id = store
            .create_reminder(&NewReminder {
                user_id: user,
                title: "water plants".to_string(),
                description: None,
                recurrence: Recurrence::Weekly,
                reminder_time: t,
                recurrence_end_date: Some(t + Duration::days(10)),
                phone_number: Some("966500000001".to_string()),
            })
            .await
            .unwrap();

        let (messenger, _sent) = MockMessenger::new(false);
        let config = SweepConfig::default();

        // First fire: next occurrence T+7d is inside the end date.
        let report = run_sweep(&store, &messenger, &config, offset(), t).await;
        assert_eq!(report.reminders, 1);
        let record = store.find_reminder(&id).await.unwrap().unwrap();
        assert!(record.is_active);
        assert_eq!(record.next_reminder_at, Some(t + Duration::days(7)));

        // Second fire at T+7d: T+14d is past the end date, so it retires.
        let report = run_sweep(&store, &messenger, &config, offset(), t + Duration::days(7)).await;
        assert_eq!(report.reminders, 1);
        let record = store.find_reminder(&id).await.unwrap().unwrap();
        assert!(!record.is_active);
        assert!(record.last_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_one_shot_reminder_deactivates_after_send() {
        let (store, user) = seeded().await;
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let id = store
            .create_reminder(&NewReminder {
                user_id: user,
                title: "once".to_string(),
                description: None,
                recurrence: Recurrence::None,
                reminder_time: t,
                recurrence_end_date: None,
                phone_number: Some("966500000001".to_string()),
            })
            .await
            .unwrap();

        let (messenger, _sent) = MockMessenger::new(false);
        let report = run_sweep(&store, &messenger, &SweepConfig::default(), offset(), t).await;
        assert_eq!(report.reminders, 1);
        assert!(!store.find_reminder(&id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_failed_send_leaves_reminder_untouched() {
        let (store, user) = seeded().await;
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let id = store
            .create_reminder(&NewReminder {
                user_id: user,
                title: "flaky".to_string(),
                description: None,
                recurrence: Recurrence::None,
                reminder_time: t,
                recurrence_end_date: None,
                phone_number: Some("966500000001".to_string()),
            })
            .await
            .unwrap();

        let (failing, _) = MockMessenger::new(true);
        let report = run_sweep(&store, &failing, &SweepConfig::default(), offset(), t).await;
        assert_eq!(report.reminders, 0);
        assert_eq!(report.errors, 1);

        // Still due: the next sweep retries it.
        let record = store.find_reminder(&id).await.unwrap().unwrap();
        assert!(record.is_active);
        assert_eq!(record.next_reminder_at, Some(t));
        assert!(record.last_sent_at.is_none());

        let (working, _) = MockMessenger::new(false);
        let report = run_sweep(&store, &working, &SweepConfig::default(), offset(), t).await;
        assert_eq!(report.reminders, 1);
    }

    #[tokio::test]
    async fn test_meeting_window_is_fifteen_minutes() {
        let (store, user) = seeded().await;
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        store
            .create_meeting(&NewMeeting {
                user_id: user.clone(),
                title: "soon".to_string(),
                description: None,
                start_time: now + Duration::minutes(10),
                location: None,
            })
            .await
            .unwrap();
        store
            .create_meeting(&NewMeeting {
                user_id: user,
                title: "later".to_string(),
                description: None,
                start_time: now + Duration::minutes(45),
                location: None,
            })
            .await
            .unwrap();

        let (messenger, sent) = MockMessenger::new(false);
        let report = run_sweep(&store, &messenger, &SweepConfig::default(), offset(), now).await;
        assert_eq!(report.meetings, 1);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("soon"));
    }

    #[tokio::test]
    async fn test_empty_sweep_reports_zero() {
        let (store, _user) = seeded().await;
        let (messenger, _sent) = MockMessenger::new(false);
        let report = run_sweep(
            &store,
            &messenger,
            &SweepConfig::default(),
            offset(),
            Utc::now(),
        )
        .await;
        assert_eq!(report.reminders, 0);
        assert_eq!(report.tasks, 0);
        assert_eq!(report.meetings, 0);
        assert_eq!(report.errors, 0);
    }
}
