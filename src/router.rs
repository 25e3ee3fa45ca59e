//! Command Router — turns a normalized inbound message into domain
//! mutations and a reply.
//!
//! Interactive button taps are dispatched on their id prefix. Text goes
//! through a literal greeting/help fast path first; everything else is
//! handed to the intent extractor and dispatched on the parsed intent.

use chrono::{Duration, Utc};
use dhikra_core::config::{AppConfig, SweepConfig};
use dhikra_core::error::DhikraError;
use dhikra_core::intent::{Intent, ParsedIntent, Recurrence};
use dhikra_core::message::{GroceryLine, InboundMessage, MessageKind};
use dhikra_core::traits::{IntentParser, Messenger};
use dhikra_store::audit::{AuditDirection, AuditEntry, AuditLogger};
use dhikra_store::{NewMeeting, NewReminder, NewTask, Store, UserRecord};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Literal greetings answered without an extractor round trip.
const GREETING_KW: &[&str] = &[
    "السلام عليكم",
    "سلام عليكم",
    "هلا",
    "مرحبا",
    "اهلا",
    "أهلا",
    "hi",
    "hello",
    "hey",
];

/// Literal help requests answered without an extractor round trip.
const HELP_KW: &[&str] = &["مساعدة", "المساعدة", "help", "؟", "?"];

const HELP_REPLY: &str = "أقدر أساعدك في:\n\
⏰ التذكيرات — \"ذكرني بالدواء الساعة ٩\"\n\
📋 المهام — \"أضف مهمة تسليم التقرير بكرة\"\n\
🛒 المقاضي — \"أضف حليب للمقاضي\" / \"اشتريت الحليب\" / \"وش المقاضي\"\n\
📅 الاجتماعات — \"اجتماع مع أحمد بكرة الساعة ٣\"\n\n\
I can help with:\n\
⏰ Reminders — \"remind me to take my meds at 9\"\n\
📋 Tasks — \"add task: submit the report tomorrow\"\n\
🛒 Groceries — \"add milk\" / \"bought the milk\" / \"show groceries\"\n\
📅 Meetings — \"meeting with Ahmed tomorrow at 3\"";

const GREETING_REPLY: &str =
    "هلا وغلا! 👋 أنا مساعدك الشخصي. اكتب \"مساعدة\" لتشوف وش أقدر أسوي.\n\
Hello! 👋 I'm your personal assistant. Type \"help\" to see what I can do.";

const ONBOARDING_REPLY: &str =
    "أهلا! هذا الرقم غير مسجل عندنا بعد. سجل من التطبيق وفعّل رقمك عشان أقدر أخدمك. 🙏\n\
Hi! This number isn't registered yet. Sign up in the app and verify your \
phone so I can help you.";

const UNKNOWN_REPLY: &str = "ما فهمت قصدك 🤔 اكتب \"مساعدة\" لتشوف الأوامر.\n\
Sorry, I didn't get that. Type \"help\" to see what I can do.";

/// Dispatches inbound messages against the store and replies through the
/// messenger.
pub struct Router {
    store: Store,
    audit: AuditLogger,
    messenger: Arc<dyn Messenger>,
    parser: Arc<dyn IntentParser>,
    app: AppConfig,
    sweep: SweepConfig,
}

impl Router {
    pub fn new(
        store: Store,
        messenger: Arc<dyn Messenger>,
        parser: Arc<dyn IntentParser>,
        app: AppConfig,
        sweep: SweepConfig,
    ) -> Self {
        let audit = AuditLogger::new(store.pool().clone());
        Self {
            store,
            audit,
            messenger,
            parser,
            app,
            sweep,
        }
    }

    /// Handle one inbound message end to end. The sender is resolved to a
    /// verified user once, up front; everything that mutates the store is
    /// scoped to that user.
    pub async fn handle_inbound(&self, msg: &InboundMessage) -> Result<(), DhikraError> {
        let user = self.store.find_user_by_phone(&msg.from).await?;
        self.audit_in(msg, user.as_ref()).await;

        match msg.kind {
            MessageKind::Interactive => self.handle_button(msg, user.as_ref()).await,
            MessageKind::Text => self.handle_text(msg, user.as_ref()).await,
        }
    }

    // --- Interactive taps ---

    async fn handle_button(
        &self,
        msg: &InboundMessage,
        user: Option<&UserRecord>,
    ) -> Result<(), DhikraError> {
        let Some(reply_id) = msg.interactive_reply_id.as_deref() else {
            return Ok(());
        };

        // Button ids carry record ids; only the record's owner may act on
        // them, so an unresolved sender is onboarded, never dispatched.
        let Some(user) = user else {
            info!("unresolved sender {} tapped a button, sending onboarding prompt", msg.from);
            self.reply(msg, None, "onboarding", ONBOARDING_REPLY).await;
            return Ok(());
        };

        let snooze_until = Utc::now() + Duration::minutes(self.sweep.snooze_mins);

        let (intent_tag, changed, reply) = if let Some(id) = reply_id.strip_prefix("task_done_") {
            (
                "task_done",
                self.store.complete_task(id, &user.id).await?,
                "تمت المهمة ✅ | Task completed".to_string(),
            )
        } else if let Some(id) = reply_id.strip_prefix("task_snooze_") {
            (
                "task_snooze",
                self.store.snooze_task(id, &user.id, snooze_until).await?,
                format!(
                    "أجلت المهمة {} دقيقة ⏰ | Task snoozed {} minutes",
                    self.sweep.snooze_mins, self.sweep.snooze_mins
                ),
            )
        } else if let Some(id) = reply_id.strip_prefix("meeting_confirm_") {
            (
                "meeting_confirm",
                self.store.confirm_meeting(id, &user.id).await?,
                "تأكد الاجتماع ✅ | Meeting confirmed".to_string(),
            )
        } else if let Some(id) = reply_id.strip_prefix("meeting_cancel_") {
            (
                "meeting_cancel",
                self.store.cancel_meeting(id, &user.id).await?,
                "ألغي الاجتماع ❌ | Meeting cancelled".to_string(),
            )
        } else if let Some(id) = reply_id.strip_prefix("done_") {
            (
                "reminder_done",
                self.store.deactivate_reminder(id, &user.id, None).await?,
                "تم التذكير ✅ | Reminder done".to_string(),
            )
        } else if let Some(id) = reply_id.strip_prefix("snooze_") {
            (
                "reminder_snooze",
                self.store.snooze_reminder(id, &user.id, snooze_until).await?,
                format!(
                    "أجلت التذكير {} دقيقة ⏰ | Reminder snoozed {} minutes",
                    self.sweep.snooze_mins, self.sweep.snooze_mins
                ),
            )
        } else {
            // Unknown button ids are ignored, not answered.
            debug!("ignoring unknown button id: {reply_id}");
            return Ok(());
        };

        // Nothing changed: the id is stale or belongs to someone else.
        if !changed {
            debug!(
                "button {reply_id} from {} matched no owned record, ignoring",
                msg.from
            );
            return Ok(());
        }

        self.reply(msg, Some(user), intent_tag, &reply).await;
        Ok(())
    }

    // --- Text messages ---

    async fn handle_text(
        &self,
        msg: &InboundMessage,
        user: Option<&UserRecord>,
    ) -> Result<(), DhikraError> {
        let text = msg.text_or_empty().trim();

        // Greeting/help fast path: answered for everyone, even unverified
        // senders, without touching the extractor.
        if kw_match(text, GREETING_KW) {
            self.reply(msg, user, "greeting", GREETING_REPLY).await;
            return Ok(());
        }
        if kw_match(text, HELP_KW) {
            self.reply(msg, user, "help", HELP_REPLY).await;
            return Ok(());
        }

        let Some(user) = user else {
            info!("unresolved sender {}, sending onboarding prompt", msg.from);
            self.reply(msg, None, "onboarding", ONBOARDING_REPLY).await;
            return Ok(());
        };

        let now_local = msg.timestamp.with_timezone(&self.app.utc_offset()?);
        let parsed = self.parser.parse(text, now_local).await;
        debug!(
            "intent for {}: {} (confidence {:.2})",
            msg.from,
            parsed.intent.tag(),
            parsed.confidence
        );

        self.dispatch(msg, user, &parsed).await
    }

    async fn dispatch(
        &self,
        msg: &InboundMessage,
        user: &UserRecord,
        parsed: &ParsedIntent,
    ) -> Result<(), DhikraError> {
        let tag = parsed.intent.tag();
        match parsed.intent {
            Intent::CreateReminder => {
                let Some(title) = non_empty(&parsed.title) else {
                    self.reply(
                        msg,
                        Some(user),
                        tag,
                        "وش تبيني أذكرك فيه؟ 🙂 | What should I remind you about?",
                    )
                    .await;
                    return Ok(());
                };
                let when = parsed
                    .datetime_utc()
                    .unwrap_or_else(|| msg.timestamp + Duration::hours(1));
                self.store
                    .create_reminder(&NewReminder {
                        user_id: user.id.clone(),
                        title: title.to_string(),
                        description: parsed.description.clone(),
                        recurrence: parsed.recurrence,
                        reminder_time: when,
                        recurrence_end_date: None,
                        phone_number: Some(msg.from.clone()),
                    })
                    .await?;
                let recur = match parsed.recurrence {
                    Recurrence::None => String::new(),
                    r => format!(" ({})", r.tag()),
                };
                self.reply(
                    msg,
                    Some(user),
                    tag,
                    &format!(
                        "أبشر، بذكرك: {title}{recur} ⏰\nGot it, I'll remind you: {title}{recur}"
                    ),
                )
                .await;
            }
            Intent::CreateTask => {
                let Some(title) = non_empty(&parsed.title) else {
                    self.reply(msg, Some(user), tag, "وش عنوان المهمة؟ | What's the task?")
                        .await;
                    return Ok(());
                };
                self.store
                    .create_task(&NewTask {
                        user_id: user.id.clone(),
                        title: title.to_string(),
                        description: parsed.description.clone(),
                        due_date: parsed.datetime_utc(),
                        priority: parsed.priority,
                    })
                    .await?;
                self.reply(
                    msg,
                    Some(user),
                    tag,
                    &format!("أضفت المهمة: {title} 📋\nTask added: {title}"),
                )
                .await;
            }
            Intent::AddGroceryItem => {
                let Some(name) = non_empty(&parsed.title) else {
                    self.reply(msg, Some(user), tag, "وش أضيف للمقاضي؟ | What should I add?")
                        .await;
                    return Ok(());
                };
                let list = self.default_list(&user.id, msg).await?;
                self.store
                    .add_grocery_item(
                        &list,
                        name,
                        parsed.quantity.unwrap_or(1.0),
                        None,
                        "whatsapp",
                    )
                    .await?;
                self.reply(
                    msg,
                    Some(user),
                    tag,
                    &format!("أضفت {name} للمقاضي 🛒\nAdded {name} to your groceries"),
                )
                .await;
            }
            Intent::CheckGroceryItem => {
                let Some(name) = non_empty(&parsed.title) else {
                    self.reply(msg, Some(user), tag, "وش اللي اشتريته؟ | Which item did you get?")
                        .await;
                    return Ok(());
                };
                let Some(list) = self.store.latest_grocery_list(&user.id).await? else {
                    self.reply(
                        msg,
                        Some(user),
                        tag,
                        "ما عندك قائمة مقاضي بعد 🛒 | You don't have a grocery list yet",
                    )
                    .await;
                    return Ok(());
                };
                let count = self
                    .store
                    .check_grocery_items_matching(&list.id, name)
                    .await?;
                let reply = if count == 0 {
                    format!("ما لقيت \"{name}\" في القائمة 🤔\nCouldn't find \"{name}\" on the list")
                } else {
                    format!("شطبت {count} ✅ | Checked off {count} item(s)")
                };
                self.reply(msg, Some(user), tag, &reply).await;
            }
            Intent::ShowGroceryList => {
                let Some(list) = self.store.latest_grocery_list(&user.id).await? else {
                    self.reply(
                        msg,
                        Some(user),
                        tag,
                        "ما عندك قائمة مقاضي بعد 🛒 | You don't have a grocery list yet",
                    )
                    .await;
                    return Ok(());
                };
                let lines: Vec<GroceryLine> = self
                    .store
                    .grocery_items_unchecked_first(&list.id)
                    .await?
                    .into_iter()
                    .map(|i| GroceryLine {
                        name: i.name,
                        quantity: i.quantity,
                        unit: i.unit,
                        checked: i.is_checked,
                    })
                    .collect();
                self.audit_out(msg, Some(user), tag, "[grocery list]").await;
                self.messenger
                    .send_grocery_list(&msg.from, &list.name, &lines)
                    .await;
            }
            Intent::CreateMeeting => {
                // Both a title and a start time are required; asking back
                // beats silently dropping the message.
                let title = non_empty(&parsed.title);
                let when = parsed.datetime_utc();
                match (title, when) {
                    (Some(title), Some(when)) => {
                        self.store
                            .create_meeting(&NewMeeting {
                                user_id: user.id.clone(),
                                title: title.to_string(),
                                description: parsed.description.clone(),
                                start_time: when,
                                location: parsed.location.clone(),
                            })
                            .await?;
                        self.reply(
                            msg,
                            Some(user),
                            tag,
                            &format!("سجلت الاجتماع: {title} 📅\nMeeting scheduled: {title}"),
                        )
                        .await;
                    }
                    (None, _) => {
                        self.reply(msg, Some(user), tag, "وش عنوان الاجتماع؟ | What's the meeting about?")
                            .await;
                    }
                    (_, None) => {
                        self.reply(msg, Some(user), tag, "متى الاجتماع؟ | When is the meeting?")
                            .await;
                    }
                }
            }
            Intent::ListTasks => {
                let tasks = self.store.list_pending_tasks(&user.id).await?;
                let reply = if tasks.is_empty() {
                    "ما عندك مهام 🎉 | No pending tasks".to_string()
                } else {
                    let offset = self.app.utc_offset()?;
                    let mut out = String::from("📋 مهامك | Your tasks:\n");
                    for t in &tasks {
                        let due = t
                            .due_date
                            .map(|d| {
                                format!(" — {}", d.with_timezone(&offset).format("%Y-%m-%d %H:%M"))
                            })
                            .unwrap_or_default();
                        out.push_str(&format!("• {}{due}\n", t.title));
                    }
                    out.trim_end().to_string()
                };
                self.reply(msg, Some(user), tag, &reply).await;
            }
            Intent::ListReminders => {
                let reminders = self.store.list_active_reminders(&user.id).await?;
                let reply = if reminders.is_empty() {
                    "ما عندك تذكيرات ⏰ | No active reminders".to_string()
                } else {
                    let offset = self.app.utc_offset()?;
                    let mut out = String::from("⏰ تذكيراتك | Your reminders:\n");
                    for r in &reminders {
                        let next = r
                            .next_reminder_at
                            .map(|d| {
                                format!(" — {}", d.with_timezone(&offset).format("%Y-%m-%d %H:%M"))
                            })
                            .unwrap_or_default();
                        out.push_str(&format!("• {}{next}\n", r.title));
                    }
                    out.trim_end().to_string()
                };
                self.reply(msg, Some(user), tag, &reply).await;
            }
            Intent::Greeting => self.reply(msg, Some(user), tag, GREETING_REPLY).await,
            Intent::Help => self.reply(msg, Some(user), tag, HELP_REPLY).await,
            Intent::Unknown => self.reply(msg, Some(user), tag, UNKNOWN_REPLY).await,
        }
        Ok(())
    }

    /// The user's current list, auto-creating a default-named one so an
    /// "add milk" from a fresh account just works.
    async fn default_list(
        &self,
        user_id: &str,
        msg: &InboundMessage,
    ) -> Result<String, DhikraError> {
        if let Some(list) = self.store.latest_grocery_list(user_id).await? {
            return Ok(list.id);
        }
        self.store
            .create_grocery_list(user_id, "المقاضي", msg.timestamp)
            .await
    }

    /// Send a text reply and record it in the audit log.
    async fn reply(
        &self,
        msg: &InboundMessage,
        user: Option<&UserRecord>,
        intent_tag: &str,
        body: &str,
    ) {
        self.audit_out(msg, user, intent_tag, body).await;
        self.messenger.send_text(&msg.from, body).await;
    }

    async fn audit_in(&self, msg: &InboundMessage, user: Option<&UserRecord>) {
        let body = match msg.kind {
            MessageKind::Text => msg.text_or_empty().to_string(),
            MessageKind::Interactive => format!(
                "[button:{}]",
                msg.interactive_reply_id.as_deref().unwrap_or("")
            ),
        };
        let entry = AuditEntry {
            direction: AuditDirection::In,
            phone: msg.from.clone(),
            user_id: user.map(|u| u.id.clone()),
            intent: None,
            body,
        };
        if let Err(e) = self.audit.log(&entry).await {
            warn!("inbound audit log failed: {e}");
        }
    }

    async fn audit_out(
        &self,
        msg: &InboundMessage,
        user: Option<&UserRecord>,
        intent_tag: &str,
        body: &str,
    ) {
        let entry = AuditEntry {
            direction: AuditDirection::Out,
            phone: msg.from.clone(),
            user_id: user.map(|u| u.id.clone()),
            intent: Some(intent_tag.to_string()),
            body: body.to_string(),
        };
        if let Err(e) = self.audit.log(&entry).await {
            warn!("outbound audit log failed: {e}");
        }
    }
}

/// Literal keyword match on the trimmed, lowercased message.
fn kw_match(text: &str, keywords: &[&str]) -> bool {
    let normalized = text.trim().to_lowercase();
    keywords.iter().any(|kw| normalized == *kw)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use dhikra_core::message::Button;
    use std::sync::Mutex;

    /// Records every outbound send for assertion.
    struct MockMessenger {
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl MockMessenger {
        fn new() -> (Arc<Self>, Arc<Mutex<Vec<(String, String)>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Arc::new(Self {
                    sent: Arc::clone(&sent),
                }),
                sent,
            )
        }
    }

    #[async_trait]
    impl Messenger for MockMessenger {
        async fn send_text(&self, to: &str, body: &str) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            true
        }

        async fn send_buttons(&self, to: &str, body: &str, buttons: &[Button]) -> bool {
            let ids: Vec<&str> = buttons.iter().map(|b| b.id.as_str()).collect();
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), format!("{body} [{}]", ids.join(","))));
            true
        }
    }

    /// Returns a preset parse result and counts invocations.
    struct FixedParser {
        parsed: ParsedIntent,
        calls: Arc<Mutex<u32>>,
    }

    impl FixedParser {
        fn new(parsed: ParsedIntent) -> (Arc<Self>, Arc<Mutex<u32>>) {
            let calls = Arc::new(Mutex::new(0));
            (
                Arc::new(Self {
                    parsed,
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }
    }

    #[async_trait]
    impl IntentParser for FixedParser {
        async fn parse(
            &self,
            _text: &str,
            _now: chrono::DateTime<chrono::FixedOffset>,
        ) -> ParsedIntent {
            *self.calls.lock().unwrap() += 1;
            self.parsed.clone()
        }
    }

    const PHONE: &str = "966500000001";

    async fn test_router(parsed: ParsedIntent) -> (Router, Arc<Mutex<Vec<(String, String)>>>, Arc<Mutex<u32>>, Store) {
        let store = Store::in_memory().await.unwrap();
        let (messenger, sent) = MockMessenger::new();
        let (parser, calls) = FixedParser::new(parsed);
        let router = Router::new(
            store.clone(),
            messenger,
            parser,
            AppConfig::default(),
            SweepConfig::default(),
        );
        (router, sent, calls, store)
    }

    fn text_msg(text: &str) -> InboundMessage {
        InboundMessage {
            from: PHONE.to_string(),
            provider_message_id: "wamid.test".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            kind: MessageKind::Text,
            text: Some(text.to_string()),
            interactive_reply_id: None,
        }
    }

    fn button_msg(reply_id: &str) -> InboundMessage {
        button_msg_from(PHONE, reply_id)
    }

    fn button_msg_from(phone: &str, reply_id: &str) -> InboundMessage {
        InboundMessage {
            from: phone.to_string(),
            provider_message_id: "wamid.test".to_string(),
            timestamp: Utc::now(),
            kind: MessageKind::Interactive,
            text: None,
            interactive_reply_id: Some(reply_id.to_string()),
        }
    }

    #[tokio::test]
    async fn test_greeting_fast_path_skips_extractor() {
        let (router, sent, calls, _store) = test_router(ParsedIntent::unknown()).await;
        router.handle_inbound(&text_msg("هلا")).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), 0);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("👋"));
    }

    #[tokio::test]
    async fn test_help_fast_path_works_for_unverified_sender() {
        let (router, sent, calls, _store) = test_router(ParsedIntent::unknown()).await;
        router.handle_inbound(&text_msg("Help")).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(sent.lock().unwrap()[0].1.contains("⏰"));
    }

    #[tokio::test]
    async fn test_unverified_sender_gets_onboarding_prompt() {
        let (router, sent, calls, _store) = test_router(ParsedIntent::unknown()).await;
        router
            .handle_inbound(&text_msg("ذكرني بالدواء"))
            .await
            .unwrap();

        // Never reaches the extractor: the sender is resolved first.
        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(sent.lock().unwrap()[0].1.contains("غير مسجل"));
    }

    #[tokio::test]
    async fn test_create_reminder_defaults_to_one_hour() {
        let parsed = ParsedIntent {
            intent: Intent::CreateReminder,
            title: Some("الدواء".to_string()),
            confidence: 0.9,
            ..Default::default()
        };
        let (router, sent, _calls, store) = test_router(parsed).await;
        let user = store.create_user(PHONE, None, true).await.unwrap();

        let msg = text_msg("ذكرني بالدواء");
        router.handle_inbound(&msg).await.unwrap();

        let reminders = store.list_active_reminders(&user).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(
            reminders[0].next_reminder_at,
            Some(msg.timestamp + Duration::hours(1))
        );
        assert_eq!(reminders[0].phone_number.as_deref(), Some(PHONE));
        assert!(sent.lock().unwrap()[0].1.contains("الدواء"));
    }

    #[tokio::test]
    async fn test_create_reminder_without_title_asks_back() {
        let parsed = ParsedIntent {
            intent: Intent::CreateReminder,
            confidence: 0.6,
            ..Default::default()
        };
        let (router, sent, _calls, store) = test_router(parsed).await;
        let user = store.create_user(PHONE, None, true).await.unwrap();

        router.handle_inbound(&text_msg("ذكرني")).await.unwrap();

        assert!(store.list_active_reminders(&user).await.unwrap().is_empty());
        assert!(sent.lock().unwrap()[0].1.contains("What should I remind"));
    }

    #[tokio::test]
    async fn test_create_meeting_missing_time_asks_back() {
        let parsed = ParsedIntent {
            intent: Intent::CreateMeeting,
            title: Some("اجتماع الفريق".to_string()),
            confidence: 0.8,
            ..Default::default()
        };
        let (router, sent, _calls, store) = test_router(parsed).await;
        store.create_user(PHONE, None, true).await.unwrap();

        router
            .handle_inbound(&text_msg("اجتماع الفريق"))
            .await
            .unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM meetings")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(sent.lock().unwrap()[0].1.contains("When is the meeting"));
    }

    #[tokio::test]
    async fn test_add_grocery_item_auto_creates_list() {
        let parsed = ParsedIntent {
            intent: Intent::AddGroceryItem,
            title: Some("حليب".to_string()),
            quantity: Some(2.0),
            confidence: 0.9,
            ..Default::default()
        };
        let (router, _sent, _calls, store) = test_router(parsed).await;
        let user = store.create_user(PHONE, None, true).await.unwrap();

        router
            .handle_inbound(&text_msg("أضف حليب للمقاضي"))
            .await
            .unwrap();

        let list = store.latest_grocery_list(&user).await.unwrap().unwrap();
        let items = store.grocery_items_unchecked_first(&list.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "حليب");
        assert_eq!(items[0].quantity, 2.0);
        assert_eq!(items[0].added_via, "whatsapp");
    }

    #[tokio::test]
    async fn test_check_grocery_item_reports_match_count() {
        let parsed = ParsedIntent {
            intent: Intent::CheckGroceryItem,
            title: Some("milk".to_string()),
            confidence: 0.9,
            ..Default::default()
        };
        let (router, sent, _calls, store) = test_router(parsed).await;
        let user = store.create_user(PHONE, None, true).await.unwrap();
        let list = store
            .create_grocery_list(&user, "weekly", Utc::now())
            .await
            .unwrap();
        store
            .add_grocery_item(&list, "Milk", 1.0, None, "whatsapp")
            .await
            .unwrap();
        store
            .add_grocery_item(&list, "Bread", 1.0, None, "whatsapp")
            .await
            .unwrap();

        router.handle_inbound(&text_msg("bought milk")).await.unwrap();

        assert!(sent.lock().unwrap()[0].1.contains("1"));
        let items = store.grocery_items_unchecked_first(&list).await.unwrap();
        let milk = items.iter().find(|i| i.name == "Milk").unwrap();
        assert!(milk.is_checked);
        let bread = items.iter().find(|i| i.name == "Bread").unwrap();
        assert!(!bread.is_checked);
    }

    #[tokio::test]
    async fn test_done_button_deactivates_exactly_that_reminder() {
        let (router, sent, _calls, store) = test_router(ParsedIntent::unknown()).await;
        let user = store.create_user(PHONE, None, true).await.unwrap();
        let target = store
            .create_reminder(&NewReminder {
                user_id: user.clone(),
                title: "a".to_string(),
                description: None,
                recurrence: Recurrence::None,
                reminder_time: Utc::now(),
                recurrence_end_date: None,
                phone_number: Some(PHONE.to_string()),
            })
            .await
            .unwrap();
        let other = store
            .create_reminder(&NewReminder {
                user_id: user,
                title: "b".to_string(),
                description: None,
                recurrence: Recurrence::None,
                reminder_time: Utc::now(),
                recurrence_end_date: None,
                phone_number: Some(PHONE.to_string()),
            })
            .await
            .unwrap();

        router
            .handle_inbound(&button_msg(&format!("done_{target}")))
            .await
            .unwrap();

        assert!(!store.find_reminder(&target).await.unwrap().unwrap().is_active);
        assert!(store.find_reminder(&other).await.unwrap().unwrap().is_active);
        assert!(sent.lock().unwrap()[0].1.contains("✅"));
    }

    #[tokio::test]
    async fn test_task_done_button_completes_task() {
        let (router, _sent, _calls, store) = test_router(ParsedIntent::unknown()).await;
        let user = store.create_user(PHONE, None, true).await.unwrap();
        let task = store
            .create_task(&NewTask {
                user_id: user,
                title: "report".to_string(),
                description: None,
                due_date: None,
                priority: dhikra_core::intent::Priority::Medium,
            })
            .await
            .unwrap();

        router
            .handle_inbound(&button_msg(&format!("task_done_{task}")))
            .await
            .unwrap();

        let record = store.find_task(&task).await.unwrap().unwrap();
        assert_eq!(record.status, "completed");
        assert!(!record.whatsapp_reminder);
    }

    #[tokio::test]
    async fn test_meeting_cancel_button_deletes_row() {
        let (router, _sent, _calls, store) = test_router(ParsedIntent::unknown()).await;
        let user = store.create_user(PHONE, None, true).await.unwrap();
        let meeting = store
            .create_meeting(&NewMeeting {
                user_id: user,
                title: "standup".to_string(),
                description: None,
                start_time: Utc::now(),
                location: None,
            })
            .await
            .unwrap();

        router
            .handle_inbound(&button_msg(&format!("meeting_cancel_{meeting}")))
            .await
            .unwrap();

        assert!(store.find_meeting(&meeting).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_button_id_is_ignored() {
        let (router, sent, _calls, store) = test_router(ParsedIntent::unknown()).await;
        store.create_user(PHONE, None, true).await.unwrap();
        router
            .handle_inbound(&button_msg("mystery_button_42"))
            .await
            .unwrap();
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_button_from_unregistered_phone_mutates_nothing() {
        let (router, sent, _calls, store) = test_router(ParsedIntent::unknown()).await;
        let victim = store
            .create_user("966500000002", None, true)
            .await
            .unwrap();
        let reminder = store
            .create_reminder(&NewReminder {
                user_id: victim,
                title: "meds".to_string(),
                description: None,
                recurrence: Recurrence::None,
                reminder_time: Utc::now(),
                recurrence_end_date: None,
                phone_number: Some("966500000002".to_string()),
            })
            .await
            .unwrap();

        router
            .handle_inbound(&button_msg_from(
                "15550001111",
                &format!("done_{reminder}"),
            ))
            .await
            .unwrap();

        assert!(store.find_reminder(&reminder).await.unwrap().unwrap().is_active);
        assert!(sent.lock().unwrap()[0].1.contains("غير مسجل"));
    }

    #[tokio::test]
    async fn test_button_tap_cannot_touch_another_users_records() {
        let (router, sent, _calls, store) = test_router(ParsedIntent::unknown()).await;
        store.create_user(PHONE, None, true).await.unwrap();
        let victim = store
            .create_user("966500000002", None, true)
            .await
            .unwrap();
        let meeting = store
            .create_meeting(&NewMeeting {
                user_id: victim.clone(),
                title: "standup".to_string(),
                description: None,
                start_time: Utc::now(),
                location: None,
            })
            .await
            .unwrap();
        let reminder = store
            .create_reminder(&NewReminder {
                user_id: victim,
                title: "meds".to_string(),
                description: None,
                recurrence: Recurrence::None,
                reminder_time: Utc::now(),
                recurrence_end_date: None,
                phone_number: Some("966500000002".to_string()),
            })
            .await
            .unwrap();

        router
            .handle_inbound(&button_msg(&format!("meeting_cancel_{meeting}")))
            .await
            .unwrap();
        router
            .handle_inbound(&button_msg(&format!("done_{reminder}")))
            .await
            .unwrap();

        assert!(store.find_meeting(&meeting).await.unwrap().is_some());
        assert!(store.find_reminder(&reminder).await.unwrap().unwrap().is_active);
        // Taps that matched nothing owned get no confirmation either.
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_rows_carry_resolved_user_id() {
        let (router, _sent, _calls, store) = test_router(ParsedIntent::unknown()).await;
        let user = store.create_user(PHONE, None, true).await.unwrap();

        router.handle_inbound(&text_msg("هلا")).await.unwrap();

        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT direction, user_id FROM audit_log")
                .fetch_all(store.pool())
                .await
                .unwrap();
        assert_eq!(rows.len(), 2);
        for (_, user_id) in &rows {
            assert_eq!(user_id.as_deref(), Some(user.as_str()));
        }
    }

    #[tokio::test]
    async fn test_unknown_intent_for_verified_user() {
        let (router, sent, calls, store) = test_router(ParsedIntent::unknown()).await;
        store.create_user(PHONE, None, true).await.unwrap();

        router
            .handle_inbound(&text_msg("asdf qwerty"))
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(sent.lock().unwrap()[0].1.contains("ما فهمت"));
    }
}
