//! Outbound payload construction for the Cloud API messages endpoint.

use dhikra_core::message::Button;
use serde_json::{json, Value};

/// The Cloud API rejects interactive messages with more than three buttons.
const MAX_BUTTONS: usize = 3;

/// The Cloud API rejects button titles longer than 20 characters.
const MAX_TITLE_CHARS: usize = 20;

/// Build a plain text message payload.
pub(crate) fn text_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": normalize_phone(to),
        "type": "text",
        "text": { "body": body },
    })
}

/// Build an interactive reply-button payload. Titles are truncated and
/// the button count capped to what the API accepts.
pub(crate) fn buttons_payload(to: &str, body: &str, buttons: &[Button]) -> Value {
    let buttons: Vec<Value> = buttons
        .iter()
        .take(MAX_BUTTONS)
        .map(|b| {
            json!({
                "type": "reply",
                "reply": {
                    "id": b.id,
                    "title": truncate_title(&b.title),
                },
            })
        })
        .collect();

    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": normalize_phone(to),
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons },
        },
    })
}

/// Strip everything but digits; the API wants bare international numbers.
pub(crate) fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Truncate to the API's title limit on a character boundary.
fn truncate_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone_strips_formatting() {
        assert_eq!(normalize_phone("+966 50-000-0001"), "966500000001");
        assert_eq!(normalize_phone("966500000001"), "966500000001");
    }

    #[test]
    fn test_text_payload_shape() {
        let payload = text_payload("+966500000001", "hello");
        assert_eq!(payload["messaging_product"], "whatsapp");
        assert_eq!(payload["to"], "966500000001");
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["text"]["body"], "hello");
    }

    #[test]
    fn test_buttons_capped_at_three() {
        let buttons: Vec<Button> = (0..5)
            .map(|i| Button::new(format!("b{i}"), format!("Button {i}")))
            .collect();
        let payload = buttons_payload("966500000001", "pick one", &buttons);
        let sent = payload["interactive"]["action"]["buttons"]
            .as_array()
            .unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0]["reply"]["id"], "b0");
    }

    #[test]
    fn test_title_truncated_on_char_boundary() {
        let long = "تذكير بالاجتماع الأسبوعي مع الفريق";
        let buttons = [Button::new("x", long)];
        let payload = buttons_payload("966500000001", "body", &buttons);
        let title = payload["interactive"]["action"]["buttons"][0]["reply"]["title"]
            .as_str()
            .unwrap();
        assert_eq!(title.chars().count(), 20);
        assert_eq!(title, long.chars().take(20).collect::<String>());
    }

    #[test]
    fn test_short_title_unchanged() {
        let buttons = [Button::new("x", "تم ✅")];
        let payload = buttons_payload("966500000001", "body", &buttons);
        assert_eq!(
            payload["interactive"]["action"]["buttons"][0]["reply"]["title"],
            "تم ✅"
        );
    }
}
