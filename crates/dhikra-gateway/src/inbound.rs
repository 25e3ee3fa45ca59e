//! Webhook verification and inbound payload normalization.

use chrono::{DateTime, Utc};
use dhikra_core::message::{InboundMessage, MessageKind};
use serde_json::Value;
use tracing::debug;

/// Answer the Cloud API's subscription handshake.
///
/// Returns the challenge to echo back iff the mode is `subscribe` and the
/// token matches the configured one.
pub fn verify_challenge<'a>(
    mode: Option<&str>,
    token: Option<&str>,
    expected_token: &str,
    challenge: Option<&'a str>,
) -> Option<&'a str> {
    if mode == Some("subscribe") && token == Some(expected_token) {
        challenge
    } else {
        None
    }
}

/// Extract the first user message from a webhook callback.
///
/// The Cloud API nests it at `entry[0].changes[0].value.messages[0]`;
/// status-only callbacks (delivery receipts, read marks) have no
/// `messages` array and yield `None`. Unwrapping is defensive throughout:
/// a malformed envelope is ignored rather than an error.
pub fn normalize_inbound(payload: &Value) -> Option<InboundMessage> {
    let message = payload
        .get("entry")?
        .get(0)?
        .get("changes")?
        .get(0)?
        .get("value")?
        .get("messages")?
        .get(0)?;

    let from = message.get("from")?.as_str()?.to_string();
    let provider_message_id = message.get("id")?.as_str()?.to_string();
    let timestamp = parse_timestamp(message.get("timestamp"));

    let kind_tag = message.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let (kind, text, interactive_reply_id) = match kind_tag {
        "text" => {
            let body = message.get("text")?.get("body")?.as_str()?.to_string();
            (MessageKind::Text, Some(body), None)
        }
        "interactive" => {
            let reply_id = interactive_reply_id_of(message.get("interactive")?)?;
            (MessageKind::Interactive, None, Some(reply_id))
        }
        other => {
            debug!("ignoring unsupported message type: {other}");
            return None;
        }
    };

    Some(InboundMessage {
        from,
        provider_message_id,
        timestamp,
        kind,
        text,
        interactive_reply_id,
    })
}

/// Tapped button id for both reply-button and list-reply messages.
fn interactive_reply_id_of(interactive: &Value) -> Option<String> {
    for key in ["button_reply", "list_reply"] {
        if let Some(id) = interactive
            .get(key)
            .and_then(|r| r.get("id"))
            .and_then(|id| id.as_str())
        {
            return Some(id.to_string());
        }
    }
    None
}

/// The callback carries the epoch as a decimal string. Anything
/// unparsable falls back to the receive time.
fn parse_timestamp(raw: Option<&Value>) -> DateTime<Utc> {
    raw.and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn callback(message: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "123",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": "456" },
                        "messages": [message],
                    },
                }],
            }],
        })
    }

    #[test]
    fn test_verify_challenge_matrix() {
        let ok = verify_challenge(
            Some("subscribe"),
            Some("secret"),
            "secret",
            Some("12345"),
        );
        assert_eq!(ok, Some("12345"));

        assert!(verify_challenge(Some("subscribe"), Some("wrong"), "secret", Some("12345"))
            .is_none());
        assert!(
            verify_challenge(Some("unsubscribe"), Some("secret"), "secret", Some("12345"))
                .is_none()
        );
        assert!(verify_challenge(None, Some("secret"), "secret", Some("12345")).is_none());
        assert!(verify_challenge(Some("subscribe"), None, "secret", Some("12345")).is_none());
    }

    #[test]
    fn test_normalize_text_message() {
        let payload = callback(json!({
            "from": "966500000001",
            "id": "wamid.abc",
            "timestamp": "1740990000",
            "type": "text",
            "text": { "body": "ذكرني بالدواء الساعة ٩" },
        }));

        let msg = normalize_inbound(&payload).unwrap();
        assert_eq!(msg.from, "966500000001");
        assert_eq!(msg.provider_message_id, "wamid.abc");
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.text.as_deref(), Some("ذكرني بالدواء الساعة ٩"));
        assert!(msg.interactive_reply_id.is_none());
        assert_eq!(msg.timestamp.timestamp(), 1_740_990_000);
    }

    #[test]
    fn test_normalize_button_reply() {
        let payload = callback(json!({
            "from": "966500000001",
            "id": "wamid.def",
            "timestamp": "1740990000",
            "type": "interactive",
            "interactive": {
                "type": "button_reply",
                "button_reply": { "id": "done_r1", "title": "تم ✅" },
            },
        }));

        let msg = normalize_inbound(&payload).unwrap();
        assert_eq!(msg.kind, MessageKind::Interactive);
        assert_eq!(msg.interactive_reply_id.as_deref(), Some("done_r1"));
        assert!(msg.text.is_none());
    }

    #[test]
    fn test_normalize_list_reply() {
        let payload = callback(json!({
            "from": "966500000001",
            "id": "wamid.ghi",
            "timestamp": "1740990000",
            "type": "interactive",
            "interactive": {
                "type": "list_reply",
                "list_reply": { "id": "snooze_r2", "title": "تأجيل" },
            },
        }));

        let msg = normalize_inbound(&payload).unwrap();
        assert_eq!(msg.interactive_reply_id.as_deref(), Some("snooze_r2"));
    }

    #[test]
    fn test_status_only_callback_is_none() {
        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "123",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "statuses": [{ "id": "wamid.abc", "status": "delivered" }],
                    },
                }],
            }],
        });
        assert!(normalize_inbound(&payload).is_none());
    }

    #[test]
    fn test_unsupported_type_is_none() {
        let payload = callback(json!({
            "from": "966500000001",
            "id": "wamid.jkl",
            "timestamp": "1740990000",
            "type": "image",
            "image": { "id": "media1" },
        }));
        assert!(normalize_inbound(&payload).is_none());
    }

    #[test]
    fn test_empty_payload_is_none() {
        assert!(normalize_inbound(&json!({})).is_none());
    }
}
