use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized inbound WhatsApp message.
///
/// Produced by the gateway from a Cloud API webhook callback; everything
/// downstream (router, audit) works with this shape only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Sender phone number, digits only (e.g. "9665xxxxxxxx").
    pub from: String,
    /// Provider-assigned message id (wamid).
    pub provider_message_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    /// Text body for `Text` messages.
    pub text: Option<String>,
    /// Tapped button/list-row id for `Interactive` messages.
    pub interactive_reply_id: Option<String>,
}

impl InboundMessage {
    /// The text to feed the intent extractor; empty for interactive taps.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// What kind of inbound message this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Interactive,
}

/// A reply button attached to an outbound interactive message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Button {
    /// Callback id delivered back in `interactive_reply_id` when tapped.
    pub id: String,
    /// Visible label. The Cloud API caps titles at 20 characters.
    pub title: String,
}

impl Button {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// One grocery item as rendered in an outbound list message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroceryLine {
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub checked: bool,
}
