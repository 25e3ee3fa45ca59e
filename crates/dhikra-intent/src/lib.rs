//! LLM-backed intent extraction.
//!
//! One call per inbound text message: the message plus the user-local
//! clock go in, a [`ParsedIntent`] comes out. Extraction is a total
//! function — any failure (transport, non-2xx, malformed completion)
//! collapses to the unknown intent with zero confidence so the router
//! always has something to dispatch on.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use dhikra_core::{config::AiConfig, error::DhikraError, intent::ParsedIntent, traits::IntentParser};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Chat-completion client for an OpenAI-compatible endpoint.
pub struct IntentExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl IntentExtractor {
    /// Create from config values.
    pub fn from_config(config: &AiConfig) -> Result<Self, DhikraError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DhikraError::Provider(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn try_parse(
        &self,
        text: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<ParsedIntent, DhikraError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(now),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("intent: POST {url} model={}", self.model);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| DhikraError::Provider(format!("intent request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(DhikraError::Provider(format!(
                "intent endpoint returned {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = resp.json().await.map_err(|e| {
            DhikraError::Provider(format!("intent: failed to parse response: {e}"))
        })?;

        let content = parsed
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.as_str())
            .ok_or_else(|| DhikraError::Provider("intent: empty completion".to_string()))?;

        parse_completion(content)
    }
}

#[async_trait]
impl IntentParser for IntentExtractor {
    async fn parse(&self, text: &str, now: DateTime<FixedOffset>) -> ParsedIntent {
        if text.trim().is_empty() {
            return ParsedIntent::unknown();
        }

        match self.try_parse(text, now).await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("intent extraction failed, falling back to unknown: {e}");
                ParsedIntent::unknown()
            }
        }
    }
}

/// Parse the model's answer into a [`ParsedIntent`], tolerating code
/// fences around the JSON object.
fn parse_completion(content: &str) -> Result<ParsedIntent, DhikraError> {
    let stripped = strip_fences(content);
    let parsed: ParsedIntent = serde_json::from_str(stripped)
        .map_err(|e| DhikraError::Provider(format!("intent: malformed completion: {e}")))?;
    Ok(parsed.clamped())
}

/// Strip a surrounding ``` or ```json fence, if present.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// The extraction prompt. Embeds the user-local clock so the model can
/// resolve relative time expressions to absolute datetimes.
fn system_prompt(now: DateTime<FixedOffset>) -> String {
    format!(
        "You classify WhatsApp messages for a personal assistant. Messages are in \
Arabic or English. Current local time: {now}.\n\
Reply with ONE JSON object, nothing else:\n\
{{\"intent\": \"...\", \"title\": \"...\", \"description\": null, \"datetime\": null, \
\"recurrence\": \"none\", \"priority\": \"medium\", \"quantity\": null, \
\"location\": null, \"confidence\": 0.0}}\n\
Intents and their triggers:\n\
- create_reminder: ذكرني / فكرني / remind me\n\
- create_task: مهمة / أضف مهمة / add task / new task\n\
- add_grocery_item: أضف للمقاضي / اشتري / add to groceries / buy\n\
- check_grocery_item: اشتريت / خلصت / bought / got\n\
- show_grocery_list: وش المقاضي / قائمة المقاضي / show groceries / grocery list\n\
- create_meeting: اجتماع / موعد / meeting / appointment\n\
- list_tasks: وش مهامي / مهامي / my tasks / list tasks\n\
- list_reminders: تذكيراتي / my reminders / list reminders\n\
- help: مساعدة / help\n\
- greeting: السلام عليكم / هلا / مرحبا / hi / hello / hey\n\
- unknown: anything else\n\
Rules:\n\
- datetime: resolve relative expressions (بكرة, tomorrow, الساعة ٥, in an hour) \
against the current local time above and emit an absolute ISO-8601 datetime with \
offset; null when no time is mentioned.\n\
- recurrence: none, daily (كل يوم / يوميا), weekly (كل أسبوع), monthly (كل شهر), \
yearly (كل سنة).\n\
- priority: high for مهم / عاجل / urgent / important, low for مو مستعجل / \
whenever, otherwise medium.\n\
- quantity: numeric amount for grocery items, null otherwise.\n\
- confidence: your certainty in [0, 1]."
    )
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}
