//! WhatsApp Cloud API gateway.
//!
//! Three concerns live here:
//! - `inbound` — webhook subscription verification and normalization of
//!   callback payloads into [`InboundMessage`]
//! - `send` — outbound payload construction (truncation, button caps,
//!   phone normalization)
//! - the [`WhatsAppGateway`] client, which implements [`Messenger`]

pub mod inbound;
mod send;

pub use inbound::{normalize_inbound, verify_challenge};

use async_trait::async_trait;
use dhikra_core::config::WhatsAppConfig;
use dhikra_core::message::Button;
use dhikra_core::traits::Messenger;
use serde_json::Value;
use tracing::{debug, error};

/// HTTP client for the Cloud API messages endpoint.
pub struct WhatsAppGateway {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
    phone_number_id: String,
}

impl WhatsAppGateway {
    pub fn new(config: &WhatsAppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
        }
    }

    /// POST a prebuilt payload to the messages endpoint. Best-effort:
    /// failures are logged and reported as `false`, never as an error.
    async fn post_payload(&self, payload: &Value) -> bool {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);

        let response = match self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("whatsapp send failed: {e}");
                return false;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("whatsapp send rejected ({status}): {body}");
            return false;
        }

        debug!("whatsapp message delivered");
        true
    }
}

#[async_trait]
impl Messenger for WhatsAppGateway {
    async fn send_text(&self, to: &str, body: &str) -> bool {
        self.post_payload(&send::text_payload(to, body)).await
    }

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[Button]) -> bool {
        self.post_payload(&send::buttons_payload(to, body, buttons))
            .await
    }
}
