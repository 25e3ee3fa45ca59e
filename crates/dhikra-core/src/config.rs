use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DhikraError;

/// Top-level Dhikra configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// User-local UTC offset in minutes, used to anchor relative time
    /// expressions ("tomorrow at 5"). Default is UTC+3.
    #[serde(default = "default_utc_offset_mins")]
    pub utc_offset_mins: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            utc_offset_mins: default_utc_offset_mins(),
        }
    }
}

impl AppConfig {
    /// The configured offset as a chrono [`FixedOffset`].
    pub fn utc_offset(&self) -> Result<FixedOffset, DhikraError> {
        FixedOffset::east_opt(self.utc_offset_mins * 60).ok_or_else(|| {
            DhikraError::Config(format!(
                "utc_offset_mins out of range: {}",
                self.utc_offset_mins
            ))
        })
    }
}

/// WhatsApp Cloud API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_whatsapp_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    /// Shared secret echoed back during webhook subscription.
    #[serde(default)]
    pub verify_token: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base: default_whatsapp_api_base(),
            access_token: String::new(),
            phone_number_id: String::new(),
            verify_token: String::new(),
        }
    }
}

/// Chat-completion endpoint used for intent extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            api_key: String::new(),
            model: default_ai_model(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token required on `/cron/sweep`. Empty disables the check.
    #[serde(default)]
    pub cron_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cron_secret: String::new(),
        }
    }
}

/// Sweep windows and snooze length, all in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_task_lookahead")]
    pub task_lookahead_mins: i64,
    #[serde(default = "default_meeting_lookahead")]
    pub meeting_lookahead_mins: i64,
    #[serde(default = "default_snooze_mins")]
    pub snooze_mins: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            task_lookahead_mins: default_task_lookahead(),
            meeting_lookahead_mins: default_meeting_lookahead(),
            snooze_mins: default_snooze_mins(),
        }
    }
}

// --- Default value functions ---

fn default_name() -> String {
    "dhikra".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_utc_offset_mins() -> i32 {
    180
}
fn default_whatsapp_api_base() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}
fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_ai_timeout_secs() -> u64 {
    30
}
fn default_db_path() -> String {
    "dhikra.db".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_task_lookahead() -> i64 {
    30
}
fn default_meeting_lookahead() -> i64 {
    15
}
fn default_snooze_mins() -> i64 {
    30
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Secrets can be
/// supplied or overridden via environment variables so the file never
/// has to hold them.
pub fn load(path: &str) -> Result<Config, DhikraError> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DhikraError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| DhikraError::Config(format!("failed to parse config: {e}")))?
    } else {
        tracing::info!("config file not found at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config);
    config.app.utc_offset()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    for (var, slot) in [
        ("DHIKRA_WHATSAPP_TOKEN", &mut config.whatsapp.access_token),
        ("DHIKRA_VERIFY_TOKEN", &mut config.whatsapp.verify_token),
        ("DHIKRA_AI_API_KEY", &mut config.ai.api_key),
        ("DHIKRA_CRON_SECRET", &mut config.server.cron_secret),
    ] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                *slot = value;
            }
        }
    }
}
