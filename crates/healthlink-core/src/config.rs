use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{HealthlinkError, Result};

pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LOCK_NAME: &str = "proactive_checkin_job";
pub const DEFAULT_LOCK_AT_MOST_SECS: u64 = 50;
pub const DEFAULT_LOCK_AT_LEAST_SECS: u64 = 10;
/// Prior conversation turns handed to the model for a proactive message.
pub const DEFAULT_HISTORY_TURNS: usize = 5;
pub const DEFAULT_MANAGED_DAILY_LIMIT: u32 = 100;
pub const DEFAULT_INDIVIDUAL_DAILY_LIMIT: u32 = 50;

/// Top-level config (healthlink.toml + HEALTHLINK_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthlinkConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub whatsapp: WhatsappConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Proactive check-in loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Set to false to run an instance that serves owner operations only.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Name of the distributed lock row shared by every instance.
    #[serde(default = "default_lock_name")]
    pub lock_name: String,
    /// A crashed holder's lease is reclaimable after this long.
    #[serde(default = "default_lock_at_most_secs")]
    pub lock_at_most_secs: u64,
    /// A lease is never released earlier than this after acquisition.
    #[serde(default = "default_lock_at_least_secs")]
    pub lock_at_least_secs: u64,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// Identifies this process in the lock table. Random when unset.
    pub instance_id: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_INTERVAL_SECS,
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            lock_at_most_secs: DEFAULT_LOCK_AT_MOST_SECS,
            lock_at_least_secs: DEFAULT_LOCK_AT_LEAST_SECS,
            history_turns: DEFAULT_HISTORY_TURNS,
            instance_id: None,
        }
    }
}

/// Daily caps per tenant, tiered by account class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_managed_limit")]
    pub managed_daily_limit: u32,
    #[serde(default = "default_individual_limit")]
    pub individual_daily_limit: u32,
    /// Cross-tenant cap. `None` disables the global tier.
    pub global_daily_limit: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            managed_daily_limit: DEFAULT_MANAGED_DAILY_LIMIT,
            individual_daily_limit: DEFAULT_INDIVIDUAL_DAILY_LIMIT,
            global_daily_limit: None,
        }
    }
}

/// OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

/// Evolution API (WhatsApp) messaging gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsappConfig {
    #[serde(default = "default_evolution_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_instance")]
    pub instance: String,
    /// Typing delay the gateway applies before delivering.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u32,
    #[serde(default = "default_whatsapp_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WhatsappConfig {
    fn default() -> Self {
        Self {
            base_url: default_evolution_base_url(),
            api_key: String::new(),
            instance: default_instance(),
            delay_ms: default_delay_ms(),
            timeout_secs: default_whatsapp_timeout_secs(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}
fn default_lock_name() -> String {
    DEFAULT_LOCK_NAME.to_string()
}
fn default_lock_at_most_secs() -> u64 {
    DEFAULT_LOCK_AT_MOST_SECS
}
fn default_lock_at_least_secs() -> u64 {
    DEFAULT_LOCK_AT_LEAST_SECS
}
fn default_history_turns() -> usize {
    DEFAULT_HISTORY_TURNS
}
fn default_managed_limit() -> u32 {
    DEFAULT_MANAGED_DAILY_LIMIT
}
fn default_individual_limit() -> u32 {
    DEFAULT_INDIVIDUAL_DAILY_LIMIT
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    300
}
fn default_chat_timeout_secs() -> u64 {
    30
}
fn default_evolution_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_instance() -> String {
    "healthlink".to_string()
}
fn default_delay_ms() -> u32 {
    1000
}
fn default_whatsapp_timeout_secs() -> u64 {
    15
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.healthlink/healthlink.db", home)
}

impl HealthlinkConfig {
    /// Load config from a TOML file with HEALTHLINK_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `HEALTHLINK_SCHEDULER__INTERVAL_SECS=30`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("HEALTHLINK_").split("__")),
        )
    }

    /// Extract and validate from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: HealthlinkConfig = figment
            .extract()
            .map_err(|e| HealthlinkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the check-in loop cannot honour.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.interval_secs == 0 {
            return Err(HealthlinkError::Config(
                "scheduler.interval_secs must be greater than zero".to_string(),
            ));
        }
        if s.lock_at_most_secs == 0 {
            return Err(HealthlinkError::Config(
                "scheduler.lock_at_most_secs must be greater than zero".to_string(),
            ));
        }
        if s.lock_at_least_secs > s.lock_at_most_secs {
            return Err(HealthlinkError::Config(format!(
                "scheduler.lock_at_least_secs ({}) exceeds lock_at_most_secs ({})",
                s.lock_at_least_secs, s.lock_at_most_secs
            )));
        }
        let r = &self.rate_limits;
        if r.managed_daily_limit == 0 || r.individual_daily_limit == 0 {
            return Err(HealthlinkError::Config(
                "rate_limits daily limits must be greater than zero".to_string(),
            ));
        }
        if r.global_daily_limit == Some(0) {
            return Err(HealthlinkError::Config(
                "rate_limits.global_daily_limit must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.healthlink/healthlink.toml", home)
}
