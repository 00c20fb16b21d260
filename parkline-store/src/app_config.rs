use parkline_billing::RateSchedule;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub billing: RateSchedule,
    #[serde(default)]
    pub notifications: NotificationConfig,
    pub blynk: Option<BlynkConfig>,
    pub whatsapp: Option<WhatsAppConfig>,
    pub mail: Option<MailConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            enabled: true,
        }
    }
}

fn default_poll_interval_ms() -> u64 { 2000 }
fn default_true() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    /// Per-call budget for any outbound collaborator request.
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_notify_timeout_ms(),
        }
    }
}

fn default_notify_timeout_ms() -> u64 { 5000 }

#[derive(Debug, Deserialize, Clone)]
pub struct BlynkConfig {
    #[serde(default = "default_blynk_server")]
    pub server: String,
    pub auth_token: String,
}

fn default_blynk_server() -> String { "blynk.cloud".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct WhatsAppConfig {
    pub account_sid: String,
    pub auth_token: String,
    #[serde(default = "default_whatsapp_from")]
    pub from: String,
}

fn default_whatsapp_from() -> String { "whatsapp:+14155238886".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub relay_url: String,
    pub sender: String,
    pub api_key: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `PARKLINE__BLYNK__AUTH_TOKEN=abc` sets `blynk.auth_token`
            .add_source(config::Environment::with_prefix("PARKLINE").separator("__"))
            .build()?;

        let config: Config = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that deserialize fine but would break the poller or billing.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: &str| Err(config::ConfigError::Message(msg.to_string()));

        if self.poller.interval_ms == 0 {
            return invalid("poller.interval_ms must be greater than zero");
        }
        if self.notifications.timeout_ms == 0 {
            return invalid("notifications.timeout_ms must be greater than zero");
        }

        let live = &self.billing.live;
        if !(live.tick_seconds.is_finite() && live.tick_seconds > 0.0) {
            return invalid("billing.live.tick_seconds must be a positive number");
        }
        let charges = [
            ("billing.live.base_charge", live.base_charge),
            ("billing.live.rate_per_tick", live.rate_per_tick),
            ("billing.cancellation.base_charge", self.billing.cancellation.base_charge),
            ("billing.cancellation.rate_per_hour", self.billing.cancellation.rate_per_hour),
        ];
        for (key, value) in charges {
            if !(value.is_finite() && value >= 0.0) {
                return Err(config::ConfigError::Message(format!(
                    "{} must be a non-negative number, got {}",
                    key, value
                )));
            }
        }
        Ok(())
    }
}
