//! Configuration types for the provisioning daemon
//!
//! This module defines all configuration structures used throughout the
//! crate. Values are loaded from `WHM2BUNNY_*` environment variables by the
//! daemon binary; everything here is plain data with serde defaults so the
//! resolved configuration can also be displayed or validated from the CLI.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryConfig;

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Bunny.net API settings
    pub bunny: BunnyConfig,

    /// Webhook ingress settings
    pub webhook: WebhookConfig,

    /// Provisioning pipeline settings
    pub provision: ProvisionConfig,

    /// State persistence settings
    #[serde(default)]
    pub state: StateConfig,

    /// Telegram notification settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Retry policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.bunny.validate()?;
        self.webhook.validate()?;
        self.provision.validate()?;
        self.telegram.validate()?;
        self.retry.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether the `/debug` routes are exposed
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9090
}

/// Bunny.net API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BunnyConfig {
    /// API access key, sent in the `AccessKey` header
    pub api_key: String,

    /// API base URL
    #[serde(default = "default_bunny_base_url")]
    pub base_url: String,
}

impl BunnyConfig {
    fn validate(&self) -> Result<()> {
        crate::validator::validate_api_key(&self.api_key)?;
        if self.base_url.is_empty() {
            return Err(Error::config("bunny base_url cannot be empty"));
        }
        Ok(())
    }
}

fn default_bunny_base_url() -> String {
    "https://api.bunny.net".to_string()
}

/// Webhook ingress configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret for the HMAC-SHA256 signature
    pub secret: String,

    /// Whether accepted domains also get an advisory DNS lookup
    #[serde(default)]
    pub dns_checks: bool,
}

impl WebhookConfig {
    fn validate(&self) -> Result<()> {
        crate::validator::validate_webhook_secret(&self.secret)
    }
}

/// Provisioning pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Origin IP (or hostname) that seeded A records and pull zones point at
    pub origin_ip: String,

    /// Administrative contact recorded in new DNS zones
    #[serde(default = "default_soa_email")]
    pub soa_email: String,

    /// Origin shield region code for new pull zones
    #[serde(default = "default_origin_shield_region")]
    pub origin_shield_region: String,
}

impl ProvisionConfig {
    fn validate(&self) -> Result<()> {
        crate::validator::validate_origin(&self.origin_ip)?;
        if self.soa_email.is_empty() {
            return Err(Error::config("soa_email cannot be empty"));
        }
        if self.origin_shield_region.is_empty() {
            return Err(Error::config("origin_shield_region cannot be empty"));
        }
        Ok(())
    }
}

fn default_soa_email() -> String {
    "hostmaster@mordenhost.com".to_string()
}

fn default_origin_shield_region() -> String {
    "SG".to_string()
}

/// State persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Path to the provisioning state file
    #[serde(default = "default_state_path")]
    pub path: String,

    /// Path to the bandwidth snapshot file
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

fn default_state_path() -> String {
    "/var/lib/whm2bunny/state.json".to_string()
}

fn default_snapshot_path() -> String {
    "/var/lib/whm2bunny/snapshots.json".to_string()
}

/// Telegram notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Whether notifications are enabled at all
    #[serde(default)]
    pub enabled: bool,

    /// Bot token
    #[serde(default)]
    pub bot_token: String,

    /// Destination chat id
    #[serde(default)]
    pub chat_id: String,

    /// Event kinds that produce a notification
    #[serde(default = "default_events")]
    pub events: Vec<String>,

    /// Summary and alert scheduling
    #[serde(default)]
    pub summary: SummaryConfig,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            events: default_events(),
            summary: SummaryConfig::default(),
        }
    }
}

impl TelegramConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled {
            if self.bot_token.is_empty() {
                return Err(Error::config("telegram bot_token is required when enabled"));
            }
            if self.chat_id.is_empty() {
                return Err(Error::config("telegram chat_id is required when enabled"));
            }
        }
        self.summary.validate()
    }
}

fn default_events() -> Vec<String> {
    vec![
        "success".to_string(),
        "failed".to_string(),
        "ssl".to_string(),
        "bandwidth".to_string(),
        "deprovisioned".to_string(),
        "subdomain".to_string(),
    ]
}

/// Scheduler configuration for summaries and bandwidth alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Whether scheduled summaries run
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Daily summary schedule (5-field cron)
    #[serde(default = "default_daily_schedule")]
    pub schedule: String,

    /// Weekly summary schedule (5-field cron)
    #[serde(default = "default_weekly_schedule")]
    pub weekly_schedule: String,

    /// IANA timezone name used for all schedule and window math
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// How many zones the summary ranking includes
    #[serde(default = "default_top_bandwidth")]
    pub include_top_bandwidth: usize,

    /// Percent increase over the prior 24 hours that triggers an alert
    #[serde(default = "default_alert_threshold")]
    pub bandwidth_alert_threshold: f64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_daily_schedule(),
            weekly_schedule: default_weekly_schedule(),
            timezone: default_timezone(),
            include_top_bandwidth: default_top_bandwidth(),
            bandwidth_alert_threshold: default_alert_threshold(),
        }
    }
}

impl SummaryConfig {
    fn validate(&self) -> Result<()> {
        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(Error::config(format!(
                "unknown timezone '{}'",
                self.timezone
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_daily_schedule() -> String {
    "0 9 * * *".to_string()
}

fn default_weekly_schedule() -> String {
    "0 9 * * 1".to_string()
}

fn default_timezone() -> String {
    "Asia/Jakarta".to_string()
}

fn default_top_bandwidth() -> usize {
    20
}

fn default_alert_threshold() -> f64 {
    50.0
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or text
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(Error::config(format!("invalid log level '{other}'")));
            }
        }
        match self.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(Error::config(format!("invalid log format '{other}'"))),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}
