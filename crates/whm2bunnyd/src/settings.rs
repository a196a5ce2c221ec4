//! Environment configuration loading
//!
//! All daemon configuration comes from `WHM2BUNNY_*` environment variables.
//! Everything has a safe default except the three secrets: the Bunny API
//! key, the origin IP and the webhook secret.
//!
//! ## Variables
//!
//! - `WHM2BUNNY_BUNNY_API_KEY` (required): Bunny.net access key
//! - `WHM2BUNNY_ORIGIN_IP` (required): origin for seeded records and pull zones
//! - `WHM2BUNNY_WEBHOOK_SECRET` (required): HMAC secret for `/hook`
//! - `WHM2BUNNY_BUNNY_BASE_URL`: API base URL
//! - `WHM2BUNNY_SERVER_HOST` / `WHM2BUNNY_SERVER_PORT`: bind address
//! - `WHM2BUNNY_SERVER_DEBUG`: expose the `/debug` routes
//! - `WHM2BUNNY_STATE_PATH` / `WHM2BUNNY_SNAPSHOT_PATH`: persistence files
//! - `WHM2BUNNY_SOA_EMAIL`: SOA contact for new zones
//! - `WHM2BUNNY_ORIGIN_SHIELD_REGION`: pull-zone origin shield region code
//! - `WHM2BUNNY_DNS_CHECKS`: advisory DNS lookups on accepted domains
//! - `WHM2BUNNY_TELEGRAM_BOT_TOKEN` / `WHM2BUNNY_TELEGRAM_CHAT_ID`: setting
//!   both enables notifications
//! - `WHM2BUNNY_TELEGRAM_EVENTS`: comma-separated event subscription list
//! - `WHM2BUNNY_SUMMARY_SCHEDULE` / `WHM2BUNNY_SUMMARY_WEEKLY_SCHEDULE`:
//!   5-field cron expressions
//! - `WHM2BUNNY_SUMMARY_TIMEZONE`: IANA timezone for the scheduler
//! - `WHM2BUNNY_SUMMARY_TOP_N`: ranking size in summaries
//! - `WHM2BUNNY_BANDWIDTH_ALERT_THRESHOLD`: spike threshold in percent
//! - `WHM2BUNNY_LOG_LEVEL` / `WHM2BUNNY_LOG_FORMAT`: logging

use std::env;

use anyhow::{bail, Context};
use whm2bunny_core::config::{
    BunnyConfig, Config, LoggingConfig, ProvisionConfig, ServerConfig, StateConfig, SummaryConfig,
    TelegramConfig, WebhookConfig,
};
use whm2bunny_core::retry::RetryConfig;

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn required(name: &str) -> anyhow::Result<String> {
    var(name).with_context(|| format!("{name} is required. Set it via: export {name}=..."))
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match var(name) {
        Some(raw) => match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => bail!("{name} has an invalid value: '{raw}'"),
        },
        None => Ok(None),
    }
}

fn bool_var(name: &str) -> bool {
    matches!(
        var(name).unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Load the daemon configuration from the environment
pub fn load() -> anyhow::Result<Config> {
    let defaults = SummaryConfig::default();

    let bot_token = var("WHM2BUNNY_TELEGRAM_BOT_TOKEN").unwrap_or_default();
    let chat_id = var("WHM2BUNNY_TELEGRAM_CHAT_ID").unwrap_or_default();
    let telegram_enabled = !bot_token.is_empty() && !chat_id.is_empty();

    let events = match var("WHM2BUNNY_TELEGRAM_EVENTS") {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => TelegramConfig::default().events,
    };

    let config = Config {
        server: ServerConfig {
            host: var_or("WHM2BUNNY_SERVER_HOST", &ServerConfig::default().host),
            port: parse_var("WHM2BUNNY_SERVER_PORT")?.unwrap_or(ServerConfig::default().port),
            debug: bool_var("WHM2BUNNY_SERVER_DEBUG"),
        },
        bunny: BunnyConfig {
            api_key: required("WHM2BUNNY_BUNNY_API_KEY")?,
            base_url: var_or("WHM2BUNNY_BUNNY_BASE_URL", "https://api.bunny.net"),
        },
        webhook: WebhookConfig {
            secret: required("WHM2BUNNY_WEBHOOK_SECRET")?,
            dns_checks: bool_var("WHM2BUNNY_DNS_CHECKS"),
        },
        provision: ProvisionConfig {
            origin_ip: required("WHM2BUNNY_ORIGIN_IP")?,
            soa_email: var_or("WHM2BUNNY_SOA_EMAIL", "hostmaster@mordenhost.com"),
            origin_shield_region: var_or("WHM2BUNNY_ORIGIN_SHIELD_REGION", "SG"),
        },
        state: StateConfig {
            path: var_or("WHM2BUNNY_STATE_PATH", &StateConfig::default().path),
            snapshot_path: var_or(
                "WHM2BUNNY_SNAPSHOT_PATH",
                &StateConfig::default().snapshot_path,
            ),
        },
        telegram: TelegramConfig {
            enabled: telegram_enabled,
            bot_token,
            chat_id,
            events,
            summary: SummaryConfig {
                enabled: defaults.enabled,
                schedule: var_or("WHM2BUNNY_SUMMARY_SCHEDULE", &defaults.schedule),
                weekly_schedule: var_or(
                    "WHM2BUNNY_SUMMARY_WEEKLY_SCHEDULE",
                    &defaults.weekly_schedule,
                ),
                timezone: var_or("WHM2BUNNY_SUMMARY_TIMEZONE", &defaults.timezone),
                include_top_bandwidth: parse_var("WHM2BUNNY_SUMMARY_TOP_N")?
                    .unwrap_or(defaults.include_top_bandwidth),
                bandwidth_alert_threshold: parse_var("WHM2BUNNY_BANDWIDTH_ALERT_THRESHOLD")?
                    .unwrap_or(defaults.bandwidth_alert_threshold),
            },
        },
        retry: RetryConfig::default(),
        logging: LoggingConfig {
            level: var_or("WHM2BUNNY_LOG_LEVEL", "info"),
            format: var_or("WHM2BUNNY_LOG_FORMAT", "json"),
        },
    };

    Ok(config)
}

/// A sample environment file for `config generate`
pub fn sample_env() -> String {
    [
        "# whm2bunny daemon configuration",
        "# Required secrets",
        "export WHM2BUNNY_BUNNY_API_KEY=your-bunny-api-key",
        "export WHM2BUNNY_ORIGIN_IP=203.0.113.10",
        "export WHM2BUNNY_WEBHOOK_SECRET=change-me-to-a-long-random-string",
        "",
        "# HTTP server",
        "export WHM2BUNNY_SERVER_HOST=127.0.0.1",
        "export WHM2BUNNY_SERVER_PORT=9090",
        "# export WHM2BUNNY_SERVER_DEBUG=true",
        "",
        "# Persistence",
        "export WHM2BUNNY_STATE_PATH=/var/lib/whm2bunny/state.json",
        "export WHM2BUNNY_SNAPSHOT_PATH=/var/lib/whm2bunny/snapshots.json",
        "",
        "# Provisioning",
        "export WHM2BUNNY_SOA_EMAIL=hostmaster@mordenhost.com",
        "export WHM2BUNNY_ORIGIN_SHIELD_REGION=SG",
        "",
        "# Telegram notifications (set both to enable)",
        "# export WHM2BUNNY_TELEGRAM_BOT_TOKEN=123456:bot-token",
        "# export WHM2BUNNY_TELEGRAM_CHAT_ID=-1001234567890",
        "# export WHM2BUNNY_TELEGRAM_EVENTS=success,failed,deprovisioned",
        "",
        "# Scheduler",
        "export WHM2BUNNY_SUMMARY_SCHEDULE='0 9 * * *'",
        "export WHM2BUNNY_SUMMARY_WEEKLY_SCHEDULE='0 9 * * 1'",
        "export WHM2BUNNY_SUMMARY_TIMEZONE=Asia/Jakarta",
        "",
        "# Logging",
        "export WHM2BUNNY_LOG_LEVEL=info",
        "export WHM2BUNNY_LOG_FORMAT=json",
    ]
    .join("\n")
}

/// The resolved configuration as JSON with secrets redacted, for
/// `config show`
pub fn redacted_json(config: &Config) -> anyhow::Result<String> {
    let mut config = config.clone();
    config.bunny.api_key = "<redacted>".to_string();
    config.webhook.secret = "<redacted>".to_string();
    if !config.telegram.bot_token.is_empty() {
        config.telegram.bot_token = "<redacted>".to_string();
    }
    Ok(serde_json::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_hides_secrets() {
        let config = Config {
            server: ServerConfig::default(),
            bunny: BunnyConfig {
                api_key: "very-secret-api-key".to_string(),
                base_url: "https://api.bunny.net".to_string(),
            },
            webhook: WebhookConfig {
                secret: "very-secret-webhook".to_string(),
                dns_checks: false,
            },
            provision: ProvisionConfig {
                origin_ip: "203.0.113.10".to_string(),
                soa_email: "hostmaster@example.com".to_string(),
                origin_shield_region: "SG".to_string(),
            },
            state: StateConfig::default(),
            telegram: TelegramConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        };

        let json = redacted_json(&config).unwrap();
        assert!(!json.contains("very-secret-api-key"));
        assert!(!json.contains("very-secret-webhook"));
        assert!(json.contains("<redacted>"));
        assert!(json.contains("203.0.113.10"));
    }

    #[test]
    fn sample_env_names_required_variables() {
        let sample = sample_env();
        assert!(sample.contains("WHM2BUNNY_BUNNY_API_KEY"));
        assert!(sample.contains("WHM2BUNNY_ORIGIN_IP"));
        assert!(sample.contains("WHM2BUNNY_WEBHOOK_SECRET"));
    }
}
