//! Notification fan-out
//!
//! The [`Notifier`] formats operator-facing messages for provisioning
//! events, filters them against the configured event-kind subscriptions and
//! hands them to a [`ChatTransport`]. Every emission is fire-and-forget:
//! delivery failures are logged and swallowed so notifications can never
//! fail or delay a provisioning step.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::traits::ChatTransport;

/// Event kind: a domain finished provisioning
pub const EVENT_SUCCESS: &str = "success";
/// Event kind: provisioning failed
pub const EVENT_FAILED: &str = "failed";
/// Event kind: an SSL certificate was issued
pub const EVENT_SSL: &str = "ssl";
/// Event kind: a bandwidth spike was detected
pub const EVENT_BANDWIDTH: &str = "bandwidth";
/// Event kind: a domain was deprovisioned
pub const EVENT_DEPROVISIONED: &str = "deprovisioned";
/// Event kind: a subdomain finished provisioning
pub const EVENT_SUBDOMAIN: &str = "subdomain";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Outbound notification fan-out with subscription filtering
pub struct Notifier {
    transport: Option<Arc<dyn ChatTransport>>,
    events: Vec<String>,
    hostname: String,
    timezone: Tz,
}

impl Notifier {
    /// Create a notifier. A `None` transport disables every emission.
    pub fn new(
        transport: Option<Arc<dyn ChatTransport>>,
        events: Vec<String>,
        hostname: impl Into<String>,
        timezone: Tz,
    ) -> Self {
        Self {
            transport,
            events,
            hostname: hostname.into(),
            timezone,
        }
    }

    /// A notifier that drops everything
    pub fn disabled() -> Self {
        Self {
            transport: None,
            events: Vec::new(),
            hostname: "unknown".to_string(),
            timezone: chrono_tz::UTC,
        }
    }

    /// Whether a transport is configured
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether the subscription set includes `event`. An empty set
    /// subscribes to everything.
    fn should_notify(&self, event: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e.eq_ignore_ascii_case(event))
    }

    /// Deliver `text`, logging and swallowing any failure
    async fn send(&self, text: String) {
        let Some(transport) = &self.transport else {
            return;
        };
        match transport.send(&text).await {
            Ok(()) => debug!(transport = transport.transport_name(), "notification sent"),
            Err(err) => warn!(
                transport = transport.transport_name(),
                error = %err,
                "failed to send notification"
            ),
        }
    }

    /// Domain provisioned successfully
    pub async fn notify_success(
        &self,
        domain: &str,
        zone_id: i64,
        cdn_hostname: &str,
        duration: Duration,
    ) {
        if !self.should_notify(EVENT_SUCCESS) {
            return;
        }
        let message = format!(
            "✅ <b>Domain Provisioned</b>\n\n\
             🌐 <b>Domain:</b> {domain}\n\
             📍 <b>Zone ID:</b> {zone_id}\n\
             🚀 <b>CDN:</b> {cdn_hostname}\n\
             ⏱️ <b>Duration:</b> {:.2}s\n\n\
             🖥️ <b>Server:</b> {}",
            duration.as_secs_f64(),
            self.hostname,
        );
        self.send(message).await;
    }

    /// Provisioning failed at a named step
    pub async fn notify_failed(&self, domain: &str, step: &str, error: &str) {
        if !self.should_notify(EVENT_FAILED) {
            return;
        }
        let local_time = Utc::now()
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S %Z");
        let message = format!(
            "❌ <b>Provisioning Failed</b>\n\n\
             🌐 <b>Domain:</b> {domain}\n\
             📍 <b>Step:</b> {step}\n\
             ⚠️ <b>Error:</b> {error}\n\n\
             🖥️ <b>Server:</b> {}\n\
             🕐 <b>Time:</b> {local_time}",
            self.hostname,
        );
        self.send(message).await;
    }

    /// SSL certificate issued for a domain
    pub async fn notify_ssl_issued(&self, domain: &str, hostname: &str) {
        if !self.should_notify(EVENT_SSL) {
            return;
        }
        let message = format!(
            "🔐 <b>SSL Certificate Issued</b>\n\n\
             🌐 <b>Domain:</b> {domain}\n\
             🚀 <b>CDN:</b> {hostname}\n\n\
             🖥️ <b>Server:</b> {}",
            self.hostname,
        );
        self.send(message).await;
    }

    /// Bandwidth spike on a zone compared to the prior 24 hours
    pub async fn notify_bandwidth_alert(
        &self,
        zone_name: &str,
        current: i64,
        previous: i64,
        percent_increase: f64,
    ) {
        if !self.should_notify(EVENT_BANDWIDTH) {
            return;
        }
        let message = format!(
            "⚠️ <b>Bandwidth Alert</b>\n\n\
             🌐 <b>Domain:</b> {zone_name}\n\
             📈 <b>Increase:</b> {percent_increase:.0}% in last 24 hours\n\
             📊 <b>Current:</b> {:.2} GB/day\n\
             📊 <b>Previous:</b> {:.2} GB/day\n\n\
             🖥️ <b>Server:</b> {}",
            current as f64 / GIB,
            previous as f64 / GIB,
            self.hostname,
        );
        self.send(message).await;
    }

    /// Domain removed, zone and pull zone deleted
    pub async fn notify_deprovisioned(&self, domain: &str) {
        if !self.should_notify(EVENT_DEPROVISIONED) {
            return;
        }
        let message = format!(
            "🗑️ <b>Domain Removed</b>\n\n\
             🌐 <b>Domain:</b> {domain}\n\
             📍 <b>DNS Zone:</b> Deleted\n\
             🚀 <b>CDN Pull Zone:</b> Deleted\n\n\
             🖥️ <b>Server:</b> {}",
            self.hostname,
        );
        self.send(message).await;
    }

    /// Subdomain provisioned under a parent zone
    pub async fn notify_subdomain(&self, subdomain: &str, parent: &str, cdn_hostname: &str) {
        if !self.should_notify(EVENT_SUBDOMAIN) {
            return;
        }
        let message = format!(
            "✅ <b>Subdomain Provisioned</b>\n\n\
             🌐 <b>Subdomain:</b> {subdomain}\n\
             📍 <b>Parent Zone:</b> {parent}\n\
             🚀 <b>CDN:</b> {cdn_hostname}\n\n\
             🖥️ <b>Server:</b> {}",
            self.hostname,
        );
        self.send(message).await;
    }

    /// Send a pre-formatted message (scheduler summaries), bypassing the
    /// event filter but not the enabled check
    pub async fn send_raw(&self, message: &str) {
        self.send(message.to_string()).await;
    }

    /// Drain the notifier during shutdown.
    ///
    /// Every delivery is awaited inline at emission time, so there is no
    /// queued work to wait for; the transport needs no teardown either.
    pub async fn drain(&self) {
        if let Some(transport) = &self.transport {
            debug!(transport = transport.transport_name(), "notifier drained");
        }
    }
}
