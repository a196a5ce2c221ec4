//! Syntactic and advisory DNS validation
//!
//! Rejects malformed domains, subdomains, origins and secrets before any
//! state is created or any provider call is made. The optional DNS lookup is
//! advisory only: resolution failures are logged and never reject input.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use crate::error::{Error, Result};
use crate::webhook::{
    WebhookPayload, EVENT_ACCOUNT_CREATED, EVENT_ACCOUNT_DELETED, EVENT_ADDON_CREATED,
    EVENT_SUBDOMAIN_CREATED,
};

/// Maximum length of a full domain name (RFC 1035)
const MAX_DOMAIN_LENGTH: usize = 253;
/// Maximum length of a single label (RFC 1035)
const MAX_LABEL_LENGTH: usize = 63;
/// Maximum number of labels a subdomain may add above its parent
const MAX_SUBDOMAIN_LABELS: usize = 5;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?$").unwrap());

static DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$").unwrap());

static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap());

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?\.)*[a-zA-Z]{2,}\.?$").unwrap()
});

/// Validate a fully-qualified domain name
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::validation("domain is required"));
    }

    let domain = domain.trim().trim_end_matches('.');

    if domain.len() > MAX_DOMAIN_LENGTH {
        return Err(Error::validation(format!(
            "domain too long (max {MAX_DOMAIN_LENGTH} characters)"
        )));
    }

    if !DOMAIN_RE.is_match(domain) {
        return Err(Error::validation(format!("invalid domain format: '{domain}'")));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    for label in &labels {
        if label.len() > MAX_LABEL_LENGTH {
            return Err(Error::validation(format!(
                "label '{label}' too long (max {MAX_LABEL_LENGTH} characters)"
            )));
        }
        if !LABEL_RE.is_match(label) {
            return Err(Error::validation(format!(
                "label '{label}' contains invalid characters"
            )));
        }
    }

    let tld = labels[labels.len() - 1];
    if tld.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation("TLD cannot be all numeric"));
    }

    Ok(())
}

/// Validate a single subdomain label (no dots)
pub fn validate_subdomain_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::validation("subdomain label is required"));
    }
    if label.len() > MAX_LABEL_LENGTH {
        return Err(Error::validation(format!(
            "subdomain label too long (max {MAX_LABEL_LENGTH} characters)"
        )));
    }
    if !LABEL_RE.is_match(label) {
        return Err(Error::validation(
            "subdomain label contains invalid characters",
        ));
    }
    Ok(())
}

/// Validate a full `sub.parent` subdomain name
pub fn validate_subdomain(subdomain: &str) -> Result<()> {
    if subdomain.is_empty() {
        return Err(Error::validation("subdomain is required"));
    }

    let subdomain = subdomain.trim().trim_end_matches('.');

    if subdomain.len() > MAX_DOMAIN_LENGTH {
        return Err(Error::validation(format!(
            "subdomain too long (max {MAX_DOMAIN_LENGTH} characters)"
        )));
    }

    let labels: Vec<&str> = subdomain.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::validation("subdomain must have at least one dot"));
    }
    if labels.len() > MAX_SUBDOMAIN_LABELS + 2 {
        return Err(Error::validation(format!(
            "too many labels in subdomain (max {MAX_SUBDOMAIN_LABELS})"
        )));
    }

    for label in &labels {
        validate_subdomain_label(label)?;
    }

    let tld = labels[labels.len() - 1];
    if tld.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation("TLD cannot be all numeric"));
    }

    Ok(())
}

/// Validate an origin target: IPv4 dotted-quad or a hostname
pub fn validate_origin(origin: &str) -> Result<()> {
    if origin.is_empty() {
        return Err(Error::validation("origin IP is required"));
    }

    if IPV4_RE.is_match(origin) {
        for octet in origin.split('.') {
            let value: u32 = octet
                .parse()
                .map_err(|_| Error::validation(format!("invalid IP address octet: {octet}")))?;
            if value > 255 {
                return Err(Error::validation(format!(
                    "invalid IP address octet: {octet}"
                )));
            }
        }
        return Ok(());
    }

    if HOSTNAME_RE.is_match(origin) {
        return Ok(());
    }

    Err(Error::validation("invalid origin IP or hostname format"))
}

/// Validate the provider API key format
pub fn validate_api_key(api_key: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(Error::validation("API key is required"));
    }
    if api_key.len() < 10 {
        return Err(Error::validation("API key too short (min 10 characters)"));
    }
    Ok(())
}

/// Validate the webhook shared secret
pub fn validate_webhook_secret(secret: &str) -> Result<()> {
    if secret.is_empty() {
        return Err(Error::validation("webhook secret is required"));
    }
    if secret.len() < 16 {
        return Err(Error::validation(
            "webhook secret too short (min 16 characters)",
        ));
    }
    Ok(())
}

/// Validate an MX record target
pub fn validate_mx_record(mx: &str) -> Result<()> {
    if mx.is_empty() {
        return Err(Error::validation("MX record is required"));
    }
    let trimmed = mx.trim_end_matches('.');
    if !HOSTNAME_RE.is_match(&format!("{trimmed}.")) {
        return Err(Error::validation("invalid MX record format"));
    }
    Ok(())
}

/// Validate a TXT record value
pub fn validate_txt_record(txt: &str) -> Result<()> {
    if txt.is_empty() {
        return Err(Error::validation("TXT record is required"));
    }
    if txt.len() > 65_535 {
        return Err(Error::validation("TXT record too long (max 65535 characters)"));
    }
    Ok(())
}

/// Payload validator with optional advisory DNS checks
#[derive(Debug, Clone)]
pub struct Validator {
    enable_dns_checks: bool,
    dns_timeout: Duration,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            enable_dns_checks: false,
            dns_timeout: Duration::from_secs(5),
        }
    }
}

impl Validator {
    /// Create a validator; `enable_dns_checks` turns on the advisory lookup
    pub fn new(enable_dns_checks: bool) -> Self {
        Self {
            enable_dns_checks,
            ..Self::default()
        }
    }

    /// Validate a webhook payload: event membership, required fields and
    /// the syntax of every domain field it carries.
    pub async fn validate_payload(&self, payload: &WebhookPayload) -> Result<()> {
        if payload.user.is_empty() {
            return Err(Error::validation("user is required"));
        }

        match payload.event.as_str() {
            EVENT_ACCOUNT_CREATED | EVENT_ADDON_CREATED | EVENT_ACCOUNT_DELETED => {
                if payload.domain.is_empty() {
                    return Err(Error::validation(format!(
                        "domain is required for event '{}'",
                        payload.event
                    )));
                }
                validate_domain(&payload.domain)?;
                if self.enable_dns_checks {
                    self.advisory_lookup(&payload.domain).await;
                }
            }
            EVENT_SUBDOMAIN_CREATED => {
                if payload.subdomain.is_empty() {
                    return Err(Error::validation(format!(
                        "subdomain is required for event '{}'",
                        payload.event
                    )));
                }
                if payload.parent_domain.is_empty() {
                    return Err(Error::validation(format!(
                        "parent_domain is required for event '{}'",
                        payload.event
                    )));
                }
                validate_domain(&payload.parent_domain)?;
                validate_subdomain_label(&payload.subdomain)?;
            }
            other => {
                return Err(Error::validation(format!("unknown event type: '{other}'")));
            }
        }

        Ok(())
    }

    /// Advisory DNS lookup: failures log a warning and never reject.
    async fn advisory_lookup(&self, domain: &str) {
        let target = format!("{domain}:80");
        match tokio::time::timeout(self.dns_timeout, tokio::net::lookup_host(target)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                warn!(domain = %domain, error = %err, "advisory DNS lookup failed");
            }
            Err(_) => {
                warn!(domain = %domain, "advisory DNS lookup timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_domains() {
        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("sub.example.co.uk").is_ok());
        assert!(validate_domain("xn--bcher-kva.example").is_ok());
    }

    #[test]
    fn rejects_malformed_domains() {
        assert!(validate_domain("").is_err());
        assert!(validate_domain("nodots").is_err());
        assert!(validate_domain("-bad.example.com").is_err());
        assert!(validate_domain("bad-.example.com").is_err());
        assert!(validate_domain("example.123").is_err());
        assert!(validate_domain("exa mple.com").is_err());
    }

    #[test]
    fn label_length_boundary() {
        let label_63 = "a".repeat(63);
        let label_64 = "a".repeat(64);
        assert!(validate_domain(&format!("{label_63}.com")).is_ok());
        assert!(validate_domain(&format!("{label_64}.com")).is_err());
    }

    #[test]
    fn total_length_boundary() {
        // Four 63-char labels plus dots and TLD push past 253.
        let long = format!("{0}.{0}.{0}.{0}.com", "a".repeat(63));
        assert!(validate_domain(&long).is_err());
    }

    #[test]
    fn subdomain_label_rules() {
        assert!(validate_subdomain_label("blog").is_ok());
        assert!(validate_subdomain_label("my-blog2").is_ok());
        assert!(validate_subdomain_label("").is_err());
        assert!(validate_subdomain_label("-blog").is_err());
        assert!(validate_subdomain_label("bl.og").is_err());
    }

    #[test]
    fn subdomain_full_name_rules() {
        assert!(validate_subdomain("blog.example.com").is_ok());
        assert!(validate_subdomain("justonelabel").is_err());
        assert!(validate_subdomain("a.b.c.d.e.f.g.example.com").is_err());
    }

    #[test]
    fn origin_accepts_ipv4_and_hostnames() {
        assert!(validate_origin("203.0.113.9").is_ok());
        assert!(validate_origin("origin.example.com").is_ok());
        assert!(validate_origin("256.1.1.1").is_err());
        assert!(validate_origin("").is_err());
        assert!(validate_origin("not valid").is_err());
    }

    #[test]
    fn mx_record_targets() {
        assert!(validate_mx_record("mail.example.com.").is_ok());
        assert!(validate_mx_record("mail.example.com").is_ok());
        assert!(validate_mx_record("").is_err());
        assert!(validate_mx_record("not a hostname").is_err());
    }

    #[test]
    fn txt_record_values() {
        assert!(validate_txt_record("v=spf1 a mx -all").is_ok());
        assert!(validate_txt_record("v=DMARC1; p=none; rua=mailto:dmarc@example.com").is_ok());
        assert!(validate_txt_record("").is_err());
        assert!(validate_txt_record(&"x".repeat(70_000)).is_err());
    }

    #[test]
    fn secret_lengths() {
        assert!(validate_api_key("0123456789").is_ok());
        assert!(validate_api_key("012345678").is_err());
        assert!(validate_webhook_secret("0123456789abcdef").is_ok());
        assert!(validate_webhook_secret("0123456789abcde").is_err());
    }

    #[tokio::test]
    async fn payload_validation_per_event() {
        let v = Validator::new(false);

        let mut payload = WebhookPayload {
            event: EVENT_ACCOUNT_CREATED.to_string(),
            domain: "example.com".to_string(),
            subdomain: String::new(),
            parent_domain: String::new(),
            user: "u1".to_string(),
        };
        assert!(v.validate_payload(&payload).await.is_ok());

        payload.user = String::new();
        assert!(v.validate_payload(&payload).await.is_err());

        payload.user = "u1".to_string();
        payload.event = "mystery_event".to_string();
        assert!(v.validate_payload(&payload).await.is_err());

        payload.event = EVENT_SUBDOMAIN_CREATED.to_string();
        assert!(v.validate_payload(&payload).await.is_err());

        payload.subdomain = "blog".to_string();
        payload.parent_domain = "example.com".to_string();
        assert!(v.validate_payload(&payload).await.is_ok());
    }
}
