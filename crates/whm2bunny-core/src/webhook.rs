//! Webhook wire types and signature verification
//!
//! The control panel POSTs JSON events to `/hook`, signed with an
//! HMAC-SHA256 of the exact request bytes under a shared secret. This module
//! owns the payload shape, the event-name constants and the constant-time
//! signature check; the HTTP handling itself lives in the daemon binary.

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Header carrying the lowercase hex HMAC-SHA256 of the request body
pub const SIGNATURE_HEADER: &str = "X-Whm2bunny-Signature";

/// Event name: a new hosting account was created
pub const EVENT_ACCOUNT_CREATED: &str = "account_created";
/// Event name: an addon domain was added to an account
pub const EVENT_ADDON_CREATED: &str = "addon_created";
/// Event name: a subdomain was created under an existing domain
pub const EVENT_SUBDOMAIN_CREATED: &str = "subdomain_created";
/// Event name: a hosting account was terminated
pub const EVENT_ACCOUNT_DELETED: &str = "account_deleted";

/// Incoming webhook payload from WHM/cPanel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Event name (see the `EVENT_*` constants)
    pub event: String,

    /// Target domain; required for account/addon/delete events
    #[serde(default)]
    pub domain: String,

    /// Subdomain label; required for subdomain events
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subdomain: String,

    /// Parent domain; required for subdomain events
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_domain: String,

    /// Control-panel user that triggered the event
    pub user: String,
}

/// Successful webhook response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// Always `true` for accepted requests
    pub success: bool,
    /// Human-readable status
    pub message: String,
    /// Tracking id for the accepted work item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookErrorResponse {
    /// Short error category
    pub error: String,
    /// Optional detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the lowercase hex HMAC-SHA256 of `body` under `secret`
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex_encode(&mac.finalize().into_bytes())
}

/// Verify a received signature against the raw body in constant time.
///
/// The signature is the lowercase hex HMAC-SHA256 of the exact received
/// bytes; a missing or empty signature never verifies.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if signature.is_empty() {
        return false;
    }
    let expected = sign(secret, body);
    constant_time_eq(signature.as_bytes(), expected.as_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
