//! Chat transport trait
//!
//! The notifier formats messages; a transport delivers them. Implementations
//! must be thread-safe and must not retry on their own: a failed delivery is
//! reported once and the notifier decides what to do with it (it logs and
//! drops: notifications never block provisioning).

use async_trait::async_trait;

use crate::error::Result;

/// Trait for outbound chat transports (Telegram, test doubles)
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver a single message. HTML formatting is transport-defined.
    async fn send(&self, text: &str) -> Result<()>;

    /// Transport name for logging
    fn transport_name(&self) -> &'static str;
}
