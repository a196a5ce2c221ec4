//! # Telegram chat transport
//!
//! Delivers notifier messages to a Telegram chat through the Bot API,
//! implementing the core [`ChatTransport`] trait.
//!
//! The transport is deliberately dumb: one `sendMessage` call per emission,
//! no retry, no queueing. The notifier treats every delivery as
//! fire-and-forget, so a failed send is reported once and dropped there.
//!
//! The bot token never appears in logs or `Debug` output; request URLs
//! containing it are never logged.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use whm2bunny_core::error::{Error, Result};
use whm2bunny_core::traits::ChatTransport;

/// Telegram Bot API base URL
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram Bot API transport
pub struct TelegramTransport {
    bot_token: String,
    chat_id: i64,
    base_url: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[derive(Serialize)]
struct SendMessageParams<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramTransport {
    /// Create a transport for the given bot and chat.
    ///
    /// The chat id must be numeric (group ids are negative). The
    /// connection itself is probed lazily via [`Self::check`], not here, so
    /// construction never blocks startup on the Telegram API.
    pub fn new(bot_token: impl Into<String>, chat_id: &str) -> Result<Self> {
        let bot_token = bot_token.into();
        if bot_token.is_empty() {
            return Err(Error::config("telegram bot token cannot be empty"));
        }

        let chat_id: i64 = chat_id
            .parse()
            .map_err(|_| Error::config(format!("invalid telegram chat id '{chat_id}'")))?;

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            bot_token,
            chat_id,
            base_url: TELEGRAM_API_BASE.to_string(),
            http,
        })
    }

    /// Override the API base URL (tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Probe the bot credentials with a `getMe` call
    pub async fn check(&self) -> Result<()> {
        let url = format!("{}/bot{}/getMe", self.base_url, self.bot_token);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::notify(format!("telegram getMe failed: {e}")))?;

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::notify(format!("telegram getMe response invalid: {e}")))?;

        if !body.ok {
            return Err(Error::notify(format!(
                "telegram rejected bot credentials: {}",
                body.description.unwrap_or_default()
            )));
        }

        debug!("telegram bot credentials verified");
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let params = SendMessageParams {
            chat_id: self.chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self
            .http
            .post(&url)
            .json(&params)
            .send()
            .await
            .map_err(|e| Error::notify(format!("telegram sendMessage failed: {e}")))?;

        let status = response.status();
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::notify(format!("telegram response invalid: {e}")))?;

        if !body.ok {
            return Err(Error::notify(format!(
                "telegram sendMessage rejected (status {status}): {}",
                body.description.unwrap_or_default()
            )));
        }

        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "telegram"
    }
}
