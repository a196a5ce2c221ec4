//! Error types for the provisioning daemon
//!
//! This module defines all error types used throughout the crate, together
//! with the retryability classification consumed by the retry engine.

use thiserror::Error;

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the provisioning daemon
#[derive(Error, Debug)]
pub enum Error {
    /// Provider API returned a non-success status
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code returned by the provider
        status: u16,
        /// Error message extracted from the response body
        message: String,
    },

    /// Network-level failure talking to a remote service
    #[error("network error: {0}")]
    Network(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// State store errors
    #[error("state store error: {0}")]
    State(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Input validation errors
    #[error("validation error: {0}")]
    Validation(String),

    /// A looked-up resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The parent DNS zone for a subdomain does not exist at the provider
    #[error("parent-zone-not-found: no DNS zone for parent domain {0}")]
    ParentZoneNotFound(String),

    /// Notification transport failure
    #[error("notification error: {0}")]
    Notify(String),

    /// Wrapper that marks any error as retryable for the retry engine
    #[error("{0}")]
    Retryable(#[source] Box<Error>),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a state store error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a notification error
    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    /// Create a provider API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Wrap an error so the retry engine treats it as retryable
    pub fn retryable(err: Error) -> Self {
        Self::Retryable(Box::new(err))
    }

    /// Whether the retry engine should attempt this operation again.
    ///
    /// Transient network failures, provider throttling (429), request
    /// timeouts (408) and provider server errors (5xx) retry. Other client
    /// errors and every local failure terminate immediately. An explicit
    /// [`Error::Retryable`] wrapper always retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Retryable(_) => true,
            Error::Network(_) => true,
            Error::Api { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }

    /// Strip the retryable marker, returning the underlying error
    pub fn into_inner(self) -> Error {
        match self {
            Error::Retryable(inner) => inner.into_inner(),
            other => other,
        }
    }

    /// Whether this is a "not found" condition (used by adoption lookups)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::Api { status: 404, .. })
    }
}
