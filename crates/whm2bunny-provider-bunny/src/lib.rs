//! # Bunny.net provider client
//!
//! Typed, retrying client for the Bunny.net API, implementing the core
//! [`ProviderApi`] trait: DNS zones and records, CDN pull zones and
//! hostnames, certificates and traffic statistics.
//!
//! ## Behavior
//!
//! - Authenticates with the `AccessKey` header; the key never appears in
//!   logs or `Debug` output
//! - Every request runs through the core retry engine (capped exponential
//!   backoff); request bodies are re-serialized on each attempt
//! - 4xx responses other than 408/429 terminate immediately; 408, 429 and
//!   5xx retry; network failures retry
//! - Adoption lookups (`zone_by_domain`, `pull_zone_by_name`) translate an
//!   absent resource into `Ok(None)` rather than an error
//!
//! ## Security
//!
//! The API key MUST be provided via configuration; the client fails fast on
//! an empty key and the `Debug` implementation redacts it.

mod cdn;
mod dns;
mod stats;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use whm2bunny_core::error::{Error, Result};
use whm2bunny_core::retry::{self, RetryConfig};
use whm2bunny_core::traits::{
    Certificate, DnsRecord, NewDnsRecord, NewPullZone, ProviderApi, PullZone, TrafficStats, Zone,
};

/// Default Bunny.net API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.bunny.net";

/// Header name carrying the API key
pub const ACCESS_KEY_HEADER: &str = "AccessKey";

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bunny.net API client
pub struct BunnyClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
    retry: RetryConfig,
}

// The API key must never leak through Debug output.
impl std::fmt::Debug for BunnyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BunnyClient")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl BunnyClient {
    /// Create a client with the default base URL, timeout and retry policy.
    ///
    /// Returns a configuration error for an empty API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("Bunny API key cannot be empty"));
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
            retry: RetryConfig::default(),
        })
    }

    /// Override the API base URL (tests, regional endpoints)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Perform a request with retries, parsing a JSON response.
    ///
    /// The body is handed to reqwest inside the attempt closure, so it is
    /// re-serialized on every retry rather than consumed by the first.
    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let raw = self.send_raw(method, path, body).await?;
        serde_json::from_str(&raw).map_err(Error::from)
    }

    /// Perform a request with retries, discarding any response body
    async fn send_empty<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.send_raw(method, path, body).await.map(|_| ())
    }

    async fn send_raw<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);

        retry::retry(&self.retry, || {
            let method = method.clone();
            let url = url.clone();
            async move {
                let mut request = self
                    .http
                    .request(method.clone(), &url)
                    .header(ACCESS_KEY_HEADER, &self.api_key)
                    .header("Accept", "application/json");
                if let Some(body) = body {
                    request = request.json(body);
                }

                debug!(method = %method, path, "bunny API request");

                let response = request
                    .send()
                    .await
                    .map_err(|e| Error::network(format!("request to {path} failed: {e}")))?;

                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| Error::network(format!("reading response from {path}: {e}")))?;

                if status.as_u16() >= 400 {
                    let message = extract_error_message(&text, status);
                    if status.as_u16() >= 500 || matches!(status.as_u16(), 408 | 429) {
                        warn!(
                            method = %method,
                            path,
                            status = status.as_u16(),
                            "bunny API request returned a retryable error"
                        );
                    }
                    return Err(Error::api(status.as_u16(), message));
                }

                Ok(text)
            }
        })
        .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, None::<&()>).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> Result<()> {
        self.send_empty(Method::POST, path, body).await
    }

    async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(Method::PUT, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.send_empty(Method::DELETE, path, None::<&()>).await
    }
}

/// Bunny error bodies carry a `Message` field; fall back to the HTTP
/// reason phrase.
fn extract_error_message(body: &str, status: reqwest::StatusCode) -> String {
    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct ApiErrorBody {
        message: Option<String>,
    }

    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

#[async_trait]
impl ProviderApi for BunnyClient {
    async fn create_zone(&self, domain: &str, soa_email: &str) -> Result<Zone> {
        self.create_zone_op(domain, soa_email).await
    }

    async fn zone_by_domain(&self, domain: &str) -> Result<Option<Zone>> {
        self.zone_by_domain_op(domain).await
    }

    async fn zone_by_id(&self, id: i64) -> Result<Zone> {
        self.zone_by_id_op(id).await
    }

    async fn delete_zone(&self, id: i64) -> Result<()> {
        self.delete_zone_op(id).await
    }

    async fn list_records(&self, zone_id: i64) -> Result<Vec<DnsRecord>> {
        self.list_records_op(zone_id).await
    }

    async fn add_record(&self, zone_id: i64, record: &NewDnsRecord) -> Result<DnsRecord> {
        self.add_record_op(zone_id, record).await
    }

    async fn update_record(
        &self,
        zone_id: i64,
        record_id: i64,
        record: &NewDnsRecord,
    ) -> Result<()> {
        self.update_record_op(zone_id, record_id, record).await
    }

    async fn delete_record(&self, zone_id: i64, record_id: i64) -> Result<()> {
        self.delete_record_op(zone_id, record_id).await
    }

    async fn create_pull_zone(&self, options: &NewPullZone) -> Result<PullZone> {
        self.create_pull_zone_op(options).await
    }

    async fn pull_zone_by_name(&self, name: &str) -> Result<Option<PullZone>> {
        self.pull_zone_by_name_op(name).await
    }

    async fn pull_zone_by_id(&self, id: i64) -> Result<PullZone> {
        self.pull_zone_by_id_op(id).await
    }

    async fn list_pull_zones(&self) -> Result<Vec<PullZone>> {
        self.list_pull_zones_op().await
    }

    async fn delete_pull_zone(&self, id: i64) -> Result<()> {
        self.delete_pull_zone_op(id).await
    }

    async fn add_hostname(&self, id: i64, hostname: &str) -> Result<()> {
        self.add_hostname_op(id, hostname).await
    }

    async fn purge_cache(&self, id: i64) -> Result<()> {
        self.purge_cache_op(id).await
    }

    async fn certificate(&self, id: i64) -> Result<Certificate> {
        self.certificate_op(id).await
    }

    async fn pull_zone_stats(
        &self,
        id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<TrafficStats> {
        self.pull_zone_stats_op(id, from, to).await
    }

    fn provider_name(&self) -> &'static str {
        "bunny"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(BunnyClient::new("").is_err());
    }

    #[test]
    fn api_key_not_exposed_in_debug() {
        let client = BunnyClient::new("super-secret-key-12345").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("super-secret-key-12345"));
        assert!(debug.contains("<REDACTED>"));
        assert!(debug.contains("BunnyClient"));
    }

    #[test]
    fn base_url_override() {
        let client = BunnyClient::new("0123456789")
            .unwrap()
            .with_base_url("http://127.0.0.1:9999");
        assert_eq!(client.base_url, "http://127.0.0.1:9999");
    }

    #[test]
    fn error_message_extraction() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        assert_eq!(
            extract_error_message(r#"{"Message":"zone already exists"}"#, status),
            "zone already exists"
        );
        assert_eq!(extract_error_message("not json", status), "Bad Request");
    }
}
