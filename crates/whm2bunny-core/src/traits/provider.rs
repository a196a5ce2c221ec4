//! Provider API trait
//!
//! Defines the DNS + CDN surface consumed by the provisioning pipeline and
//! the scheduler. The Bunny.net implementation lives in the
//! `whm2bunny-provider-bunny` crate; tests supply mock implementations.
//!
//! # Thread safety
//!
//! Implementations must be safe for concurrent callers: one task runs per
//! in-flight domain and the scheduler calls in parallel with all of them.
//!
//! # Retry ownership
//!
//! Implementations own per-request retry (capped exponential backoff through
//! the core retry engine) and must re-serialize request bodies on every
//! attempt. Lookups used for resource adoption return `Ok(None)` for a
//! missing resource rather than an error.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// DNS record kind, encoded as the provider's wire integers.
///
/// The numeric codes are part of the provider contract and must be sent
/// exactly: A=0, AAAA=1, CNAME=2, TXT=3, MX=4, NS=5. Kinds this daemon never
/// writes still round-trip through [`RecordKind::Other`] so listing a zone
/// with, say, an SOA record does not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
    /// Canonical name record
    Cname,
    /// Text record
    Txt,
    /// Mail exchange record
    Mx,
    /// Nameserver record
    Ns,
    /// Any kind this daemon does not manage
    Other(i64),
}

impl RecordKind {
    /// The provider's numeric code for this kind
    pub fn code(self) -> i64 {
        match self {
            RecordKind::A => 0,
            RecordKind::Aaaa => 1,
            RecordKind::Cname => 2,
            RecordKind::Txt => 3,
            RecordKind::Mx => 4,
            RecordKind::Ns => 5,
            RecordKind::Other(code) => code,
        }
    }

    /// Decode a provider numeric code
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => RecordKind::A,
            1 => RecordKind::Aaaa,
            2 => RecordKind::Cname,
            3 => RecordKind::Txt,
            4 => RecordKind::Mx,
            5 => RecordKind::Ns,
            other => RecordKind::Other(other),
        }
    }
}

impl Serialize for RecordKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for RecordKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        if code < 0 {
            return Err(de::Error::custom(format!("invalid record kind {code}")));
        }
        Ok(RecordKind::from_code(code))
    }
}

/// A DNS zone at the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    /// Provider zone identifier
    pub id: i64,
    /// Zone apex domain
    pub domain: String,
}

/// An existing DNS record inside a zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider record identifier
    pub id: i64,
    /// Record kind
    pub kind: RecordKind,
    /// Record name relative to the zone (`@` semantics use an empty name
    /// at the provider; this crate always passes explicit names)
    pub name: String,
    /// Record value
    pub value: String,
    /// Time to live in seconds
    pub ttl: i64,
    /// MX priority; zero for other kinds
    pub priority: i64,
}

/// A DNS record to be created or updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDnsRecord {
    /// Record kind
    pub kind: RecordKind,
    /// Record name relative to the zone
    pub name: String,
    /// Record value
    pub value: String,
    /// Time to live in seconds
    pub ttl: i64,
    /// MX priority; zero for other kinds
    pub priority: i64,
}

impl NewDnsRecord {
    /// Convenience constructor for records without a priority
    pub fn new(kind: RecordKind, name: impl Into<String>, value: impl Into<String>, ttl: i64) -> Self {
        Self {
            kind,
            name: name.into(),
            value: value.into(),
            ttl,
            priority: 0,
        }
    }

    /// Set the MX priority
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// A CDN pull zone at the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullZone {
    /// Provider pull-zone identifier
    pub id: i64,
    /// Pull-zone name
    pub name: String,
    /// Origin the edge fetches from
    pub origin_url: String,
    /// All hostnames attached to the pull zone, provider-assigned first
    pub hostnames: Vec<String>,
}

/// Options for creating a pull zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPullZone {
    /// Pull-zone name
    pub name: String,
    /// Origin URL
    pub origin_url: String,
    /// Host header sent to the origin
    pub origin_host_header: String,
    /// Whether the Asia edge region serves this zone
    pub enable_geo_zone_asia: bool,
    /// Whether the Europe edge region serves this zone
    pub enable_geo_zone_eu: bool,
    /// Whether the North America edge region serves this zone
    pub enable_geo_zone_na: bool,
    /// Whether the South America edge region serves this zone
    pub enable_geo_zone_sa: bool,
    /// Whether the Africa edge region serves this zone
    pub enable_geo_zone_af: bool,
    /// Whether an origin shield sits between edge and origin
    pub enable_origin_shield: bool,
    /// Origin shield region code
    pub origin_shield_zone_code: String,
    /// Whether certificates are issued automatically for added hostnames
    pub enable_auto_ssl: bool,
    /// Whether Brotli compression is enabled at the edge
    pub enable_brotli: bool,
    /// Edge cache TTL in minutes
    pub cache_ttl_minutes: i64,
}

/// TLS certificate status for a pull-zone hostname
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    /// Hostname the certificate covers
    pub hostname: String,
    /// Whether a certificate has been issued
    pub issued: bool,
}

/// Aggregated traffic statistics for a pull zone over a date window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficStats {
    /// Bytes served
    pub bandwidth: i64,
    /// Requests served
    pub requests: i64,
    /// Requests answered from cache
    pub cache_hits: i64,
    /// Requests forwarded to origin
    pub cache_misses: i64,
}

impl TrafficStats {
    /// Cache hit rate in percent, zero when no requests were observed
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total > 0 {
            self.cache_hits as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// Trait for DNS + CDN provider implementations
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Create a DNS zone for `domain` with the given SOA contact
    async fn create_zone(&self, domain: &str, soa_email: &str) -> Result<Zone>;

    /// Look up a zone by apex domain; `Ok(None)` when absent
    async fn zone_by_domain(&self, domain: &str) -> Result<Option<Zone>>;

    /// Fetch a zone by id
    async fn zone_by_id(&self, id: i64) -> Result<Zone>;

    /// Delete a zone; deleting an absent zone is an error surfaced as
    /// not-found, which teardown treats as already done
    async fn delete_zone(&self, id: i64) -> Result<()>;

    /// List all records in a zone
    async fn list_records(&self, zone_id: i64) -> Result<Vec<DnsRecord>>;

    /// Add a record to a zone
    async fn add_record(&self, zone_id: i64, record: &NewDnsRecord) -> Result<DnsRecord>;

    /// Replace an existing record's contents
    async fn update_record(&self, zone_id: i64, record_id: i64, record: &NewDnsRecord)
        -> Result<()>;

    /// Delete a record from a zone
    async fn delete_record(&self, zone_id: i64, record_id: i64) -> Result<()>;

    /// Create a pull zone
    async fn create_pull_zone(&self, options: &NewPullZone) -> Result<PullZone>;

    /// Look up a pull zone by name; `Ok(None)` when absent
    async fn pull_zone_by_name(&self, name: &str) -> Result<Option<PullZone>>;

    /// Fetch a pull zone by id
    async fn pull_zone_by_id(&self, id: i64) -> Result<PullZone>;

    /// List all pull zones on the account
    async fn list_pull_zones(&self) -> Result<Vec<PullZone>>;

    /// Delete a pull zone
    async fn delete_pull_zone(&self, id: i64) -> Result<()>;

    /// Attach an operator hostname to a pull zone
    async fn add_hostname(&self, id: i64, hostname: &str) -> Result<()>;

    /// Purge the edge cache of a pull zone
    async fn purge_cache(&self, id: i64) -> Result<()>;

    /// Certificate status for a pull zone's canonical hostname
    async fn certificate(&self, id: i64) -> Result<Certificate>;

    /// Traffic statistics over an inclusive date window (provider-local
    /// dates, date-only precision)
    async fn pull_zone_stats(&self, id: i64, from: NaiveDate, to: NaiveDate)
        -> Result<TrafficStats>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
