//! Durable provisioning state
//!
//! Two stores live here, each owning its own file and lock:
//!
//! - [`StateStore`]: the map from domain to provisioning record, the
//!   checkpoint the pipeline resumes from after a crash
//! - [`SnapshotStore`]: rolling bandwidth snapshots the scheduler compares
//!   against
//!
//! Both persist with the same discipline: serialize the full set, write to
//! `<path>.tmp`, fsync best-effort, rename over the real path. Either the
//! pre-state or the post-state is visible after a crash, never a torn write.

mod snapshots;
mod store;

pub use snapshots::{BandwidthSnapshot, SnapshotStore};
pub use store::{StateStore, MAX_RECOVERY_RETRIES};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// No step has completed yet
pub const STEP_NONE: i32 = 0;
/// The DNS zone exists
pub const STEP_DNS_ZONE: i32 = 1;
/// The canonical record set is seeded
pub const STEP_DNS_RECORDS: i32 = 2;
/// The CDN pull zone exists
pub const STEP_PULL_ZONE: i32 = 3;
/// The CDN hostname is synced back into the zone; terminal step
pub const STEP_CNAME_SYNC: i32 = 4;

/// Human-readable name for a step number
pub fn step_name(step: i32) -> &'static str {
    match step {
        STEP_NONE => "none",
        STEP_DNS_ZONE => "dns_zone",
        STEP_DNS_RECORDS => "dns_records",
        STEP_PULL_ZONE => "pull_zone",
        STEP_CNAME_SYNC => "cname_sync",
        _ => "unknown",
    }
}

/// Lifecycle status of a provisioning record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionStatus {
    /// Waiting to be provisioned
    Pending,
    /// A pipeline task is working on it
    Provisioning,
    /// All steps completed
    Success,
    /// The last attempt failed
    Failed,
}

impl std::fmt::Display for ProvisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProvisionStatus::Pending => "pending",
            ProvisionStatus::Provisioning => "provisioning",
            ProvisionStatus::Success => "success",
            ProvisionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One provisioning work item: a domain or a `sub.parent` subdomain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRecord {
    /// Opaque unique identifier, immutable after creation
    pub id: String,

    /// Fully-qualified target domain
    pub domain: String,

    /// Lifecycle status
    pub status: ProvisionStatus,

    /// Highest step proven complete (0..4); drives resume
    pub current_step: i32,

    /// Provider DNS zone id; 0 until known. For subdomain records this is
    /// the parent's zone id.
    #[serde(default)]
    pub zone_id: i64,

    /// Provider CDN pull-zone id; 0 until known
    #[serde(default)]
    pub pull_zone_id: i64,

    /// Provider-assigned CDN canonical hostname
    #[serde(default)]
    pub cdn_hostname: String,

    /// Last error message when failed; empty otherwise
    #[serde(default)]
    pub error: String,

    /// Number of failure transitions observed
    pub retries: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl ProvisionRecord {
    /// A fresh pending record for `domain`
    pub(crate) fn new(domain: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            domain: domain.to_string(),
            status: ProvisionStatus::Pending,
            current_step: STEP_NONE,
            zone_id: 0,
            pull_zone_id: 0,
            cdn_hostname: String::new(),
            error: String::new(),
            retries: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
