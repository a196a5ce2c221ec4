//! Bandwidth snapshot store
//!
//! Append-mostly store of per-zone traffic snapshots the scheduler uses as
//! its 24-hour baseline. Snapshots older than the 30-day window are pruned
//! on append. Same atomic-save discipline as the record store, with its own
//! lock and file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Snapshots are retained for this many days
const RETENTION_DAYS: i64 = 30;

/// Traffic counters for one zone at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthSnapshot {
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Pull-zone id
    pub zone_id: i64,
    /// Pull-zone name
    pub zone_name: String,
    /// Bytes served over the snapshot window
    pub bandwidth: i64,
    /// Requests served over the snapshot window
    pub requests: i64,
    /// Cache hits over the snapshot window
    pub cache_hits: i64,
    /// Cache misses over the snapshot window
    pub cache_misses: i64,
}

/// Durable store of bandwidth snapshots with a rolling retention window
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    snapshots: RwLock<Vec<BandwidthSnapshot>>,
}

impl SnapshotStore {
    /// Open (or create) the snapshot store at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state(format!(
                        "failed to create snapshot directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let snapshots = match fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => {
                serde_json::from_str(&content).map_err(|e| {
                    Error::state(format!(
                        "failed to parse snapshot file {}: {e}",
                        path.display()
                    ))
                })?
            }
            Ok(_) => Vec::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(Error::state(format!(
                    "failed to read snapshot file {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(Self {
            path,
            snapshots: RwLock::new(snapshots),
        })
    }

    async fn save_locked(&self, snapshots: &[BandwidthSnapshot]) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshots)?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path).await.map_err(|e| {
                Error::state(format!(
                    "failed to create temp snapshot file {}: {e}",
                    tmp_path.display()
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state(format!(
                    "failed to write temp snapshot file {}: {e}",
                    tmp_path.display()
                ))
            })?;
            if let Err(e) = file.sync_all().await {
                warn!(error = %e, "fsync of snapshot file failed");
            }
        }

        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            Error::state(format!(
                "failed to rename {} to {}: {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })?;

        Ok(())
    }

    /// Append a snapshot, pruning entries older than the retention window
    pub async fn add(&self, snapshot: BandwidthSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.push(snapshot);

        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        snapshots.retain(|s| s.timestamp > cutoff);

        debug!(count = snapshots.len(), "saved bandwidth snapshot");
        self.save_locked(&snapshots).await
    }

    /// The most recent snapshot for a zone, if any
    pub async fn latest_by_zone(&self, zone_id: i64) -> Option<BandwidthSnapshot> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .iter()
            .filter(|s| s.zone_id == zone_id)
            .max_by_key(|s| s.timestamp)
            .cloned()
    }

    /// Snapshots for a zone taken after `since`
    pub async fn by_zone_since(
        &self,
        zone_id: i64,
        since: DateTime<Utc>,
    ) -> Vec<BandwidthSnapshot> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .iter()
            .filter(|s| s.zone_id == zone_id && s.timestamp > since)
            .cloned()
            .collect()
    }

    /// All snapshots taken after `since`
    pub async fn all_since(&self, since: DateTime<Utc>) -> Vec<BandwidthSnapshot> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .iter()
            .filter(|s| s.timestamp > since)
            .cloned()
            .collect()
    }

    /// Number of retained snapshots
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Whether the store holds no snapshots
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
