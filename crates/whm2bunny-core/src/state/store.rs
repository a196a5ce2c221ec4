//! File-backed provisioning record store
//!
//! In-memory map plus a flat JSON file holding an array of records with a
//! domain index rebuilt on load. Every mutation serializes the full record
//! set and atomically replaces the file before returning, holding the write
//! lock across serialize and rename so mutators are serialized at the store
//! boundary. Readers always get copies; no caller can alias internal state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ProvisionRecord, ProvisionStatus, STEP_CNAME_SYNC};
use crate::error::{Error, Result};

/// Recovery gives up on a record after this many failure transitions
pub const MAX_RECOVERY_RETRIES: u32 = 5;

/// Durable map from domain to provisioning record
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    records: HashMap<String, ProvisionRecord>,
    domain_index: HashMap<String, String>,
}

impl StateStore {
    /// Open (or create) the store at `path`.
    ///
    /// Creates the parent directory if needed; an absent file is an empty
    /// store. Corrupt JSON is an error: the operator must intervene rather
    /// than have the daemon silently forget in-flight work.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state(format!(
                        "failed to create state directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let mut inner = StoreInner::default();
        match fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => {
                let records: Vec<ProvisionRecord> = serde_json::from_str(&content)
                    .map_err(|e| {
                        Error::state(format!(
                            "failed to parse state file {}: {e}",
                            path.display()
                        ))
                    })?;
                for record in records {
                    inner.domain_index.insert(record.domain.clone(), record.id.clone());
                    inner.records.insert(record.id.clone(), record);
                }
                info!(
                    count = inner.records.len(),
                    path = %path.display(),
                    "loaded provisioning state"
                );
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "state file does not exist, starting empty");
            }
            Err(e) => {
                return Err(Error::state(format!(
                    "failed to read state file {}: {e}",
                    path.display()
                )));
            }
        }

        Ok(Self {
            path,
            inner: RwLock::new(inner),
        })
    }

    /// Serialize and atomically replace the state file. Callers must hold
    /// the write lock for the whole call.
    async fn save_locked(&self, inner: &StoreInner) -> Result<()> {
        let mut records: Vec<&ProvisionRecord> = inner.records.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let json = serde_json::to_string_pretty(&records)?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path).await.map_err(|e| {
                Error::state(format!(
                    "failed to create temp state file {}: {e}",
                    tmp_path.display()
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state(format!(
                    "failed to write temp state file {}: {e}",
                    tmp_path.display()
                ))
            })?;
            if let Err(e) = file.sync_all().await {
                warn!(error = %e, "fsync of state file failed");
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

    /// Run a mutation under the write lock and persist before returning
    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut StoreInner) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.inner.write().await;
        let result = f(&mut inner)?;
        self.save_locked(&inner).await?;
        Ok(result)
    }

    /// Create a pending record for `domain`.
    ///
    /// At most one record may exist per domain; a second create for the
    /// same domain fails so concurrent duplicate webhooks collapse onto the
    /// record that won.
    pub async fn create(&self, domain: &str) -> Result<ProvisionRecord> {
        self.mutate(|inner| {
            if inner.domain_index.contains_key(domain) {
                return Err(Error::state(format!(
                    "a record already exists for domain {domain}"
                )));
            }
            let record = ProvisionRecord::new(domain);
            inner
                .domain_index
                .insert(record.domain.clone(), record.id.clone());
            inner.records.insert(record.id.clone(), record.clone());
            info!(id = %record.id, domain = %domain, "created provisioning record");
            Ok(record)
        })
        .await
    }

    /// Fetch a record by id
    pub async fn get(&self, id: &str) -> Result<ProvisionRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no provisioning record with id {id}")))
    }

    /// Fetch a record by domain
    pub async fn get_by_domain(&self, domain: &str) -> Option<ProvisionRecord> {
        let inner = self.inner.read().await;
        let id = inner.domain_index.get(domain)?;
        inner.records.get(id).cloned()
    }

    /// Replace a record's mutable fields. `created_at` is preserved and
    /// `updated_at` is stamped here.
    pub async fn update(&self, mut record: ProvisionRecord) -> Result<()> {
        self.mutate(|inner| {
            let existing = inner
                .records
                .get(&record.id)
                .ok_or_else(|| Error::not_found(format!("no provisioning record with id {}", record.id)))?;
            record.created_at = existing.created_at;
            record.updated_at = Utc::now();
            inner
                .domain_index
                .insert(record.domain.clone(), record.id.clone());
            debug!(id = %record.id, status = %record.status, step = record.current_step, "updated provisioning record");
            inner.records.insert(record.id.clone(), record);
            Ok(())
        })
        .await
    }

    /// Delete a record by id
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.mutate(|inner| {
            let record = inner
                .records
                .remove(id)
                .ok_or_else(|| Error::not_found(format!("no provisioning record with id {id}")))?;
            inner.domain_index.remove(&record.domain);
            info!(id = %id, domain = %record.domain, "deleted provisioning record");
            Ok(())
        })
        .await
    }

    /// Records that are pending or mid-provisioning
    pub async fn list_pending(&self) -> Vec<ProvisionRecord> {
        self.filter(|r| {
            matches!(
                r.status,
                ProvisionStatus::Pending | ProvisionStatus::Provisioning
            )
        })
        .await
    }

    /// Records whose last attempt failed
    pub async fn list_failed(&self) -> Vec<ProvisionRecord> {
        self.filter(|r| r.status == ProvisionStatus::Failed).await
    }

    /// All records
    pub async fn list_all(&self) -> Vec<ProvisionRecord> {
        self.filter(|_| true).await
    }

    /// Records the recovery driver should re-enqueue: pending ones, plus
    /// failed ones that still have retry budget
    pub async fn recover(&self) -> Vec<ProvisionRecord> {
        self.filter(|r| {
            r.status == ProvisionStatus::Pending
                || (r.status == ProvisionStatus::Failed && r.retries < MAX_RECOVERY_RETRIES)
        })
        .await
    }

    async fn filter(&self, pred: impl Fn(&ProvisionRecord) -> bool) -> Vec<ProvisionRecord> {
        let inner = self.inner.read().await;
        let mut result: Vec<ProvisionRecord> =
            inner.records.values().filter(|r| pred(r)).cloned().collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        result
    }

    /// Mark a record as actively provisioning
    pub async fn mark_provisioning(&self, id: &str) -> Result<()> {
        self.touch(id, |record| {
            record.status = ProvisionStatus::Provisioning;
        })
        .await
    }

    /// Mark a record as fully provisioned: terminal step, error cleared
    pub async fn mark_success(&self, id: &str) -> Result<()> {
        self.touch(id, |record| {
            record.status = ProvisionStatus::Success;
            record.current_step = STEP_CNAME_SYNC;
            record.error.clear();
        })
        .await
    }

    /// Reset a failed record to pending so it can be re-enqueued
    pub async fn mark_pending(&self, id: &str) -> Result<()> {
        self.touch(id, |record| {
            record.status = ProvisionStatus::Pending;
            record.error.clear();
        })
        .await
    }

    /// Record a failure: sets failed status, stores the message and counts
    /// the retry transition
    pub async fn set_error(&self, id: &str, message: &str) -> Result<()> {
        self.touch(id, |record| {
            record.status = ProvisionStatus::Failed;
            record.error = message.to_string();
            record.retries += 1;
            warn!(
                id = %record.id,
                domain = %record.domain,
                retries = record.retries,
                error = %message,
                "provisioning record marked failed"
            );
        })
        .await
    }

    /// Advance the record's step counter by exactly one
    pub async fn increment_step(&self, id: &str) -> Result<()> {
        self.touch(id, |record| {
            record.current_step += 1;
        })
        .await
    }

    async fn touch(&self, id: &str, f: impl FnOnce(&mut ProvisionRecord)) -> Result<()> {
        self.mutate(|inner| {
            let record = inner
                .records
                .get_mut(id)
                .ok_or_else(|| Error::not_found(format!("no provisioning record with id {id}")))?;
            f(record);
            record.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    /// Remove every record
    pub async fn clear(&self) -> Result<()> {
        self.mutate(|inner| {
            inner.records.clear();
            inner.domain_index.clear();
            info!("cleared all provisioning records");
            Ok(())
        })
        .await
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Force a write of the current state to disk
    pub async fn sync(&self) -> Result<()> {
        let inner = self.inner.write().await;
        self.save_locked(&inner).await
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_get_and_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = StateStore::open(&path).await.unwrap();
        let record = store.create("example.com").await.unwrap();
        assert_eq!(record.status, ProvisionStatus::Pending);
        assert_eq!(record.current_step, 0);
        assert!(path.exists());

        let by_id = store.get(&record.id).await.unwrap();
        assert_eq!(by_id.domain, "example.com");

        // Reopen and verify persistence plus index rebuild.
        let store2 = StateStore::open(&path).await.unwrap();
        let by_domain = store2.get_by_domain("example.com").await.unwrap();
        assert_eq!(by_domain.id, record.id);
    }

    #[tokio::test]
    async fn duplicate_domain_is_rejected() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await.unwrap();

        store.create("example.com").await.unwrap();
        assert!(store.create("example.com").await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_preserves_created_at() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await.unwrap();

        let mut record = store.create("example.com").await.unwrap();
        let created_at = record.created_at;

        record.zone_id = 42;
        record.created_at = Utc::now() + chrono::Duration::hours(1);
        store.update(record.clone()).await.unwrap();

        let fetched = store.get(&record.id).await.unwrap();
        assert_eq!(fetched.zone_id, 42);
        assert_eq!(fetched.created_at, created_at);
        assert!(fetched.updated_at >= created_at);
    }

    #[tokio::test]
    async fn status_transitions() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await.unwrap();
        let record = store.create("example.com").await.unwrap();

        store.mark_provisioning(&record.id).await.unwrap();
        assert_eq!(
            store.get(&record.id).await.unwrap().status,
            ProvisionStatus::Provisioning
        );

        store.set_error(&record.id, "zone creation failed").await.unwrap();
        let failed = store.get(&record.id).await.unwrap();
        assert_eq!(failed.status, ProvisionStatus::Failed);
        assert_eq!(failed.retries, 1);
        assert_eq!(failed.error, "zone creation failed");

        store.mark_success(&record.id).await.unwrap();
        let done = store.get(&record.id).await.unwrap();
        assert_eq!(done.status, ProvisionStatus::Success);
        assert_eq!(done.current_step, STEP_CNAME_SYNC);
        assert!(done.error.is_empty());
    }

    #[tokio::test]
    async fn increment_step_is_single_step() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await.unwrap();
        let record = store.create("example.com").await.unwrap();

        for expected in 1..=4 {
            store.increment_step(&record.id).await.unwrap();
            assert_eq!(store.get(&record.id).await.unwrap().current_step, expected);
        }
    }

    #[tokio::test]
    async fn recover_respects_retry_budget() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await.unwrap();

        let pending = store.create("pending.example").await.unwrap();
        let failing = store.create("failing.example").await.unwrap();
        let exhausted = store.create("exhausted.example").await.unwrap();
        let done = store.create("done.example").await.unwrap();

        store.set_error(&failing.id, "boom").await.unwrap();
        for _ in 0..MAX_RECOVERY_RETRIES {
            store.set_error(&exhausted.id, "boom").await.unwrap();
        }
        store.mark_success(&done.id).await.unwrap();

        let recoverable = store.recover().await;
        let domains: Vec<&str> = recoverable.iter().map(|r| r.domain.as_str()).collect();
        assert!(domains.contains(&"pending.example"));
        assert!(domains.contains(&"failing.example"));
        assert!(!domains.contains(&"exhausted.example"));
        assert!(!domains.contains(&"done.example"));

        assert_eq!(store.list_pending().await.len(), 1);
        assert_eq!(store.list_failed().await.len(), 2);
        assert_eq!(store.list_all().await.len(), 4);

        let _ = pending;
    }

    #[tokio::test]
    async fn delete_removes_domain_index() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await.unwrap();
        let record = store.create("example.com").await.unwrap();

        store.delete(&record.id).await.unwrap();
        assert!(store.get_by_domain("example.com").await.is_none());

        // The domain is free again.
        assert!(store.create("example.com").await.is_ok());
    }

    #[tokio::test]
    async fn corrupt_state_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"not json at all").await.unwrap();

        assert!(StateStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn no_tmp_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::open(&path).await.unwrap();
        store.create("example.com").await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
