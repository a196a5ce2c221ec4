//! Test doubles and common utilities for pipeline contract tests
//!
//! The mock provider is an in-memory Bunny: zones, records and pull zones
//! live in maps, every mutating operation counts its calls, and named
//! operations can be made to fail with a chosen status for failure-path
//! tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use whm2bunny_core::config::ProvisionConfig;
use whm2bunny_core::error::{Error, Result};
use whm2bunny_core::traits::{
    Certificate, ChatTransport, DnsRecord, NewDnsRecord, NewPullZone, ProviderApi, PullZone,
    RecordKind, TrafficStats, Zone,
};
use whm2bunny_core::{Notifier, Provisioner, StateStore};

pub const ORIGIN_IP: &str = "203.0.113.9";

#[derive(Default)]
struct ProviderState {
    zones: HashMap<i64, Zone>,
    records: HashMap<i64, Vec<DnsRecord>>,
    pull_zones: HashMap<i64, PullZone>,
}

/// In-memory provider double with call counters and failure injection
pub struct MockProvider {
    state: Mutex<ProviderState>,
    next_id: AtomicI64,
    failures: Mutex<HashMap<String, (u16, String)>>,
    pub create_zone_calls: AtomicUsize,
    pub create_pull_zone_calls: AtomicUsize,
    pub add_record_calls: AtomicUsize,
    pub last_pull_zone_options: Mutex<Option<NewPullZone>>,
    pub stats: Mutex<HashMap<i64, TrafficStats>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ProviderState::default()),
            next_id: AtomicI64::new(1),
            failures: Mutex::new(HashMap::new()),
            create_zone_calls: AtomicUsize::new(0),
            create_pull_zone_calls: AtomicUsize::new(0),
            add_record_calls: AtomicUsize::new(0),
            last_pull_zone_options: Mutex::new(None),
            stats: Mutex::new(HashMap::new()),
        })
    }

    fn id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Make `op` fail with the given status until cleared
    pub fn set_failure(&self, op: &str, status: u16, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(op.to_string(), (status, message.to_string()));
    }

    /// Clear an injected failure
    pub fn clear_failure(&self, op: &str) {
        self.failures.lock().unwrap().remove(op);
    }

    fn maybe_fail(&self, op: &str) -> Result<()> {
        if let Some((status, message)) = self.failures.lock().unwrap().get(op) {
            return Err(Error::api(*status, message.clone()));
        }
        Ok(())
    }

    /// Seed a zone directly, bypassing the pipeline (pre-existing state at
    /// the provider)
    pub fn insert_zone(&self, domain: &str) -> i64 {
        let id = self.id();
        let mut state = self.state.lock().unwrap();
        state.zones.insert(
            id,
            Zone {
                id,
                domain: domain.to_string(),
            },
        );
        state.records.insert(id, Vec::new());
        id
    }

    /// Seed a pull zone directly
    pub fn insert_pull_zone(&self, name: &str) -> i64 {
        let id = self.id();
        let mut state = self.state.lock().unwrap();
        state.pull_zones.insert(
            id,
            PullZone {
                id,
                name: name.to_string(),
                origin_url: format!("http://{ORIGIN_IP}"),
                hostnames: vec![format!("{name}.bunnycdn.com")],
            },
        );
        id
    }

    pub fn zone_count(&self) -> usize {
        self.state.lock().unwrap().zones.len()
    }

    pub fn pull_zone_count(&self) -> usize {
        self.state.lock().unwrap().pull_zones.len()
    }

    /// All records currently in the zone for `domain`
    pub fn records_for(&self, domain: &str) -> Vec<DnsRecord> {
        let state = self.state.lock().unwrap();
        let zone = state
            .zones
            .values()
            .find(|z| z.domain.eq_ignore_ascii_case(domain));
        match zone {
            Some(zone) => state.records.get(&zone.id).cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Find one record by name and kind in a domain's zone
    pub fn record(&self, domain: &str, name: &str, kind: RecordKind) -> Option<DnsRecord> {
        self.records_for(domain)
            .into_iter()
            .find(|r| r.kind == kind && r.name == name)
    }
}

#[async_trait]
impl ProviderApi for MockProvider {
    async fn create_zone(&self, domain: &str, _soa_email: &str) -> Result<Zone> {
        self.maybe_fail("create_zone")?;
        self.create_zone_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.insert_zone(domain);
        Ok(Zone {
            id,
            domain: domain.to_string(),
        })
    }

    async fn zone_by_domain(&self, domain: &str) -> Result<Option<Zone>> {
        self.maybe_fail("zone_by_domain")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .zones
            .values()
            .find(|z| z.domain.eq_ignore_ascii_case(domain))
            .cloned())
    }

    async fn zone_by_id(&self, id: i64) -> Result<Zone> {
        self.state
            .lock()
            .unwrap()
            .zones
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::api(404, "zone not found"))
    }

    async fn delete_zone(&self, id: i64) -> Result<()> {
        self.maybe_fail("delete_zone")?;
        let mut state = self.state.lock().unwrap();
        if state.zones.remove(&id).is_none() {
            return Err(Error::api(404, "zone not found"));
        }
        state.records.remove(&id);
        Ok(())
    }

    async fn list_records(&self, zone_id: i64) -> Result<Vec<DnsRecord>> {
        self.maybe_fail("list_records")?;
        self.state
            .lock()
            .unwrap()
            .records
            .get(&zone_id)
            .cloned()
            .ok_or_else(|| Error::api(404, "zone not found"))
    }

    async fn add_record(&self, zone_id: i64, record: &NewDnsRecord) -> Result<DnsRecord> {
        self.maybe_fail("add_record")?;
        self.add_record_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.id();
        let created = DnsRecord {
            id,
            kind: record.kind,
            name: record.name.clone(),
            value: record.value.clone(),
            ttl: record.ttl,
            priority: record.priority,
        };
        self.state
            .lock()
            .unwrap()
            .records
            .get_mut(&zone_id)
            .ok_or_else(|| Error::api(404, "zone not found"))?
            .push(created.clone());
        Ok(created)
    }

    async fn update_record(
        &self,
        zone_id: i64,
        record_id: i64,
        record: &NewDnsRecord,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let records = state
            .records
            .get_mut(&zone_id)
            .ok_or_else(|| Error::api(404, "zone not found"))?;
        let existing = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| Error::api(404, "record not found"))?;
        existing.kind = record.kind;
        existing.name = record.name.clone();
        existing.value = record.value.clone();
        existing.ttl = record.ttl;
        existing.priority = record.priority;
        Ok(())
    }

    async fn delete_record(&self, zone_id: i64, record_id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let records = state
            .records
            .get_mut(&zone_id)
            .ok_or_else(|| Error::api(404, "zone not found"))?;
        records.retain(|r| r.id != record_id);
        Ok(())
    }

    async fn create_pull_zone(&self, options: &NewPullZone) -> Result<PullZone> {
        self.maybe_fail("create_pull_zone")?;
        self.create_pull_zone_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_pull_zone_options.lock().unwrap() = Some(options.clone());

        let id = self.id();
        let zone = PullZone {
            id,
            name: options.name.clone(),
            origin_url: options.origin_url.clone(),
            hostnames: vec![format!("{}.bunnycdn.com", options.name)],
        };
        self.state
            .lock()
            .unwrap()
            .pull_zones
            .insert(id, zone.clone());
        Ok(zone)
    }

    async fn pull_zone_by_name(&self, name: &str) -> Result<Option<PullZone>> {
        self.maybe_fail("pull_zone_by_name")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .pull_zones
            .values()
            .find(|z| z.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn pull_zone_by_id(&self, id: i64) -> Result<PullZone> {
        self.state
            .lock()
            .unwrap()
            .pull_zones
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::api(404, "pull zone not found"))
    }

    async fn list_pull_zones(&self) -> Result<Vec<PullZone>> {
        self.maybe_fail("list_pull_zones")?;
        let mut zones: Vec<PullZone> = self
            .state
            .lock()
            .unwrap()
            .pull_zones
            .values()
            .cloned()
            .collect();
        zones.sort_by_key(|z| z.id);
        Ok(zones)
    }

    async fn delete_pull_zone(&self, id: i64) -> Result<()> {
        self.maybe_fail("delete_pull_zone")?;
        if self.state.lock().unwrap().pull_zones.remove(&id).is_none() {
            return Err(Error::api(404, "pull zone not found"));
        }
        Ok(())
    }

    async fn add_hostname(&self, id: i64, hostname: &str) -> Result<()> {
        self.maybe_fail("add_hostname")?;
        self.state
            .lock()
            .unwrap()
            .pull_zones
            .get_mut(&id)
            .ok_or_else(|| Error::api(404, "pull zone not found"))?
            .hostnames
            .push(hostname.to_string());
        Ok(())
    }

    async fn purge_cache(&self, _id: i64) -> Result<()> {
        Ok(())
    }

    async fn certificate(&self, id: i64) -> Result<Certificate> {
        let zone = self.pull_zone_by_id(id).await?;
        Ok(Certificate {
            hostname: zone.hostnames.first().cloned().unwrap_or_default(),
            issued: true,
        })
    }

    async fn pull_zone_stats(
        &self,
        id: i64,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<TrafficStats> {
        self.maybe_fail("pull_zone_stats")?;
        Ok(self.stats.lock().unwrap().get(&id).cloned().unwrap_or_default())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Chat transport double that records every message
pub struct RecordingTransport {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "recording"
    }
}

pub fn test_config() -> ProvisionConfig {
    ProvisionConfig {
        origin_ip: ORIGIN_IP.to_string(),
        soa_email: "hostmaster@example.com".to_string(),
        origin_shield_region: "SG".to_string(),
    }
}

/// A provisioner over a fresh temp-file state store, the mock provider and
/// a recording notifier
pub async fn test_provisioner(
    dir: &tempfile::TempDir,
    provider: Arc<MockProvider>,
    transport: Arc<RecordingTransport>,
) -> (Provisioner, Arc<StateStore>) {
    let state = Arc::new(
        StateStore::open(dir.path().join("state.json"))
            .await
            .expect("state store opens"),
    );
    let transport: Arc<dyn ChatTransport> = transport;
    let notifier = Arc::new(Notifier::new(
        Some(transport),
        Vec::new(),
        "test-host",
        chrono_tz::UTC,
    ));
    let provider: Arc<dyn ProviderApi> = provider;
    let provisioner = Provisioner::new(provider, Arc::clone(&state), notifier, test_config())
        .with_recovery_pacing(Duration::from_millis(1));
    (provisioner, state)
}
