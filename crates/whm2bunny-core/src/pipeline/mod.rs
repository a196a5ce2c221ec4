//! Provisioning pipeline
//!
//! The [`Provisioner`] drives the multi-step orchestration against the
//! provider: DNS zone, seed records, CDN pull zone, CNAME sync. Progress is
//! checkpointed in the state store after every step so a crashed or killed
//! daemon resumes exactly where it stopped, and every step begins by probing
//! for an already-existing resource so replays converge instead of
//! duplicating ("adoption").
//!
//! ## Step machine
//!
//! `current_step` holds the highest step proven complete and only ever
//! advances by single increments:
//!
//! ```text
//! domain:     0 ── dns zone ──▶ 1 ── seed records ──▶ 2 ── pull zone ──▶ 3 ── cname sync ──▶ 4
//! subdomain:  0 ── parent zone ─▶ 1 ──── pull zone ───▶ 2 ── sub cname ──▶ 3 ── (success) ──▶ 4
//! ```
//!
//! One task owns one record end-to-end; the state store serializes the
//! writes underneath.

mod domain;
mod subdomain;
mod teardown;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use tracing::{error, info, warn};

use crate::config::ProvisionConfig;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::state::{
    step_name, ProvisionRecord, ProvisionStatus, StateStore, MAX_RECOVERY_RETRIES,
};
use crate::traits::{NewPullZone, ProviderApi, PullZone};

/// Prefix of every pull-zone name this daemon manages. Part of the external
/// interface: teardown-by-name relies on it.
pub const PULL_ZONE_PREFIX: &str = "morden-";

/// Suffix of provider-assigned CDN hostnames
const CDN_HOSTNAME_SUFFIX: &str = ".bunnycdn.com";

/// Seed-record TTL in seconds
const SEED_RECORD_TTL: i64 = 3600;

/// Edge cache TTL for new pull zones, in minutes
const PULL_ZONE_CACHE_TTL_MINUTES: i64 = 1440;

/// Delay between records during startup recovery, to avoid bursting the
/// provider on wake-up
const DEFAULT_RECOVERY_PACING: Duration = Duration::from_secs(3);

/// Derive the managed pull-zone name for a domain:
/// `example.com` → `morden-example-com`
pub fn pull_zone_name(domain: &str) -> String {
    format!("{PULL_ZONE_PREFIX}{}", domain.to_lowercase().replace('.', "-"))
}

/// Pick the canonical CDN hostname out of a pull zone: prefer an entry with
/// the provider suffix, else the first hostname, else fabricate one from the
/// zone id. The ordering is deliberate; keep it.
pub fn extract_cdn_hostname(zone: &PullZone) -> String {
    zone.hostnames
        .iter()
        .find(|h| h.contains(CDN_HOSTNAME_SUFFIX))
        .or_else(|| zone.hostnames.first())
        .cloned()
        .unwrap_or_else(|| format!("{}{CDN_HOSTNAME_SUFFIX}", zone.id))
}

/// Orchestrates provisioning, teardown and recovery for all work items
pub struct Provisioner {
    provider: Arc<dyn ProviderApi>,
    state: Arc<StateStore>,
    notifier: Arc<Notifier>,
    config: ProvisionConfig,
    recovery_pacing: Duration,
    // Domains with a pipeline task currently running. One task owns one
    // record end-to-end; a duplicate request while work is in flight is
    // suppressed here instead of racing the step machine.
    in_flight: Mutex<HashSet<String>>,
}

impl Provisioner {
    /// Create a provisioner over the given collaborators
    pub fn new(
        provider: Arc<dyn ProviderApi>,
        state: Arc<StateStore>,
        notifier: Arc<Notifier>,
        config: ProvisionConfig,
    ) -> Self {
        Self {
            provider,
            state,
            notifier,
            config,
            recovery_pacing: DEFAULT_RECOVERY_PACING,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Override the recovery pacing delay
    pub fn with_recovery_pacing(mut self, pacing: Duration) -> Self {
        self.recovery_pacing = pacing;
        self
    }

    /// Provision a domain: DNS zone, seed records, pull zone, CNAME sync.
    ///
    /// Idempotent: an already-successful domain returns immediately with no
    /// provider calls, and a partially-provisioned one resumes from its
    /// checkpointed step.
    pub async fn provision(&self, domain: &str, user: &str) -> Result<()> {
        if !self.begin_work(domain).await {
            info!(domain, "provisioning already in flight, skipping duplicate");
            return Ok(());
        }
        let result = self.provision_inner(domain, user).await;
        self.end_work(domain).await;
        result
    }

    async fn provision_inner(&self, domain: &str, user: &str) -> Result<()> {
        let started = Instant::now();
        info!(domain, user, "starting domain provisioning");

        let record = match self.claim_record(domain).await? {
            Some(record) => record,
            None => return Ok(()),
        };

        match self.run_domain_steps(&record.id, domain).await {
            Ok(()) => {
                self.state.mark_success(&record.id).await?;
                let done = self.state.get(&record.id).await?;
                self.notifier
                    .notify_success(domain, done.zone_id, &done.cdn_hostname, started.elapsed())
                    .await;
                info!(
                    domain,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "domain provisioning completed"
                );
                Ok(())
            }
            Err(err) => {
                self.fail_record(&record.id, domain, &err, None).await;
                Err(err)
            }
        }
    }

    /// Provision a subdomain under an existing parent domain.
    ///
    /// The parent's DNS zone must already exist at the provider; subdomains
    /// never create zones or seed apex records.
    pub async fn provision_subdomain(
        &self,
        subdomain: &str,
        parent_domain: &str,
        user: &str,
    ) -> Result<()> {
        let full_domain = format!("{subdomain}.{parent_domain}");
        if !self.begin_work(&full_domain).await {
            info!(domain = %full_domain, "provisioning already in flight, skipping duplicate");
            return Ok(());
        }
        let result = self
            .provision_subdomain_inner(subdomain, parent_domain, &full_domain, user)
            .await;
        self.end_work(&full_domain).await;
        result
    }

    async fn provision_subdomain_inner(
        &self,
        subdomain: &str,
        parent_domain: &str,
        full_domain: &str,
        user: &str,
    ) -> Result<()> {
        info!(
            subdomain,
            parent_domain,
            full_domain,
            user,
            "starting subdomain provisioning"
        );

        let record = match self.claim_record(&full_domain).await? {
            Some(record) => record,
            None => return Ok(()),
        };

        match self
            .run_subdomain_steps(&record.id, subdomain, parent_domain, &full_domain)
            .await
        {
            Ok(()) => {
                self.state.mark_success(&record.id).await?;
                let done = self.state.get(&record.id).await?;
                self.notifier
                    .notify_subdomain(&full_domain, parent_domain, &done.cdn_hostname)
                    .await;
                info!(full_domain, "subdomain provisioning completed");
                Ok(())
            }
            Err(err) => {
                self.fail_record(&record.id, &full_domain, &err, Some("subdomain_provisioning"))
                    .await;
                Err(err)
            }
        }
    }

    /// Re-enqueue unfinished work after a restart.
    ///
    /// Walks the recoverable records sequentially with a pacing delay,
    /// skipping anything that has exhausted its retry budget. Each record
    /// goes back through the ordinary provisioning flow, so recovery emits
    /// the same notifications a fresh run would.
    pub async fn recover(&self) {
        let records = self.state.recover().await;
        info!(count = records.len(), "starting recovery of unfinished provisions");

        for record in records {
            if record.retries >= MAX_RECOVERY_RETRIES {
                warn!(
                    domain = %record.domain,
                    retries = record.retries,
                    "skipping recovery, max retries exceeded"
                );
                continue;
            }

            info!(
                domain = %record.domain,
                status = %record.status,
                step = record.current_step,
                retries = record.retries,
                "recovering provision"
            );

            if let Err(err) = self.provision(&record.domain, "").await {
                error!(domain = %record.domain, error = %err, "recovery attempt failed");
            }

            tokio::time::sleep(self.recovery_pacing).await;
        }
    }

    /// Claim a domain for exclusive pipeline work; false when a task
    /// already owns it
    pub(crate) async fn begin_work(&self, domain: &str) -> bool {
        self.in_flight.lock().await.insert(domain.to_string())
    }

    /// Release a domain claimed by [`Self::begin_work`]
    pub(crate) async fn end_work(&self, domain: &str) {
        self.in_flight.lock().await.remove(domain);
    }

    /// Look up or create the record for a work item and mark it
    /// provisioning. Returns `None` when the domain is already successfully
    /// provisioned (the duplicate-webhook short-circuit).
    async fn claim_record(&self, domain: &str) -> Result<Option<ProvisionRecord>> {
        if let Some(existing) = self.state.get_by_domain(domain).await {
            if existing.status == ProvisionStatus::Success {
                info!(domain, id = %existing.id, "domain already provisioned, skipping");
                return Ok(None);
            }
            info!(
                domain,
                id = %existing.id,
                status = %existing.status,
                step = existing.current_step,
                "resuming provisioning from existing record"
            );
            self.state.mark_provisioning(&existing.id).await?;
            return Ok(Some(existing));
        }

        let record = match self.state.create(domain).await {
            Ok(record) => record,
            // Lost a create race with a duplicate webhook; adopt the winner.
            Err(create_err) => match self.state.get_by_domain(domain).await {
                Some(existing) => {
                    if existing.status == ProvisionStatus::Success {
                        return Ok(None);
                    }
                    existing
                }
                None => return Err(create_err),
            },
        };

        self.state.mark_provisioning(&record.id).await?;
        Ok(Some(record))
    }

    /// Record a terminal failure and emit the failure notification
    async fn fail_record(&self, id: &str, domain: &str, err: &Error, step_label: Option<&str>) {
        let attempted_step = match self.state.get(id).await {
            Ok(record) => record.current_step + 1,
            Err(_) => 0,
        };

        if let Err(state_err) = self.state.set_error(id, &err.to_string()).await {
            error!(domain, error = %state_err, "failed to persist error state");
        }

        let step = step_label
            .map(|s| s.to_string())
            .unwrap_or_else(|| step_name(attempted_step).to_string());
        self.notifier
            .notify_failed(domain, &step, &err.to_string())
            .await;

        error!(domain, step = %step, error = %err, "provisioning failed");
    }

    /// Find or create the managed pull zone `name` for `domain`, returning
    /// its id and canonical CDN hostname. The operator hostname attach is
    /// best-effort.
    pub(crate) async fn ensure_pull_zone(&self, name: &str, domain: &str) -> Result<(i64, String)> {
        if let Some(existing) = self.provider.pull_zone_by_name(name).await? {
            info!(name, pull_zone_id = existing.id, "adopting existing pull zone");
            return Ok((existing.id, extract_cdn_hostname(&existing)));
        }

        let options = self.pull_zone_options(name, domain);
        let created = self.provider.create_pull_zone(&options).await?;
        info!(name, pull_zone_id = created.id, "created pull zone");

        if let Err(err) = self.provider.add_hostname(created.id, domain).await {
            warn!(
                name,
                hostname = domain,
                error = %err,
                "failed to attach custom hostname to pull zone"
            );
        }

        Ok((created.id, extract_cdn_hostname(&created)))
    }

    fn pull_zone_options(&self, name: &str, domain: &str) -> NewPullZone {
        NewPullZone {
            name: name.to_string(),
            origin_url: format!("http://{}", self.config.origin_ip),
            origin_host_header: domain.to_string(),
            enable_geo_zone_asia: true,
            enable_geo_zone_eu: false,
            enable_geo_zone_na: false,
            enable_geo_zone_sa: false,
            enable_geo_zone_af: false,
            enable_origin_shield: true,
            origin_shield_zone_code: self.config.origin_shield_region.clone(),
            enable_auto_ssl: true,
            enable_brotli: true,
            cache_ttl_minutes: PULL_ZONE_CACHE_TTL_MINUTES,
        }
    }

    pub(crate) fn provider(&self) -> &Arc<dyn ProviderApi> {
        &self.provider
    }

    pub(crate) fn state(&self) -> &Arc<StateStore> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_zone_names_are_lowercased_and_dashed() {
        assert_eq!(pull_zone_name("example.com"), "morden-example-com");
        assert_eq!(pull_zone_name("Blog.Example.COM"), "morden-blog-example-com");
    }

    #[test]
    fn cdn_hostname_prefers_provider_suffix() {
        let zone = PullZone {
            id: 9,
            name: "morden-example-com".to_string(),
            origin_url: "http://203.0.113.9".to_string(),
            hostnames: vec![
                "example.com".to_string(),
                "morden-example-com.bunnycdn.com".to_string(),
            ],
        };
        assert_eq!(extract_cdn_hostname(&zone), "morden-example-com.bunnycdn.com");
    }

    #[test]
    fn cdn_hostname_falls_back_to_first_then_fabricates() {
        let mut zone = PullZone {
            id: 9,
            name: "morden-example-com".to_string(),
            origin_url: "http://203.0.113.9".to_string(),
            hostnames: vec!["example.com".to_string()],
        };
        assert_eq!(extract_cdn_hostname(&zone), "example.com");

        zone.hostnames.clear();
        assert_eq!(extract_cdn_hostname(&zone), "9.bunnycdn.com");
    }
}
