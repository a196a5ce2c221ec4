//! Subdomain provisioning steps
//!
//! Subdomains ride on the parent's DNS zone: no new zone, no apex seed
//! records, no `cdn` record. The parent zone must already exist at the
//! provider or the operation fails terminally.

use tracing::info;

use super::{pull_zone_name, Provisioner};
use crate::error::{Error, Result};

impl Provisioner {
    /// Run the subdomain step machine from the record's checkpoint
    pub(super) async fn run_subdomain_steps(
        &self,
        id: &str,
        subdomain: &str,
        parent_domain: &str,
        full_domain: &str,
    ) -> Result<()> {
        loop {
            let record = self.state().get(id).await?;
            match record.current_step {
                0 => self.step_resolve_parent_zone(id, parent_domain).await?,
                1 => self.step_subdomain_pull_zone(id, full_domain).await?,
                2 => self.step_subdomain_cname(id, subdomain).await?,
                _ => return Ok(()),
            }
        }
    }

    /// Step 1: resolve the parent's zone; absence is terminal
    async fn step_resolve_parent_zone(&self, id: &str, parent_domain: &str) -> Result<()> {
        let zone = self
            .provider()
            .zone_by_domain(parent_domain)
            .await?
            .ok_or_else(|| Error::ParentZoneNotFound(parent_domain.to_string()))?;

        info!(parent_domain, zone_id = zone.id, "resolved parent DNS zone");

        let mut record = self.state().get(id).await?;
        record.zone_id = zone.id;
        self.state().update(record).await?;
        self.state().increment_step(id).await
    }

    /// Step 2: create (or adopt) the subdomain's pull zone
    async fn step_subdomain_pull_zone(&self, id: &str, full_domain: &str) -> Result<()> {
        let name = pull_zone_name(full_domain);
        let (pull_zone_id, cdn_hostname) = self.ensure_pull_zone(&name, full_domain).await?;

        let mut record = self.state().get(id).await?;
        record.pull_zone_id = pull_zone_id;
        record.cdn_hostname = cdn_hostname;
        self.state().update(record).await?;
        self.state().increment_step(id).await
    }

    /// Step 3: point `sub` at the pull zone inside the parent zone
    async fn step_subdomain_cname(&self, id: &str, subdomain: &str) -> Result<()> {
        let record = self.state().get(id).await?;
        self.upsert_cname(record.zone_id, subdomain, &record.cdn_hostname)
            .await?;
        self.state().increment_step(id).await
    }
}
