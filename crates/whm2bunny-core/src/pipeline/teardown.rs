//! Teardown
//!
//! Deletes a domain's DNS zone and pull zone, then its state record.
//! Idempotent: already-absent resources count as deleted, and a failure on
//! one resource never stops the attempt on the other.

use tracing::{info, warn};

use super::{pull_zone_name, Provisioner};
use crate::error::{Error, Result};

impl Provisioner {
    /// Tear down a domain's provider resources and forget its record.
    ///
    /// With a state record, the recorded ids drive the deletions. Without
    /// one, deprovisioning is best-effort by name: look up the zone by
    /// domain and the pull zone by its managed name, deleting whatever is
    /// found.
    pub async fn deprovision(&self, domain: &str) -> Result<()> {
        if !self.begin_work(domain).await {
            info!(domain, "work already in flight for domain, skipping teardown");
            return Ok(());
        }
        let result = self.deprovision_inner(domain).await;
        self.end_work(domain).await;
        result
    }

    async fn deprovision_inner(&self, domain: &str) -> Result<()> {
        info!(domain, "starting domain deprovisioning");

        let mut first_err: Option<Error> = None;

        match self.state().get_by_domain(domain).await {
            Some(record) => {
                if record.zone_id != 0 {
                    if let Err(err) = self.delete_zone_if_present(record.zone_id).await {
                        warn!(domain, zone_id = record.zone_id, error = %err, "failed to delete DNS zone");
                        first_err.get_or_insert(err);
                    }
                }
                if record.pull_zone_id != 0 {
                    if let Err(err) = self.delete_pull_zone_if_present(record.pull_zone_id).await {
                        warn!(domain, pull_zone_id = record.pull_zone_id, error = %err, "failed to delete pull zone");
                        first_err.get_or_insert(err);
                    }
                }

                if let Some(err) = first_err {
                    return Err(err);
                }

                self.state().delete(&record.id).await?;
            }
            None => {
                info!(domain, "no state record, deprovisioning by name");

                match self.provider().zone_by_domain(domain).await {
                    Ok(Some(zone)) => {
                        if let Err(err) = self.delete_zone_if_present(zone.id).await {
                            warn!(domain, zone_id = zone.id, error = %err, "failed to delete DNS zone");
                            first_err.get_or_insert(err);
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(domain, error = %err, "DNS zone lookup failed during teardown");
                        first_err.get_or_insert(err);
                    }
                }

                let name = pull_zone_name(domain);
                match self.provider().pull_zone_by_name(&name).await {
                    Ok(Some(zone)) => {
                        if let Err(err) = self.delete_pull_zone_if_present(zone.id).await {
                            warn!(domain, pull_zone_id = zone.id, error = %err, "failed to delete pull zone");
                            first_err.get_or_insert(err);
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(domain, error = %err, "pull zone lookup failed during teardown");
                        first_err.get_or_insert(err);
                    }
                }

                if let Some(err) = first_err {
                    return Err(err);
                }
            }
        }

        self.notifier.notify_deprovisioned(domain).await;
        info!(domain, "domain deprovisioning completed");
        Ok(())
    }

    async fn delete_zone_if_present(&self, zone_id: i64) -> Result<()> {
        match self.provider().delete_zone(zone_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn delete_pull_zone_if_present(&self, pull_zone_id: i64) -> Result<()> {
        match self.provider().delete_pull_zone(pull_zone_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }
}
