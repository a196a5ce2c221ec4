//! Domain provisioning steps
//!
//! The four idempotent steps for a full domain. Each step probes for an
//! existing resource first and adopts it, persists what it learned, then
//! advances the checkpoint by one.

use tracing::{info, warn};

use super::{pull_zone_name, Provisioner, SEED_RECORD_TTL};
use crate::error::Result;
use crate::state::{STEP_DNS_RECORDS, STEP_DNS_ZONE, STEP_NONE, STEP_PULL_ZONE};
use crate::traits::{DnsRecord, NewDnsRecord, RecordKind};
use crate::validator::{validate_mx_record, validate_txt_record};

impl Provisioner {
    /// Run the domain step machine from the record's checkpoint to the end
    pub(super) async fn run_domain_steps(&self, id: &str, domain: &str) -> Result<()> {
        loop {
            let record = self.state().get(id).await?;
            match record.current_step {
                STEP_NONE => self.step_create_zone(id, domain).await?,
                STEP_DNS_ZONE => self.step_seed_records(id, domain).await?,
                STEP_DNS_RECORDS => self.step_create_pull_zone(id, domain).await?,
                STEP_PULL_ZONE => self.step_sync_cname(id).await?,
                _ => return Ok(()),
            }
        }
    }

    /// Step 1: create (or adopt) the DNS zone
    async fn step_create_zone(&self, id: &str, domain: &str) -> Result<()> {
        let zone = match self.provider().zone_by_domain(domain).await? {
            Some(zone) => {
                info!(domain, zone_id = zone.id, "adopting existing DNS zone");
                zone
            }
            None => {
                let zone = self
                    .provider()
                    .create_zone(domain, &self.config.soa_email)
                    .await?;
                info!(domain, zone_id = zone.id, "created DNS zone");
                zone
            }
        };

        let mut record = self.state().get(id).await?;
        record.zone_id = zone.id;
        self.state().update(record).await?;
        self.state().increment_step(id).await
    }

    /// Step 2: seed the canonical record set.
    ///
    /// Existing records are fetched best-effort; each seed is added only if
    /// no record of the same (name, kind) is already present. The DMARC
    /// record alone may fail without failing the step.
    async fn step_seed_records(&self, id: &str, domain: &str) -> Result<()> {
        let record = self.state().get(id).await?;
        let zone_id = record.zone_id;

        let existing = match self.provider().list_records(zone_id).await {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    domain,
                    zone_id,
                    error = %err,
                    "could not list existing records, assuming empty zone"
                );
                Vec::new()
            }
        };

        let mx_target = format!("mail.{domain}.");
        validate_mx_record(&mx_target)?;
        let spf_value = "v=spf1 a mx -all";
        validate_txt_record(spf_value)?;

        let seeds = [
            NewDnsRecord::new(
                RecordKind::A,
                "@",
                self.config.origin_ip.clone(),
                SEED_RECORD_TTL,
            ),
            NewDnsRecord::new(RecordKind::Cname, "www", format!("{domain}."), SEED_RECORD_TTL),
            NewDnsRecord::new(RecordKind::Mx, "@", mx_target, SEED_RECORD_TTL).with_priority(10),
            NewDnsRecord::new(RecordKind::Txt, "@", spf_value, SEED_RECORD_TTL),
        ];

        for seed in &seeds {
            if has_record(&existing, &seed.name, seed.kind) {
                info!(domain, name = %seed.name, kind = seed.kind.code(), "seed record already present");
                continue;
            }
            self.provider().add_record(zone_id, seed).await?;
        }

        // DMARC is best-effort throughout: an invalid value or a failed add
        // is logged and skipped, never fails the step.
        let dmarc_value = format!("v=DMARC1; p=none; rua=mailto:dmarc@{domain}");
        if let Err(err) = validate_txt_record(&dmarc_value) {
            warn!(domain, error = %err, "skipping invalid DMARC record value");
        } else {
            let dmarc =
                NewDnsRecord::new(RecordKind::Txt, "_dmarc", dmarc_value, SEED_RECORD_TTL);
            if !has_record(&existing, &dmarc.name, dmarc.kind) {
                if let Err(err) = self.provider().add_record(zone_id, &dmarc).await {
                    warn!(domain, error = %err, "failed to add DMARC record");
                }
            }
        }

        self.state().increment_step(id).await
    }

    /// Step 3: create (or adopt) the CDN pull zone
    async fn step_create_pull_zone(&self, id: &str, domain: &str) -> Result<()> {
        let name = pull_zone_name(domain);
        let (pull_zone_id, cdn_hostname) = self.ensure_pull_zone(&name, domain).await?;

        let mut record = self.state().get(id).await?;
        record.pull_zone_id = pull_zone_id;
        record.cdn_hostname = cdn_hostname;
        self.state().update(record).await?;
        self.state().increment_step(id).await
    }

    /// Step 4: point a `cdn` CNAME at the pull zone's hostname
    async fn step_sync_cname(&self, id: &str) -> Result<()> {
        let record = self.state().get(id).await?;
        self.upsert_cname(record.zone_id, "cdn", &record.cdn_hostname)
            .await?;
        self.state().increment_step(id).await
    }

    /// Insert or correct a CNAME in a zone; a matching record is left alone
    pub(super) async fn upsert_cname(&self, zone_id: i64, name: &str, value: &str) -> Result<()> {
        let records = self.provider().list_records(zone_id).await?;
        let desired = NewDnsRecord::new(RecordKind::Cname, name, value, SEED_RECORD_TTL);

        match records
            .iter()
            .find(|r| r.kind == RecordKind::Cname && r.name == name)
        {
            Some(existing) if existing.value == value => {
                info!(zone_id, name, "CNAME already up to date");
                Ok(())
            }
            Some(existing) => {
                info!(zone_id, name, value, "updating CNAME");
                self.provider()
                    .update_record(zone_id, existing.id, &desired)
                    .await
            }
            None => {
                info!(zone_id, name, value, "adding CNAME");
                self.provider().add_record(zone_id, &desired).await?;
                Ok(())
            }
        }
    }
}

fn has_record(existing: &[DnsRecord], name: &str, kind: RecordKind) -> bool {
    existing.iter().any(|r| r.kind == kind && r.name == name)
}
