//! Pull zone, hostname and certificate operations
//!
//! The geo-region flag names (`EnableGeoZoneASIA`, ...) are part of the
//! provider contract and must be sent exactly as written here.

use serde::{Deserialize, Serialize};

use whm2bunny_core::error::{Error, Result};
use whm2bunny_core::traits::{Certificate, NewPullZone, PullZone};

use crate::BunnyClient;

/// Suffix of provider-assigned CDN hostnames
const CDN_HOSTNAME_SUFFIX: &str = ".bunnycdn.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PullZoneWire {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub origin_url: String,
    #[serde(default)]
    pub hostnames: Vec<HostnameWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct HostnameWire {
    pub value: String,
    #[serde(default)]
    pub has_certificate: bool,
}

impl From<PullZoneWire> for PullZone {
    fn from(wire: PullZoneWire) -> Self {
        PullZone {
            id: wire.id,
            name: wire.name,
            origin_url: wire.origin_url,
            hostnames: wire.hostnames.into_iter().map(|h| h.value).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NewPullZoneWire<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "OriginUrl")]
    origin_url: &'a str,
    #[serde(rename = "OriginHostHeader")]
    origin_host_header: &'a str,
    #[serde(rename = "EnableGeoZoneASIA")]
    enable_geo_zone_asia: bool,
    #[serde(rename = "EnableGeoZoneEU")]
    enable_geo_zone_eu: bool,
    #[serde(rename = "EnableGeoZoneUS")]
    enable_geo_zone_na: bool,
    #[serde(rename = "EnableGeoZoneSA")]
    enable_geo_zone_sa: bool,
    #[serde(rename = "EnableGeoZoneAF")]
    enable_geo_zone_af: bool,
    #[serde(rename = "EnableOriginShield")]
    enable_origin_shield: bool,
    #[serde(rename = "OriginShieldZoneCode")]
    origin_shield_zone_code: &'a str,
    #[serde(rename = "EnableAutoSSL")]
    enable_auto_ssl: bool,
    #[serde(rename = "EnableBrotliCompression")]
    enable_brotli: bool,
    #[serde(rename = "CacheControlMaxAgeOverride")]
    cache_control_max_age_override: i64,
}

impl<'a> From<&'a NewPullZone> for NewPullZoneWire<'a> {
    fn from(options: &'a NewPullZone) -> Self {
        Self {
            name: &options.name,
            origin_url: &options.origin_url,
            origin_host_header: &options.origin_host_header,
            enable_geo_zone_asia: options.enable_geo_zone_asia,
            enable_geo_zone_eu: options.enable_geo_zone_eu,
            enable_geo_zone_na: options.enable_geo_zone_na,
            enable_geo_zone_sa: options.enable_geo_zone_sa,
            enable_geo_zone_af: options.enable_geo_zone_af,
            enable_origin_shield: options.enable_origin_shield,
            origin_shield_zone_code: &options.origin_shield_zone_code,
            enable_auto_ssl: options.enable_auto_ssl,
            enable_brotli: options.enable_brotli,
            // Config carries minutes; the wire wants seconds.
            cache_control_max_age_override: options.cache_ttl_minutes * 60,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AddHostnameWire<'a> {
    hostname: &'a str,
}

impl BunnyClient {
    /// POST /pullzone
    pub(crate) async fn create_pull_zone_op(&self, options: &NewPullZone) -> Result<PullZone> {
        let body = NewPullZoneWire::from(options);
        let zone: PullZoneWire = self.post("/pullzone", &body).await?;
        Ok(zone.into())
    }

    /// GET /pullzone?search=... with an exact-name filter
    pub(crate) async fn pull_zone_by_name_op(&self, name: &str) -> Result<Option<PullZone>> {
        let zones: Vec<PullZoneWire> = match self.get(&format!("/pullzone?search={name}")).await {
            Ok(zones) => zones,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(zones
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(name))
            .map(PullZone::from))
    }

    /// GET /pullzone/{id}
    pub(crate) async fn pull_zone_by_id_op(&self, id: i64) -> Result<PullZone> {
        let zone: PullZoneWire = self.get(&format!("/pullzone/{id}")).await?;
        Ok(zone.into())
    }

    /// GET /pullzone
    pub(crate) async fn list_pull_zones_op(&self) -> Result<Vec<PullZone>> {
        let zones: Vec<PullZoneWire> = self.get("/pullzone").await?;
        Ok(zones.into_iter().map(PullZone::from).collect())
    }

    /// DELETE /pullzone/{id}
    pub(crate) async fn delete_pull_zone_op(&self, id: i64) -> Result<()> {
        self.delete(&format!("/pullzone/{id}")).await
    }

    /// POST /pullzone/{id}/addHostname
    pub(crate) async fn add_hostname_op(&self, id: i64, hostname: &str) -> Result<()> {
        let body = AddHostnameWire { hostname };
        self.post_empty(&format!("/pullzone/{id}/addHostname"), Some(&body))
            .await
    }

    /// POST /pullzone/{id}/purgeCache
    pub(crate) async fn purge_cache_op(&self, id: i64) -> Result<()> {
        self.post_empty::<()>(&format!("/pullzone/{id}/purgeCache"), None)
            .await
    }

    /// Certificate status for a pull zone's canonical hostname, derived
    /// from the zone's hostname list
    pub(crate) async fn certificate_op(&self, id: i64) -> Result<Certificate> {
        let zone: PullZoneWire = self.get(&format!("/pullzone/{id}")).await?;
        let hostname = zone
            .hostnames
            .iter()
            .find(|h| h.value.contains(CDN_HOSTNAME_SUFFIX))
            .or_else(|| zone.hostnames.first())
            .ok_or_else(|| Error::not_found(format!("pull zone {id} has no hostnames")))?;

        Ok(Certificate {
            hostname: hostname.value.clone(),
            issued: hostname.has_certificate,
        })
    }
}
