//! DNS zone and record operations
//!
//! Wire types use Bunny's PascalCase JSON; record kinds go over the wire as
//! the provider's numeric codes via the core [`RecordKind`] serde impls.

use serde::{Deserialize, Serialize};

use whm2bunny_core::error::Result;
use whm2bunny_core::traits::{DnsRecord, NewDnsRecord, RecordKind, Zone};

use crate::BunnyClient;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DnsZoneWire {
    pub id: i64,
    pub domain: String,
    #[serde(default)]
    pub records: Vec<DnsRecordWire>,
}

impl From<DnsZoneWire> for Zone {
    fn from(wire: DnsZoneWire) -> Self {
        Zone {
            id: wire.id,
            domain: wire.domain,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DnsRecordWire {
    pub id: i64,
    #[serde(rename = "Type")]
    pub kind: RecordKind,
    pub name: String,
    pub value: String,
    pub ttl: i64,
    #[serde(default)]
    pub priority: i64,
}

impl From<DnsRecordWire> for DnsRecord {
    fn from(wire: DnsRecordWire) -> Self {
        DnsRecord {
            id: wire.id,
            kind: wire.kind,
            name: wire.name,
            value: wire.value,
            ttl: wire.ttl,
            priority: wire.priority,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NewDnsRecordWire<'a> {
    #[serde(rename = "Type")]
    kind: RecordKind,
    name: &'a str,
    value: &'a str,
    ttl: i64,
    priority: i64,
}

impl<'a> From<&'a NewDnsRecord> for NewDnsRecordWire<'a> {
    fn from(record: &'a NewDnsRecord) -> Self {
        Self {
            kind: record.kind,
            name: &record.name,
            value: &record.value,
            ttl: record.ttl,
            priority: record.priority,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateZoneWire<'a> {
    domain: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    soa_email: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DnsZoneListWire {
    #[serde(default)]
    items: Vec<DnsZoneWire>,
}

impl BunnyClient {
    /// POST /dnszone
    pub(crate) async fn create_zone_op(&self, domain: &str, soa_email: &str) -> Result<Zone> {
        let body = CreateZoneWire { domain, soa_email };
        let zone: DnsZoneWire = self.post("/dnszone", &body).await?;
        Ok(zone.into())
    }

    /// GET /dnszone?search=... with an exact-domain filter over the page
    pub(crate) async fn zone_by_domain_op(&self, domain: &str) -> Result<Option<Zone>> {
        let path = format!("/dnszone?page=1&perPage=1000&search={domain}");
        let list: DnsZoneListWire = match self.get(&path).await {
            Ok(list) => list,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(list
            .items
            .into_iter()
            .find(|z| z.domain.eq_ignore_ascii_case(domain))
            .map(Zone::from))
    }

    /// GET /dnszone/{id}
    pub(crate) async fn zone_by_id_op(&self, id: i64) -> Result<Zone> {
        let zone: DnsZoneWire = self.get(&format!("/dnszone/{id}")).await?;
        Ok(zone.into())
    }

    /// DELETE /dnszone/{id}
    pub(crate) async fn delete_zone_op(&self, id: i64) -> Result<()> {
        self.delete(&format!("/dnszone/{id}")).await
    }

    /// GET /dnszone/{id}, returning the zone's record set
    pub(crate) async fn list_records_op(&self, zone_id: i64) -> Result<Vec<DnsRecord>> {
        let zone: DnsZoneWire = self.get(&format!("/dnszone/{zone_id}")).await?;
        Ok(zone.records.into_iter().map(DnsRecord::from).collect())
    }

    /// PUT /dnszone/{id}/records
    pub(crate) async fn add_record_op(
        &self,
        zone_id: i64,
        record: &NewDnsRecord,
    ) -> Result<DnsRecord> {
        let body = NewDnsRecordWire::from(record);
        let created: DnsRecordWire = self
            .put(&format!("/dnszone/{zone_id}/records"), &body)
            .await?;
        Ok(created.into())
    }

    /// POST /dnszone/{id}/records/{recordId}
    pub(crate) async fn update_record_op(
        &self,
        zone_id: i64,
        record_id: i64,
        record: &NewDnsRecord,
    ) -> Result<()> {
        let body = NewDnsRecordWire::from(record);
        self.post_empty(
            &format!("/dnszone/{zone_id}/records/{record_id}"),
            Some(&body),
        )
        .await
    }

    /// DELETE /dnszone/{id}/records/{recordId}
    pub(crate) async fn delete_record_op(&self, zone_id: i64, record_id: i64) -> Result<()> {
        self.delete(&format!("/dnszone/{zone_id}/records/{record_id}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_wire_parses_with_records() {
        let json = r#"{
            "Id": 11,
            "Domain": "example.com",
            "Records": [
                {"Id": 1, "Type": 0, "Name": "@", "Value": "203.0.113.9", "Ttl": 3600},
                {"Id": 2, "Type": 2, "Name": "www", "Value": "example.com.", "Ttl": 3600},
                {"Id": 3, "Type": 4, "Name": "@", "Value": "mail.example.com.", "Ttl": 3600, "Priority": 10}
            ]
        }"#;

        let zone: DnsZoneWire = serde_json::from_str(json).unwrap();
        assert_eq!(zone.id, 11);
        assert_eq!(zone.records.len(), 3);
        assert_eq!(zone.records[0].kind, RecordKind::A);
        assert_eq!(zone.records[1].kind, RecordKind::Cname);
        assert_eq!(zone.records[2].kind, RecordKind::Mx);
        assert_eq!(zone.records[2].priority, 10);
    }

    #[test]
    fn new_record_serializes_numeric_type() {
        let record = NewDnsRecord::new(RecordKind::Txt, "@", "v=spf1 a mx -all", 3600);
        let json = serde_json::to_value(NewDnsRecordWire::from(&record)).unwrap();
        assert_eq!(json["Type"], 3);
        assert_eq!(json["Name"], "@");
        assert_eq!(json["Ttl"], 3600);
        assert_eq!(json["Priority"], 0);
    }

    #[test]
    fn create_zone_omits_empty_soa_email() {
        let body = CreateZoneWire {
            domain: "example.com",
            soa_email: "",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("SoaEmail").is_none());

        let body = CreateZoneWire {
            domain: "example.com",
            soa_email: "hostmaster@example.com",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["SoaEmail"], "hostmaster@example.com");
    }
}
