//! Traffic statistics
//!
//! Bunny reports bandwidth, request totals and a cache hit rate; the hit
//! and miss counts the summaries work with are derived from the rate.
//! Dates are date-only (YYYY-MM-DD) in the provider's timezone.

use chrono::NaiveDate;
use serde::Deserialize;

use whm2bunny_core::error::Result;
use whm2bunny_core::traits::TrafficStats;

use crate::BunnyClient;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatisticsWire {
    #[serde(default)]
    total_bandwidth_used: i64,
    #[serde(default)]
    total_requests_served: i64,
    #[serde(default)]
    cache_hit_rate: f64,
}

impl From<StatisticsWire> for TrafficStats {
    fn from(wire: StatisticsWire) -> Self {
        let hits =
            (wire.total_requests_served as f64 * wire.cache_hit_rate / 100.0).round() as i64;
        TrafficStats {
            bandwidth: wire.total_bandwidth_used,
            requests: wire.total_requests_served,
            cache_hits: hits,
            cache_misses: wire.total_requests_served - hits,
        }
    }
}

impl BunnyClient {
    /// GET /statistics?pullZoneId=...&dateFrom=...&dateTo=...
    pub(crate) async fn pull_zone_stats_op(
        &self,
        id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<TrafficStats> {
        let path = format!(
            "/statistics?pullZoneId={id}&dateFrom={}&dateTo={}",
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
        );
        let stats: StatisticsWire = self.get(&path).await?;
        Ok(stats.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_and_miss_counts_derive_from_rate() {
        let wire = StatisticsWire {
            total_bandwidth_used: 1_000_000,
            total_requests_served: 200,
            cache_hit_rate: 75.0,
        };
        let stats = TrafficStats::from(wire);
        assert_eq!(stats.bandwidth, 1_000_000);
        assert_eq!(stats.requests, 200);
        assert_eq!(stats.cache_hits, 150);
        assert_eq!(stats.cache_misses, 50);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let wire: StatisticsWire = serde_json::from_str("{}").unwrap();
        let stats = TrafficStats::from(wire);
        assert_eq!(stats.bandwidth, 0);
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.cache_hits, 0);
    }
}
