//! Summary and alert message formatting
//!
//! Builds the HTML messages the scheduler sends through the notifier:
//! daily and weekly traffic summaries ranking the top zones, and the
//! bandwidth spike alert.

use chrono::NaiveDate;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Per-zone usage over a summary window
#[derive(Debug, Clone)]
pub struct ZoneUsage {
    /// Pull-zone id
    pub zone_id: i64,
    /// Pull-zone name
    pub zone_name: String,
    /// Bytes served
    pub bandwidth: i64,
    /// Requests served
    pub requests: i64,
}

/// Format the daily summary message
pub fn format_daily(
    date: NaiveDate,
    total_bandwidth: i64,
    total_requests: i64,
    cache_hit_rate: f64,
    top_zones: &[ZoneUsage],
    hostname: &str,
) -> String {
    let mut message = format!(
        "📊 <b>Daily Summary</b> - {}\n\n\
         📈 <b>Total Bandwidth:</b> {:.2} GB\n\
         📈 <b>Total Requests:</b> {}\n\
         📈 <b>Cache Hit Rate:</b> {cache_hit_rate:.1}%\n\n\
         🔝 <b>Top {} Domains:</b>",
        date.format("%b %-d, %Y"),
        total_bandwidth as f64 / GIB,
        format_number(total_requests),
        top_zones.len(),
    );

    append_ranking(&mut message, total_bandwidth, top_zones);
    message.push_str(&format!("\n\n🖥️ <b>Server:</b> {hostname}"));
    message
}

/// Format the weekly summary message
#[allow(clippy::too_many_arguments)]
pub fn format_weekly(
    week_number: u32,
    year: i32,
    total_bandwidth: i64,
    total_requests: i64,
    cache_hit_rate: f64,
    bandwidth_change_pct: f64,
    top_zones: &[ZoneUsage],
    hostname: &str,
) -> String {
    let change = if bandwidth_change_pct > 0.0 {
        format!("+{bandwidth_change_pct:.0}%")
    } else if bandwidth_change_pct < 0.0 {
        format!("{bandwidth_change_pct:.0}%")
    } else {
        "0%".to_string()
    };

    let mut message = format!(
        "📊 <b>Weekly Summary</b> - Week {week_number}, {year}\n\n\
         📈 <b>Total Bandwidth:</b> {:.2} GB\n\
         📈 <b>Total Requests:</b> {}\n\
         📈 <b>Avg Cache Hit Rate:</b> {cache_hit_rate:.1}%\n\
         📈 <b>Bandwidth Change:</b> {change} vs last week\n\n\
         🔝 <b>Top {} Domains:</b>",
        total_bandwidth as f64 / GIB,
        format_number(total_requests),
        top_zones.len(),
    );

    append_ranking(&mut message, total_bandwidth, top_zones);
    message.push_str(&format!("\n\n🖥️ <b>Server:</b> {hostname}"));
    message
}

fn append_ranking(message: &mut String, total_bandwidth: i64, top_zones: &[ZoneUsage]) {
    for (i, zone) in top_zones.iter().enumerate() {
        let percentage = if total_bandwidth > 0 {
            zone.bandwidth as f64 / total_bandwidth as f64 * 100.0
        } else {
            0.0
        };
        message.push_str(&format!(
            "\n{}. {} - {:.2} GB ({percentage:.0}%)",
            i + 1,
            zone.zone_name,
            zone.bandwidth as f64 / GIB,
        ));
    }
}

/// Format a large count with K/M/B suffixes
pub fn format_number(n: i64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}
