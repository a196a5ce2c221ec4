//! Cron-driven summaries and bandwidth alerts
//!
//! Three jobs, all evaluated in the configured timezone:
//!
//! - daily traffic summary (default 09:00): also appends a bandwidth
//!   snapshot per zone for later comparison
//! - weekly traffic summary (default Monday 09:00): includes the percent
//!   change against the week before
//! - hourly bandwidth spike check: compares today-so-far per zone against
//!   the prior 24-hour baseline from the snapshot store, falling back to a
//!   provider call when no snapshot exists
//!
//! Starting is a no-op when the notifier is disabled. Stopping signals the
//! job tasks and waits up to ten seconds for in-flight work.

pub mod summary;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SummaryConfig;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::state::{BandwidthSnapshot, SnapshotStore};
use crate::traits::ProviderApi;
use self::summary::ZoneUsage;

/// Grace period for in-flight jobs on stop
const STOP_GRACE: Duration = Duration::from_secs(10);

/// The hourly spike check always runs at minute zero
const HOURLY_ALERT_SCHEDULE: &str = "0 * * * *";

#[derive(Debug, Clone, Copy)]
enum Job {
    DailySummary,
    WeeklySummary,
    BandwidthAlert,
}

impl Job {
    fn name(self) -> &'static str {
        match self {
            Job::DailySummary => "daily_summary",
            Job::WeeklySummary => "weekly_summary",
            Job::BandwidthAlert => "bandwidth_alert",
        }
    }
}

#[derive(Default)]
struct SchedulerInner {
    running: bool,
    shutdown: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

/// Cron scheduler for summaries and alerts
pub struct Scheduler {
    provider: Arc<dyn ProviderApi>,
    notifier: Arc<Notifier>,
    snapshots: Arc<SnapshotStore>,
    config: SummaryConfig,
    hostname: String,
    tz: Tz,
    inner: Mutex<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler. An unparseable timezone falls back to UTC with a
    /// warning (configuration validation normally catches it first).
    pub fn new(
        provider: Arc<dyn ProviderApi>,
        notifier: Arc<Notifier>,
        snapshots: Arc<SnapshotStore>,
        config: SummaryConfig,
        hostname: impl Into<String>,
    ) -> Self {
        let tz = config.timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(timezone = %config.timezone, "unknown timezone, falling back to UTC");
            chrono_tz::UTC
        });

        Self {
            provider,
            notifier,
            snapshots,
            config,
            hostname: hostname.into(),
            tz,
            inner: Mutex::new(SchedulerInner::default()),
        }
    }

    /// Start the cron jobs. No-op when already running, when summaries are
    /// disabled, or when the notifier has no transport.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.running {
            info!("scheduler already running");
            return Ok(());
        }
        if !self.config.enabled || !self.notifier.is_enabled() {
            info!("notifications disabled, scheduler not starting");
            return Ok(());
        }

        let daily = parse_schedule(&self.config.schedule)?;
        let weekly = parse_schedule(&self.config.weekly_schedule)?;
        let hourly = parse_schedule(HOURLY_ALERT_SCHEDULE)?;

        let (tx, rx) = watch::channel(false);

        for (schedule, job) in [
            (daily, Job::DailySummary),
            (weekly, Job::WeeklySummary),
            (hourly, Job::BandwidthAlert),
        ] {
            let scheduler = Arc::clone(&self);
            let shutdown = rx.clone();
            info!(job = job.name(), timezone = %self.tz, "scheduled job");
            inner
                .handles
                .push(tokio::spawn(scheduler.job_loop(schedule, shutdown, job)));
        }

        inner.shutdown = Some(tx);
        inner.running = true;

        info!(
            timezone = %self.tz,
            daily_schedule = %self.config.schedule,
            weekly_schedule = %self.config.weekly_schedule,
            "scheduler started"
        );
        Ok(())
    }

    /// Stop the cron jobs, waiting up to ten seconds for in-flight work
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if !inner.running {
            return;
        }

        if let Some(tx) = inner.shutdown.take() {
            let _ = tx.send(true);
        }

        let handles = std::mem::take(&mut inner.handles);
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(STOP_GRACE, join_all).await.is_err() {
            warn!("scheduler stop timed out, abandoning jobs");
        }

        inner.running = false;
        info!("scheduler stopped");
    }

    async fn job_loop(self: Arc<Self>, schedule: Schedule, mut shutdown: watch::Receiver<bool>, job: Job) {
        loop {
            let now = Utc::now().with_timezone(&self.tz);
            let Some(next) = schedule.after(&now).next() else {
                warn!(job = job.name(), "schedule yields no further occurrences");
                return;
            };
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(job = job.name(), next = %next, "waiting for next occurrence");

            tokio::select! {
                _ = tokio::time::sleep(delay) => match job {
                    Job::DailySummary => self.run_daily_summary().await,
                    Job::WeeklySummary => self.run_weekly_summary().await,
                    Job::BandwidthAlert => self.run_bandwidth_alerts().await,
                },
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Produce and send the daily summary for yesterday, appending one
    /// bandwidth snapshot per zone
    pub async fn run_daily_summary(&self) {
        info!("running daily summary");

        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let Some(yesterday) = today.checked_sub_days(Days::new(1)) else {
            return;
        };

        let Some((totals, usage)) = self.collect_usage(yesterday, yesterday, true).await else {
            return;
        };

        let top = self.top_zones(usage, 5);
        let message = summary::format_daily(
            yesterday,
            totals.bandwidth,
            totals.requests,
            totals.cache_hit_rate(),
            &top,
            &self.hostname,
        );
        self.notifier.send_raw(&message).await;
        info!("daily summary sent");
    }

    /// Produce and send the weekly summary for the previous Monday–Sunday
    /// window, comparing against the week before
    pub async fn run_weekly_summary(&self) {
        info!("running weekly summary");

        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let days_since_monday = today.weekday().num_days_from_monday() as u64;
        let Some(this_monday) = today.checked_sub_days(Days::new(days_since_monday)) else {
            return;
        };
        let last_monday = this_monday - Days::new(7);
        let last_sunday = this_monday - Days::new(1);
        let prev_monday = last_monday - Days::new(7);
        let prev_sunday = last_monday - Days::new(1);

        let Some((totals, usage)) = self.collect_usage(last_monday, last_sunday, false).await
        else {
            return;
        };

        let mut prev_bandwidth: i64 = 0;
        for zone in &usage {
            if let Ok(stats) = self
                .provider
                .pull_zone_stats(zone.zone_id, prev_monday, prev_sunday)
                .await
            {
                prev_bandwidth += stats.bandwidth;
            }
        }

        let change_pct = if prev_bandwidth > 0 {
            (totals.bandwidth - prev_bandwidth) as f64 / prev_bandwidth as f64 * 100.0
        } else {
            0.0
        };

        let iso = last_monday.iso_week();
        let top = self.top_zones(usage, 10);
        let message = summary::format_weekly(
            iso.week(),
            iso.year(),
            totals.bandwidth,
            totals.requests,
            totals.cache_hit_rate(),
            change_pct,
            &top,
            &self.hostname,
        );
        self.notifier.send_raw(&message).await;
        info!("weekly summary sent");
    }

    /// Compare today-so-far per zone against the prior 24-hour baseline
    /// and alert on increases at or above the threshold
    pub async fn run_bandwidth_alerts(&self) {
        debug!("checking bandwidth alerts");

        let threshold = if self.config.bandwidth_alert_threshold > 0.0 {
            self.config.bandwidth_alert_threshold
        } else {
            50.0
        };

        let zones = match self.provider.list_pull_zones().await {
            Ok(zones) => zones,
            Err(err) => {
                error!(error = %err, "failed to list pull zones for bandwidth check");
                return;
            }
        };

        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let Some(yesterday) = today.checked_sub_days(Days::new(1)) else {
            return;
        };
        let baseline_since = Utc::now() - chrono::Duration::hours(24);

        for zone in zones {
            let current = match self.provider.pull_zone_stats(zone.id, today, today).await {
                Ok(stats) => stats,
                Err(_) => continue,
            };

            let mut previous: i64 = self
                .snapshots
                .by_zone_since(zone.id, baseline_since)
                .await
                .iter()
                .map(|s| s.bandwidth)
                .sum();

            if previous == 0 {
                if let Ok(stats) = self
                    .provider
                    .pull_zone_stats(zone.id, yesterday, yesterday)
                    .await
                {
                    previous = stats.bandwidth;
                }
            }

            if previous > 0 {
                let increase = (current.bandwidth - previous) as f64 / previous as f64 * 100.0;
                if increase >= threshold {
                    warn!(
                        zone_id = zone.id,
                        zone_name = %zone.name,
                        increase_pct = increase,
                        "bandwidth spike detected"
                    );
                    self.notifier
                        .notify_bandwidth_alert(&zone.name, current.bandwidth, previous, increase)
                        .await;
                }
            }
        }
    }

    /// Fetch stats for every pull zone over a date window. Zones whose
    /// stats call fails are skipped with a warning; a failed zone listing
    /// aborts the job.
    async fn collect_usage(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        record_snapshots: bool,
    ) -> Option<(crate::traits::TrafficStats, Vec<ZoneUsage>)> {
        let zones = match self.provider.list_pull_zones().await {
            Ok(zones) => zones,
            Err(err) => {
                error!(error = %err, "failed to list pull zones for summary");
                return None;
            }
        };

        let mut totals = crate::traits::TrafficStats::default();
        let mut usage = Vec::with_capacity(zones.len());

        for zone in zones {
            let stats = match self.provider.pull_zone_stats(zone.id, from, to).await {
                Ok(stats) => stats,
                Err(err) => {
                    warn!(zone_id = zone.id, zone_name = %zone.name, error = %err, "failed to get zone stats");
                    continue;
                }
            };

            totals.bandwidth += stats.bandwidth;
            totals.requests += stats.requests;
            totals.cache_hits += stats.cache_hits;
            totals.cache_misses += stats.cache_misses;

            usage.push(ZoneUsage {
                zone_id: zone.id,
                zone_name: zone.name.clone(),
                bandwidth: stats.bandwidth,
                requests: stats.requests,
            });

            if record_snapshots {
                let snapshot = BandwidthSnapshot {
                    timestamp: Utc::now(),
                    zone_id: zone.id,
                    zone_name: zone.name,
                    bandwidth: stats.bandwidth,
                    requests: stats.requests,
                    cache_hits: stats.cache_hits,
                    cache_misses: stats.cache_misses,
                };
                if let Err(err) = self.snapshots.add(snapshot).await {
                    warn!(error = %err, "failed to store bandwidth snapshot");
                }
            }
        }

        Some((totals, usage))
    }

    fn top_zones(&self, mut usage: Vec<ZoneUsage>, default_n: usize) -> Vec<ZoneUsage> {
        usage.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
        let mut n = self.config.include_top_bandwidth;
        if n == 0 {
            n = default_n;
        }
        usage.truncate(n);
        usage
    }
}

/// Parse a standard 5-field cron expression, prepending the seconds field
/// the `cron` crate expects
fn parse_schedule(expr: &str) -> Result<Schedule> {
    let with_seconds = format!("0 {expr}");
    Schedule::from_str(&with_seconds)
        .map_err(|e| Error::config(format!("invalid cron expression '{expr}': {e}")))
}
