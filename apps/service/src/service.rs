//! Admin and public boundary.
//!
//! No web framework lives here; a UI or HTTP layer calls these methods and
//! maps [`AppError`] codes onto its own wire format. Admin calls are rate
//! limited per caller and authenticated against the configured bearer token.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::analytics::latency::{avg, build_latency_histogram, percentile_from_values};
use crate::analytics::uptime::{
    build_unknown_intervals, overlap_seconds, range_to_seconds, sum_intervals, Interval,
};
use crate::config::Admin;
use crate::database::models::{Monitor, MonitorKind, NotificationChannel, Outage};
use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::monitoring::state_machine::StateSnapshot;
use crate::monitoring::targets::{validate_http_target, validate_tcp_target};
use crate::monitoring::types::{CheckOutcome, CheckStatus, MonitorStatus};
use crate::monitoring::CheckRunner;
use crate::notify::{dispatch_to_channel, DeliveryOutcome, NotificationEvent, WebhookTransport};
use crate::ratelimit::{InMemoryCounterStore, RateLimiter};
use crate::settings::{patch_settings, read_settings, Settings, SettingsPatch};
use crate::snapshots::{
    cache_control_for_age, compute_public_status_payload, read_status_snapshot,
    write_status_snapshot, PublicStatusPayload,
};

const OUTAGE_HISTORY_LIMIT: u32 = 100;

/// Per-request call metadata: bearer token as presented, a caller key for
/// rate limiting (usually the peer address), and the request time.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub token: Option<&'a str>,
    pub caller: &'a str,
    pub now: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyReport {
    pub samples: usize,
    pub avg_ms: Option<i64>,
    pub p50_ms: Option<i64>,
    pub p95_ms: Option<i64>,
    pub p99_ms: Option<i64>,
    pub histogram: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeReport {
    pub range_start: i64,
    pub range_end: i64,
    pub unknown_seconds: i64,
    pub down_seconds: i64,
    /// `None` when the whole range is unknown.
    pub uptime_percent: Option<f64>,
}

pub struct UptimerService {
    db: Arc<dyn Database>,
    checks: Arc<dyn CheckRunner>,
    transport: Arc<dyn WebhookTransport>,
    limiter: RateLimiter<InMemoryCounterStore>,
    admin_token: Option<String>,
}

impl UptimerService {
    pub fn new(
        db: Arc<dyn Database>,
        checks: Arc<dyn CheckRunner>,
        transport: Arc<dyn WebhookTransport>,
        admin: &Admin,
    ) -> Self {
        Self {
            db,
            checks,
            transport,
            limiter: RateLimiter::new(
                InMemoryCounterStore::new(),
                admin.rate_limit_max,
                admin.rate_limit_window_seconds as i64,
            ),
            admin_token: admin.token.clone(),
        }
    }

    fn guard(&self, ctx: CallContext<'_>) -> AppResult<()> {
        self.limiter.check(ctx.caller, ctx.now)?;
        match &self.admin_token {
            None => Ok(()),
            Some(expected) if ctx.token == Some(expected.as_str()) => Ok(()),
            Some(_) => Err(AppError::Unauthorized),
        }
    }

    fn validate_monitor(monitor: &Monitor) -> AppResult<()> {
        if monitor.name.trim().is_empty() {
            return Err(AppError::invalid_argument("name must not be empty"));
        }
        if monitor.interval_sec < 1 {
            return Err(AppError::invalid_argument("interval_sec must be positive"));
        }
        if monitor.timeout_ms < 1 {
            return Err(AppError::invalid_argument("timeout_ms must be positive"));
        }
        match monitor.kind {
            MonitorKind::Http => validate_http_target(&monitor.target),
            MonitorKind::Tcp => validate_tcp_target(&monitor.target),
        }
        .map_err(|err| AppError::invalid_argument(err.to_string()))
    }

    // Monitors

    pub async fn list_monitors(&self, ctx: CallContext<'_>) -> AppResult<Vec<Monitor>> {
        self.guard(ctx)?;
        Ok(self.db.list_monitors().await?)
    }

    pub async fn get_monitor(&self, ctx: CallContext<'_>, id: i64) -> AppResult<Monitor> {
        self.guard(ctx)?;
        self.db.get_monitor(id).await?.ok_or_else(|| AppError::not_found("monitor"))
    }

    pub async fn create_monitor(
        &self,
        ctx: CallContext<'_>,
        mut monitor: Monitor,
    ) -> AppResult<Monitor> {
        self.guard(ctx)?;
        Self::validate_monitor(&monitor)?;
        monitor.created_at = ctx.now;
        monitor.updated_at = ctx.now;
        let id = self.db.insert_monitor(&monitor).await?;
        monitor.id = Some(id);
        info!(monitor = id, name = %monitor.name, "monitor created");
        Ok(monitor)
    }

    pub async fn update_monitor(
        &self,
        ctx: CallContext<'_>,
        mut monitor: Monitor,
    ) -> AppResult<Monitor> {
        self.guard(ctx)?;
        let id = monitor.id.ok_or_else(|| AppError::invalid_argument("monitor id is required"))?;
        if self.db.get_monitor(id).await?.is_none() {
            return Err(AppError::not_found("monitor"));
        }
        Self::validate_monitor(&monitor)?;
        monitor.updated_at = ctx.now;
        self.db.update_monitor(&monitor).await?;
        Ok(monitor)
    }

    pub async fn delete_monitor(&self, ctx: CallContext<'_>, id: i64) -> AppResult<()> {
        self.guard(ctx)?;
        if self.db.get_monitor(id).await?.is_none() {
            return Err(AppError::not_found("monitor"));
        }
        self.db.delete_monitor(id).await?;
        info!(monitor = id, "monitor deleted");
        Ok(())
    }

    /// Current debounced state; a never-checked monitor reads as unknown.
    pub async fn monitor_state(&self, ctx: CallContext<'_>, id: i64) -> AppResult<StateSnapshot> {
        self.guard(ctx)?;
        if self.db.get_monitor(id).await?.is_none() {
            return Err(AppError::not_found("monitor"));
        }
        Ok(self.db.get_monitor_state(id).await?.unwrap_or(StateSnapshot {
            status: MonitorStatus::Unknown,
            last_changed_at: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }))
    }

    pub async fn outage_history(&self, ctx: CallContext<'_>, id: i64) -> AppResult<Vec<Outage>> {
        self.guard(ctx)?;
        if self.db.get_monitor(id).await?.is_none() {
            return Err(AppError::not_found("monitor"));
        }
        Ok(self.db.outage_history(id, OUTAGE_HISTORY_LIMIT).await?)
    }

    /// One ad-hoc check outside the schedule. Nothing is persisted.
    pub async fn test_monitor(&self, ctx: CallContext<'_>, id: i64) -> AppResult<CheckOutcome> {
        self.guard(ctx)?;
        let monitor =
            self.db.get_monitor(id).await?.ok_or_else(|| AppError::not_found("monitor"))?;
        Ok(monitor.probe_config().run(self.checks.as_ref()).await)
    }

    // Channels

    pub async fn test_notification_channel(
        &self,
        ctx: CallContext<'_>,
        id: i64,
    ) -> AppResult<DeliveryOutcome> {
        self.guard(ctx)?;
        let channel: NotificationChannel =
            self.db.get_channel(id).await?.ok_or_else(|| AppError::not_found("channel"))?;

        let event = NotificationEvent::new(
            "test.ping",
            format!("test:{id}:{}", ctx.now),
            ctx.now,
            json!({}),
        );
        match dispatch_to_channel(self.db.as_ref(), self.transport.as_ref(), &channel, &event)
            .await?
        {
            Some(outcome) => Ok(outcome),
            None => Err(AppError::invalid_argument("channel did not accept the test event")),
        }
    }

    // Analytics

    pub async fn monitor_latency(
        &self,
        ctx: CallContext<'_>,
        id: i64,
        range: &str,
    ) -> AppResult<LatencyReport> {
        self.guard(ctx)?;
        if self.db.get_monitor(id).await?.is_none() {
            return Err(AppError::not_found("monitor"));
        }
        let seconds = range_to_seconds(range)
            .ok_or_else(|| AppError::invalid_argument("unknown analytics range"))?;

        let rows = self.db.check_results_between(id, ctx.now - seconds, ctx.now).await?;
        let values: Vec<i64> = rows.iter().filter_map(|r| r.outcome.latency_ms).collect();

        Ok(LatencyReport {
            samples: values.len(),
            avg_ms: avg(&values),
            p50_ms: percentile_from_values(&values, 0.50),
            p95_ms: percentile_from_values(&values, 0.95),
            p99_ms: percentile_from_values(&values, 0.99),
            histogram: build_latency_histogram(&values),
        })
    }

    pub async fn monitor_uptime(
        &self,
        ctx: CallContext<'_>,
        id: i64,
        range: &str,
    ) -> AppResult<UptimeReport> {
        self.guard(ctx)?;
        let monitor =
            self.db.get_monitor(id).await?.ok_or_else(|| AppError::not_found("monitor"))?;
        let seconds = range_to_seconds(range)
            .ok_or_else(|| AppError::invalid_argument("unknown analytics range"))?;

        let range_start = ctx.now - seconds;
        let range_end = ctx.now;

        let rows = self.db.check_results_between(id, range_start, range_end).await?;
        let checks: Vec<crate::database::models::CheckPoint> = rows
            .iter()
            .map(|r| crate::database::models::CheckPoint {
                checked_at: r.checked_at,
                status: match r.outcome.status {
                    CheckStatus::Up => MonitorStatus::Up,
                    CheckStatus::Down => MonitorStatus::Down,
                    CheckStatus::Unknown => MonitorStatus::Unknown,
                },
            })
            .collect();

        let unknown =
            build_unknown_intervals(range_start, range_end, monitor.interval_sec, &checks);
        let unknown_seconds = sum_intervals(&unknown);

        let outages: Vec<Interval> = self
            .db
            .outage_history(id, OUTAGE_HISTORY_LIMIT)
            .await?
            .iter()
            .map(|o| Interval {
                start: o.started_at.max(range_start),
                end: o.ended_at.unwrap_or(range_end).min(range_end),
            })
            .collect();
        let range_interval = [Interval { start: range_start, end: range_end }];
        let down_total = overlap_seconds(&outages, &range_interval);
        let down_in_unknown = overlap_seconds(&outages, &unknown);
        let down_seconds = down_total - down_in_unknown;

        let known = seconds - unknown_seconds;
        let uptime_percent = if known > 0 {
            Some(100.0 * (known - down_seconds) as f64 / known as f64)
        } else {
            None
        };

        Ok(UptimeReport { range_start, range_end, unknown_seconds, down_seconds, uptime_percent })
    }

    // Public status

    /// The status page payload plus its cache-control header. Serves the
    /// stored snapshot while fresh, otherwise computes live and stores it.
    pub async fn public_status(
        &self,
        now: i64,
    ) -> AppResult<(PublicStatusPayload, &'static str)> {
        if let Some((payload, age)) = read_status_snapshot(self.db.as_ref(), now).await? {
            return Ok((payload, cache_control_for_age(age)));
        }

        let settings = read_settings(self.db.as_ref()).await?;
        let payload = compute_public_status_payload(self.db.as_ref(), &settings, now).await?;
        write_status_snapshot(self.db.as_ref(), &payload, now).await?;
        Ok((payload, cache_control_for_age(0)))
    }

    // Settings

    pub async fn get_settings(&self, ctx: CallContext<'_>) -> AppResult<Settings> {
        self.guard(ctx)?;
        Ok(read_settings(self.db.as_ref()).await?)
    }

    pub async fn update_settings(
        &self,
        ctx: CallContext<'_>,
        patch: &SettingsPatch,
    ) -> AppResult<Settings> {
        self.guard(ctx)?;
        patch_settings(self.db.as_ref(), patch).await?;
        Ok(read_settings(self.db.as_ref()).await?)
    }
}
