//! One scheduler tick.
//!
//! A tick claims a short lease so that overlapping runs cannot double-check
//! monitors, probes everything that is due, feeds each outcome through the
//! state machine, and spawns notification fan-out and the snapshot refresh
//! as background tasks. The tick itself never waits on webhook round trips;
//! the delivery claim row keeps a rerun from double-sending.

use std::collections::HashSet;

use anyhow::Result;
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, error, info};

use crate::database::models::{
    CheckResultRow, DueMonitor, MaintenanceWindow, NotificationChannel,
};
use crate::monitoring::state_machine::OutageAction;
use crate::monitoring::types::{CheckStatus, MonitorStatus};
use crate::monitoring::{compute_next_state, StateThresholds};
use crate::notify::{dispatch_event, NotificationEvent};
use crate::settings::read_settings;
use crate::snapshots::refresh_public_status_snapshot;

use super::Scheduler;

const TICK_LEASE_NAME: &str = "scheduler:tick";
const TICK_LEASE_SECS: i64 = 55;

/// How far back a tick looks for maintenance boundaries it may have missed.
const MAINTENANCE_LOOKBACK_SECS: i64 = 120;

/// What one monitor's check produced, as far as notifications care.
struct CheckReport {
    monitor_id: i64,
    name: String,
    target: String,
    status: MonitorStatus,
    error: Option<String>,
    changed: bool,
    downtime_seconds: Option<i64>,
}

impl Scheduler {
    /// Run one tick at `now` (unix seconds). Returns early without touching
    /// anything when another runner holds the tick lease.
    pub async fn run_tick(&self, now: i64) -> Result<()> {
        self.reap_background();

        if !self.db.acquire_lease(TICK_LEASE_NAME, now, TICK_LEASE_SECS).await? {
            debug!("tick lease held elsewhere, skipping");
            return Ok(());
        }

        // Checks within a minute share one timestamp so event keys and
        // uptime math line up across monitors.
        let checked_at = now - now.rem_euclid(60);

        let settings = read_settings(self.db.as_ref()).await?;
        let thresholds = settings.state_thresholds();

        let due = self.db.due_monitors(checked_at).await?;
        let suppressed: HashSet<i64> =
            self.db.monitors_in_active_maintenance(checked_at).await?.into_iter().collect();

        if !due.is_empty() {
            info!(due = due.len(), checked_at, "running due checks");
        }

        let reports = join_all(
            due.iter().map(|monitor| self.process_monitor(monitor, checked_at, thresholds)),
        )
        .await;

        let channels = self.db.list_active_channels().await?;

        for report in reports {
            let report = match report {
                Ok(report) => report,
                Err(err) => {
                    error!(error = %err, "monitor check failed");
                    continue;
                }
            };
            if !report.changed || suppressed.contains(&report.monitor_id) {
                continue;
            }
            let direction = match report.status {
                MonitorStatus::Up => "up",
                MonitorStatus::Down => "down",
                _ => continue,
            };

            let mut vars = json!({
                "monitor": {
                    "id": report.monitor_id,
                    "name": report.name,
                    "target": report.target,
                },
                "state": {
                    "status": report.status.as_str(),
                    "error": report.error,
                },
            });
            if let Some(seconds) = report.downtime_seconds {
                vars["downtime_seconds"] = json!(seconds);
            }

            let event = NotificationEvent::new(
                &format!("monitor.{direction}"),
                format!("monitor:{}:{}:{}", report.monitor_id, direction, checked_at),
                checked_at,
                vars,
            );
            let db = self.db.clone();
            let transport = self.transport.clone();
            let channels = channels.clone();
            self.spawn_background(async move {
                dispatch_event(db.as_ref(), transport.as_ref(), &channels, &event).await;
            });
        }

        self.dispatch_maintenance_boundaries(checked_at, &channels).await?;

        let db = self.db.clone();
        self.spawn_background(async move {
            if let Err(err) = refresh_public_status_snapshot(db.as_ref(), now).await {
                error!(error = %err, "snapshot refresh failed");
            }
        });

        Ok(())
    }

    async fn process_monitor(
        &self,
        monitor: &DueMonitor,
        checked_at: i64,
        thresholds: StateThresholds,
    ) -> Result<CheckReport> {
        let outcome = monitor.probe_config().run(self.checks.as_ref()).await;

        let (next, action) =
            compute_next_state(monitor.state.as_ref(), &outcome, checked_at, thresholds);

        self.db
            .insert_check_result(&CheckResultRow {
                monitor_id: monitor.id,
                checked_at,
                outcome: outcome.clone(),
            })
            .await?;
        self.db
            .upsert_monitor_state(monitor.id, &next, outcome.error.as_deref(), checked_at)
            .await?;

        let mut downtime_seconds = None;
        match action {
            OutageAction::Open => {
                self.db.open_outage(monitor.id, checked_at, outcome.error.as_deref()).await?;
            }
            OutageAction::Update => {
                self.db.update_open_outage(monitor.id, outcome.error.as_deref()).await?;
            }
            OutageAction::Close => {
                self.db.close_outage(monitor.id, checked_at).await?;
                downtime_seconds = monitor
                    .state
                    .as_ref()
                    .and_then(|s| s.last_changed_at)
                    .map(|since| (checked_at - since).max(0));
            }
            OutageAction::None => {}
        }

        self.db.mark_monitor_checked(monitor.id, checked_at).await?;

        if outcome.status == CheckStatus::Down {
            debug!(
                monitor = monitor.id,
                error = outcome.error.as_deref().unwrap_or(""),
                "check observed down"
            );
        }

        Ok(CheckReport {
            monitor_id: monitor.id,
            name: monitor.name.clone(),
            target: monitor.target.clone(),
            status: next.status,
            error: outcome.error,
            changed: next.changed,
            downtime_seconds,
        })
    }

    /// Announce maintenance windows that started or ended since the last
    /// couple of ticks. Channels created after a boundary do not get told
    /// about it, so a freshly added channel is not spammed with history.
    async fn dispatch_maintenance_boundaries(
        &self,
        checked_at: i64,
        channels: &[NotificationChannel],
    ) -> Result<()> {
        let from = checked_at - MAINTENANCE_LOOKBACK_SECS;

        let started = self.db.maintenance_windows_started_between(from, checked_at).await?;
        for window in &started {
            self.dispatch_maintenance_event(window, "started", window.starts_at, channels);
        }

        let ended = self.db.maintenance_windows_ended_between(from, checked_at).await?;
        for window in &ended {
            self.dispatch_maintenance_event(window, "ended", window.ends_at, channels);
        }

        Ok(())
    }

    fn dispatch_maintenance_event(
        &self,
        window: &MaintenanceWindow,
        boundary: &str,
        boundary_at: i64,
        channels: &[NotificationChannel],
    ) {
        let eligible: Vec<NotificationChannel> =
            channels.iter().filter(|c| c.created_at < boundary_at).cloned().collect();
        if eligible.is_empty() {
            return;
        }

        let event = NotificationEvent::new(
            &format!("maintenance.{boundary}"),
            format!("maintenance:{}:{}:{}", window.id, boundary, boundary_at),
            boundary_at,
            json!({
                "maintenance": {
                    "id": window.id,
                    "title": window.title,
                    "message": window.message,
                    "starts_at": window.starts_at,
                    "ends_at": window.ends_at,
                },
            }),
        );
        let db = self.db.clone();
        let transport = self.transport.clone();
        self.spawn_background(async move {
            dispatch_event(db.as_ref(), transport.as_ref(), &eligible, &event).await;
        });
    }
}
