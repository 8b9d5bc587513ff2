//! Precomputed public status payload.
//!
//! The status page is read far more often than it changes, so each tick
//! writes a snapshot row and readers serve it while it is fresh. A stale or
//! corrupt snapshot falls back to a live compute; it never surfaces an
//! error to the public side.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::database::models::MaintenanceWindow;
use crate::database::Database;
use crate::monitoring::types::MonitorStatus;
use crate::settings::Settings;

pub const SNAPSHOT_KEY: &str = "status";

/// A snapshot older than this is not served.
pub const SNAPSHOT_FRESHNESS_SECS: i64 = 60;

/// How far ahead upcoming maintenance windows are surfaced.
const UPCOMING_HORIZON_SECS: i64 = 7 * 86_400;

const CACHE_CONTROL_FRESH: &str =
    "public, max-age=30, stale-while-revalidate=20, stale-if-error=20";
const CACHE_CONTROL_STALE: &str =
    "public, max-age=0, stale-while-revalidate=0, stale-if-error=0";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub up: u32,
    pub down: u32,
    pub maintenance: u32,
    pub paused: u32,
    pub unknown: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicMonitor {
    pub id: i64,
    pub name: String,
    pub group_name: Option<String>,
    pub status: MonitorStatus,
    pub last_changed_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicMaintenanceWindow {
    pub id: i64,
    pub title: String,
    pub message: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceOverview {
    pub active: Vec<PublicMaintenanceWindow>,
    pub upcoming: Vec<PublicMaintenanceWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicStatusPayload {
    pub generated_at: i64,
    pub site_title: String,
    pub site_description: String,
    pub site_timezone: String,
    pub overall_status: MonitorStatus,
    pub summary: StatusSummary,
    pub monitors: Vec<PublicMonitor>,
    pub maintenance_windows: MaintenanceOverview,
}

fn overall_status(summary: &StatusSummary) -> MonitorStatus {
    if summary.down > 0 {
        MonitorStatus::Down
    } else if summary.maintenance > 0 {
        MonitorStatus::Maintenance
    } else if summary.unknown > 0 {
        MonitorStatus::Unknown
    } else if summary.up > 0 {
        MonitorStatus::Up
    } else {
        MonitorStatus::Unknown
    }
}

fn public_window(window: &MaintenanceWindow) -> PublicMaintenanceWindow {
    PublicMaintenanceWindow {
        id: window.id,
        title: window.title.clone(),
        message: window.message.clone(),
        starts_at: window.starts_at,
        ends_at: window.ends_at,
    }
}

/// Build the public payload from live state.
pub async fn compute_public_status_payload(
    db: &dyn Database,
    settings: &Settings,
    now: i64,
) -> Result<PublicStatusPayload> {
    let rows = db.monitor_status_rows().await?;
    let in_maintenance: std::collections::HashSet<i64> =
        db.monitors_in_active_maintenance(now).await?.into_iter().collect();
    let windows = db.active_and_upcoming_maintenance(now, UPCOMING_HORIZON_SECS).await?;

    let mut summary = StatusSummary::default();
    let mut monitors = Vec::with_capacity(rows.len());
    for row in rows {
        // An active maintenance window overrides the observed status.
        let status =
            if in_maintenance.contains(&row.id) { MonitorStatus::Maintenance } else { row.status };
        match status {
            MonitorStatus::Up => summary.up += 1,
            MonitorStatus::Down => summary.down += 1,
            MonitorStatus::Maintenance => summary.maintenance += 1,
            MonitorStatus::Paused => summary.paused += 1,
            MonitorStatus::Unknown => summary.unknown += 1,
        }
        monitors.push(PublicMonitor {
            id: row.id,
            name: row.name,
            group_name: row.group_name,
            status,
            last_changed_at: row.last_changed_at,
        });
    }

    let (active, upcoming): (Vec<_>, Vec<_>) =
        windows.iter().partition(|w| w.starts_at <= now);

    Ok(PublicStatusPayload {
        generated_at: now,
        site_title: settings.site_title.clone(),
        site_description: settings.site_description.clone(),
        site_timezone: settings.site_timezone.clone(),
        overall_status: overall_status(&summary),
        summary,
        monitors,
        maintenance_windows: MaintenanceOverview {
            active: active.iter().map(|w| public_window(w)).collect(),
            upcoming: upcoming.iter().map(|w| public_window(w)).collect(),
        },
    })
}

/// Read the stored snapshot if it is fresh and parses. Returns the payload
/// and its age in seconds.
pub async fn read_status_snapshot(
    db: &dyn Database,
    now: i64,
) -> Result<Option<(PublicStatusPayload, i64)>> {
    let Some(row) = db.read_snapshot(SNAPSHOT_KEY).await? else {
        return Ok(None);
    };

    let age = now - row.generated_at;
    if age > SNAPSHOT_FRESHNESS_SECS {
        return Ok(None);
    }

    match serde_json::from_str::<PublicStatusPayload>(&row.body_json) {
        Ok(payload) => Ok(Some((payload, age.max(0)))),
        Err(err) => {
            warn!(error = %err, "stored status snapshot failed to parse");
            Ok(None)
        }
    }
}

pub async fn write_status_snapshot(
    db: &dyn Database,
    payload: &PublicStatusPayload,
    now: i64,
) -> Result<()> {
    let body_json = serde_json::to_string(payload)?;
    db.write_snapshot(SNAPSHOT_KEY, payload.generated_at, &body_json, now).await
}

/// Recompute and store the snapshot. Called at the end of every tick.
pub async fn refresh_public_status_snapshot(db: &dyn Database, now: i64) -> Result<()> {
    let settings = crate::settings::read_settings(db).await?;
    let payload = compute_public_status_payload(db, &settings, now).await?;
    write_status_snapshot(db, &payload, now).await
}

/// Cache-control header value for a snapshot of the given age.
pub fn cache_control_for_age(age: i64) -> &'static str {
    if age <= SNAPSHOT_FRESHNESS_SECS {
        CACHE_CONTROL_FRESH
    } else {
        CACHE_CONTROL_STALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Monitor, MonitorKind};
    use crate::database::repository::tests::test_db;
    use crate::monitoring::state_machine::NextState;

    async fn add_monitor(db: &crate::database::DatabaseImpl, name: &str) -> i64 {
        let monitor =
            Monitor::new(name.to_string(), MonitorKind::Http, "https://example.com/".to_string(), 0);
        db.insert_monitor(&monitor).await.unwrap()
    }

    async fn set_status(db: &crate::database::DatabaseImpl, id: i64, status: MonitorStatus) {
        let next = NextState {
            status,
            last_changed_at: 100,
            consecutive_failures: 0,
            consecutive_successes: 0,
            changed: true,
        };
        db.upsert_monitor_state(id, &next, None, 100).await.unwrap();
    }

    #[tokio::test]
    async fn payload_summarises_monitor_statuses() {
        let (_dir, db) = test_db().await;
        let a = add_monitor(&db, "a").await;
        let b = add_monitor(&db, "b").await;
        add_monitor(&db, "c").await; // no state row -> unknown

        set_status(&db, a, MonitorStatus::Up).await;
        set_status(&db, b, MonitorStatus::Down).await;

        let payload =
            compute_public_status_payload(&db, &Settings::default(), 1000).await.unwrap();
        assert_eq!(payload.generated_at, 1000);
        assert_eq!(payload.site_title, "Uptimer");
        assert_eq!(
            payload.summary,
            StatusSummary { up: 1, down: 1, maintenance: 0, paused: 0, unknown: 1 }
        );
        assert_eq!(payload.overall_status, MonitorStatus::Down);
        assert_eq!(payload.monitors.len(), 3);
    }

    #[tokio::test]
    async fn empty_site_reports_unknown() {
        let (_dir, db) = test_db().await;
        let payload =
            compute_public_status_payload(&db, &Settings::default(), 1000).await.unwrap();
        assert_eq!(payload.overall_status, MonitorStatus::Unknown);
        assert!(payload.monitors.is_empty());
    }

    #[tokio::test]
    async fn active_maintenance_overrides_status() {
        let (_dir, db) = test_db().await;
        let id = add_monitor(&db, "a").await;
        set_status(&db, id, MonitorStatus::Up).await;

        db_insert_window(&db, 1, 900, 1100, id).await;

        let payload =
            compute_public_status_payload(&db, &Settings::default(), 1000).await.unwrap();
        assert_eq!(payload.monitors[0].status, MonitorStatus::Maintenance);
        assert_eq!(payload.summary.maintenance, 1);
        assert_eq!(payload.overall_status, MonitorStatus::Maintenance);
        assert_eq!(payload.maintenance_windows.active.len(), 1);
        assert!(payload.maintenance_windows.upcoming.is_empty());
    }

    async fn db_insert_window(
        db: &crate::database::DatabaseImpl,
        id: i64,
        starts_at: i64,
        ends_at: i64,
        monitor_id: i64,
    ) {
        let conn = db.get_conn().await.unwrap();
        conn.execute(
            "INSERT INTO maintenance_windows (id, title, message, starts_at, ends_at, created_at) \
             VALUES (?, 'window', NULL, ?, ?, 0)",
            libsql::params![id, starts_at, ends_at],
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO maintenance_window_monitors (maintenance_window_id, monitor_id) \
             VALUES (?, ?)",
            libsql::params![id, monitor_id],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn snapshot_round_trip_and_freshness() {
        let (_dir, db) = test_db().await;
        add_monitor(&db, "a").await;

        refresh_public_status_snapshot(&db, 1000).await.unwrap();

        let (payload, age) = read_status_snapshot(&db, 1030).await.unwrap().unwrap();
        assert_eq!(payload.generated_at, 1000);
        assert_eq!(age, 30);

        // Beyond the freshness bound the snapshot is not served.
        assert!(read_status_snapshot(&db, 1061).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_ignored() {
        let (_dir, db) = test_db().await;
        db.write_snapshot(SNAPSHOT_KEY, 1000, "not json", 1000).await.unwrap();
        assert!(read_status_snapshot(&db, 1010).await.unwrap().is_none());
    }

    #[test]
    fn cache_control_tracks_freshness() {
        assert_eq!(cache_control_for_age(0), CACHE_CONTROL_FRESH);
        assert_eq!(cache_control_for_age(60), CACHE_CONTROL_FRESH);
        assert_eq!(cache_control_for_age(61), CACHE_CONTROL_STALE);
    }
}
