use anyhow::Result;
use async_trait::async_trait;
use libsql::params;
use uuid::Uuid;

use super::models::{
    ChannelKind, CheckResultRow, DueMonitor, MaintenanceWindow, Monitor, MonitorKind,
    MonitorStatusRow, NotificationChannel, Outage, SnapshotRow,
};
use crate::monitoring::state_machine::{NextState, StateSnapshot};
use crate::monitoring::types::{CheckStatus, MonitorStatus};
use crate::pool::LibsqlPool;

/// Database trait for abstracting database operations
#[async_trait]
pub trait Database: Send + Sync {
    // Monitors

    /// List all monitors, ordered for display.
    async fn list_monitors(&self) -> Result<Vec<Monitor>>;

    /// Get a monitor by id.
    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>>;

    /// Insert a monitor, returning its row id.
    async fn insert_monitor(&self, monitor: &Monitor) -> Result<i64>;

    /// Update a monitor (all editable fields).
    async fn update_monitor(&self, monitor: &Monitor) -> Result<()>;

    /// Delete a monitor; history rows cascade.
    async fn delete_monitor(&self, id: i64) -> Result<()>;

    /// Active monitors whose interval has elapsed, joined with their state.
    async fn due_monitors(&self, now: i64) -> Result<Vec<DueMonitor>>;

    /// Stamp `last_checked_at` after a check completes.
    async fn mark_monitor_checked(&self, id: i64, now: i64) -> Result<()>;

    // Check history

    async fn insert_check_result(&self, row: &CheckResultRow) -> Result<()>;

    /// Check rows for one monitor within `[from, to]`, ascending.
    async fn check_results_between(
        &self,
        monitor_id: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<CheckResultRow>>;

    /// Delete up to `limit` check rows older than `cutoff`; returns rows deleted.
    async fn delete_check_results_before(&self, cutoff: i64, limit: u64) -> Result<u64>;

    // Monitor state

    async fn get_monitor_state(&self, monitor_id: i64) -> Result<Option<StateSnapshot>>;

    async fn upsert_monitor_state(
        &self,
        monitor_id: i64,
        next: &NextState,
        last_error: Option<&str>,
        now: i64,
    ) -> Result<()>;

    // Outages

    async fn open_outage(&self, monitor_id: i64, started_at: i64, error: Option<&str>)
        -> Result<()>;

    /// Refresh `last_error` on the open outage, if any.
    async fn update_open_outage(&self, monitor_id: i64, last_error: Option<&str>) -> Result<()>;

    async fn close_outage(&self, monitor_id: i64, ended_at: i64) -> Result<()>;

    async fn outage_history(&self, monitor_id: i64, limit: u32) -> Result<Vec<Outage>>;

    // Lease

    /// Try to claim a named lease until `now + lease_secs`. A lease whose
    /// `expires_at` has passed can be re-claimed by anyone; a live lease
    /// cannot. Returns whether this caller won.
    async fn acquire_lease(&self, name: &str, now: i64, lease_secs: i64) -> Result<bool>;

    // Settings

    async fn read_setting_rows(&self) -> Result<Vec<(String, String)>>;

    async fn upsert_setting(&self, key: &str, value: &str) -> Result<()>;

    // Notification channels and deliveries

    /// Insert a channel, returning its row id.
    async fn insert_channel(&self, channel: &NotificationChannel) -> Result<i64>;

    async fn list_active_channels(&self) -> Result<Vec<NotificationChannel>>;

    async fn get_channel(&self, id: i64) -> Result<Option<NotificationChannel>>;

    /// Claim `(event_key, channel_id)` for delivery. Exactly one caller wins
    /// per pair; the placeholder row is finalized after the send.
    async fn claim_notification_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
        now: i64,
    ) -> Result<bool>;

    async fn finalize_notification_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
        status: &str,
        http_status: Option<u16>,
        error: Option<&str>,
    ) -> Result<()>;

    // Maintenance windows

    /// Ids of monitors covered by a maintenance window active at `now`.
    async fn monitors_in_active_maintenance(&self, now: i64) -> Result<Vec<i64>>;

    /// Windows with `starts_at` in `(from, to]`.
    async fn maintenance_windows_started_between(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<MaintenanceWindow>>;

    /// Windows with `ends_at` in `(from, to]`.
    async fn maintenance_windows_ended_between(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<MaintenanceWindow>>;

    /// Windows still running at `now` or starting within `horizon` seconds.
    async fn active_and_upcoming_maintenance(
        &self,
        now: i64,
        horizon: i64,
    ) -> Result<Vec<MaintenanceWindow>>;

    // Public snapshots

    async fn read_snapshot(&self, name: &str) -> Result<Option<SnapshotRow>>;

    async fn write_snapshot(
        &self,
        name: &str,
        generated_at: i64,
        body_json: &str,
        now: i64,
    ) -> Result<()>;

    /// Active monitors with their debounced status, for the status page.
    async fn monitor_status_rows(&self) -> Result<Vec<MonitorStatusRow>>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    pub(crate) async fn get_conn(
        &self,
    ) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

const MONITOR_COLUMNS: &str = "id, uuid, name, kind, target, interval_sec, timeout_ms, \
     http_method, http_headers_json, http_body, expected_status_json, response_keyword, \
     response_forbidden_keyword, is_active, group_name, sort_order, last_checked_at, \
     created_at, updated_at";

fn monitor_from_row(row: &libsql::Row) -> Result<Monitor> {
    let uuid_str: String = row.get(1)?;
    let kind_str: String = row.get(3)?;
    let kind = MonitorKind::parse(&kind_str)
        .ok_or_else(|| anyhow::anyhow!("unknown monitor kind: {kind_str}"))?;

    Ok(Monitor {
        id: Some(row.get(0)?),
        uuid: Uuid::parse_str(&uuid_str)?,
        name: row.get(2)?,
        kind,
        target: row.get(4)?,
        interval_sec: row.get(5)?,
        timeout_ms: row.get(6)?,
        http_method: row.get(7)?,
        http_headers_json: row.get(8)?,
        http_body: row.get(9)?,
        expected_status_json: row.get(10)?,
        response_keyword: row.get(11)?,
        response_forbidden_keyword: row.get(12)?,
        is_active: row.get::<i64>(13)? != 0,
        group_name: row.get(14)?,
        sort_order: row.get(15)?,
        last_checked_at: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn channel_from_row(row: &libsql::Row) -> Result<NotificationChannel> {
    let kind_str: String = row.get(2)?;
    let kind = ChannelKind::parse(&kind_str)
        .ok_or_else(|| anyhow::anyhow!("unknown channel kind: {kind_str}"))?;

    Ok(NotificationChannel {
        id: row.get(0)?,
        name: row.get(1)?,
        kind,
        config_json: row.get(3)?,
        is_active: row.get::<i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

fn maintenance_window_from_row(row: &libsql::Row) -> Result<MaintenanceWindow> {
    Ok(MaintenanceWindow {
        id: row.get(0)?,
        title: row.get(1)?,
        message: row.get(2)?,
        starts_at: row.get(3)?,
        ends_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn list_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY sort_order, name");
        let mut rows = conn.query(&sql, ()).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?");
        let mut rows = conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_monitor(&self, monitor: &Monitor) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitors (uuid, name, kind, target, interval_sec, timeout_ms, \
             http_method, http_headers_json, http_body, expected_status_json, \
             response_keyword, response_forbidden_keyword, is_active, group_name, \
             sort_order, last_checked_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                monitor.uuid.to_string(),
                monitor.name.clone(),
                monitor.kind.as_str(),
                monitor.target.clone(),
                monitor.interval_sec,
                monitor.timeout_ms,
                monitor.http_method.clone(),
                monitor.http_headers_json.clone(),
                monitor.http_body.clone(),
                monitor.expected_status_json.clone(),
                monitor.response_keyword.clone(),
                monitor.response_forbidden_keyword.clone(),
                monitor.is_active as i64,
                monitor.group_name.clone(),
                monitor.sort_order,
                monitor.last_checked_at,
                monitor.created_at,
                monitor.updated_at,
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<()> {
        let id = monitor.id.ok_or_else(|| anyhow::anyhow!("monitor has no id"))?;
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET name = ?, kind = ?, target = ?, interval_sec = ?, \
             timeout_ms = ?, http_method = ?, http_headers_json = ?, http_body = ?, \
             expected_status_json = ?, response_keyword = ?, response_forbidden_keyword = ?, \
             is_active = ?, group_name = ?, sort_order = ?, updated_at = ? WHERE id = ?",
            params![
                monitor.name.clone(),
                monitor.kind.as_str(),
                monitor.target.clone(),
                monitor.interval_sec,
                monitor.timeout_ms,
                monitor.http_method.clone(),
                monitor.http_headers_json.clone(),
                monitor.http_body.clone(),
                monitor.expected_status_json.clone(),
                monitor.response_keyword.clone(),
                monitor.response_forbidden_keyword.clone(),
                monitor.is_active as i64,
                monitor.group_name.clone(),
                monitor.sort_order,
                monitor.updated_at,
                id,
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_monitor(&self, id: i64) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM monitors WHERE id = ?", params![id]).await?;
        Ok(())
    }

    async fn due_monitors(&self, now: i64) -> Result<Vec<DueMonitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT m.id, m.name, m.kind, m.target, m.interval_sec, m.timeout_ms, \
                 m.http_method, m.http_headers_json, m.http_body, m.expected_status_json, \
                 m.response_keyword, m.response_forbidden_keyword, \
                 s.status, s.last_changed_at, s.consecutive_failures, s.consecutive_successes \
                 FROM monitors m LEFT JOIN monitor_state s ON s.monitor_id = m.id \
                 WHERE m.is_active = 1 \
                 AND (m.last_checked_at IS NULL OR m.last_checked_at + m.interval_sec <= ?)",
                params![now],
            )
            .await?;

        let mut due = Vec::new();
        while let Some(row) = rows.next().await? {
            let kind_str: String = row.get(2)?;
            let kind = MonitorKind::parse(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("unknown monitor kind: {kind_str}"))?;

            let state = match row.get::<Option<String>>(12)? {
                Some(status_str) => {
                    let status = MonitorStatus::parse(&status_str)
                        .ok_or_else(|| anyhow::anyhow!("unknown monitor status: {status_str}"))?;
                    Some(StateSnapshot {
                        status,
                        last_changed_at: row.get(13)?,
                        consecutive_failures: row.get::<i64>(14)? as u32,
                        consecutive_successes: row.get::<i64>(15)? as u32,
                    })
                }
                None => None,
            };

            due.push(DueMonitor {
                id: row.get(0)?,
                name: row.get(1)?,
                kind,
                target: row.get(3)?,
                interval_sec: row.get(4)?,
                timeout_ms: row.get(5)?,
                http_method: row.get(6)?,
                http_headers_json: row.get(7)?,
                http_body: row.get(8)?,
                expected_status_json: row.get(9)?,
                response_keyword: row.get(10)?,
                response_forbidden_keyword: row.get(11)?,
                state,
            });
        }
        Ok(due)
    }

    async fn mark_monitor_checked(&self, id: i64, now: i64) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute("UPDATE monitors SET last_checked_at = ? WHERE id = ?", params![now, id])
            .await?;
        Ok(())
    }

    async fn insert_check_result(&self, row: &CheckResultRow) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO check_results (monitor_id, checked_at, status, latency_ms, \
             http_status, error, attempts) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                row.monitor_id,
                row.checked_at,
                row.outcome.status.as_str(),
                row.outcome.latency_ms,
                row.outcome.http_status.map(|s| s as i64),
                row.outcome.error.clone(),
                row.outcome.attempts as i64,
            ],
        )
        .await?;
        Ok(())
    }

    async fn check_results_between(
        &self,
        monitor_id: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<CheckResultRow>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT monitor_id, checked_at, status, latency_ms, http_status, error, attempts \
                 FROM check_results WHERE monitor_id = ? AND checked_at >= ? AND checked_at <= ? \
                 ORDER BY checked_at",
                params![monitor_id, from, to],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let status_str: String = row.get(2)?;
            let status = CheckStatus::parse(&status_str)
                .ok_or_else(|| anyhow::anyhow!("unknown check status: {status_str}"))?;

            results.push(CheckResultRow {
                monitor_id: row.get(0)?,
                checked_at: row.get(1)?,
                outcome: crate::monitoring::types::CheckOutcome {
                    status,
                    latency_ms: row.get(3)?,
                    http_status: row.get::<Option<i64>>(4)?.map(|s| s as u16),
                    error: row.get(5)?,
                    attempts: row.get::<i64>(6)? as u32,
                },
            });
        }
        Ok(results)
    }

    async fn delete_check_results_before(&self, cutoff: i64, limit: u64) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM check_results WHERE id IN \
                 (SELECT id FROM check_results WHERE checked_at < ? LIMIT ?)",
                params![cutoff, limit as i64],
            )
            .await?;
        Ok(deleted)
    }

    async fn get_monitor_state(&self, monitor_id: i64) -> Result<Option<StateSnapshot>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT status, last_changed_at, consecutive_failures, consecutive_successes \
                 FROM monitor_state WHERE monitor_id = ?",
                params![monitor_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let status_str: String = row.get(0)?;
                let status = MonitorStatus::parse(&status_str)
                    .ok_or_else(|| anyhow::anyhow!("unknown monitor status: {status_str}"))?;
                Ok(Some(StateSnapshot {
                    status,
                    last_changed_at: row.get(1)?,
                    consecutive_failures: row.get::<i64>(2)? as u32,
                    consecutive_successes: row.get::<i64>(3)? as u32,
                }))
            }
            None => Ok(None),
        }
    }

    async fn upsert_monitor_state(
        &self,
        monitor_id: i64,
        next: &NextState,
        last_error: Option<&str>,
        now: i64,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitor_state (monitor_id, status, last_changed_at, \
             consecutive_failures, consecutive_successes, last_error, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(monitor_id) DO UPDATE SET status = excluded.status, \
             last_changed_at = excluded.last_changed_at, \
             consecutive_failures = excluded.consecutive_failures, \
             consecutive_successes = excluded.consecutive_successes, \
             last_error = excluded.last_error, updated_at = excluded.updated_at",
            params![
                monitor_id,
                next.status.as_str(),
                next.last_changed_at,
                next.consecutive_failures as i64,
                next.consecutive_successes as i64,
                last_error,
                now,
            ],
        )
        .await?;
        Ok(())
    }

    async fn open_outage(
        &self,
        monitor_id: i64,
        started_at: i64,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO outages (monitor_id, started_at, initial_error, last_error) \
             VALUES (?, ?, ?, ?)",
            params![monitor_id, started_at, error, error],
        )
        .await?;
        Ok(())
    }

    async fn update_open_outage(&self, monitor_id: i64, last_error: Option<&str>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE outages SET last_error = COALESCE(?, last_error) \
             WHERE monitor_id = ? AND ended_at IS NULL",
            params![last_error, monitor_id],
        )
        .await?;
        Ok(())
    }

    async fn close_outage(&self, monitor_id: i64, ended_at: i64) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE outages SET ended_at = ? WHERE monitor_id = ? AND ended_at IS NULL",
            params![ended_at, monitor_id],
        )
        .await?;
        Ok(())
    }

    async fn outage_history(&self, monitor_id: i64, limit: u32) -> Result<Vec<Outage>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_id, started_at, ended_at, initial_error, last_error \
                 FROM outages WHERE monitor_id = ? ORDER BY started_at DESC LIMIT ?",
                params![monitor_id, limit as i64],
            )
            .await?;

        let mut outages = Vec::new();
        while let Some(row) = rows.next().await? {
            outages.push(Outage {
                id: row.get(0)?,
                monitor_id: row.get(1)?,
                started_at: row.get(2)?,
                ended_at: row.get(3)?,
                initial_error: row.get(4)?,
                last_error: row.get(5)?,
            });
        }
        Ok(outages)
    }

    async fn acquire_lease(&self, name: &str, now: i64, lease_secs: i64) -> Result<bool> {
        let conn = self.get_conn().await?;
        let affected = conn
            .execute(
                "INSERT INTO locks (name, expires_at) VALUES (?, ?) \
                 ON CONFLICT(name) DO UPDATE SET expires_at = excluded.expires_at \
                 WHERE locks.expires_at <= ?",
                params![name, now + lease_secs, now],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn read_setting_rows(&self) -> Result<Vec<(String, String)>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT key, value FROM settings", ()).await?;

        let mut settings = Vec::new();
        while let Some(row) = rows.next().await? {
            settings.push((row.get(0)?, row.get(1)?));
        }
        Ok(settings)
    }

    async fn upsert_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .await?;
        Ok(())
    }

    async fn insert_channel(&self, channel: &NotificationChannel) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notification_channels (name, kind, config_json, is_active, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                channel.name.clone(),
                channel.kind.as_str(),
                channel.config_json.clone(),
                channel.is_active as i64,
                channel.created_at,
                channel.created_at,
            ],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    async fn list_active_channels(&self) -> Result<Vec<NotificationChannel>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, kind, config_json, is_active, created_at \
                 FROM notification_channels WHERE is_active = 1 ORDER BY id",
                (),
            )
            .await?;

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(channel_from_row(&row)?);
        }
        Ok(channels)
    }

    async fn get_channel(&self, id: i64) -> Result<Option<NotificationChannel>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, kind, config_json, is_active, created_at \
                 FROM notification_channels WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(channel_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn claim_notification_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
        now: i64,
    ) -> Result<bool> {
        let conn = self.get_conn().await?;
        // Placeholder row; stays 'failed'/'pending' if the process dies mid-send.
        let affected = conn
            .execute(
                "INSERT OR IGNORE INTO notification_deliveries \
                 (event_key, channel_id, status, error, created_at) \
                 VALUES (?, ?, 'failed', 'pending', ?)",
                params![event_key, channel_id, now],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn finalize_notification_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
        status: &str,
        http_status: Option<u16>,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE notification_deliveries SET status = ?, http_status = ?, error = ? \
             WHERE event_key = ? AND channel_id = ?",
            params![status, http_status.map(|s| s as i64), error, event_key, channel_id],
        )
        .await?;
        Ok(())
    }

    async fn monitors_in_active_maintenance(&self, now: i64) -> Result<Vec<i64>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT DISTINCT mwm.monitor_id FROM maintenance_window_monitors mwm \
                 JOIN maintenance_windows mw ON mw.id = mwm.maintenance_window_id \
                 WHERE mw.starts_at <= ? AND mw.ends_at > ?",
                params![now, now],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    async fn maintenance_windows_started_between(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<MaintenanceWindow>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, title, message, starts_at, ends_at, created_at \
                 FROM maintenance_windows WHERE starts_at > ? AND starts_at <= ?",
                params![from, to],
            )
            .await?;

        let mut windows = Vec::new();
        while let Some(row) = rows.next().await? {
            windows.push(maintenance_window_from_row(&row)?);
        }
        Ok(windows)
    }

    async fn maintenance_windows_ended_between(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<MaintenanceWindow>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, title, message, starts_at, ends_at, created_at \
                 FROM maintenance_windows WHERE ends_at > ? AND ends_at <= ?",
                params![from, to],
            )
            .await?;

        let mut windows = Vec::new();
        while let Some(row) = rows.next().await? {
            windows.push(maintenance_window_from_row(&row)?);
        }
        Ok(windows)
    }

    async fn active_and_upcoming_maintenance(
        &self,
        now: i64,
        horizon: i64,
    ) -> Result<Vec<MaintenanceWindow>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, title, message, starts_at, ends_at, created_at \
                 FROM maintenance_windows WHERE ends_at > ? AND starts_at <= ? \
                 ORDER BY starts_at",
                params![now, now + horizon],
            )
            .await?;

        let mut windows = Vec::new();
        while let Some(row) = rows.next().await? {
            windows.push(maintenance_window_from_row(&row)?);
        }
        Ok(windows)
    }

    async fn read_snapshot(&self, name: &str) -> Result<Option<SnapshotRow>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT generated_at, body_json FROM public_snapshots WHERE name = ?",
                params![name],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                Ok(Some(SnapshotRow { generated_at: row.get(0)?, body_json: row.get(1)? }))
            }
            None => Ok(None),
        }
    }

    async fn write_snapshot(
        &self,
        name: &str,
        generated_at: i64,
        body_json: &str,
        now: i64,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO public_snapshots (name, generated_at, body_json, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET generated_at = excluded.generated_at, \
             body_json = excluded.body_json, updated_at = excluded.updated_at",
            params![name, generated_at, body_json, now],
        )
        .await?;
        Ok(())
    }

    async fn monitor_status_rows(&self) -> Result<Vec<MonitorStatusRow>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT m.id, m.name, m.group_name, s.status, s.last_changed_at \
                 FROM monitors m LEFT JOIN monitor_state s ON s.monitor_id = m.id \
                 WHERE m.is_active = 1 ORDER BY m.sort_order, m.name",
                (),
            )
            .await?;

        let mut statuses = Vec::new();
        while let Some(row) = rows.next().await? {
            let status = match row.get::<Option<String>>(3)? {
                Some(raw) => MonitorStatus::parse(&raw)
                    .ok_or_else(|| anyhow::anyhow!("unknown monitor status: {raw}"))?,
                None => MonitorStatus::Unknown,
            };
            statuses.push(MonitorStatusRow {
                id: row.get(0)?,
                name: row.get(1)?,
                group_name: row.get(2)?,
                status,
                last_changed_at: row.get(4)?,
            });
        }
        Ok(statuses)
    }
}
