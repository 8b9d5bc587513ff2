use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::monitoring::state_machine::StateSnapshot;
use crate::monitoring::types::{CheckOutcome, MonitorStatus};
use crate::monitoring::{HttpCheckConfig, ProbeConfig, TcpCheckConfig};

/// Monitor model - a probe target owned by the admin boundary.
///
/// The engine treats everything except `last_checked_at` as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    pub kind: MonitorKind,
    pub target: String,
    pub interval_sec: i64,
    pub timeout_ms: i64,
    pub http_method: Option<String>,
    pub http_headers_json: Option<String>,
    pub http_body: Option<String>,
    pub expected_status_json: Option<String>,
    pub response_keyword: Option<String>,
    pub response_forbidden_keyword: Option<String>,
    pub is_active: bool,
    pub group_name: Option<String>,
    pub sort_order: i64,
    pub last_checked_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Monitor {
    /// Create a new HTTP or TCP monitor with engine defaults.
    pub fn new(name: String, kind: MonitorKind, target: String, now: i64) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name,
            kind,
            target,
            interval_sec: 60,
            timeout_ms: 10_000,
            http_method: None,
            http_headers_json: None,
            http_body: None,
            expected_status_json: None,
            response_keyword: None,
            response_forbidden_keyword: None,
            is_active: true,
            group_name: None,
            sort_order: 0,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn parse_headers_json(raw: Option<&str>) -> Vec<(String, String)> {
    let Some(raw) = raw else { return Vec::new() };
    match serde_json::from_str::<std::collections::BTreeMap<String, String>>(raw) {
        Ok(map) => map.into_iter().collect(),
        Err(err) => {
            warn!(error = %err, "ignoring malformed http_headers_json");
            Vec::new()
        }
    }
}

fn parse_expected_status_json(raw: Option<&str>) -> Option<Vec<u16>> {
    let raw = raw?;
    match serde_json::from_str::<Vec<u16>>(raw) {
        Ok(codes) if !codes.is_empty() => Some(codes),
        Ok(_) => None,
        Err(err) => {
            warn!(error = %err, "ignoring malformed expected_status_json");
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn http_probe(
    target: &str,
    timeout_ms: i64,
    method: Option<&str>,
    headers_json: Option<&str>,
    body: Option<&str>,
    expected_status_json: Option<&str>,
    response_keyword: Option<&str>,
    response_forbidden_keyword: Option<&str>,
) -> HttpCheckConfig {
    HttpCheckConfig {
        url: target.to_string(),
        timeout_ms: timeout_ms.max(0) as u64,
        method: method.unwrap_or("GET").to_string(),
        headers: parse_headers_json(headers_json),
        body: body.map(str::to_string),
        expected_status: parse_expected_status_json(expected_status_json),
        response_keyword: response_keyword.map(str::to_string),
        response_forbidden_keyword: response_forbidden_keyword.map(str::to_string),
    }
}

impl Monitor {
    /// Resolve the stored columns into a runnable probe.
    pub fn probe_config(&self) -> ProbeConfig {
        match self.kind {
            MonitorKind::Http => ProbeConfig::Http(http_probe(
                &self.target,
                self.timeout_ms,
                self.http_method.as_deref(),
                self.http_headers_json.as_deref(),
                self.http_body.as_deref(),
                self.expected_status_json.as_deref(),
                self.response_keyword.as_deref(),
                self.response_forbidden_keyword.as_deref(),
            )),
            MonitorKind::Tcp => ProbeConfig::Tcp(TcpCheckConfig {
                target: self.target.clone(),
                timeout_ms: self.timeout_ms.max(0) as u64,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    Http,
    Tcp,
}

impl MonitorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Http => "http",
            MonitorKind::Tcp => "tcp",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "http" => Some(MonitorKind::Http),
            "tcp" => Some(MonitorKind::Tcp),
            _ => None,
        }
    }
}

/// A monitor that is due for a check, joined with its current state row.
#[derive(Debug, Clone)]
pub struct DueMonitor {
    pub id: i64,
    pub name: String,
    pub kind: MonitorKind,
    pub target: String,
    pub interval_sec: i64,
    pub timeout_ms: i64,
    pub http_method: Option<String>,
    pub http_headers_json: Option<String>,
    pub http_body: Option<String>,
    pub expected_status_json: Option<String>,
    pub response_keyword: Option<String>,
    pub response_forbidden_keyword: Option<String>,
    pub state: Option<StateSnapshot>,
}

impl DueMonitor {
    pub fn probe_config(&self) -> ProbeConfig {
        match self.kind {
            MonitorKind::Http => ProbeConfig::Http(http_probe(
                &self.target,
                self.timeout_ms,
                self.http_method.as_deref(),
                self.http_headers_json.as_deref(),
                self.http_body.as_deref(),
                self.expected_status_json.as_deref(),
                self.response_keyword.as_deref(),
                self.response_forbidden_keyword.as_deref(),
            )),
            MonitorKind::Tcp => ProbeConfig::Tcp(TcpCheckConfig {
                target: self.target.clone(),
                timeout_ms: self.timeout_ms.max(0) as u64,
            }),
        }
    }
}

/// Append-only persisted form of a [`CheckOutcome`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResultRow {
    pub monitor_id: i64,
    pub checked_at: i64,
    pub outcome: CheckOutcome,
}

/// A historical check point, as consumed by the uptime analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckPoint {
    pub checked_at: i64,
    pub status: MonitorStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outage {
    pub id: i64,
    pub monitor_id: i64,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub initial_error: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    Webhook,
    GoogleChat,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Webhook => "webhook",
            ChannelKind::GoogleChat => "google-chat",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "webhook" => Some(ChannelKind::Webhook),
            "google-chat" => Some(ChannelKind::GoogleChat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: i64,
    pub name: String,
    pub kind: ChannelKind,
    pub config_json: String,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: i64,
    pub title: String,
    pub message: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub created_at: i64,
}

/// Raw row from `public_snapshots`.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub generated_at: i64,
    pub body_json: String,
}

/// Monitor + current status, as exposed on the public status page.
#[derive(Debug, Clone)]
pub struct MonitorStatusRow {
    pub id: i64,
    pub name: String,
    pub group_name: Option<String>,
    pub status: MonitorStatus,
    pub last_changed_at: Option<i64>,
}
