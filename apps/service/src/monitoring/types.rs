use serde::{Deserialize, Serialize};

/// What a single probe observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
    Unknown,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
            CheckStatus::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "up" => Some(CheckStatus::Up),
            "down" => Some(CheckStatus::Down),
            "unknown" => Some(CheckStatus::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debounced monitor status. `Paused` and `Maintenance` are operator
/// overrides that the state machine never leaves on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Unknown,
    Paused,
    Maintenance,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Unknown => "unknown",
            MonitorStatus::Paused => "paused",
            MonitorStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "up" => Some(MonitorStatus::Up),
            "down" => Some(MonitorStatus::Down),
            "unknown" => Some(MonitorStatus::Unknown),
            "paused" => Some(MonitorStatus::Paused),
            "maintenance" => Some(MonitorStatus::Maintenance),
            _ => None,
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one check, after retries. Consumed by the state machine and
/// persisted as a `check_results` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    /// End-to-end latency of the attempt that produced the terminal result.
    pub latency_ms: Option<i64>,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    /// How many attempts were made, including the terminal one.
    pub attempts: u32,
}

impl CheckOutcome {
    /// Outcome for a target that failed validation: no network call is made.
    pub fn invalid_target(error: String) -> Self {
        Self { status: CheckStatus::Unknown, latency_ms: None, http_status: None, error: Some(error), attempts: 1 }
    }
}
