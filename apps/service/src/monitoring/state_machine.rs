//! Debouncing state machine.
//!
//! Raw probe results flap; the public status only flips after a configured
//! number of consecutive observations. Pure function so every transition is
//! unit-testable.

use serde::{Deserialize, Serialize};

use crate::monitoring::types::{CheckOutcome, CheckStatus, MonitorStatus};

const MAX_STREAK: u32 = 1000;

/// Persisted per-monitor state, as read from `monitor_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub status: MonitorStatus,
    pub last_changed_at: Option<i64>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

/// What the current tick decided for a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextState {
    pub status: MonitorStatus,
    pub last_changed_at: i64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutageAction {
    Open,
    Close,
    Update,
    None,
}

/// Consecutive-observation thresholds, sourced from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateThresholds {
    pub failures_to_down: u32,
    pub successes_to_up: u32,
}

impl Default for StateThresholds {
    fn default() -> Self {
        Self { failures_to_down: 2, successes_to_up: 2 }
    }
}

fn cap_streak(n: u32) -> u32 {
    n.min(MAX_STREAK)
}

/// Fold one check outcome into the monitor's state.
///
/// `paused` and `maintenance` are operator overrides: the machine reports
/// them back unchanged, zeroes the streaks, and takes no outage action.
pub fn compute_next_state(
    prev: Option<&StateSnapshot>,
    outcome: &CheckOutcome,
    checked_at: i64,
    thresholds: StateThresholds,
) -> (NextState, OutageAction) {
    let prev_status = prev.map(|s| s.status).unwrap_or(MonitorStatus::Unknown);

    if matches!(prev_status, MonitorStatus::Paused | MonitorStatus::Maintenance) {
        let last_changed_at = prev.and_then(|s| s.last_changed_at).unwrap_or(checked_at);
        return (
            NextState {
                status: prev_status,
                last_changed_at,
                consecutive_failures: 0,
                consecutive_successes: 0,
                changed: false,
            },
            OutageAction::None,
        );
    }

    let prev_failures = prev.map(|s| s.consecutive_failures).unwrap_or(0);
    let prev_successes = prev.map(|s| s.consecutive_successes).unwrap_or(0);
    let prev_changed_at = prev.and_then(|s| s.last_changed_at);

    let mut next_status = prev_status;
    let mut failures = 0;
    let mut successes = 0;
    let mut changed = false;

    match outcome.status {
        CheckStatus::Up => {
            successes = cap_streak(prev_successes + 1);
            match prev_status {
                MonitorStatus::Down => {
                    if successes >= thresholds.successes_to_up {
                        next_status = MonitorStatus::Up;
                        changed = true;
                    }
                }
                MonitorStatus::Unknown => {
                    next_status = MonitorStatus::Up;
                    changed = true;
                }
                _ => next_status = MonitorStatus::Up,
            }
        }
        CheckStatus::Down => {
            failures = cap_streak(prev_failures + 1);
            match prev_status {
                MonitorStatus::Up => {
                    if failures >= thresholds.failures_to_down {
                        next_status = MonitorStatus::Down;
                        changed = true;
                    }
                }
                MonitorStatus::Unknown => {
                    next_status = MonitorStatus::Down;
                    changed = true;
                }
                _ => next_status = MonitorStatus::Down,
            }
        }
        // Inconclusive checks never flip an established up/down state.
        CheckStatus::Unknown => {}
    }

    let last_changed_at = if changed { checked_at } else { prev_changed_at.unwrap_or(checked_at) };

    let outage_action = match (prev_status, next_status) {
        (MonitorStatus::Down, MonitorStatus::Down) => OutageAction::Update,
        (MonitorStatus::Down, _) => OutageAction::Close,
        (_, MonitorStatus::Down) => OutageAction::Open,
        _ => OutageAction::None,
    };

    (
        NextState {
            status: next_status,
            last_changed_at,
            consecutive_failures: failures,
            consecutive_successes: successes,
            changed,
        },
        outage_action,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn up_outcome() -> CheckOutcome {
        CheckOutcome {
            status: CheckStatus::Up,
            latency_ms: Some(42),
            http_status: Some(200),
            error: None,
            attempts: 1,
        }
    }

    fn down_outcome() -> CheckOutcome {
        CheckOutcome {
            status: CheckStatus::Down,
            latency_ms: Some(42),
            http_status: Some(503),
            error: Some("Unexpected HTTP status: 503".to_string()),
            attempts: 3,
        }
    }

    fn unknown_outcome() -> CheckOutcome {
        CheckOutcome {
            status: CheckStatus::Unknown,
            latency_ms: None,
            http_status: None,
            error: Some("target hostname is not allowed".to_string()),
            attempts: 1,
        }
    }

    fn snapshot(status: MonitorStatus, failures: u32, successes: u32) -> StateSnapshot {
        StateSnapshot {
            status,
            last_changed_at: Some(100),
            consecutive_failures: failures,
            consecutive_successes: successes,
        }
    }

    #[test]
    fn first_observation_settles_immediately() {
        let (next, action) =
            compute_next_state(None, &up_outcome(), 500, StateThresholds::default());
        assert_eq!(next.status, MonitorStatus::Up);
        assert!(next.changed);
        assert_eq!(next.last_changed_at, 500);
        assert_eq!(action, OutageAction::None);

        let (next, action) =
            compute_next_state(None, &down_outcome(), 500, StateThresholds::default());
        assert_eq!(next.status, MonitorStatus::Down);
        assert!(next.changed);
        assert_eq!(action, OutageAction::Open);
    }

    #[test]
    fn up_to_down_needs_consecutive_failures() {
        let thresholds = StateThresholds::default();

        // up, down, down, down against thresholds (2, 2).
        let prev = snapshot(MonitorStatus::Up, 0, 3);
        let (first, action) = compute_next_state(Some(&prev), &down_outcome(), 200, thresholds);
        assert_eq!(first.status, MonitorStatus::Up);
        assert_eq!(first.consecutive_failures, 1);
        assert_eq!(first.consecutive_successes, 0);
        assert!(!first.changed);
        assert_eq!(first.last_changed_at, 100);
        assert_eq!(action, OutageAction::None);

        let prev = StateSnapshot {
            status: first.status,
            last_changed_at: Some(first.last_changed_at),
            consecutive_failures: first.consecutive_failures,
            consecutive_successes: first.consecutive_successes,
        };
        let (second, action) = compute_next_state(Some(&prev), &down_outcome(), 260, thresholds);
        assert_eq!(second.status, MonitorStatus::Down);
        assert_eq!(second.consecutive_failures, 2);
        assert!(second.changed);
        assert_eq!(second.last_changed_at, 260);
        assert_eq!(action, OutageAction::Open);

        let prev = StateSnapshot {
            status: second.status,
            last_changed_at: Some(second.last_changed_at),
            consecutive_failures: second.consecutive_failures,
            consecutive_successes: second.consecutive_successes,
        };
        let (third, action) = compute_next_state(Some(&prev), &down_outcome(), 320, thresholds);
        assert_eq!(third.status, MonitorStatus::Down);
        assert_eq!(third.consecutive_failures, 3);
        assert!(!third.changed);
        assert_eq!(third.last_changed_at, 260);
        assert_eq!(action, OutageAction::Update);
    }

    #[test]
    fn down_to_up_needs_consecutive_successes() {
        let thresholds = StateThresholds::default();

        let prev = snapshot(MonitorStatus::Down, 5, 0);
        let (first, action) = compute_next_state(Some(&prev), &up_outcome(), 200, thresholds);
        assert_eq!(first.status, MonitorStatus::Down);
        assert_eq!(first.consecutive_successes, 1);
        assert!(!first.changed);
        assert_eq!(action, OutageAction::Update);

        let prev = snapshot(MonitorStatus::Down, 0, 1);
        let (second, action) = compute_next_state(Some(&prev), &up_outcome(), 260, thresholds);
        assert_eq!(second.status, MonitorStatus::Up);
        assert!(second.changed);
        assert_eq!(action, OutageAction::Close);
    }

    #[test]
    fn custom_thresholds_apply() {
        let thresholds = StateThresholds { failures_to_down: 1, successes_to_up: 3 };

        let prev = snapshot(MonitorStatus::Up, 0, 9);
        let (next, action) = compute_next_state(Some(&prev), &down_outcome(), 200, thresholds);
        assert_eq!(next.status, MonitorStatus::Down);
        assert!(next.changed);
        assert_eq!(action, OutageAction::Open);

        let prev = snapshot(MonitorStatus::Down, 0, 1);
        let (next, _) = compute_next_state(Some(&prev), &up_outcome(), 200, thresholds);
        assert_eq!(next.status, MonitorStatus::Down);
        assert_eq!(next.consecutive_successes, 2);
    }

    #[test]
    fn unknown_never_flips_established_state() {
        let prev = snapshot(MonitorStatus::Up, 0, 7);
        let (next, action) =
            compute_next_state(Some(&prev), &unknown_outcome(), 200, StateThresholds::default());
        assert_eq!(next.status, MonitorStatus::Up);
        assert_eq!(next.consecutive_failures, 0);
        assert_eq!(next.consecutive_successes, 0);
        assert!(!next.changed);
        assert_eq!(action, OutageAction::None);

        // During an outage an inconclusive check keeps the outage updated.
        let prev = snapshot(MonitorStatus::Down, 4, 0);
        let (next, action) =
            compute_next_state(Some(&prev), &unknown_outcome(), 200, StateThresholds::default());
        assert_eq!(next.status, MonitorStatus::Down);
        assert_eq!(action, OutageAction::Update);
    }

    #[test]
    fn operator_states_are_sticky() {
        for status in [MonitorStatus::Paused, MonitorStatus::Maintenance] {
            let prev = snapshot(status, 3, 3);
            let (next, action) =
                compute_next_state(Some(&prev), &down_outcome(), 200, StateThresholds::default());
            assert_eq!(next.status, status);
            assert_eq!(next.consecutive_failures, 0);
            assert_eq!(next.consecutive_successes, 0);
            assert!(!next.changed);
            assert_eq!(next.last_changed_at, 100);
            assert_eq!(action, OutageAction::None);
        }
    }

    #[test]
    fn streaks_are_capped() {
        let prev = snapshot(MonitorStatus::Down, 1000, 0);
        let (next, _) =
            compute_next_state(Some(&prev), &down_outcome(), 200, StateThresholds::default());
        assert_eq!(next.consecutive_failures, 1000);
    }
}
