//! Uptime interval arithmetic.
//!
//! Uptime is computed over half-open second intervals. Windows where no
//! conclusive check exists are carved out as "unknown" and excluded from
//! both the numerator and the denominator.

use crate::database::models::CheckPoint;
use crate::monitoring::types::MonitorStatus;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Half-open `[start, end)` interval in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

/// Seconds for a configured analytics range name.
pub fn range_to_seconds(range: &str) -> Option<i64> {
    match range {
        "24h" => Some(86_400),
        "7d" => Some(604_800),
        "30d" => Some(2_592_000),
        "90d" => Some(7_776_000),
        _ => None,
    }
}

/// Floor a timestamp to the start of its UTC day.
pub fn utc_day_start(ts: i64) -> i64 {
    ts.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
}

/// Sort, drop empty intervals, and merge overlapping or touching ones.
pub fn merge_intervals(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted: Vec<Interval> =
        intervals.iter().copied().filter(|iv| iv.end > iv.start).collect();
    sorted.sort_by_key(|iv| (iv.start, iv.end));

    let mut merged: Vec<Interval> = Vec::new();
    for iv in sorted {
        match merged.last_mut() {
            Some(last) if iv.start <= last.end => last.end = last.end.max(iv.end),
            _ => merged.push(iv),
        }
    }
    merged
}

/// Total seconds covered, counting overlaps once.
pub fn sum_intervals(intervals: &[Interval]) -> i64 {
    merge_intervals(intervals).iter().map(|iv| iv.end - iv.start).sum()
}

/// Seconds covered by both lists.
pub fn overlap_seconds(a: &[Interval], b: &[Interval]) -> i64 {
    let a = merge_intervals(a);
    let b = merge_intervals(b);

    let mut total = 0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let start = a[i].start.max(b[j].start);
        let end = a[i].end.min(b[j].end);
        if end > start {
            total += end - start;
        }
        if a[i].end <= b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    total
}

/// Windows within `[range_start, range_end)` where the monitor's status is
/// unknowable: no check landed within twice the expected interval, the
/// latest observation was inconclusive, or no data exists at all.
///
/// Checks just outside the range participate so boundary windows are not
/// spuriously unknown.
pub fn build_unknown_intervals(
    range_start: i64,
    range_end: i64,
    interval_sec: i64,
    checks: &[CheckPoint],
) -> Vec<Interval> {
    if range_end <= range_start {
        return Vec::new();
    }
    if interval_sec <= 0 || checks.is_empty() {
        return vec![Interval { start: range_start, end: range_end }];
    }

    let mut sorted = checks.to_vec();
    sorted.sort_by_key(|c| c.checked_at);

    // A check "covers" up to twice its interval to absorb scheduling jitter.
    let tolerance = interval_sec * 2;
    let mut unknown: Vec<Interval> = Vec::new();

    // Before the first observation nothing is known.
    if sorted[0].checked_at > range_start {
        unknown.push(Interval { start: range_start, end: sorted[0].checked_at });
    }

    for (i, check) in sorted.iter().enumerate() {
        let next_at = sorted.get(i + 1).map(|c| c.checked_at);

        if check.status == MonitorStatus::Unknown {
            unknown.push(Interval { start: check.checked_at, end: next_at.unwrap_or(range_end) });
        }

        match next_at {
            Some(next_at) if next_at - check.checked_at > tolerance => {
                unknown.push(Interval { start: check.checked_at + tolerance, end: next_at });
            }
            None if range_end - check.checked_at > tolerance => {
                unknown.push(Interval { start: check.checked_at + tolerance, end: range_end });
            }
            _ => {}
        }
    }

    let clamped: Vec<Interval> = unknown
        .into_iter()
        .map(|iv| Interval { start: iv.start.max(range_start), end: iv.end.min(range_end) })
        .filter(|iv| iv.end > iv.start)
        .collect();

    merge_intervals(&clamped)
}
