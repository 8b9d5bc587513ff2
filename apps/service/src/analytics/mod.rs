//! Pure analytics over check history: latency distributions and uptime
//! interval arithmetic. Nothing here touches the database.

pub mod latency;
pub mod uptime;

pub use latency::{
    avg, build_latency_histogram, merge_latency_histograms, percentile_from_histogram,
    percentile_from_values, LatencyHistogram, LATENCY_BUCKETS_MS,
};
pub use uptime::{
    build_unknown_intervals, merge_intervals, overlap_seconds, range_to_seconds, sum_intervals,
    utc_day_start, Interval,
};
