//! Fixed-bucket latency histograms and percentile estimates.
//!
//! Histograms from different windows can be merged by element-wise addition,
//! so percentiles over any range are cheap to derive from stored buckets.

/// Bucket upper bounds in milliseconds. One overflow bucket follows.
pub const LATENCY_BUCKETS_MS: [i64; 21] = [
    25, 50, 75, 100, 150, 200, 300, 400, 500, 750, 1000, 1500, 2000, 3000, 5000, 7500, 10000,
    15000, 20000, 30000, 60000,
];

pub const HISTOGRAM_SLOTS: usize = LATENCY_BUCKETS_MS.len() + 1;

pub type LatencyHistogram = Vec<u64>;

/// Mean of the non-negative samples, rounded; `None` when there are none.
pub fn avg(values: &[i64]) -> Option<i64> {
    let clean: Vec<i64> = values.iter().copied().filter(|&v| v >= 0).collect();
    if clean.is_empty() {
        return None;
    }
    let sum: i64 = clean.iter().sum();
    Some((sum as f64 / clean.len() as f64).round() as i64)
}

/// Exact nearest-rank percentile (`ceil(p * N)`); `p` in `(0, 1]`.
pub fn percentile_from_values(values: &[i64], p: f64) -> Option<i64> {
    if values.is_empty() || !p.is_finite() || p <= 0.0 || p > 1.0 {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let idx = ((p * sorted.len() as f64).ceil() as usize)
        .saturating_sub(1)
        .min(sorted.len() - 1);
    Some(sorted[idx])
}

/// Bucket the samples. Negative samples clamp to zero, landing in the
/// first bucket, so every sample is counted.
pub fn build_latency_histogram(values: &[i64]) -> LatencyHistogram {
    let mut hist = vec![0u64; HISTOGRAM_SLOTS];

    for &v in values {
        let v = v.max(0);
        let slot = LATENCY_BUCKETS_MS
            .iter()
            .position(|&upper| v <= upper)
            .unwrap_or(HISTOGRAM_SLOTS - 1);
        hist[slot] += 1;
    }

    hist
}

/// Element-wise sum. Short inputs are treated as zero-padded.
pub fn merge_latency_histograms(hists: &[LatencyHistogram]) -> LatencyHistogram {
    let mut merged = vec![0u64; HISTOGRAM_SLOTS];
    for h in hists {
        for (i, slot) in merged.iter_mut().enumerate() {
            *slot += h.get(i).copied().unwrap_or(0);
        }
    }
    merged
}

/// Nearest-rank percentile over bucket upper bounds. The overflow bucket
/// reports the last configured bound.
pub fn percentile_from_histogram(hist: &[u64], p: f64) -> Option<i64> {
    if !p.is_finite() || p <= 0.0 || p > 1.0 {
        return None;
    }

    let total: u64 = hist.iter().sum();
    if total == 0 {
        return None;
    }

    let target = (p * total as f64).ceil() as u64;
    let mut acc = 0u64;
    let last_bound = LATENCY_BUCKETS_MS[LATENCY_BUCKETS_MS.len() - 1];

    for (i, &count) in hist.iter().enumerate() {
        acc += count;
        if acc >= target {
            return Some(LATENCY_BUCKETS_MS.get(i).copied().unwrap_or(last_bound));
        }
    }

    Some(last_bound)
}
