//! Summary statistics over probe latencies.
//!
//! Latency figures are computed over successful probes only. Failed probes
//! count towards the totals and the success rate but never towards latency.

use std::time::Duration;

use crate::models::{AggregatedStatistics, ProbeResult};

/// Below this many samples p95 is reported as the maximum latency
pub const P95_MIN_SAMPLES: usize = 20;

const QUANTILES: u128 = 20;
const P95_CUT: u128 = 19;

/// Build statistics from raw counters and the successful latencies
pub fn summarize(
    total_requests: u64,
    success_count: u64,
    mut latencies: Vec<Duration>,
    elapsed: Duration,
) -> AggregatedStatistics {
    latencies.sort_unstable();

    let success_rate = if total_requests > 0 {
        success_count as f64 / total_requests as f64 * 100.0
    } else {
        0.0
    };

    let duration_seconds = elapsed.as_secs_f64();
    let requests_per_second = if duration_seconds > 0.0 {
        total_requests as f64 / duration_seconds
    } else {
        0.0
    };

    AggregatedStatistics {
        total_requests,
        success_count,
        failure_count: total_requests.saturating_sub(success_count),
        success_rate,
        avg_latency: mean(&latencies),
        min_latency: latencies.first().copied().unwrap_or_default(),
        max_latency: latencies.last().copied().unwrap_or_default(),
        median_latency: median(&latencies),
        p95_latency: p95(&latencies),
        duration_seconds,
        requests_per_second,
    }
}

/// Build statistics from a set of retained probe results
pub fn summarize_results<'a, I>(results: I, elapsed: Duration) -> AggregatedStatistics
where
    I: IntoIterator<Item = &'a ProbeResult>,
{
    let mut total = 0u64;
    let mut success = 0u64;
    let mut latencies = Vec::new();
    for result in results {
        total += 1;
        if result.success {
            success += 1;
            latencies.push(result.latency);
        }
    }
    summarize(total, success, latencies, elapsed)
}

/// Arithmetic mean, zero for an empty slice
pub fn mean(latencies: &[Duration]) -> Duration {
    if latencies.is_empty() {
        return Duration::ZERO;
    }
    let sum: u128 = latencies.iter().map(Duration::as_nanos).sum();
    from_nanos(sum / latencies.len() as u128)
}

/// Median of a sorted slice; the mean of the two middle values for even sizes
pub fn median(sorted: &[Duration]) -> Duration {
    let n = sorted.len();
    match n {
        0 => Duration::ZERO,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => from_nanos((sorted[n / 2 - 1].as_nanos() + sorted[n / 2].as_nanos()) / 2),
    }
}

/// 95th percentile of a sorted slice
///
/// With at least [`P95_MIN_SAMPLES`] samples this is the 19th of the 20
/// exclusive quantile cut points: rank `19 * (n + 1) / 20`, linearly
/// interpolated between its two neighbouring order statistics. With fewer
/// samples it is the maximum.
pub fn p95(sorted: &[Duration]) -> Duration {
    let n = sorted.len();
    if n == 0 {
        return Duration::ZERO;
    }
    if n < P95_MIN_SAMPLES {
        return sorted[n - 1];
    }

    let m = n as u128 + 1;
    let j = (P95_CUT * m / QUANTILES).clamp(1, n as u128 - 1);
    let delta = (P95_CUT * m - j * QUANTILES).min(QUANTILES);

    let j = j as usize;
    let lower = sorted[j - 1].as_nanos();
    let upper = sorted[j].as_nanos();
    from_nanos((lower * (QUANTILES - delta) + upper * delta) / QUANTILES)
}

fn from_nanos(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
