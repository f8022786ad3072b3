use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::history::RollingHistory;
use crate::models::{AggregatedStatistics, ProbeResult};
use crate::stats;

#[derive(Debug)]
struct Counters {
    total_requests: u64,
    success_requests: u64,
    bytes_in: u64,
    latencies: Vec<Duration>,
    errors: RollingHistory<String>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

/// Thread-safe accumulator shared by all workers of a load test
///
/// `record` and `snapshot` take the same short-lived lock; the snapshot copies
/// the counters out and sorts outside of it so writers are never held up by
/// the statistics computation.
#[derive(Debug)]
pub struct MetricsAggregator {
    inner: Mutex<Counters>,
}

impl MetricsAggregator {
    /// Create an aggregator keeping at most `max_errors` recent error messages
    pub fn new(max_errors: usize) -> Self {
        Self {
            inner: Mutex::new(Counters {
                total_requests: 0,
                success_requests: 0,
                bytes_in: 0,
                latencies: Vec::new(),
                errors: RollingHistory::new(max_errors),
                started_at: None,
                finished_at: None,
            }),
        }
    }

    /// Mark the start of the measured period
    pub fn mark_started(&self) {
        let mut inner = self.inner.lock();
        inner.started_at = Some(Instant::now());
        inner.finished_at = None;
    }

    /// Freeze the measured period; later snapshots report the same duration
    pub fn mark_finished(&self) {
        let mut inner = self.inner.lock();
        if inner.finished_at.is_none() {
            inner.finished_at = Some(Instant::now());
        }
    }

    pub fn record(&self, result: &ProbeResult) {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;
        inner.bytes_in += result.response_size as u64;

        if result.success {
            inner.success_requests += 1;
            inner.latencies.push(result.latency);
        } else {
            inner.errors.push(describe_failure(result));
        }
    }

    /// Number of probes recorded so far
    pub fn total_requests(&self) -> u64 {
        self.inner.lock().total_requests
    }

    /// Total response bytes received so far
    pub fn bytes_in(&self) -> u64 {
        self.inner.lock().bytes_in
    }

    /// The most recent error messages, oldest first
    pub fn errors(&self) -> Vec<String> {
        self.inner.lock().errors.to_vec()
    }

    pub fn snapshot(&self) -> AggregatedStatistics {
        let (total, success, latencies, elapsed) = {
            let inner = self.inner.lock();
            let elapsed = match (inner.started_at, inner.finished_at) {
                (Some(start), Some(end)) => end.saturating_duration_since(start),
                (Some(start), None) => start.elapsed(),
                _ => Duration::ZERO,
            };
            (
                inner.total_requests,
                inner.success_requests,
                inner.latencies.clone(),
                elapsed,
            )
        };
        stats::summarize(total, success, latencies, elapsed)
    }
}

fn describe_failure(result: &ProbeResult) -> String {
    format!("{}: {}", result.endpoint_label, result.failure_reason())
}
