use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::config::LoadConfig;
use crate::error::ConfigError;
use crate::metrics::MetricsAggregator;
use crate::models::{AggregatedStatistics, ProbeRequest};
use crate::probe::Prober;
use crate::scenario::ScenarioCatalog;

/// Lifecycle of a load test; phases only ever move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LoadPhase {
    Idle,
    RampingUp,
    Running,
    Draining,
    Completed,
}

/// How a load test ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadStatus {
    /// Every worker ran for the full duration
    Completed,
    /// The precondition health check failed and no worker was started
    TargetUnreachable { reason: String },
}

/// Final statistics and errors of a load test
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub status: LoadStatus,
    pub statistics: AggregatedStatistics,
    /// Most recent error messages, oldest first
    pub errors: Vec<String>,
}

impl LoadOutcome {
    pub fn precondition_failed(&self) -> bool {
        matches!(self.status, LoadStatus::TargetUnreachable { .. })
    }
}

/// Start delay of worker `index` out of `users`, spreading starts linearly across `ramp_up`
pub fn ramp_up_delay(index: usize, users: usize, ramp_up: Duration) -> Duration {
    if users == 0 {
        return Duration::ZERO;
    }
    let nanos = ramp_up.as_nanos() * index as u128 / users as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Drives concurrent virtual users against the target
pub struct LoadDriver {
    config: LoadConfig,
    catalog: Arc<ScenarioCatalog>,
    prober: Arc<dyn Prober>,
    metrics: Arc<MetricsAggregator>,
    phase: Arc<watch::Sender<LoadPhase>>,
}

impl LoadDriver {
    pub fn new(
        config: LoadConfig,
        catalog: ScenarioCatalog,
        prober: Arc<dyn Prober>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (phase, _) = watch::channel(LoadPhase::Idle);
        Ok(Self {
            metrics: Arc::new(MetricsAggregator::new(config.max_errors)),
            config,
            catalog: Arc::new(catalog),
            prober,
            phase: Arc::new(phase),
        })
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Shared aggregator; snapshots may be taken while the test runs
    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        self.metrics.clone()
    }

    pub fn phase(&self) -> LoadPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadPhase> {
        self.phase.subscribe()
    }

    /// Run the test to completion
    ///
    /// Individual probe failures never stop the run. Only a failed
    /// precondition health check ends it early, before any worker starts.
    pub async fn run(self) -> LoadOutcome {
        let users = self.config.concurrent_users;
        info!(
            event = "load_test_started",
            url = %self.config.base_url,
            users,
            duration_secs = self.config.test_duration.as_secs_f64(),
            ramp_up_secs = self.config.ramp_up_time.as_secs_f64(),
            scenarios = self.catalog.scenarios().len(),
        );

        let health = ProbeRequest::get("precondition", &self.config.health_path, self.config.timeout);
        let check = self.prober.probe(&health).await;
        if !check.success {
            let reason = format!("health check failed: {}", check.failure_reason());
            error!(
                event = "precondition_failed",
                url = %self.config.base_url,
                reason = %reason,
            );
            advance(&self.phase, LoadPhase::Completed);
            return LoadOutcome {
                status: LoadStatus::TargetUnreachable {
                    reason: reason.clone(),
                },
                statistics: AggregatedStatistics::default(),
                errors: vec![reason],
            };
        }
        info!(event = "precondition_passed", latency_ms = check.latency.as_millis() as u64);

        advance(&self.phase, LoadPhase::RampingUp);
        self.metrics.mark_started();

        let started = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..users)
            .map(|id| {
                let worker = Worker {
                    id,
                    stagger: ramp_up_delay(id, users, self.config.ramp_up_time),
                    duration: self.config.test_duration,
                    timeout: self.config.timeout,
                    users,
                    catalog: self.catalog.clone(),
                    prober: self.prober.clone(),
                    metrics: self.metrics.clone(),
                    phase: self.phase.clone(),
                    started: started.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        for (id, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                warn!(event = "worker_failed", worker = id, error = %e);
            }
        }

        self.metrics.mark_finished();
        advance(&self.phase, LoadPhase::Completed);

        let statistics = self.metrics.snapshot();
        info!(
            event = "load_test_completed",
            total_requests = statistics.total_requests,
            success_requests = statistics.success_count,
            failure_requests = statistics.failure_count,
            requests_per_second = statistics.requests_per_second,
        );

        LoadOutcome {
            status: LoadStatus::Completed,
            statistics,
            errors: self.metrics.errors(),
        }
    }
}

/// Move the phase forward, ignoring transitions to an earlier phase
fn advance(phase: &watch::Sender<LoadPhase>, next: LoadPhase) {
    phase.send_if_modified(|current| {
        if next > *current {
            *current = next;
            true
        } else {
            false
        }
    });
}

struct Worker {
    id: usize,
    stagger: Duration,
    duration: Duration,
    /// Upper bound on every request timeout
    timeout: Duration,
    users: usize,
    catalog: Arc<ScenarioCatalog>,
    prober: Arc<dyn Prober>,
    metrics: Arc<MetricsAggregator>,
    phase: Arc<watch::Sender<LoadPhase>>,
    started: Arc<AtomicUsize>,
}

impl Worker {
    async fn run(self) {
        sleep(self.stagger).await;
        if self.started.fetch_add(1, Ordering::SeqCst) + 1 == self.users {
            advance(&self.phase, LoadPhase::Running);
        }
        debug!(event = "worker_started", worker = self.id, stagger_ms = self.stagger.as_millis() as u64);

        let start = Instant::now();
        let mut seq = 0u64;
        while start.elapsed() < self.duration {
            let scenario = self.catalog.select(seq);
            let mut request = scenario.to_request(self.id, seq);
            request.timeout = request.timeout.min(self.timeout);
            let result = self.prober.probe(&request).await;
            self.metrics.record(&result);
            seq += 1;

            if let Some(delay) = scenario.delay {
                sleep(delay).await;
            }
        }

        // A worker finishing before the last one started leaves the phase to later finishers
        if self.started.load(Ordering::SeqCst) == self.users {
            advance(&self.phase, LoadPhase::Running);
            advance(&self.phase, LoadPhase::Draining);
        }
        debug!(event = "worker_finished", worker = self.id, requests = seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProbeResult;
    use crate::scenario::ScenarioDefinition;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    /// Answers every request after a fixed pause and remembers the timeouts it was given
    struct PacedProber {
        pause: Duration,
        timeouts: Mutex<Vec<Duration>>,
    }

    impl PacedProber {
        fn new(pause: Duration) -> Arc<Self> {
            Arc::new(Self {
                pause,
                timeouts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Prober for PacedProber {
        async fn probe(&self, request: &ProbeRequest) -> ProbeResult {
            self.timeouts.lock().push(request.timeout);
            sleep(self.pause).await;
            ProbeResult::response(&request.label, 200, self.pause, 16, Utc::now())
        }
    }

    fn config(users: usize, duration: Duration, ramp_up: Duration) -> LoadConfig {
        LoadConfig {
            base_url: "http://svc.test".to_string(),
            concurrent_users: users,
            test_duration: duration,
            ramp_up_time: ramp_up,
            ..LoadConfig::default()
        }
    }

    fn single(scenario: ScenarioDefinition) -> ScenarioCatalog {
        ScenarioCatalog::new(vec![scenario]).unwrap()
    }

    #[test]
    fn ramp_up_spreads_starts_linearly() {
        let delays: Vec<_> = (0..4)
            .map(|i| ramp_up_delay(i, 4, Duration::from_secs(10)))
            .collect();
        assert_eq!(
            delays,
            [
                Duration::ZERO,
                Duration::from_millis(2500),
                Duration::from_millis(5000),
                Duration::from_millis(7500),
            ]
        );
    }

    #[test]
    fn zero_ramp_up_starts_everyone_at_once() {
        assert!((0..5).all(|i| ramp_up_delay(i, 5, Duration::ZERO).is_zero()));
    }

    #[test]
    fn phases_never_move_backwards() {
        let (tx, rx) = watch::channel(LoadPhase::Idle);
        advance(&tx, LoadPhase::Draining);
        advance(&tx, LoadPhase::Running);
        assert_eq!(*rx.borrow(), LoadPhase::Draining);
        advance(&tx, LoadPhase::Completed);
        assert_eq!(*rx.borrow(), LoadPhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn load_timeout_caps_scenario_timeouts() {
        let prober = PacedProber::new(Duration::from_millis(50));
        let mut cfg = config(2, Duration::from_millis(500), Duration::ZERO);
        cfg.timeout = Duration::from_secs(2);
        let catalog = ScenarioCatalog::new(vec![
            ScenarioDefinition::get("long", "/long", 1),
            ScenarioDefinition::get("short", "/short", 1).with_timeout(Duration::from_millis(500)),
        ])
        .unwrap();

        let outcome = LoadDriver::new(cfg, catalog, prober.clone())
            .unwrap()
            .run()
            .await;
        assert!(outcome.statistics.total_requests > 0);

        let timeouts = prober.timeouts.lock();
        assert!(timeouts.contains(&Duration::from_secs(2)));
        assert!(timeouts.contains(&Duration::from_millis(500)));
        assert!(timeouts.iter().all(|t| *t <= Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn running_is_published_when_duration_is_shorter_than_ramp_up() {
        let prober = PacedProber::new(Duration::from_millis(100));
        let driver = LoadDriver::new(
            config(4, Duration::from_secs(1), Duration::from_secs(8)),
            single(ScenarioDefinition::get("list", "/users", 1)),
            prober,
        )
        .unwrap();
        let phase = driver.subscribe();
        let task = tokio::spawn(driver.run());

        // Workers start at 0s, 2s, 4s and 6s after the precondition check; the first three are done by 5.5s
        sleep(Duration::from_millis(5500)).await;
        assert_eq!(*phase.borrow(), LoadPhase::RampingUp);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(*phase.borrow(), LoadPhase::Running);

        let outcome = task.await.unwrap();
        assert_eq!(outcome.status, LoadStatus::Completed);
        assert_eq!(*phase.borrow(), LoadPhase::Completed);
    }
}
