use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};

use crate::alert::{AlertEvent, Notifier, evaluate};
use crate::config::{ALERT_HISTORY_CAPACITY, MonitorConfig};
use crate::error::ConfigError;
use crate::history::RollingHistory;
use crate::models::{ProbeRequest, ProbeResult};
use crate::probe::Prober;
use crate::report::{self, MonitorReport};

/// Label of the primary health probe in the health history
pub const HEALTH_CHECK_LABEL: &str = "health_check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Stopped,
    Running,
}

/// Everything observed in a single tick
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub health: ProbeResult,
    pub endpoints: Vec<ProbeResult>,
    pub alert: Option<AlertEvent>,
}

/// Histories and final report of a finished monitoring loop
#[derive(Debug, Clone)]
pub struct MonitorRun {
    pub report: MonitorReport,
    pub ticks: u64,
    pub health: RollingHistory<ProbeResult>,
    pub endpoints: RollingHistory<ProbeResult>,
    pub alerts: RollingHistory<AlertEvent>,
}

/// Cloneable trigger that asks a running monitor to stop at its next tick boundary
#[derive(Debug, Clone)]
pub struct StopSignal(Arc<watch::Sender<bool>>);

impl StopSignal {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Handle to a monitor running on its own task
#[derive(Debug)]
pub struct MonitorHandle {
    stop: StopSignal,
    state: watch::Receiver<MonitorState>,
    task: JoinHandle<MonitorRun>,
}

impl MonitorHandle {
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.trigger();
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Wait for the loop to exit and collect its final report
    pub async fn join(self) -> Result<MonitorRun, JoinError> {
        self.task.await
    }

    pub async fn stop_and_join(self) -> Result<MonitorRun, JoinError> {
        self.stop();
        self.join().await
    }
}

/// Periodic health checker
///
/// The loop is post-work-anchored: after a tick's probes, evaluation and
/// alert dispatch complete, it sleeps for the full check interval. Slow
/// probes therefore stretch the period instead of causing back-to-back ticks.
pub struct HealthMonitor {
    config: MonitorConfig,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    health: RollingHistory<ProbeResult>,
    endpoints: RollingHistory<ProbeResult>,
    alerts: RollingHistory<AlertEvent>,
    ticks: u64,
}

impl HealthMonitor {
    pub fn new(
        config: MonitorConfig,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            health: RollingHistory::new(config.health_capacity),
            endpoints: RollingHistory::new(config.endpoint_capacity),
            alerts: RollingHistory::new(ALERT_HISTORY_CAPACITY),
            ticks: 0,
            config,
            prober,
            notifier,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn health_history(&self) -> &RollingHistory<ProbeResult> {
        &self.health
    }

    pub fn endpoint_history(&self) -> &RollingHistory<ProbeResult> {
        &self.endpoints
    }

    pub fn alert_history(&self) -> &RollingHistory<AlertEvent> {
        &self.alerts
    }

    /// Report over the configured window ending now
    pub fn generate_report(&self) -> MonitorReport {
        report::generate(
            &self.health,
            &self.endpoints,
            self.config.report_window,
            self.config.min_success_rate,
            chrono::Utc::now(),
        )
    }

    /// Probe, record, evaluate and dispatch once
    pub async fn run_single_check(&mut self) -> CheckOutcome {
        let timeout = self.config.response_timeout;

        let primary = ProbeRequest::get(HEALTH_CHECK_LABEL, &self.config.health_path, timeout);
        let health = self.prober.probe(&primary).await;
        self.health.push(health.clone());

        // The whole batch completes before evaluation
        let requests: Vec<ProbeRequest> = self
            .config
            .endpoints
            .iter()
            .map(|endpoint| ProbeRequest {
                label: endpoint.label.clone(),
                method: endpoint.method.clone(),
                path: endpoint.path.clone(),
                body: None,
                timeout,
            })
            .collect();
        let endpoints = join_all(requests.iter().map(|r| self.prober.probe(r))).await;
        self.endpoints.extend(endpoints.iter().cloned());

        self.ticks += 1;
        let failed = endpoints.iter().filter(|r| !r.success).count();
        info!(
            event = "check_completed",
            tick = self.ticks,
            healthy = health.success,
            status_code = health.status_code,
            latency_ms = health.latency.as_millis() as u64,
            endpoints = endpoints.len(),
            endpoint_failures = failed,
        );

        let alert = evaluate(
            &health,
            &endpoints,
            &self.config.thresholds,
            &self.config.base_url,
        )
        .into_iter()
        .next();

        if let Some(event) = &alert {
            warn!(
                event = "alert_triggered",
                tick = self.ticks,
                reasons = %event.reasons.join("; "),
            );
            if let Err(e) = self.notifier.notify(event).await {
                error!(event = "notification_failed", error = %e);
            }
            self.alerts.push(event.clone());
        }

        CheckOutcome {
            health,
            endpoints,
            alert,
        }
    }

    /// Tick until stopped, a configured bound is reached, or the stop signal's sender is dropped
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> MonitorRun {
        let started = Instant::now();
        info!(
            event = "monitor_started",
            url = %self.config.base_url,
            interval_secs = self.config.check_interval.as_secs_f64(),
            endpoints = self.config.endpoints.len(),
        );

        loop {
            if *stop.borrow() {
                info!(event = "monitor_stop_requested", ticks = self.ticks);
                break;
            }
            if self
                .config
                .max_duration
                .is_some_and(|max| started.elapsed() >= max)
            {
                break;
            }

            self.run_single_check().await;

            if self.config.max_ticks.is_some_and(|max| self.ticks >= max) {
                break;
            }

            tokio::select! {
                _ = sleep(self.config.check_interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let report = self.generate_report();
        info!(
            event = "monitor_stopped",
            ticks = self.ticks,
            alerts = self.alerts.len(),
            has_data = report.has_data(),
        );

        MonitorRun {
            report,
            ticks: self.ticks,
            health: self.health,
            endpoints: self.endpoints,
            alerts: self.alerts,
        }
    }

    /// Run the loop on a background task
    pub fn spawn(self) -> MonitorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(MonitorState::Running);

        let task = tokio::spawn(async move {
            let run = self.run(stop_rx).await;
            state_tx.send_replace(MonitorState::Stopped);
            run
        });

        MonitorHandle {
            stop: StopSignal(Arc::new(stop_tx)),
            state: state_rx,
            task,
        }
    }
}
