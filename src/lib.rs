//! Falconet - HTTP load generator and continuous health monitor
//!
//! Falconet drives weighted request scenarios against a service from many
//! concurrent virtual users, and watches a service over time with periodic
//! health probes, threshold alerts and windowed reports. It can be used as a
//! command-line tool or embedded as a library.
//!
//! # Example
//!
//! ```rust,no_run
//! use falconet::{LoadTestBuilder, ScenarioCatalog, ScenarioDefinition};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = ScenarioCatalog::new(vec![
//!         ScenarioDefinition::get("list users", "/users", 3),
//!         ScenarioDefinition::get("user stats", "/stats", 1),
//!     ])?;
//!
//!     let outcome = LoadTestBuilder::new()
//!         .base_url("http://localhost:8000")
//!         .users(20)
//!         .duration(Duration::from_secs(30))
//!         .ramp_up(Duration::from_secs(5))
//!         .catalog(catalog)
//!         .run()
//!         .await?;
//!
//!     println!(
//!         "{} requests, {:.1}% successful",
//!         outcome.statistics.total_requests, outcome.statistics.success_rate
//!     );
//!     Ok(())
//! }
//! ```

mod alert;
mod config;
mod error;
mod history;
mod load;
mod metrics;
mod models;
mod monitor;
mod probe;
mod scenario;

pub mod report;
pub mod stats;
pub mod telemetry;
pub mod utils;

pub use alert::{AlertEvent, LogNotifier, NoopNotifier, Notifier, WebhookNotifier, evaluate};
pub use config::{
    AlertThresholds, Endpoint, LoadConfig, MonitorConfig, default_endpoints, validate_base_url,
};
pub use error::{ConfigError, NotifyError};
pub use history::{RollingHistory, Timestamped};
pub use load::{LoadDriver, LoadOutcome, LoadPhase, LoadStatus, ramp_up_delay};
pub use metrics::MetricsAggregator;
pub use models::{AggregatedStatistics, ProbeRequest, ProbeResult};
pub use monitor::{
    CheckOutcome, HEALTH_CHECK_LABEL, HealthMonitor, MonitorHandle, MonitorRun, MonitorState,
    StopSignal,
};
pub use probe::{HttpProber, Prober};
pub use report::{HealthReport, HealthStatus, LoadTestReport, MonitorReport, PerformanceGrade};
pub use scenario::{ScenarioCatalog, ScenarioDefinition};

use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring and running a load test
#[derive(Default)]
pub struct LoadTestBuilder {
    config: LoadConfig,
    catalog: Option<ScenarioCatalog>,
    prober: Option<Arc<dyn Prober>>,
}

impl LoadTestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: LoadConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the number of concurrent virtual users
    pub fn users(mut self, users: usize) -> Self {
        self.config.concurrent_users = users;
        self
    }

    /// Set how long each user keeps issuing requests
    pub fn duration(mut self, duration: Duration) -> Self {
        self.config.test_duration = duration;
        self
    }

    /// Set the window over which user starts are spread
    pub fn ramp_up(mut self, ramp_up: Duration) -> Self {
        self.config.ramp_up_time = ramp_up;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set how many recent error messages are kept
    pub fn max_errors(mut self, max_errors: usize) -> Self {
        self.config.max_errors = max_errors;
        self
    }

    /// Set the path probed before any user starts
    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.config.health_path = path.into();
        self
    }

    /// Set the scenario catalog; the default catalog is used otherwise
    pub fn catalog(mut self, catalog: ScenarioCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replace the HTTP prober
    pub fn prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn build(self) -> Result<LoadDriver, ConfigError> {
        self.config.validate()?;
        let prober = match self.prober {
            Some(prober) => prober,
            None => Arc::new(HttpProber::new(
                &self.config.base_url,
                self.config.timeout,
                self.config.concurrent_users,
            )?),
        };
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => ScenarioCatalog::default_catalog()?,
        };
        LoadDriver::new(self.config, catalog, prober)
    }

    /// Build the driver and run the test to completion
    pub async fn run(self) -> Result<LoadOutcome, ConfigError> {
        Ok(self.build()?.run().await)
    }
}

/// Builder for configuring a health monitor
pub struct MonitorBuilder {
    config: MonitorConfig,
    prober: Option<Arc<dyn Prober>>,
    notifier: Arc<dyn Notifier>,
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self {
            config: MonitorConfig::default(),
            prober: None,
            notifier: Arc::new(LogNotifier),
        }
    }
}

impl MonitorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: MonitorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the pause between the end of one check and the start of the next
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.check_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    /// Set the success rate a report needs to be labelled "Good"
    pub fn min_success_rate(mut self, rate: f64) -> Self {
        self.config.min_success_rate = rate;
        self
    }

    pub fn report_window(mut self, window: Duration) -> Self {
        self.config.report_window = window;
        self
    }

    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.config.health_path = path.into();
        self
    }

    /// Replace the secondary endpoints probed on every check
    pub fn endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.config.max_duration = Some(duration);
        self
    }

    pub fn max_ticks(mut self, ticks: u64) -> Self {
        self.config.max_ticks = Some(ticks);
        self
    }

    pub fn prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Set where alerts are delivered; alerts are logged otherwise
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> Result<HealthMonitor, ConfigError> {
        self.config.validate()?;
        let prober = match self.prober {
            Some(prober) => prober,
            None => Arc::new(HttpProber::new(
                &self.config.base_url,
                self.config.response_timeout,
                self.config.endpoints.len() + 1,
            )?),
        };
        HealthMonitor::new(self.config, prober, self.notifier)
    }

    /// Build the monitor and start it on a background task
    pub fn spawn(self) -> Result<MonitorHandle, ConfigError> {
        Ok(self.build()?.spawn())
    }
}
