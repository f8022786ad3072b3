use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::models::{duration_secs, option_duration_secs};

/// Path probed by the load test precondition and the monitor's primary check
pub const DEFAULT_HEALTH_PATH: &str = "/";
/// Maximum number of primary health checks retained by the monitor
pub const HEALTH_HISTORY_CAPACITY: usize = 1000;
/// Maximum number of endpoint checks retained by the monitor
pub const ENDPOINT_HISTORY_CAPACITY: usize = 5000;
/// Maximum number of dispatched alerts retained by the monitor
pub const ALERT_HISTORY_CAPACITY: usize = 1000;

/// Parameters of a load test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Base URL of the service under test
    pub base_url: String,
    /// Number of concurrent virtual users
    pub concurrent_users: usize,
    /// How long each user keeps sending requests after its own start
    #[serde(with = "duration_secs")]
    pub test_duration: Duration,
    /// Window over which user start times are spread
    #[serde(with = "duration_secs")]
    pub ramp_up_time: Duration,
    /// Timeout for the precondition check and upper bound for every scenario request
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Number of most recent error messages kept for the report
    pub max_errors: usize,
    /// Path used for the precondition health check
    pub health_path: String,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            concurrent_users: 10,
            test_duration: Duration::from_secs(60),
            ramp_up_time: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            max_errors: 10,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

impl LoadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url(&self.base_url)?;
        if self.concurrent_users == 0 {
            return Err(ConfigError::NoUsers);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("timeout"));
        }
        Ok(())
    }
}

/// A secondary endpoint checked on every monitor tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub label: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
}

impl Endpoint {
    pub fn get(label: &str, path: &str) -> Self {
        Self {
            label: label.to_string(),
            method: default_method(),
            path: path.to_string(),
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

/// The endpoint set checked when none is configured
pub fn default_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::get("health", "/"),
        Endpoint::get("list", "/users"),
        Endpoint::get("stats", "/stats"),
        Endpoint::get("detail", "/users/1"),
        Endpoint::get("search", "/users/search/alice"),
    ]
}

/// Limits checked by the alert evaluator on every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Primary probe latency above which an alert fires
    #[serde(with = "duration_secs")]
    pub max_response_time: Duration,
    /// Endpoint batch failure rate, in percent, above which an alert fires
    pub max_failure_rate: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_response_time: Duration::from_secs(2),
            max_failure_rate: 20.0,
        }
    }
}

impl AlertThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_response_time.is_zero() {
            return Err(ConfigError::ZeroDuration("max response time"));
        }
        check_percentage("max failure rate", self.max_failure_rate)
    }
}

/// Parameters of the continuous health monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub base_url: String,
    /// Pause between the end of one tick and the start of the next
    #[serde(with = "duration_secs")]
    pub check_interval: Duration,
    /// Timeout applied to every probe
    #[serde(with = "duration_secs")]
    pub response_timeout: Duration,
    pub thresholds: AlertThresholds,
    /// Success rate, in percent, a report needs to be labelled "Good"
    pub min_success_rate: f64,
    /// Window covered by the final report
    #[serde(with = "duration_secs")]
    pub report_window: Duration,
    pub health_path: String,
    pub endpoints: Vec<Endpoint>,
    pub health_capacity: usize,
    pub endpoint_capacity: usize,
    /// Stop after this much time has passed since the loop started
    #[serde(default, with = "option_duration_secs")]
    pub max_duration: Option<Duration>,
    /// Stop after this many ticks
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            check_interval: Duration::from_secs(60),
            response_timeout: Duration::from_secs(30),
            thresholds: AlertThresholds::default(),
            min_success_rate: 95.0,
            report_window: Duration::from_secs(24 * 3600),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            endpoints: default_endpoints(),
            health_capacity: HEALTH_HISTORY_CAPACITY,
            endpoint_capacity: ENDPOINT_HISTORY_CAPACITY,
            max_duration: None,
            max_ticks: None,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url(&self.base_url)?;
        if self.check_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("check interval"));
        }
        if self.response_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("response timeout"));
        }
        if self.report_window.is_zero() {
            return Err(ConfigError::ZeroDuration("report window"));
        }
        if self.health_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("health history"));
        }
        if self.endpoint_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("endpoint history"));
        }
        for endpoint in &self.endpoints {
            validate_method(&endpoint.method)?;
        }
        self.thresholds.validate()?;
        check_percentage("min success rate", self.min_success_rate)
    }
}

/// Check that a base URL parses and uses an HTTP scheme
pub fn validate_base_url(base_url: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(base_url).map_err(|source| ConfigError::InvalidUrl {
        url: base_url.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::UnsupportedScheme(base_url.to_string())),
    }
}

pub(crate) fn validate_method(method: &str) -> Result<(), ConfigError> {
    reqwest::Method::from_bytes(method.as_bytes())
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidMethod(method.to_string()))
}

fn check_percentage(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange {
            name,
            value,
            min: 0.0,
            max: 100.0,
        })
    }
}
