use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single request to issue against the target service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    /// Label used to group results (scenario or endpoint name)
    pub label: String,
    /// The HTTP method (GET, POST, etc.)
    pub method: String,
    /// Path appended to the target base URL
    pub path: String,
    /// JSON request body
    pub body: Option<serde_json::Value>,
    /// Timeout for this request
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl ProbeRequest {
    /// Create a GET request with the given label and path
    pub fn get(label: impl Into<String>, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            method: "GET".to_string(),
            path: path.into(),
            body: None,
            timeout,
        }
    }
}

/// Represents the outcome of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Whether the probe counts as a success (status < 400, no transport error)
    pub success: bool,
    /// HTTP status code, 0 when no response was received
    pub status_code: u16,
    /// How long the request took
    #[serde(with = "duration_secs")]
    pub latency: Duration,
    /// Size of the response body in bytes
    pub response_size: usize,
    /// Label of the scenario or endpoint that was probed
    pub endpoint_label: String,
    /// When the request was started
    pub timestamp: DateTime<Utc>,
    /// Error message if the request failed at the transport level
    pub error: Option<String>,
}

impl ProbeResult {
    /// Build a result for a received response
    pub fn response(
        label: impl Into<String>,
        status_code: u16,
        latency: Duration,
        response_size: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            success: status_code < 400,
            status_code,
            latency,
            response_size,
            endpoint_label: label.into(),
            timestamp,
            error: None,
        }
    }

    /// Build a result for a request that never produced a usable response
    pub fn transport_error(
        label: impl Into<String>,
        latency: Duration,
        timestamp: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            status_code: 0,
            latency,
            response_size: 0,
            endpoint_label: label.into(),
            timestamp,
            error: Some(error.into()),
        }
    }

    /// Human readable reason for a failed probe
    pub fn failure_reason(&self) -> String {
        match &self.error {
            Some(error) => error.clone(),
            None => format!("HTTP {}", self.status_code),
        }
    }
}

/// Summary statistics over a set of probe results
///
/// Latency fields only consider successful probes. Every field is zero when
/// nothing has been recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStatistics {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Success rate in percent (0.0 - 100.0)
    pub success_rate: f64,
    #[serde(with = "duration_secs")]
    pub avg_latency: Duration,
    #[serde(with = "duration_secs")]
    pub min_latency: Duration,
    #[serde(with = "duration_secs")]
    pub max_latency: Duration,
    #[serde(with = "duration_secs")]
    pub median_latency: Duration,
    #[serde(with = "duration_secs")]
    pub p95_latency: Duration,
    pub duration_seconds: f64,
    pub requests_per_second: f64,
}

/// Serializes a `Duration` as fractional seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Serializes an optional `Duration` as fractional seconds
pub(crate) mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_below_400_are_successful() {
        let now = Utc::now();
        assert!(ProbeResult::response("a", 200, Duration::ZERO, 0, now).success);
        assert!(ProbeResult::response("a", 302, Duration::ZERO, 0, now).success);
        assert!(!ProbeResult::response("a", 400, Duration::ZERO, 0, now).success);
        assert!(!ProbeResult::response("a", 503, Duration::ZERO, 0, now).success);
    }

    #[test]
    fn transport_errors_carry_status_zero() {
        let result =
            ProbeResult::transport_error("a", Duration::from_millis(5), Utc::now(), "refused");
        assert!(!result.success);
        assert_eq!(result.status_code, 0);
        assert_eq!(result.failure_reason(), "refused");
    }

    #[test]
    fn latencies_serialize_as_seconds() {
        let stats = AggregatedStatistics {
            avg_latency: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["avg_latency"], 1.5);
        assert_eq!(json["total_requests"], 0);
    }
}
