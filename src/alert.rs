use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::warn;

use crate::config::AlertThresholds;
use crate::error::NotifyError;
use crate::history::Timestamped;
use crate::models::ProbeResult;

/// Threshold violations found in one monitoring tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub reasons: Vec<String>,
    pub triggered_at: DateTime<Utc>,
    /// The monitored target, usually its base URL
    pub target: String,
}

impl AlertEvent {
    pub fn subject(&self) -> String {
        format!("[falconet] API health alert for {}", self.target)
    }

    pub fn body(&self) -> String {
        let mut body = String::from("The following problems were detected:\n\n");
        for reason in &self.reasons {
            let _ = writeln!(body, "- {}", reason);
        }
        let _ = write!(
            body,
            "\nChecked at: {}\nTarget: {}",
            self.triggered_at.to_rfc3339(),
            self.target
        );
        body
    }
}

impl Timestamped for AlertEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.triggered_at
    }
}

/// Check the latest primary probe and endpoint batch against the thresholds
///
/// Returns at most one event carrying every violated rule; an empty vector
/// when nothing is wrong.
pub fn evaluate(
    health: &ProbeResult,
    endpoints: &[ProbeResult],
    thresholds: &AlertThresholds,
    target: &str,
) -> Vec<AlertEvent> {
    let mut reasons = Vec::new();

    if !health.success {
        reasons.push(format!("health check failed: {}", health.failure_reason()));
    }

    if health.latency > thresholds.max_response_time {
        reasons.push(format!(
            "response time too high: {:.2}s (threshold {:.2}s)",
            health.latency.as_secs_f64(),
            thresholds.max_response_time.as_secs_f64()
        ));
    }

    let failed = endpoints.iter().filter(|r| !r.success).count();
    if failed > 0 {
        let failure_rate = failed as f64 / endpoints.len() as f64 * 100.0;
        if failure_rate > thresholds.max_failure_rate {
            reasons.push(format!(
                "endpoint failure rate too high: {:.1}% ({}/{})",
                failure_rate,
                failed,
                endpoints.len()
            ));
        }
    }

    if reasons.is_empty() {
        return Vec::new();
    }

    vec![AlertEvent {
        reasons,
        triggered_at: health.timestamp,
        target: target.to_string(),
    }]
}

/// Delivers alert events to an external channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        warn!(
            event = "alert",
            url = %event.target,
            reasons = %event.reasons.join("; "),
            message = %event.subject(),
        );
        Ok(())
    }
}

/// Discards alerts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &AlertEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: String,
    body: String,
    reasons: &'a [String],
    triggered_at: DateTime<Utc>,
    target: &'a str,
}

/// POSTs alerts as JSON to a webhook URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            subject: event.subject(),
            body: event.body(),
            reasons: &event.reasons,
            triggered_at: event.triggered_at,
            target: &event.target,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(label: &str, ms: u64) -> ProbeResult {
        ProbeResult::response(label, 200, Duration::from_millis(ms), 64, Utc::now())
    }

    fn batch(failures: usize, total: usize) -> Vec<ProbeResult> {
        (0..total)
            .map(|i| {
                if i < failures {
                    ProbeResult::response("list", 503, Duration::from_millis(5), 0, Utc::now())
                } else {
                    ok("list", 5)
                }
            })
            .collect()
    }

    #[test]
    fn healthy_tick_raises_nothing() {
        let events = evaluate(
            &ok("health_check", 40),
            &batch(0, 5),
            &AlertThresholds::default(),
            "http://svc",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn failed_health_check_is_reported() {
        let health = ProbeResult::transport_error(
            "health_check",
            Duration::from_millis(3),
            Utc::now(),
            "connection failed: refused",
        );
        let events = evaluate(&health, &batch(0, 5), &AlertThresholds::default(), "http://svc");

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].reasons,
            vec!["health check failed: connection failed: refused".to_string()]
        );
        assert_eq!(events[0].target, "http://svc");
    }

    #[test]
    fn slow_health_check_is_reported() {
        let events = evaluate(
            &ok("health_check", 2500),
            &batch(0, 5),
            &AlertThresholds::default(),
            "http://svc",
        );
        assert_eq!(events.len(), 1);
        assert!(events[0].reasons[0].starts_with("response time too high: 2.50s"));
    }

    #[test]
    fn failure_rate_must_exceed_threshold() {
        let thresholds = AlertThresholds::default();

        // 1 of 5 is exactly 20%, not above it
        let events = evaluate(&ok("health_check", 5), &batch(1, 5), &thresholds, "t");
        assert!(events.is_empty());

        let events = evaluate(&ok("health_check", 5), &batch(2, 5), &thresholds, "t");
        assert_eq!(
            events[0].reasons,
            vec!["endpoint failure rate too high: 40.0% (2/5)".to_string()]
        );
    }

    #[test]
    fn rules_combine_into_one_event() {
        let mut health = ok("health_check", 3000);
        health.success = false;
        health.status_code = 500;

        let events = evaluate(&health, &batch(5, 5), &AlertThresholds::default(), "t");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reasons.len(), 3);
        assert_eq!(events[0].reasons[0], "health check failed: HTTP 500");
    }

    #[test]
    fn empty_batch_skips_failure_rule() {
        let events = evaluate(&ok("health_check", 5), &[], &AlertThresholds::default(), "t");
        assert!(events.is_empty());
    }

    #[test]
    fn body_lists_reasons_time_and_target() {
        let event = AlertEvent {
            reasons: vec!["a".to_string(), "b".to_string()],
            triggered_at: Utc::now(),
            target: "http://svc".to_string(),
        };
        let body = event.body();
        assert!(body.contains("- a\n- b\n"));
        assert!(body.contains("Checked at: "));
        assert!(body.ends_with("Target: http://svc"));
        assert!(event.subject().contains("http://svc"));
    }
}
