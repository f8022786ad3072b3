use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use crate::config::LoadConfig;
use crate::history::RollingHistory;
use crate::load::LoadOutcome;
use crate::models::{AggregatedStatistics, ProbeResult, duration_secs};
use crate::stats::summarize_results;
use crate::utils::{format_duration, format_window};

/// Saved result of a load test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestReport {
    pub test_config: LoadConfig,
    pub results: AggregatedStatistics,
    pub errors: Vec<String>,
}

impl LoadTestReport {
    pub fn new(config: &LoadConfig, outcome: &LoadOutcome) -> Self {
        Self {
            test_config: config.clone(),
            results: outcome.statistics.clone(),
            errors: outcome.errors.clone(),
        }
    }
}

/// Coarse rating of a load test by average latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceGrade {
    Excellent,
    Good,
    Fair,
    NeedsOptimization,
}

impl PerformanceGrade {
    pub fn from_latency(avg_latency: Duration) -> Self {
        match avg_latency.as_millis() {
            0..=99 => Self::Excellent,
            100..=199 => Self::Good,
            200..=499 => Self::Fair,
            _ => Self::NeedsOptimization,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::NeedsOptimization => "Needs optimization",
        }
    }
}

/// Overall label of a monitoring window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Good,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Good needs `good_success_rate` and sub-second latency, Warning needs 90%
    pub fn classify(success_rate: f64, avg_latency: Duration, good_success_rate: f64) -> Self {
        if success_rate >= good_success_rate && avg_latency < Duration::from_secs(1) {
            Self::Good
        } else if success_rate >= 90.0 {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

/// Per-endpoint breakdown of a monitoring window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub total: u64,
    pub successful: u64,
    pub success_rate: f64,
    /// Mean latency of the successful checks
    #[serde(with = "duration_secs")]
    pub avg_latency: Duration,
}

/// Statistics of a monitoring window with data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub period: String,
    pub generated_at: DateTime<Utc>,
    pub summary: AggregatedStatistics,
    pub endpoint_stats: BTreeMap<String, EndpointStats>,
    pub health_status: HealthStatus,
}

/// Result of a report over a window without any health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoDataReport {
    pub period: String,
    pub generated_at: DateTime<Utc>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonitorReport {
    Summary(HealthReport),
    NoData(NoDataReport),
}

impl MonitorReport {
    pub fn has_data(&self) -> bool {
        matches!(self, Self::Summary(_))
    }
}

/// Summarize the monitor histories over the `window` ending at `now`
pub fn generate(
    health: &RollingHistory<ProbeResult>,
    endpoints: &RollingHistory<ProbeResult>,
    window: Duration,
    good_success_rate: f64,
    now: DateTime<Utc>,
) -> MonitorReport {
    let period = format!("last {}", format_window(window));
    let cutoff = chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let recent_health: Vec<&ProbeResult> = health.since(cutoff).collect();
    if recent_health.is_empty() {
        return MonitorReport::NoData(NoDataReport {
            period,
            generated_at: now,
            error: "no monitoring data available".to_string(),
        });
    }

    let first = recent_health.iter().map(|r| r.timestamp).min().unwrap_or(now);
    let last = recent_health.iter().map(|r| r.timestamp).max().unwrap_or(now);
    let span = (last - first).to_std().unwrap_or_default();
    let summary = summarize_results(recent_health.iter().copied(), span);

    let mut latencies: BTreeMap<String, Vec<Duration>> = BTreeMap::new();
    let mut endpoint_stats: BTreeMap<String, EndpointStats> = BTreeMap::new();
    for record in endpoints.since(cutoff) {
        let stats = endpoint_stats
            .entry(record.endpoint_label.clone())
            .or_default();
        stats.total += 1;
        if record.success {
            stats.successful += 1;
            latencies
                .entry(record.endpoint_label.clone())
                .or_default()
                .push(record.latency);
        }
    }
    for (label, stats) in endpoint_stats.iter_mut() {
        stats.success_rate = stats.successful as f64 / stats.total as f64 * 100.0;
        stats.avg_latency = latencies
            .get(label)
            .map(|l| crate::stats::mean(l))
            .unwrap_or_default();
    }

    let health_status =
        HealthStatus::classify(summary.success_rate, summary.avg_latency, good_success_rate);

    MonitorReport::Summary(HealthReport {
        period,
        generated_at: now,
        summary,
        endpoint_stats,
        health_status,
    })
}

/// Either kind of saved report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SavedReport {
    Load(LoadTestReport),
    Monitor(MonitorReport),
}

/// Write a load test report as text
pub fn render_load_text<W: Write>(writer: &mut W, report: &LoadTestReport) -> Result<()> {
    let stats = &report.results;
    let config = &report.test_config;

    writeln!(writer, "Target:\t\t{}", config.base_url)?;
    writeln!(
        writer,
        "Users:\t\t{} (ramp-up {}, duration {})",
        config.concurrent_users,
        format_duration(config.ramp_up_time),
        format_duration(config.test_duration)
    )?;
    writeln!(writer, "Requests:\t{}", stats.total_requests)?;
    writeln!(writer, "Success:\t{} ({:.2}%)", stats.success_count, stats.success_rate)?;
    writeln!(writer, "Failures:\t{}", stats.failure_count)?;
    writeln!(
        writer,
        "Duration:\t{}",
        format_duration(Duration::try_from_secs_f64(stats.duration_seconds).unwrap_or_default())
    )?;
    writeln!(writer, "Rate:\t\t{:.2} req/s", stats.requests_per_second)?;
    writeln!(writer, "Min:\t\t{}", format_duration(stats.min_latency))?;
    writeln!(writer, "Mean:\t\t{}", format_duration(stats.avg_latency))?;
    writeln!(writer, "50th percentile:\t{}", format_duration(stats.median_latency))?;
    writeln!(writer, "95th percentile:\t{}", format_duration(stats.p95_latency))?;
    writeln!(writer, "Max:\t\t{}", format_duration(stats.max_latency))?;

    if !report.errors.is_empty() {
        writeln!(writer, "\nRecent errors:")?;
        for (i, error) in report.errors.iter().enumerate() {
            writeln!(writer, "  {}. {}", i + 1, error)?;
        }
    }

    writeln!(
        writer,
        "\nGrade:\t\t{}",
        PerformanceGrade::from_latency(stats.avg_latency).as_str()
    )?;

    Ok(())
}

/// Write a monitor report as text
pub fn render_monitor_text<W: Write>(writer: &mut W, report: &MonitorReport) -> Result<()> {
    let report = match report {
        MonitorReport::NoData(no_data) => {
            writeln!(writer, "Period:\t\t{}", no_data.period)?;
            writeln!(writer, "{}", no_data.error)?;
            return Ok(());
        }
        MonitorReport::Summary(report) => report,
    };

    let summary = &report.summary;
    writeln!(writer, "Period:\t\t{}", report.period)?;
    writeln!(writer, "Generated:\t{}", report.generated_at.to_rfc3339())?;
    writeln!(writer, "Status:\t\t{:?}", report.health_status)?;
    writeln!(
        writer,
        "Checks:\t\t{} ({} successful, {:.2}%)",
        summary.total_requests, summary.success_count, summary.success_rate
    )?;
    writeln!(writer, "Mean:\t\t{}", format_duration(summary.avg_latency))?;
    writeln!(writer, "95th percentile:\t{}", format_duration(summary.p95_latency))?;
    writeln!(writer, "Max:\t\t{}", format_duration(summary.max_latency))?;

    if !report.endpoint_stats.is_empty() {
        writeln!(writer, "\nEndpoint\tChecks\tSuccess\tMean")?;
        for (label, stats) in &report.endpoint_stats {
            writeln!(
                writer,
                "{}\t\t{}\t{:.1}%\t{}",
                label,
                stats.total,
                stats.success_rate,
                format_duration(stats.avg_latency)
            )?;
        }
    }

    Ok(())
}

/// Write probe results as CSV
pub fn write_history_csv<'a, W, I>(writer: W, results: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a ProbeResult>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "timestamp",
        "endpoint",
        "success",
        "status_code",
        "latency_ms",
        "response_size",
        "error",
    ])?;

    for result in results {
        csv_writer.write_record(&[
            result.timestamp.to_rfc3339(),
            result.endpoint_label.clone(),
            result.success.to_string(),
            result.status_code.to_string(),
            format!("{:.3}", result.latency.as_secs_f64() * 1000.0),
            result.response_size.to_string(),
            result.error.clone().unwrap_or_default(),
        ])?;
    }

    csv_writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::LoadStatus;
    use chrono::Duration as ChronoDuration;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn check(label: &str, ok: bool, ms: u64, at: DateTime<Utc>) -> ProbeResult {
        let status = if ok { 200 } else { 503 };
        ProbeResult::response(label, status, Duration::from_millis(ms), 10, at)
    }

    #[test]
    fn empty_window_reports_no_data() {
        let now = Utc::now();
        let mut health = RollingHistory::new(10);
        health.push(check("health_check", true, 10, now - ChronoDuration::hours(30)));
        let endpoints = RollingHistory::new(10);

        let report = generate(&health, &endpoints, DAY, 95.0, now);
        match report {
            MonitorReport::NoData(no_data) => {
                assert_eq!(no_data.period, "last 24 hours");
                assert_eq!(no_data.error, "no monitoring data available");
            }
            other => panic!("expected no data, got {:?}", other),
        }
    }

    #[test]
    fn summarizes_health_and_endpoints() {
        let now = Utc::now();
        let mut health = RollingHistory::new(10);
        let mut endpoints = RollingHistory::new(10);
        for minutes in 1..=4 {
            let at = now - ChronoDuration::minutes(minutes);
            health.push(check("health_check", true, 100, at));
            endpoints.push(check("list", minutes != 2, 200, at));
            endpoints.push(check("stats", true, 50, at));
        }

        let MonitorReport::Summary(report) = generate(&health, &endpoints, DAY, 95.0, now) else {
            panic!("expected a summary");
        };

        assert_eq!(report.summary.total_requests, 4);
        assert_eq!(report.summary.success_rate, 100.0);
        assert_eq!(report.summary.duration_seconds, 180.0);
        assert_eq!(report.health_status, HealthStatus::Good);

        let list = &report.endpoint_stats["list"];
        assert_eq!(list.total, 4);
        assert_eq!(list.successful, 3);
        assert_eq!(list.success_rate, 75.0);
        assert_eq!(list.avg_latency, Duration::from_millis(200));
        assert_eq!(report.endpoint_stats["stats"].success_rate, 100.0);
    }

    #[test]
    fn classifies_health_status() {
        let fast = Duration::from_millis(200);
        let slow = Duration::from_millis(1500);
        assert_eq!(HealthStatus::classify(99.0, fast, 95.0), HealthStatus::Good);
        assert_eq!(HealthStatus::classify(99.0, slow, 95.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::classify(92.0, fast, 95.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::classify(89.9, fast, 95.0), HealthStatus::Critical);
    }

    #[test]
    fn grades_by_average_latency() {
        assert_eq!(
            PerformanceGrade::from_latency(Duration::from_millis(99)),
            PerformanceGrade::Excellent
        );
        assert_eq!(
            PerformanceGrade::from_latency(Duration::from_millis(150)),
            PerformanceGrade::Good
        );
        assert_eq!(
            PerformanceGrade::from_latency(Duration::from_millis(499)),
            PerformanceGrade::Fair
        );
        assert_eq!(
            PerformanceGrade::from_latency(Duration::from_secs(2)),
            PerformanceGrade::NeedsOptimization
        );
    }

    #[test]
    fn monitor_report_json_shape_is_stable() {
        let now = Utc::now();
        let mut health = RollingHistory::new(10);
        health.push(check("health_check", true, 10, now));
        let report = generate(&health, &RollingHistory::new(10), DAY, 95.0, now);

        let json = serde_json::to_value(&report).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            ["endpoint_stats", "generated_at", "health_status", "period", "summary"]
        );
        assert_eq!(json["health_status"], "Good");
    }

    #[test]
    fn load_report_round_trips_through_saved_report() {
        let outcome = LoadOutcome {
            status: LoadStatus::Completed,
            statistics: AggregatedStatistics {
                total_requests: 4,
                success_count: 3,
                failure_count: 1,
                success_rate: 75.0,
                ..Default::default()
            },
            errors: vec!["list: HTTP 500".to_string()],
        };
        let report = LoadTestReport::new(&LoadConfig::default(), &outcome);
        let json = serde_json::to_string(&report).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("test_config").is_some());
        assert!(value.get("results").is_some());
        assert!(value.get("errors").is_some());

        match serde_json::from_str::<SavedReport>(&json).unwrap() {
            SavedReport::Load(loaded) => assert_eq!(loaded.results.total_requests, 4),
            SavedReport::Monitor(_) => panic!("parsed as a monitor report"),
        }

        let mut text = Vec::new();
        render_load_text(&mut text, &report).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("Success:\t3 (75.00%)"));
        assert!(text.contains("1. list: HTTP 500"));
    }

    #[test]
    fn writes_csv_rows() {
        let now = Utc::now();
        let results = vec![
            check("list", true, 12, now),
            ProbeResult::transport_error("stats", Duration::from_millis(3), now, "timed out"),
        ];

        let mut out = Vec::new();
        write_history_csv(&mut out, &results).unwrap();
        let csv = String::from_utf8(out).unwrap();
        let lines: Vec<_> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,endpoint,success"));
        assert!(lines[1].contains(",list,true,200,12.000,10,"));
        assert!(lines[2].ends_with(",stats,false,0,3.000,0,timed out"));
    }
}
