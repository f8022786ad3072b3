use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use falconet::report::{self, SavedReport};
use falconet::utils::{format_size, get_reader, get_writer, parse_endpoint, timestamped_path};
use falconet::{
    AlertThresholds, LoadDriver, LoadPhase, LoadTestBuilder, LoadTestReport, LogNotifier,
    MonitorBuilder, Notifier, ScenarioCatalog, WebhookNotifier, default_endpoints, telemetry,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log debug output, including every probe
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test with concurrent virtual users
    Load {
        /// Base URL of the service under test
        #[arg(long, default_value = "http://localhost:8000")]
        url: String,

        /// Number of concurrent users
        #[arg(long, default_value = "10")]
        users: usize,

        /// How long each user keeps sending requests
        #[arg(long, default_value = "60s")]
        duration: humantime::Duration,

        /// Window over which user starts are spread
        #[arg(long = "ramp-up", default_value = "10s")]
        ramp_up: humantime::Duration,

        /// Requests timeout
        #[arg(long, default_value = "30s")]
        timeout: humantime::Duration,

        /// JSON file with scenario definitions [default catalog if omitted]
        #[arg(long)]
        scenarios: Option<String>,

        /// Number of recent error messages kept in the report
        #[arg(long = "max-errors", default_value = "10")]
        max_errors: usize,

        /// Output file [default: load_test_result_<timestamp>.json]
        #[arg(long)]
        output: Option<String>,

        /// Disable the progress bar
        #[arg(long = "no-progress")]
        no_progress: bool,
    },

    /// Monitor a service with periodic health checks
    Monitor {
        /// Base URL of the monitored service
        #[arg(long, default_value = "http://localhost:8000")]
        url: String,

        /// Pause between checks
        #[arg(long, default_value = "60s")]
        interval: humantime::Duration,

        /// Total monitoring time [0 = until interrupted]
        #[arg(long, default_value = "1h")]
        duration: humantime::Duration,

        /// Timeout of each probe
        #[arg(long, default_value = "30s")]
        timeout: humantime::Duration,

        /// Alert when the health check is slower than this
        #[arg(long = "max-response-time", default_value = "2s")]
        max_response_time: humantime::Duration,

        /// Alert when more than this percentage of endpoint checks fail
        #[arg(long = "failure-rate", default_value = "20")]
        failure_rate: f64,

        /// Success rate a report needs to be labelled Good
        #[arg(long = "min-success-rate", default_value = "95")]
        min_success_rate: f64,

        /// Window covered by the final report, in hours
        #[arg(long = "window-hours", default_value = "24")]
        window_hours: f64,

        /// Endpoint to check on every tick, as label=path or label=METHOD path
        #[arg(long = "endpoint", value_name = "value")]
        endpoints: Vec<String>,

        /// POST alerts as JSON to this URL instead of logging them
        #[arg(long)]
        webhook: Option<String>,

        /// Run a single check and print its outcome
        #[arg(long)]
        single: bool,

        /// Output file [default: performance_report_<timestamp>.json]
        #[arg(long)]
        output: Option<String>,

        /// Also write every recorded probe as CSV
        #[arg(long = "history-csv")]
        history_csv: Option<String>,
    },

    /// Print a saved load test or monitor report as text
    Report {
        /// Saved JSON report
        #[arg(long, default_value = "stdin")]
        input: String,

        /// Output file
        #[arg(long, default_value = "stdout")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose)?;

    match cli.command {
        Commands::Load {
            url,
            users,
            duration,
            ramp_up,
            timeout,
            scenarios,
            max_errors,
            output,
            no_progress,
        } => {
            let catalog = match scenarios {
                Some(path) => {
                    let reader = get_reader(&path)?;
                    ScenarioCatalog::from_reader(reader)
                        .with_context(|| format!("Failed to load scenarios from {}", path))?
                }
                None => ScenarioCatalog::default_catalog()?,
            };

            let driver = LoadTestBuilder::new()
                .base_url(url)
                .users(users)
                .duration(duration.into())
                .ramp_up(ramp_up.into())
                .timeout(timeout.into())
                .max_errors(max_errors)
                .catalog(catalog)
                .build()?;

            let config = driver.config().clone();
            let progress = if no_progress {
                None
            } else {
                Some(spawn_progress(&driver)?)
            };

            let outcome = driver.run().await;
            if let Some(progress) = progress {
                progress.await?;
            }

            let report = LoadTestReport::new(&config, &outcome);
            let output = output
                .unwrap_or_else(|| timestamped_path("load_test_result", chrono::Utc::now()));
            save_json(&output, &report)?;

            let mut stdout = std::io::stdout();
            report::render_load_text(&mut stdout, &report)?;

            if outcome.precondition_failed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Monitor {
            url,
            interval,
            duration,
            timeout,
            max_response_time,
            failure_rate,
            min_success_rate,
            window_hours,
            endpoints,
            webhook,
            single,
            output,
            history_csv,
        } => {
            let endpoints = if endpoints.is_empty() {
                default_endpoints()
            } else {
                endpoints
                    .iter()
                    .map(|e| parse_endpoint(e))
                    .collect::<Result<Vec<_>>>()?
            };

            let timeout: Duration = timeout.into();
            let notifier: Arc<dyn Notifier> = match webhook {
                Some(webhook) => Arc::new(WebhookNotifier::new(webhook, timeout)?),
                None => Arc::new(LogNotifier),
            };

            let window = Duration::try_from_secs_f64(window_hours * 3600.0)
                .context("Invalid report window")?;

            let mut builder = MonitorBuilder::new()
                .base_url(url)
                .interval(interval.into())
                .timeout(timeout)
                .thresholds(AlertThresholds {
                    max_response_time: max_response_time.into(),
                    max_failure_rate: failure_rate,
                })
                .min_success_rate(min_success_rate)
                .report_window(window)
                .endpoints(endpoints)
                .notifier(notifier);

            let duration: Duration = duration.into();
            if !duration.is_zero() {
                builder = builder.max_duration(duration);
            }

            let mut monitor = builder.build()?;

            if single {
                let outcome = monitor.run_single_check().await;
                let output = output.unwrap_or_else(|| "stdout".to_string());
                save_json(&output, &outcome)?;
                return Ok(ExitCode::SUCCESS);
            }

            let handle = monitor.spawn();
            let stop = handle.stop_signal();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!(event = "interrupted", message = "Stopping after the current check");
                    stop.trigger();
                }
            });

            let run = handle.join().await.context("Monitor task failed")?;

            let output = output
                .unwrap_or_else(|| timestamped_path("performance_report", chrono::Utc::now()));
            save_json(&output, &run.report)?;

            if let Some(path) = history_csv {
                let writer = get_writer(&path)?;
                report::write_history_csv(writer, run.health.iter().chain(run.endpoints.iter()))?;
                info!(event = "history_written", path = %path);
            }

            let mut stdout = std::io::stdout();
            report::render_monitor_text(&mut stdout, &run.report)?;
            if !run.alerts.is_empty() {
                writeln!(stdout, "\nAlerts:\t\t{}", run.alerts.len())?;
            }
        }
        Commands::Report { input, output } => {
            let reader = get_reader(&input)?;
            let saved: SavedReport = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse report from {}", input))?;

            let mut writer = get_writer(&output)?;
            match &saved {
                SavedReport::Load(report) => report::render_load_text(&mut writer, report)?,
                SavedReport::Monitor(report) => report::render_monitor_text(&mut writer, report)?,
            }
            writer.flush()?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Pretty-print a value as JSON to a file or stdout
fn save_json<T: serde::Serialize>(path: &str, value: &T) -> Result<()> {
    let mut writer = get_writer(path)?;
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    if path != "stdout" && path != "-" {
        info!(event = "report_saved", path = %path);
    }
    Ok(())
}

/// Draw a progress bar from aggregator snapshots until the test completes
fn spawn_progress(driver: &LoadDriver) -> Result<tokio::task::JoinHandle<()>> {
    let total = driver.config().ramp_up_time + driver.config().test_duration;
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5}s {msg}")?
        .progress_chars("##-");

    let pb = ProgressBar::new(total.as_secs().max(1));
    pb.set_style(style);

    let metrics = driver.metrics();
    let mut phase = driver.subscribe();
    let started = tokio::time::Instant::now();

    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = phase.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let current = *phase.borrow();
            if current == LoadPhase::Completed {
                break;
            }
            let snapshot = metrics.snapshot();
            pb.set_position(started.elapsed().as_secs().min(pb.length().unwrap_or(0)));
            pb.set_message(format!(
                "{:?}: {} requests, {:.1}% ok, {} in",
                current,
                snapshot.total_requests,
                snapshot.success_rate,
                format_size(metrics.bytes_in())
            ));
        }
        pb.finish_with_message("Load test completed");
    }))
}
