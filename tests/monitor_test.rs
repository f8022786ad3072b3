use falconet::report::{self, SavedReport};
use falconet::{
    AlertThresholds, Endpoint, MonitorBuilder, MonitorReport, MonitorState, NoopNotifier,
    WebhookNotifier,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn service(health_status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(health_status))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    server
}

fn endpoints() -> Vec<Endpoint> {
    vec![Endpoint::get("list", "/users"), Endpoint::get("stats", "/stats")]
}

#[tokio::test]
async fn monitor_summarizes_health_and_endpoints() {
    let server = service(200).await;

    let handle = MonitorBuilder::new()
        .base_url(server.uri())
        .health_path("/health")
        .endpoints(endpoints())
        .interval(Duration::from_millis(20))
        .timeout(Duration::from_secs(2))
        .thresholds(AlertThresholds {
            max_response_time: Duration::from_secs(2),
            max_failure_rate: 60.0,
        })
        .max_ticks(3)
        .notifier(Arc::new(NoopNotifier))
        .spawn()
        .unwrap();

    let run = handle.join().await.unwrap();
    assert_eq!(run.ticks, 3);
    assert_eq!(run.health.len(), 3);
    assert_eq!(run.endpoints.len(), 6);
    assert!(run.alerts.is_empty());

    let MonitorReport::Summary(summary) = &run.report else {
        panic!("expected a summary report");
    };
    assert_eq!(summary.summary.total_requests, 3);
    assert_eq!(summary.summary.success_rate, 100.0);
    assert_eq!(summary.period, "last 24 hours");

    let list = &summary.endpoint_stats["list"];
    assert_eq!((list.total, list.successful), (3, 3));
    let stats = &summary.endpoint_stats["stats"];
    assert_eq!((stats.total, stats.successful), (3, 0));
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(stats.avg_latency, Duration::ZERO);
}

#[tokio::test]
async fn failing_health_check_is_sent_to_webhook() {
    let server = service(500).await;
    let hook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&hook)
        .await;

    let notifier =
        WebhookNotifier::new(format!("{}/hook", hook.uri()), Duration::from_secs(2)).unwrap();
    let handle = MonitorBuilder::new()
        .base_url(server.uri())
        .health_path("/health")
        .endpoints(endpoints())
        .interval(Duration::from_millis(20))
        .max_ticks(2)
        .notifier(Arc::new(notifier))
        .spawn()
        .unwrap();

    let run = handle.join().await.unwrap();
    assert_eq!(run.alerts.len(), 2);
    assert!(run.alerts.iter().all(|a| {
        a.reasons.contains(&"health check failed: HTTP 500".to_string())
            && a.reasons.iter().any(|r| r.starts_with("endpoint failure rate too high: 50.0%"))
    }));

    let received = hook.received_requests().await.unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(payload["target"], server.uri());
    assert!(payload["subject"].as_str().unwrap().contains(&server.uri()));
    hook.verify().await;
}

#[tokio::test]
async fn rejected_webhook_does_not_stop_monitoring() {
    let server = service(500).await;
    let hook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&hook)
        .await;

    let notifier = WebhookNotifier::new(hook.uri(), Duration::from_secs(2)).unwrap();
    let run = MonitorBuilder::new()
        .base_url(server.uri())
        .health_path("/health")
        .endpoints(endpoints())
        .interval(Duration::from_millis(10))
        .max_ticks(3)
        .notifier(Arc::new(notifier))
        .spawn()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(run.ticks, 3);
    assert_eq!(run.alerts.len(), 3);
}

#[tokio::test]
async fn stop_signal_ends_long_running_monitor() {
    let server = service(200).await;
    let handle = MonitorBuilder::new()
        .base_url(server.uri())
        .health_path("/health")
        .endpoints(endpoints())
        .interval(Duration::from_secs(3600))
        .notifier(Arc::new(NoopNotifier))
        .spawn()
        .unwrap();

    // Let the first check finish before stopping during the sleep
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(handle.state(), MonitorState::Running);

    let run = tokio::time::timeout(Duration::from_secs(5), handle.stop_and_join())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.ticks, 1);
    assert!(run.report.has_data());
}

#[tokio::test]
async fn single_check_against_unreachable_target() {
    let mut monitor = MonitorBuilder::new()
        .base_url("http://127.0.0.1:9")
        .endpoints(endpoints())
        .timeout(Duration::from_secs(2))
        .notifier(Arc::new(NoopNotifier))
        .build()
        .unwrap();

    let outcome = monitor.run_single_check().await;
    assert!(!outcome.health.success);
    assert_eq!(outcome.health.status_code, 0);
    assert!(outcome.endpoints.iter().all(|r| !r.success));

    let alert = outcome.alert.unwrap();
    assert!(alert.reasons[0].starts_with("health check failed"));
    assert_eq!(monitor.alert_history().len(), 1);
}

#[tokio::test]
async fn history_and_report_files_round_trip() {
    let server = service(200).await;
    let run = MonitorBuilder::new()
        .base_url(server.uri())
        .health_path("/health")
        .endpoints(endpoints())
        .interval(Duration::from_millis(10))
        .max_ticks(2)
        .notifier(Arc::new(NoopNotifier))
        .spawn()
        .unwrap()
        .join()
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();

    let csv_path = dir.path().join("history.csv");
    let file = std::fs::File::create(&csv_path).unwrap();
    report::write_history_csv(file, run.health.iter().chain(run.endpoints.iter())).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 1 + 2 + 4);
    assert!(csv.lines().nth(1).unwrap().contains("health_check"));

    let json_path = dir.path().join("report.json");
    std::fs::write(&json_path, serde_json::to_vec_pretty(&run.report).unwrap()).unwrap();
    let saved: SavedReport =
        serde_json::from_reader(std::fs::File::open(&json_path).unwrap()).unwrap();
    let SavedReport::Monitor(report) = saved else {
        panic!("expected a monitor report");
    };
    assert!(report.has_data());
    let (MonitorReport::Summary(saved), MonitorReport::Summary(original)) = (&report, &run.report)
    else {
        panic!("expected summary reports");
    };
    assert_eq!(saved.summary.total_requests, original.summary.total_requests);
    assert_eq!(saved.health_status, original.health_status);
    assert_eq!(
        saved.endpoint_stats.keys().collect::<Vec<_>>(),
        ["list", "stats"]
    );

    let mut text = Vec::new();
    report::render_monitor_text(&mut text, &report).unwrap();
    let text = String::from_utf8(text).unwrap();
    assert!(text.contains("Period:\t\tlast 24 hours"));
    assert!(text.contains("stats"));
}
