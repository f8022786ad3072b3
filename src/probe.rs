use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::validate_base_url;
use crate::error::ConfigError;
use crate::models::{ProbeRequest, ProbeResult};

const USER_AGENT: &str = concat!("falconet/", env!("CARGO_PKG_VERSION"));

/// Issues one request and classifies its outcome
///
/// Implementations never fail: transport problems are reported as an
/// unsuccessful [`ProbeResult`].
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, request: &ProbeRequest) -> ProbeResult;
}

/// [`Prober`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    base_url: String,
}

impl HttpProber {
    /// Build a prober with its own connection pool
    ///
    /// `timeout` applies to requests sent through the client directly. Probes
    /// always use the timeout of their [`ProbeRequest`], which replaces it.
    pub fn new(base_url: &str, timeout: Duration, connections: usize) -> Result<Self, ConfigError> {
        validate_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(connections)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL for a request path
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, request: &ProbeRequest) -> ProbeResult {
        let timestamp = chrono::Utc::now();
        let start_time = Instant::now();

        let method = match Method::from_bytes(request.method.as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return ProbeResult::transport_error(
                    &request.label,
                    start_time.elapsed(),
                    timestamp,
                    format!("unsupported HTTP method: {}", request.method),
                );
            }
        };

        let url = self.url_for(&request.path);
        let mut request_builder = self
            .client
            .request(method, &url)
            .timeout(request.timeout);

        if let Some(body) = &request.body {
            request_builder = request_builder.json(body);
        }

        let result = match request_builder.send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();

                match response.bytes().await {
                    Ok(body) => ProbeResult::response(
                        &request.label,
                        status_code,
                        start_time.elapsed(),
                        body.len(),
                        timestamp,
                    ),
                    Err(e) => {
                        let mut result = ProbeResult::transport_error(
                            &request.label,
                            start_time.elapsed(),
                            timestamp,
                            format!("failed to read response body: {}", e),
                        );
                        result.status_code = status_code;
                        result
                    }
                }
            }
            Err(e) => ProbeResult::transport_error(
                &request.label,
                start_time.elapsed(),
                timestamp,
                describe_error(&e, request.timeout),
            ),
        };

        debug!(
            event = "probe",
            label = %result.endpoint_label,
            url = %url,
            success = result.success,
            status_code = result.status_code,
            latency_ms = result.latency.as_millis() as u64,
            bytes_in = result.response_size,
        );

        result
    }
}

fn describe_error(error: &reqwest::Error, timeout: Duration) -> String {
    if error.is_timeout() {
        format!("request timed out after {}", humantime::format_duration(timeout))
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        format!("request failed: {}", error)
    }
}
