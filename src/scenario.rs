use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::Read;
use std::time::Duration;

use crate::config::validate_method;
use crate::error::ConfigError;
use crate::models::{ProbeRequest, duration_secs, option_duration_secs};

/// A weighted request template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Path appended to the target base URL
    pub path: String,
    /// JSON body; string values may contain `{{timestamp}}`, `{{worker}}` and `{{seq}}`
    #[serde(default)]
    pub body_template: Option<Value>,
    /// How many times the scenario appears in the weighted expansion
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Pause after each request of this scenario
    #[serde(default, with = "option_duration_secs")]
    pub delay: Option<Duration>,
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_weight() -> u32 {
    1
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ScenarioDefinition {
    pub fn get(name: &str, path: &str, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            method: default_method(),
            path: path.to_string(),
            body_template: None,
            weight,
            delay: None,
            timeout: default_timeout(),
        }
    }

    pub fn post(name: &str, path: &str, body: Value, weight: u32) -> Self {
        Self {
            method: "POST".to_string(),
            body_template: Some(body),
            ..Self::get(name, path, weight)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Instantiate the request, filling body placeholders
    pub fn to_request(&self, worker: usize, seq: u64) -> ProbeRequest {
        ProbeRequest {
            label: self.name.clone(),
            method: self.method.clone(),
            path: self.path.clone(),
            body: self
                .body_template
                .as_ref()
                .map(|template| render_template(template, worker, seq)),
            timeout: self.timeout,
        }
    }
}

fn render_template(template: &Value, worker: usize, seq: u64) -> Value {
    match template {
        Value::String(s) if s.contains("{{") => {
            let timestamp = chrono::Utc::now().timestamp_micros().to_string();
            Value::String(
                s.replace("{{timestamp}}", &timestamp)
                    .replace("{{worker}}", &worker.to_string())
                    .replace("{{seq}}", &seq.to_string()),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_template(item, worker, seq))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), render_template(value, worker, seq)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Scenario indices, each repeated `weight` times in declaration order
fn expand(scenarios: &[ScenarioDefinition]) -> Result<Vec<usize>, ConfigError> {
    if scenarios.is_empty() {
        return Err(ConfigError::EmptyCatalog);
    }

    let mut expansion = Vec::new();
    for (index, scenario) in scenarios.iter().enumerate() {
        if scenario.weight == 0 {
            return Err(ConfigError::ZeroWeight(scenario.name.clone()));
        }
        if scenario.timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("scenario timeout"));
        }
        validate_method(&scenario.method)?;
        expansion.extend(std::iter::repeat_n(index, scenario.weight as usize));
    }
    Ok(expansion)
}

/// Immutable set of scenarios and their weighted expansion
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    scenarios: Vec<ScenarioDefinition>,
    /// Scenario indices, each repeated `weight` times in declaration order
    expansion: Vec<usize>,
}

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<ScenarioDefinition>) -> Result<Self, ConfigError> {
        let expansion = expand(&scenarios)?;
        Ok(Self {
            scenarios,
            expansion,
        })
    }

    /// Parse a JSON array of scenario definitions
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let scenarios: Vec<ScenarioDefinition> = serde_json::from_reader(reader)?;
        Self::new(scenarios)
    }

    /// The traffic mix of a typical user CRUD service
    pub fn default_catalog() -> Result<Self, ConfigError> {
        let scenarios = vec![
            ScenarioDefinition::get("health check", "/", 10),
            ScenarioDefinition::get("list users", "/users", 30),
            ScenarioDefinition::get("user stats", "/stats", 10),
            ScenarioDefinition::get("get user", "/users/1", 20),
            ScenarioDefinition::get("search users", "/users/search/alice", 15),
            ScenarioDefinition::post(
                "create user",
                "/users",
                json!({
                    "name": "load test user {{timestamp}}-{{worker}}-{{seq}}",
                    "email": "loadtest{{timestamp}}-{{worker}}-{{seq}}@example.com",
                    "age": 25
                }),
                10,
            ),
            ScenarioDefinition::get("age range", "/users/age-range/20/30", 5),
        ];
        Self::new(scenarios)
    }

    /// The scenario at position `cursor` of the weighted expansion, wrapping around
    pub fn select(&self, cursor: u64) -> &ScenarioDefinition {
        let slot = (cursor % self.expansion.len() as u64) as usize;
        &self.scenarios[self.expansion[slot]]
    }

    pub fn scenarios(&self) -> &[ScenarioDefinition] {
        &self.scenarios
    }

    /// Length of the weighted expansion, the sum of all weights
    pub fn total_weight(&self) -> usize {
        self.expansion.len()
    }
}
