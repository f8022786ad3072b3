use thiserror::Error;

/// Errors raised while validating a run before any request is sent
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid target URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("target URL {0:?} must use http or https")]
    UnsupportedScheme(String),

    #[error("at least one concurrent user is required")]
    NoUsers,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("{0} capacity must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("scenario catalog is empty")]
    EmptyCatalog,

    #[error("scenario {0:?} has weight 0, weights must be at least 1")]
    ZeroWeight(String),

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("{name} must be within {min}..={max}, got {value}")]
    ThresholdOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("failed to parse scenario catalog: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors raised by notification transports
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification endpoint rejected the alert with HTTP {0}")]
    Rejected(u16),
}
