use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("failed to read replay file {path}")]
    Replay {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("missing required configuration field: {field}")]
    MissingField { field: &'static str },
    #[error("invalid configuration for {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("configuration error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },
    #[error("probe of {endpoint} did not complete: {message}")]
    Task { endpoint: String, message: String },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification backend failed")]
    Backend,
    #[error("notification backend is not available on this platform")]
    Unsupported,
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Error};

    #[test]
    fn config_errors_render_transparently() {
        let err = Error::from(ConfigError::InvalidField {
            field: "throttling.backoff_multiplier",
            message: "must be greater than zero".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "invalid configuration for throttling.backoff_multiplier: must be greater than zero"
        );
    }
}
