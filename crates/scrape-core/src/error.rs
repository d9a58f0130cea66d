//! Error handling for the scrape exporter
//!
//! Provides the error taxonomy shared by the broker client, the collectors
//! and the dispatcher. Everything except configuration errors is local to one
//! collection cycle of one endpoint.

use std::fmt;

/// Result type alias for scrape operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the scrape exporter
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network failure, non-2xx status, timeout or an abandoned admission wait
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body does not decode into the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The broker explicitly returned a non-success result
    #[error("Broker rejected request: {0}")]
    UpstreamRejected(String),

    /// Credential or token acquisition failed
    #[error("Authorization error: {0}")]
    Auth(String),

    /// Contract violation detected at configuration or emission time
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration loading errors
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Coarse classification of an [`Error`], used for diagnostics and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Protocol,
    UpstreamRejected,
    Auth,
    Configuration,
}

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an upstream rejection carrying the broker's reason
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::UpstreamRejected(reason.into())
    }

    /// Create an authorization error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) | Error::Io(_) => ErrorKind::Transport,
            Error::Protocol(_) | Error::Json(_) => ErrorKind::Protocol,
            Error::UpstreamRejected(_) => ErrorKind::UpstreamRejected,
            Error::Auth(_) => ErrorKind::Auth,
            Error::InvalidConfiguration(_) | Error::Yaml(_) | Error::Config(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// Whether this error indicates a defect rather than an environmental fault.
    ///
    /// Fatal errors are never folded into a health measurement; they end the
    /// process.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

impl ErrorKind {
    /// Stable lowercase name used in metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::UpstreamRejected => "upstream_rejected",
            ErrorKind::Auth => "auth",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
