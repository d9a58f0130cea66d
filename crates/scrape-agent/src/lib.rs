//! # scrape-agent
//!
//! The broker scrape exporter daemon.
//!
//! This crate wires the collection pipeline together and runs it:
//! - One refresh actor per background endpoint, publishing snapshots
//! - On-demand collection for zero-interval endpoints and ad-hoc queries
//! - The HTTP front end serving snapshots, self-metrics and status
//! - Logging initialisation and the `broker-exporter` binary

pub mod agent;
pub mod config;
pub mod services;

// Re-export commonly used types
pub use agent::{Agent, AgentBuilder};
pub use config::{AgentConfig, LoggingConfig};
pub use services::{ActorState, Dispatcher, RefreshActor};

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] scrape_core::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] scrape_metrics::MetricsError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Whether the error stems from invalid configuration
    pub fn is_fatal_config(&self) -> bool {
        match self {
            AgentError::Config(_) => true,
            AgentError::Core(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Load the configuration, initialise logging and build the agent
pub async fn init_agent(config: &AgentConfig) -> Result<Agent> {
    init_logging(&config.logging)?;

    tracing::info!(
        "Initializing broker exporter for {} with {} endpoints",
        config.exporter.broker.url,
        config.exporter.endpoints.len()
    );

    AgentBuilder::new().with_config(config.clone()).build()
}

/// Initialize logging and tracing
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging_config.show_target)
        .with_thread_ids(logging_config.show_thread_ids)
        .with_line_number(logging_config.show_line_numbers);

    let installed = match logging_config.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };
    installed.map_err(|e| AgentError::Service(format!("Failed to install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AgentError::Core(scrape_core::Error::config("bad")).is_fatal_config());
        assert!(!AgentError::Core(scrape_core::Error::transport("down")).is_fatal_config());
        assert!(!AgentError::Service("x".to_string()).is_fatal_config());
    }
}
