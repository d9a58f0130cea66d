//! Configuration management for the exporter daemon

use crate::{AgentError, Result};
use scrape_core::config::layered;
use scrape_core::ExporterConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete configuration for the exporter daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Broker, endpoint and listener configuration
    #[serde(flatten)]
    pub exporter: ExporterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Show target in logs
    pub show_target: bool,

    /// Show thread IDs in logs
    pub show_thread_ids: bool,

    /// Show line numbers in logs
    pub show_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
        }
    }
}

impl AgentConfig {
    /// Load from defaults, the configuration file and `BROKER_EXPORTER_*`
    /// environment variables, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut defaults = Self::default();
        defaults.exporter.endpoints.clear();

        let config: Self = layered(&defaults, path)?
            .try_deserialize()
            .map_err(scrape_core::Error::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file as-is, without environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AgentConfig = serde_yaml::from_str(&content)
            .map_err(|e| AgentError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.exporter.validate()?;

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(AgentError::Config(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            _ => {
                return Err(AgentError::Config(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }
}
