//! Configuration management for the scrape exporter
//!
//! Configuration is layered with precedence:
//! 1. Environment variables prefixed `BROKER_EXPORTER_` (highest)
//! 2. The YAML configuration file
//! 3. Built-in defaults (lowest)

use crate::types::parse_filter;
use crate::{DataSource, Endpoint, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "BROKER_EXPORTER_CONFIG";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "BROKER_EXPORTER";

/// Paths served by the exporter itself, unavailable to endpoints
pub const RESERVED_PATHS: &[&str] = &["/metrics", "/health", "/status", "/scrape"];

/// Longest accepted background refresh interval (one week)
pub const MAX_REFRESH_INTERVAL_SECONDS: u64 = 7 * 86_400;

/// Main configuration structure for the exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Address the HTTP front end binds to
    pub listen_addr: SocketAddr,

    /// Broker connection settings
    pub broker: BrokerConfig,

    /// Configured scrape endpoints
    pub endpoints: Vec<EndpointConfig>,
}

impl ExporterConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Without an explicit path, `BROKER_EXPORTER_CONFIG` is consulted and
    /// then `./broker-exporter.yaml`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Endpoint lists from a file replace the default endpoint rather than merge into it
        let mut defaults = Self::default();
        defaults.endpoints.clear();

        let parsed: Self = layered(&defaults, path)?.try_deserialize()?;
        parsed.validate()?;

        debug!(
            "Loaded configuration with {} endpoints for broker {}",
            parsed.endpoints.len(),
            parsed.broker.url
        );
        Ok(parsed)
    }

    /// Load configuration from a specific file, without environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut defaults = Self::default();
        defaults.endpoints.clear();

        let parsed: Self = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.broker.validate()?;

        if self.endpoints.is_empty() {
            return Err(Error::config("At least one endpoint must be configured"));
        }

        let mut names = HashSet::new();
        let mut paths = HashSet::new();
        for endpoint in &self.endpoints {
            endpoint.validate()?;

            if !names.insert(endpoint.name.as_str()) {
                return Err(Error::config(format!("Duplicate endpoint name '{}'", endpoint.name)));
            }
            let path = endpoint.path();
            if RESERVED_PATHS.contains(&path.as_str()) {
                return Err(Error::config(format!(
                    "Endpoint '{}' uses reserved path {}",
                    endpoint.name, path
                )));
            }
            if !paths.insert(path.clone()) {
                return Err(Error::config(format!("Duplicate endpoint path {}", path)));
            }
        }

        Ok(())
    }

    /// Build the immutable endpoint definitions
    pub fn build_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.endpoints.iter().map(EndpointConfig::build).collect()
    }
}

/// Layer `defaults`, the configuration file and the environment.
///
/// Without an explicit path, `BROKER_EXPORTER_CONFIG` is consulted and then
/// `./broker-exporter.yaml`, which may be absent.
pub fn layered<T: Serialize>(defaults: &T, path: Option<&Path>) -> Result<config::Config> {
    let mut builder = config::Config::builder().add_source(config::Config::try_from(defaults)?);

    builder = match path {
        Some(path) => builder.add_source(config::File::from(path)),
        None => match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => builder.add_source(config::File::with_name(&path)),
            Err(_) => builder
                .add_source(config::File::with_name("./broker-exporter.yaml").required(false)),
        },
    };

    let built = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(built)
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9628)),
            broker: BrokerConfig::default(),
            endpoints: vec![EndpointConfig {
                name: "broker".to_string(),
                path: None,
                refresh_interval_seconds: 30,
                sources: vec![
                    SourceConfig::new("Version", "*|*"),
                    SourceConfig::new("VpnStats", "*|*"),
                    SourceConfig::new("QueueStats", "*|*"),
                ],
            }],
        }
    }
}

/// Broker connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Base URL of the broker's management interface
    pub url: Url,

    /// Per-call timeout in seconds
    pub timeout_seconds: u64,

    /// Maximum number of broker calls in flight across the whole process
    pub max_concurrent_requests: usize,

    /// Rows requested per page
    pub page_size: u32,

    /// Upper bound on pages followed by one query
    pub max_pages: usize,

    /// Authorization scheme
    #[serde(default)]
    pub auth: AuthConfig,
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Broker URL must use http or https, got '{}'",
                self.url.scheme()
            )));
        }

        if self.max_concurrent_requests == 0 {
            return Err(Error::config("Max concurrent requests must be > 0"));
        }

        if self.timeout_seconds == 0 {
            return Err(Error::config("Broker timeout must be > 0"));
        }

        if self.page_size == 0 || self.max_pages == 0 {
            return Err(Error::config("Page size and max pages must be > 0"));
        }

        self.auth.validate()
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost:8080").expect("static URL is valid"),
            timeout_seconds: 5,
            max_concurrent_requests: 2,
            page_size: 100,
            max_pages: 10_000,
            auth: AuthConfig::None,
        }
    }
}

/// Broker authorization scheme
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authorization header
    #[default]
    None,

    /// HTTP Basic authorization
    Basic { username: String, password: String },

    /// OAuth2 client-credentials grant
    #[serde(rename = "oauth")]
    OAuth {
        token_url: Url,
        client_id: String,
        client_secret: String,
        #[serde(default)]
        scope: Option<String>,
    },
}

impl AuthConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            AuthConfig::None => Ok(()),
            AuthConfig::Basic { username, .. } if username.is_empty() => {
                Err(Error::config("Basic auth requires a username"))
            }
            AuthConfig::OAuth { client_id, .. } if client_id.is_empty() => {
                Err(Error::config("OAuth requires a client id"))
            }
            _ => Ok(()),
        }
    }
}

/// Endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint name
    pub name: String,

    /// HTTP path; defaults to `/<name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Background refresh interval; 0 collects on every request
    #[serde(default)]
    pub refresh_interval_seconds: u64,

    /// Data sources in collection order
    pub sources: Vec<SourceConfig>,
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("Endpoint name cannot be empty"));
        }

        if !self.path().starts_with('/') {
            return Err(Error::config(format!(
                "Endpoint '{}' path must start with '/'",
                self.name
            )));
        }

        if self.refresh_interval_seconds > MAX_REFRESH_INTERVAL_SECONDS {
            return Err(Error::config(format!(
                "Endpoint '{}' refresh interval {}s exceeds the maximum of {}s",
                self.name, self.refresh_interval_seconds, MAX_REFRESH_INTERVAL_SECONDS
            )));
        }

        if self.sources.is_empty() {
            return Err(Error::config(format!(
                "Endpoint '{}' has no data sources",
                self.name
            )));
        }

        for source in &self.sources {
            if source.family.is_empty() {
                return Err(Error::config(format!(
                    "Endpoint '{}' has a source without a family",
                    self.name
                )));
            }
            parse_filter(&source.filter)?;
        }

        Ok(())
    }

    /// Effective HTTP path
    pub fn path(&self) -> String {
        self.path.clone().unwrap_or_else(|| format!("/{}", self.name))
    }

    /// Build the immutable endpoint
    pub fn build(&self) -> Result<Endpoint> {
        let sources = self
            .sources
            .iter()
            .map(SourceConfig::build)
            .collect::<Result<Vec<_>>>()?;

        Ok(Endpoint::new(
            self.name.clone(),
            sources,
            Duration::from_secs(self.refresh_interval_seconds),
        )
        .with_path(self.path()))
    }
}

/// Data source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Metric family name
    pub family: String,

    /// `"<scope>|<item>"` filter
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Sub-metrics to collect; empty means all
    #[serde(default)]
    pub fields: Vec<String>,
}

fn default_filter() -> String {
    "*|*".to_string()
}

impl SourceConfig {
    pub fn new(family: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            filter: filter.into(),
            fields: Vec::new(),
        }
    }

    pub fn build(&self) -> Result<DataSource> {
        Ok(DataSource::new(self.family.clone())
            .with_filter(&self.filter)?
            .with_fields(self.fields.iter().cloned()))
    }
}
