//! Endpoint and data source definitions

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Filter value matching everything
pub const WILDCARD: &str = "*";

/// One named metric family to collect plus its query-narrowing filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    /// Family name, selects the collector function
    pub family: String,

    /// Primary-scope filter (message VPN name or wildcard)
    pub scope: String,

    /// Secondary-scope filter (item name or wildcard)
    pub item: String,

    /// Sub-metrics to request; empty means all
    pub fields: Vec<String>,
}

impl DataSource {
    /// Create a data source matching every scope and item
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            scope: WILDCARD.to_string(),
            item: WILDCARD.to_string(),
            fields: Vec::new(),
        }
    }

    /// Apply a `"scope|item"` filter expression
    pub fn with_filter(mut self, filter: &str) -> Result<Self> {
        let (scope, item) = parse_filter(filter)?;
        self.scope = scope;
        self.item = item;
        Ok(self)
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = item.into();
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the given sub-metric was requested
    pub fn selects(&self, field: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == field)
    }

    /// Whether the scope filter contains a wildcard
    pub fn scope_is_pattern(&self) -> bool {
        self.scope.contains('*') || self.scope.contains('?')
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}|{})", self.family, self.scope, self.item)
    }
}

/// Parse a `"scope|item"` filter expression.
///
/// A missing or empty part means [`WILDCARD`].
pub fn parse_filter(filter: &str) -> Result<(String, String)> {
    let mut parts = filter.split('|');
    let scope = parts.next().unwrap_or_default().trim();
    let item = parts.next().unwrap_or_default().trim();
    if parts.next().is_some() {
        return Err(Error::config(format!(
            "Invalid filter '{}': expected '<scope>|<item>'",
            filter
        )));
    }

    let or_wildcard = |s: &str| {
        if s.is_empty() {
            WILDCARD.to_string()
        } else {
            s.to_string()
        }
    };

    Ok((or_wildcard(scope), or_wildcard(item)))
}

/// One externally reachable scrape target
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// Endpoint name
    pub name: String,

    /// HTTP path the endpoint is served under
    pub path: String,

    /// Data sources, collected in order
    pub sources: Vec<DataSource>,

    /// Refresh interval; zero means collect on demand
    pub refresh_interval: Duration,
}

impl Endpoint {
    /// Create an endpoint served under `/<name>`
    pub fn new(name: impl Into<String>, sources: Vec<DataSource>, refresh_interval: Duration) -> Self {
        let name = name.into();
        Self {
            path: format!("/{}", name),
            name,
            sources,
            refresh_interval,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Whether a background refresh actor owns this endpoint
    pub fn is_background(&self) -> bool {
        !self.refresh_interval.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("default|orders*").unwrap(),
            ("default".to_string(), "orders*".to_string())
        );
        assert_eq!(
            parse_filter("default").unwrap(),
            ("default".to_string(), "*".to_string())
        );
        assert_eq!(parse_filter("").unwrap(), ("*".to_string(), "*".to_string()));
        assert_eq!(parse_filter("|q1").unwrap(), ("*".to_string(), "q1".to_string()));
        assert!(parse_filter("a|b|c").is_err());
    }

    #[test]
    fn test_data_source_builder() {
        let source = DataSource::new("QueueStats")
            .with_filter("vpn1|q*")
            .unwrap()
            .with_fields(["spooled_bytes"]);

        assert_eq!(source.scope, "vpn1");
        assert_eq!(source.item, "q*");
        assert!(source.selects("spooled_bytes"));
        assert!(!source.selects("spooled_messages"));
        assert!(!source.scope_is_pattern());
        assert_eq!(source.to_string(), "QueueStats(vpn1|q*)");

        let all = DataSource::new("VpnStats");
        assert!(all.selects("anything"));
        assert!(all.scope_is_pattern());
    }

    #[test]
    fn test_endpoint_defaults() {
        let endpoint = Endpoint::new("broker", vec![DataSource::new("Version")], Duration::ZERO);
        assert_eq!(endpoint.path, "/broker");
        assert!(!endpoint.is_background());

        let endpoint = endpoint.with_path("/custom");
        assert_eq!(endpoint.path, "/custom");

        let background = Endpoint::new("bg", vec![], Duration::from_secs(30));
        assert!(background.is_background());
    }
}
