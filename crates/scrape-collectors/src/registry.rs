//! Registry mapping family names to collectors

use crate::collector::Collector;
use crate::families::{
    ClientStatsCollector, QueueStatsCollector, QueueStatsV2Collector, VersionCollector,
    VpnStatsCollector, VpnStatsV2Collector,
};
use scrape_core::{DataSource, Endpoint, Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Collectors keyed by family name
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    collectors: BTreeMap<&'static str, Arc<dyn Collector>>,
}

impl CollectorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in family
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VersionCollector));
        registry.register(Arc::new(VpnStatsCollector));
        registry.register(Arc::new(QueueStatsCollector));
        registry.register(Arc::new(ClientStatsCollector));
        registry.register(Arc::new(VpnStatsV2Collector));
        registry.register(Arc::new(QueueStatsV2Collector));
        registry
    }

    /// Register a collector, replacing any previous one for its family
    pub fn register(&mut self, collector: Arc<dyn Collector>) {
        debug!("Registering collector for family {}", collector.family());
        self.collectors.insert(collector.family(), collector);
    }

    pub fn get(&self, family: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.get(family).cloned()
    }

    /// Registered family names, sorted
    pub fn families(&self) -> Vec<&'static str> {
        self.collectors.keys().copied().collect()
    }

    /// Check that a data source names a known family and suits it
    pub fn validate_source(&self, source: &DataSource) -> Result<()> {
        let collector = self.get(&source.family).ok_or_else(|| {
            Error::config(format!(
                "Unknown metric family '{}' (known: {})",
                source.family,
                self.families().join(", ")
            ))
        })?;
        collector.validate(source)
    }

    /// Check every data source of an endpoint
    pub fn validate_endpoint(&self, endpoint: &Endpoint) -> Result<()> {
        for source in &endpoint.sources {
            self.validate_source(source).map_err(|e| {
                Error::config(format!("Endpoint '{}': {}", endpoint.name, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_families() {
        let registry = CollectorRegistry::with_defaults();
        assert_eq!(
            registry.families(),
            vec![
                "ClientStats",
                "QueueStats",
                "QueueStatsV2",
                "Version",
                "VpnStats",
                "VpnStatsV2"
            ]
        );
        assert!(registry.get("QueueStats").is_some());
        assert!(registry.get("Nope").is_none());
    }

    #[test]
    fn test_validate_endpoint() {
        let registry = CollectorRegistry::with_defaults();

        let good = Endpoint::new(
            "e",
            vec![DataSource::new("Version"), DataSource::new("QueueStats")],
            Duration::ZERO,
        );
        assert!(registry.validate_endpoint(&good).is_ok());

        let unknown = Endpoint::new("e", vec![DataSource::new("Bogus")], Duration::ZERO);
        let err = registry.validate_endpoint(&unknown).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Unknown metric family 'Bogus'"));

        let wildcard_v2 = Endpoint::new("e", vec![DataSource::new("QueueStatsV2")], Duration::ZERO);
        assert!(registry.validate_endpoint(&wildcard_v2).is_err());
    }
}
