//! # scrape-metrics
//!
//! Prometheus exposition for the broker scrape exporter.
//!
//! This crate provides:
//! - Rendering of a published [`Snapshot`](scrape_core::Snapshot) to the
//!   Prometheus text format
//! - The exporter's own metrics (cycles, durations, source failures,
//!   admission usage)

pub mod common;
pub mod exposition;

// Re-export commonly used types
pub use common::{CycleOutcome, ExporterMetrics};
pub use exposition::{render_snapshot, CONTENT_TYPE};

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error(transparent)]
    Core(#[from] scrape_core::Error),
}

impl From<prometheus::Error> for MetricsError {
    fn from(e: prometheus::Error) -> Self {
        MetricsError::Registry(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;

/// Encode every family gathered from `registry` as Prometheus text
pub(crate) fn encode(registry: &prometheus::Registry) -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| MetricsError::Export(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| MetricsError::Export(format!("Failed to convert metrics to string: {}", e)))
}
