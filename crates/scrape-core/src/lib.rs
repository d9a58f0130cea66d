//! # scrape-core
//!
//! Core types, traits, and utilities for the broker scrape exporter.
//!
//! This crate provides the data model shared by every other crate in the
//! workspace:
//!
//! - Endpoint and data source definitions
//! - Metric descriptors and measurements
//! - The published snapshot type
//! - The metric sink and broker transport traits
//! - Exporter configuration schema and loading
//! - The error taxonomy used across collection

pub mod config;
pub mod error;
pub mod metric;
pub mod snapshot;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::{AuthConfig, BrokerConfig, EndpointConfig, ExporterConfig, SourceConfig};
pub use error::{Error, ErrorKind, Result};
pub use metric::{Measurement, MetricDesc, ValueKind};
pub use snapshot::{up_desc, Snapshot, UP_METRIC_NAME};
pub use traits::{BrokerRequest, BrokerResponse, BrokerTransport, MetricSink};
pub use types::{DataSource, Endpoint, WILDCARD};
