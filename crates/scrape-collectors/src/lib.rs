//! # scrape-collectors
//!
//! Metric-family collectors for the broker scrape exporter.
//!
//! This crate provides:
//! - The [`Collector`] trait and the [`CollectContext`] collectors run in
//! - The [`CollectorRegistry`] mapping family names to collectors
//! - Collectors for version, VPN, queue and client statistics

pub mod collector;
pub mod families;
pub mod registry;

// Re-export commonly used types
pub use collector::{check_fields, CollectContext, Collector};
pub use registry::CollectorRegistry;
