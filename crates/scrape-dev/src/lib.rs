//! # scrape-dev
//!
//! Development and testing utilities for the broker scrape exporter.
//!
//! This crate provides:
//! - A scripted mock broker transport with a request log, concurrency
//!   high-water mark, latency and hold/release control
//! - Reply fixtures for both management protocol flavors
//! - Test logging and configuration helpers

pub mod fixtures;
pub mod mock_broker;
pub mod utils;

// Re-export commonly used types
pub use mock_broker::{MockBroker, MockReply};
pub use utils::{setup_test_logging, test_broker_config, test_endpoint};
