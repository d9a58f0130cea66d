//! Metric-family collectors
//!
//! Each family is an independent mapping from one broker query to
//! measurements. XML families use the command flavor; the `V2` families use
//! the JSON monitor flavor.

pub mod client;
pub mod monitor;
pub mod queue;
pub mod version;
pub mod vpn;

pub use client::ClientStatsCollector;
pub use monitor::{QueueStatsV2Collector, VpnStatsV2Collector};
pub use queue::QueueStatsCollector;
pub use version::VersionCollector;
pub use vpn::VpnStatsCollector;
