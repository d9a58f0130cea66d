//! # scrape-state
//!
//! Published collection state for the broker scrape exporter.
//!
//! This crate provides:
//! - The per-endpoint [`SnapshotStore`], swapped atomically on publish and
//!   read without blocking
//! - The in-memory [`MeasurementBuffer`] collectors push into during a cycle
//!
//! ## Example
//!
//! ```rust
//! use scrape_core::Snapshot;
//! use scrape_state::{SnapshotStore, SnapshotView};
//! use std::time::Duration;
//!
//! let store = SnapshotStore::new("broker");
//! assert!(matches!(store.read(), SnapshotView::NotYetCollected));
//!
//! store.publish(Snapshot::new("broker", vec![], None, Duration::ZERO));
//! assert_eq!(store.generation(), 1);
//! ```

pub mod sink;
pub mod store;

// Re-export commonly used types
pub use sink::MeasurementBuffer;
pub use store::{SnapshotStore, SnapshotView};
