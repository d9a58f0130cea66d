//! Published collection results
//!
//! A [`Snapshot`] is the outcome of one collection cycle for one endpoint.
//! It is built once and never edited; the next cycle replaces it wholesale.

use crate::{Measurement, MetricDesc};
use chrono::{DateTime, Utc};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Name of the synthesized health metric
pub const UP_METRIC_NAME: &str = "broker_up";

static UP_DESC: LazyLock<Arc<MetricDesc>> = LazyLock::new(|| {
    Arc::new(MetricDesc::gauge(
        UP_METRIC_NAME,
        "Whether every data source of the last collection cycle succeeded (1) or not (0)",
        &["error"],
    ))
});

/// Descriptor of the synthesized health metric
pub fn up_desc() -> Arc<MetricDesc> {
    Arc::clone(&UP_DESC)
}

/// The result of one completed collection cycle for one endpoint
#[derive(Debug, Clone)]
pub struct Snapshot {
    endpoint: String,
    generation: u64,
    measurements: Vec<Measurement>,
    error: Option<String>,
    collected_at: DateTime<Utc>,
    duration: Duration,
}

impl Snapshot {
    /// Create a snapshot; it is healthy when `error` is `None`
    pub fn new(
        endpoint: impl Into<String>,
        measurements: Vec<Measurement>,
        error: Option<String>,
        duration: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            generation: 0,
            measurements,
            error,
            collected_at: Utc::now(),
            duration,
        }
    }

    /// Stamp the publication generation
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Publication generation; 0 for snapshots that were never published
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Whether every data source of the cycle succeeded
    pub fn is_up(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Measurements of one metric, in emission order
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Measurement> + 'a {
        self.measurements.iter().filter(move |m| m.desc().name() == name)
    }

    /// Value of the health measurement, if the cycle produced one
    pub fn up_value(&self) -> Option<f64> {
        self.find(UP_METRIC_NAME).last().map(|m| m.value())
    }
}
