//! In-memory metric sink

use scrape_core::{Measurement, MetricSink};

/// Ordered buffer of one cycle's measurements
#[derive(Debug, Default)]
pub struct MeasurementBuffer {
    measurements: Vec<Measurement>,
}

impl MeasurementBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Hand over the buffered measurements in push order
    pub fn into_measurements(self) -> Vec<Measurement> {
        self.measurements
    }
}

impl MetricSink for MeasurementBuffer {
    fn push(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    fn len(&self) -> usize {
        self.measurements.len()
    }
}
