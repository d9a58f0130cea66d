//! Exporter self-metrics

use crate::{encode, Result};
use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

/// How a collection cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Up,
    Down,
    Fatal,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Up => "up",
            CycleOutcome::Down => "down",
            CycleOutcome::Fatal => "fatal",
        }
    }
}

/// Metrics the exporter keeps about itself, served on `/metrics`
#[derive(Debug, Clone)]
pub struct ExporterMetrics {
    registry: Arc<Registry>,

    /// Completed collection cycles by endpoint and outcome
    pub cycles_total: CounterVec,

    /// Wall time of collection cycles
    pub cycle_duration_seconds: HistogramVec,

    /// Failed data sources by endpoint, family and error kind
    pub source_failures_total: CounterVec,

    /// Broker calls currently holding an admission ticket
    pub admission_in_flight: Gauge,
}

impl ExporterMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let metrics = Self {
            registry: Arc::new(Registry::new()),
            cycles_total: CounterVec::new(
                Opts::new("broker_exporter_cycles_total", "Completed collection cycles"),
                &["endpoint", "outcome"],
            )?,
            cycle_duration_seconds: HistogramVec::new(
                HistogramOpts::new(
                    "broker_exporter_cycle_duration_seconds",
                    "Duration of collection cycles",
                )
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
                &["endpoint"],
            )?,
            source_failures_total: CounterVec::new(
                Opts::new(
                    "broker_exporter_source_failures_total",
                    "Data sources that failed during collection",
                ),
                &["endpoint", "family", "kind"],
            )?,
            admission_in_flight: Gauge::new(
                "broker_exporter_admission_in_flight",
                "Broker calls currently holding an admission ticket",
            )?,
        };
        metrics.register()?;
        Ok(metrics)
    }

    fn register(&self) -> prometheus::Result<()> {
        self.registry.register(Box::new(self.cycles_total.clone()))?;
        self.registry
            .register(Box::new(self.cycle_duration_seconds.clone()))?;
        self.registry
            .register(Box::new(self.source_failures_total.clone()))?;
        self.registry
            .register(Box::new(self.admission_in_flight.clone()))?;
        Ok(())
    }

    /// Record the end of one collection cycle
    pub fn record_cycle(&self, endpoint: &str, outcome: CycleOutcome, duration: Duration) {
        self.cycles_total
            .with_label_values(&[endpoint, outcome.as_str()])
            .inc();
        self.cycle_duration_seconds
            .with_label_values(&[endpoint])
            .observe(duration.as_secs_f64());
    }

    /// Record one failed data source
    pub fn record_source_failure(&self, endpoint: &str, family: &str, kind: &str) {
        self.source_failures_total
            .with_label_values(&[endpoint, family, kind])
            .inc();
    }

    pub fn set_admission_in_flight(&self, in_flight: usize) {
        self.admission_in_flight.set(in_flight as f64);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the self-metrics in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        encode(&self.registry)
    }
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create ExporterMetrics")
    }
}
