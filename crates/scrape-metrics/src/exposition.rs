//! Snapshot rendering
//!
//! Each render builds a throwaway [`Registry`] from the snapshot's
//! descriptors, fills it with the measurement values and encodes it. The
//! snapshot's contents are handed over unmodified: no aggregation, no
//! renaming.

use crate::{encode, MetricsError, Result};
use prometheus::{CounterVec, GaugeVec, Opts, Registry};
use scrape_core::{Measurement, MetricDesc, Snapshot, ValueKind};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Content type of the rendered text
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

impl Family {
    fn new(desc: &MetricDesc) -> Result<Self> {
        let opts = Opts::new(desc.name(), desc.help());
        let labels: Vec<&str> = desc.label_names().iter().map(String::as_str).collect();
        Ok(match desc.kind() {
            ValueKind::Gauge => Family::Gauge(GaugeVec::new(opts, &labels)?),
            ValueKind::Counter => Family::Counter(CounterVec::new(opts, &labels)?),
        })
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        match self {
            Family::Gauge(vec) => registry.register(Box::new(vec.clone()))?,
            Family::Counter(vec) => registry.register(Box::new(vec.clone()))?,
        }
        Ok(())
    }

    fn record(&self, measurement: &Measurement) -> Result<()> {
        let labels: Vec<&str> = measurement.label_values().iter().map(String::as_str).collect();
        match self {
            Family::Gauge(vec) => vec.get_metric_with_label_values(&labels)?.set(measurement.value()),
            Family::Counter(vec) => {
                if measurement.value() < 0.0 || measurement.value().is_nan() {
                    warn!(
                        "Dropping counter {} with invalid value {}",
                        measurement.desc().name(),
                        measurement.value()
                    );
                    return Ok(());
                }
                let counter = vec.get_metric_with_label_values(&labels)?;
                counter.reset();
                counter.inc_by(measurement.value());
            }
        }
        Ok(())
    }
}

/// Render a snapshot in the Prometheus text format
pub fn render_snapshot(snapshot: &Snapshot) -> Result<String> {
    let registry = Registry::new();
    let mut families: HashMap<&str, (Arc<MetricDesc>, Family)> = HashMap::new();

    for measurement in snapshot.measurements() {
        let desc = measurement.desc();
        let (known, family) = match families.entry(desc.name()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let family = Family::new(desc)?;
                family.register(&registry)?;
                entry.insert((Arc::clone(desc), family))
            }
        };

        if **known != **desc {
            return Err(MetricsError::Registry(format!(
                "Metric {} is described twice with different shapes",
                desc.name()
            )));
        }
        family.record(measurement)?;
    }

    encode(&registry)
}
