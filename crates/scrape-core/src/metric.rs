//! Metric descriptors and measurements
//!
//! A [`MetricDesc`] declares a metric's name, help text, kind and label
//! names. Collectors create [`Measurement`]s against a descriptor; the label
//! arity is checked at creation, so a sink never holds a malformed one.

use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Kind of value a metric carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Gauge,
    Counter,
}

/// Static description of one metric
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricDesc {
    name: String,
    help: String,
    kind: ValueKind,
    label_names: Vec<String>,
}

impl MetricDesc {
    /// Create a new descriptor
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        kind: ValueKind,
        label_names: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            label_names: label_names.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a gauge descriptor
    pub fn gauge(name: impl Into<String>, help: impl Into<String>, label_names: &[&str]) -> Self {
        Self::new(name, help, ValueKind::Gauge, label_names)
    }

    /// Create a counter descriptor
    pub fn counter(name: impl Into<String>, help: impl Into<String>, label_names: &[&str]) -> Self {
        Self::new(name, help, ValueKind::Counter, label_names)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

impl fmt::Display for MetricDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.name, self.label_names.join(","))
    }
}

/// One emitted numeric observation
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    desc: Arc<MetricDesc>,
    value: f64,
    label_values: Vec<String>,
}

impl Measurement {
    /// Create a measurement, checking the label values against the descriptor.
    ///
    /// A mismatch is a [`Error::InvalidConfiguration`]: it can only come from
    /// a defective collector, never from broker data.
    pub fn new<S: Into<String>>(
        desc: &Arc<MetricDesc>,
        value: f64,
        label_values: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let label_values: Vec<String> = label_values.into_iter().map(Into::into).collect();
        if label_values.len() != desc.label_names.len() {
            return Err(Error::config(format!(
                "Metric {} declares {} labels but {} values were given",
                desc,
                desc.label_names.len(),
                label_values.len()
            )));
        }

        Ok(Self {
            desc: Arc::clone(desc),
            value,
            label_values,
        })
    }

    pub fn desc(&self) -> &Arc<MetricDesc> {
        &self.desc
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Look up a label value by name
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .label_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.label_values[i].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_creation() {
        let desc = Arc::new(MetricDesc::gauge(
            "broker_queue_spool_usage_bytes",
            "Spool usage",
            &["vpn_name", "queue_name"],
        ));

        let m = Measurement::new(&desc, 42.0, ["default", "orders"]).unwrap();
        assert_eq!(m.value(), 42.0);
        assert_eq!(m.label("queue_name"), Some("orders"));
        assert_eq!(m.label("missing"), None);
        assert_eq!(m.desc().kind(), ValueKind::Gauge);
    }

    #[test]
    fn test_label_arity_mismatch_is_configuration_error() {
        let desc = Arc::new(MetricDesc::counter("broker_rx_msgs_total", "Received", &["vpn_name"]));

        let err = Measurement::new(&desc, 1.0, ["a", "b"]).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("declares 1 labels but 2"));

        let err = Measurement::new(&desc, 1.0, Vec::<String>::new()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_descriptor_display() {
        let desc = MetricDesc::gauge("broker_up", "Up", &["error"]);
        assert_eq!(desc.to_string(), "broker_up{error}");
    }
}
