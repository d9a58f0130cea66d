//! Collector trait and the context collectors run in

use async_trait::async_trait;
use scrape_broker::{PagedQuery, QueryExecutor};
use scrape_core::{DataSource, Error, Measurement, MetricDesc, MetricSink, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a collector needs to talk to the broker
#[derive(Clone)]
pub struct CollectContext {
    executor: QueryExecutor,
    page_size: u32,
    cancel: CancellationToken,
}

impl CollectContext {
    pub fn new(executor: QueryExecutor, page_size: u32) -> Self {
        Self {
            executor,
            page_size,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon admission waits when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run a paginated query through the shared admission controller
    pub async fn query<Q: PagedQuery>(&self, query: &Q) -> Result<Vec<Q::Row>> {
        self.executor.execute(query, &self.cancel).await
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Maps one metric family from broker data to measurements
#[async_trait]
pub trait Collector: Send + Sync {
    /// Family name data sources refer to
    fn family(&self) -> &'static str;

    /// Selectable sub-metric names
    fn field_names(&self) -> Vec<&'static str>;

    /// Check a data source at configuration time
    fn validate(&self, source: &DataSource) -> Result<()> {
        check_fields(self.family(), &self.field_names(), source)
    }

    /// Query the broker and push measurements into `sink`
    async fn collect(
        &self,
        ctx: &CollectContext,
        source: &DataSource,
        sink: &mut dyn MetricSink,
    ) -> Result<()>;
}

/// Reject field selections the family does not know
pub fn check_fields(family: &str, known: &[&str], source: &DataSource) -> Result<()> {
    match source.fields.iter().find(|f| !known.contains(&f.as_str())) {
        Some(unknown) => Err(Error::config(format!(
            "Family {} has no field '{}' (known: {})",
            family,
            unknown,
            known.join(", ")
        ))),
        None => Ok(()),
    }
}

/// One selectable sub-metric of a row type
pub(crate) struct Field<R> {
    pub name: &'static str,
    pub desc: Arc<MetricDesc>,
    pub value: fn(&R) -> Option<f64>,
}

impl<R> Field<R> {
    pub fn new(name: &'static str, desc: &Arc<MetricDesc>, value: fn(&R) -> Option<f64>) -> Self {
        Self {
            name,
            desc: Arc::clone(desc),
            value,
        }
    }
}

/// Push the selected fields of one row; absent values are skipped
pub(crate) fn emit_row<R>(
    fields: &[Field<R>],
    source: &DataSource,
    row: &R,
    labels: &[&str],
    sink: &mut dyn MetricSink,
) -> Result<()> {
    for field in fields.iter().filter(|f| source.selects(f.name)) {
        if let Some(value) = (field.value)(row) {
            sink.push(Measurement::new(&field.desc, value, labels.iter().copied())?);
        }
    }
    Ok(())
}

pub(crate) fn field_names<R>(fields: &[Field<R>]) -> Vec<&'static str> {
    fields.iter().map(|f| f.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        a: Option<f64>,
        b: Option<f64>,
    }

    fn fields() -> Vec<Field<Row>> {
        let a = Arc::new(MetricDesc::gauge("test_a", "A", &["name"]));
        let b = Arc::new(MetricDesc::gauge("test_b", "B", &["name"]));
        vec![
            Field::new("a", &a, |r: &Row| r.a),
            Field::new("b", &b, |r: &Row| r.b),
        ]
    }

    #[test]
    fn test_emit_row_respects_selection_and_absent_values() {
        let row = Row {
            a: Some(1.0),
            b: None,
        };
        let mut sink: Vec<Measurement> = Vec::new();
        emit_row(&fields(), &DataSource::new("T"), &row, &["x"], &mut sink).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].desc().name(), "test_a");

        let row = Row {
            a: Some(1.0),
            b: Some(2.0),
        };
        let mut sink: Vec<Measurement> = Vec::new();
        let source = DataSource::new("T").with_fields(["b"]);
        emit_row(&fields(), &source, &row, &["x"], &mut sink).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].value(), 2.0);
    }

    #[test]
    fn test_emit_row_label_mismatch_is_fatal() {
        let row = Row {
            a: Some(1.0),
            b: None,
        };
        let mut sink: Vec<Measurement> = Vec::new();
        let err = emit_row(&fields(), &DataSource::new("T"), &row, &[], &mut sink).unwrap_err();
        assert!(err.is_fatal());
    }
}
