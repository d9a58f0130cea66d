//! Collection dispatcher
//!
//! Runs an endpoint's data sources in order against one fresh buffer and
//! turns the outcome into a [`Snapshot`]. The first failing source ends the
//! cycle; measurements of the sources before it are kept. Every snapshot
//! ends with one `broker_up` measurement.

use scrape_collectors::{CollectContext, CollectorRegistry};
use scrape_core::{up_desc, DataSource, Error, Measurement, MetricSink, Result, Snapshot};
use scrape_metrics::{CycleOutcome, ExporterMetrics};
use scrape_state::MeasurementBuffer;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Invokes registered collectors for a list of data sources
#[derive(Clone)]
pub struct Dispatcher {
    registry: CollectorRegistry,
    metrics: ExporterMetrics,
}

impl Dispatcher {
    pub fn new(registry: CollectorRegistry, metrics: ExporterMetrics) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &CollectorRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Collect `sources` into a snapshot for `endpoint`.
    ///
    /// Transport, protocol, upstream and auth failures mark the snapshot
    /// down. Configuration errors are returned instead: they can only come
    /// from a defective collector or unchecked configuration.
    pub async fn collect(
        &self,
        endpoint: &str,
        sources: &[DataSource],
        ctx: &CollectContext,
    ) -> Result<Snapshot> {
        let started = Instant::now();
        let mut buffer = MeasurementBuffer::new();
        let mut failure: Option<String> = None;

        for source in sources {
            let collector = self.registry.get(&source.family).ok_or_else(|| {
                Error::config(format!("No collector registered for family '{}'", source.family))
            })?;

            let source_started = Instant::now();
            let before = buffer.len();
            match collector.collect(ctx, source, &mut buffer).await {
                Ok(()) => {
                    debug!(
                        "Endpoint {}: {} emitted {} measurements in {:?}",
                        endpoint,
                        source,
                        buffer.len() - before,
                        source_started.elapsed()
                    );
                }
                Err(e) if e.is_fatal() => {
                    error!("Endpoint {}: {} failed fatally: {}", endpoint, source, e);
                    self.metrics
                        .record_cycle(endpoint, CycleOutcome::Fatal, started.elapsed());
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Endpoint {}: {} failed after {:?}: {}",
                        endpoint,
                        source,
                        source_started.elapsed(),
                        e
                    );
                    self.metrics
                        .record_source_failure(endpoint, &source.family, e.kind().as_str());
                    failure = Some(format!("{}: {}", source.family, e));
                    break;
                }
            }
        }

        let (up, outcome) = match failure {
            None => (1.0, CycleOutcome::Up),
            Some(_) => (0.0, CycleOutcome::Down),
        };
        buffer.push(Measurement::new(
            &up_desc(),
            up,
            [failure.as_deref().unwrap_or_default()],
        )?);

        let duration = started.elapsed();
        self.metrics.record_cycle(endpoint, outcome, duration);
        debug!(
            "Endpoint {}: cycle finished in {:?} with {} measurements (up={})",
            endpoint,
            duration,
            buffer.len(),
            up
        );

        Ok(Snapshot::new(
            endpoint,
            buffer.into_measurements(),
            failure,
            duration,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scrape_broker::{AdmissionController, QueryExecutor};
    use scrape_collectors::Collector;
    use scrape_core::{ErrorKind, MetricDesc, UP_METRIC_NAME};
    use scrape_dev::MockBroker;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behavior {
        Emit(usize),
        Fail(fn() -> Error),
    }

    struct ScriptedCollector {
        family: &'static str,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedCollector {
        fn new(family: &'static str, behavior: Behavior) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let collector = Arc::new(Self {
                family,
                behavior,
                calls: Arc::clone(&calls),
            });
            (collector, calls)
        }
    }

    #[async_trait]
    impl Collector for ScriptedCollector {
        fn family(&self) -> &'static str {
            self.family
        }

        fn field_names(&self) -> Vec<&'static str> {
            Vec::new()
        }

        async fn collect(
            &self,
            _ctx: &CollectContext,
            _source: &DataSource,
            sink: &mut dyn MetricSink,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Emit(count) => {
                    let desc = Arc::new(MetricDesc::gauge(
                        format!("test_{}", self.family.to_lowercase()),
                        "Test",
                        &["n"],
                    ));
                    for n in 0..*count {
                        sink.push(Measurement::new(&desc, n as f64, [n.to_string()])?);
                    }
                    Ok(())
                }
                Behavior::Fail(error) => Err(error()),
            }
        }
    }

    fn context() -> CollectContext {
        let executor = QueryExecutor::new(
            Arc::new(MockBroker::new()),
            Arc::new(AdmissionController::new(1)),
        );
        CollectContext::new(executor, 10)
    }

    fn sources(families: &[&str]) -> Vec<DataSource> {
        families.iter().map(|f| DataSource::new(*f)).collect()
    }

    #[tokio::test]
    async fn test_all_sources_healthy() {
        let (a, _) = ScriptedCollector::new("A", Behavior::Emit(2));
        let (b, _) = ScriptedCollector::new("B", Behavior::Emit(0));
        let mut registry = CollectorRegistry::new();
        registry.register(a);
        registry.register(b);

        let dispatcher = Dispatcher::new(registry, ExporterMetrics::default());
        let snapshot = dispatcher
            .collect("e", &sources(&["A", "B"]), &context())
            .await
            .unwrap();

        assert!(snapshot.is_up());
        assert_eq!(snapshot.measurements().len(), 3);
        assert_eq!(snapshot.up_value(), Some(1.0));
        let up = snapshot.find(UP_METRIC_NAME).next().unwrap();
        assert_eq!(up.label("error"), Some(""));
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_cycle() {
        let (a, a_calls) = ScriptedCollector::new("A", Behavior::Emit(2));
        let (b, b_calls) =
            ScriptedCollector::new("B", Behavior::Fail(|| Error::transport("connection refused")));
        let (c, c_calls) = ScriptedCollector::new("C", Behavior::Emit(5));
        let mut registry = CollectorRegistry::new();
        registry.register(a);
        registry.register(b);
        registry.register(c);

        let metrics = ExporterMetrics::default();
        let dispatcher = Dispatcher::new(registry, metrics.clone());
        let snapshot = dispatcher
            .collect("e", &sources(&["A", "B", "C"]), &context())
            .await
            .unwrap();

        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);

        assert!(!snapshot.is_up());
        assert_eq!(snapshot.find("test_a").count(), 2);
        assert_eq!(snapshot.find("test_c").count(), 0);
        assert_eq!(snapshot.up_value(), Some(0.0));

        let up = snapshot.find(UP_METRIC_NAME).next().unwrap();
        let label = up.label("error").unwrap();
        assert!(label.starts_with("B: "));
        assert!(label.contains("connection refused"));
        assert_eq!(snapshot.error(), Some(label));

        let text = metrics.render().unwrap();
        assert!(text.contains("family=\"B\",kind=\"transport\""));
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_a_down_snapshot() {
        let (a, _) = ScriptedCollector::new("A", Behavior::Fail(|| Error::config("label mismatch")));
        let mut registry = CollectorRegistry::new();
        registry.register(a);

        let dispatcher = Dispatcher::new(registry, ExporterMetrics::default());
        let err = dispatcher
            .collect("e", &sources(&["A"]), &context())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_unregistered_family_is_fatal() {
        let dispatcher = Dispatcher::new(CollectorRegistry::new(), ExporterMetrics::default());
        let err = dispatcher
            .collect("e", &sources(&["Missing"]), &context())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
