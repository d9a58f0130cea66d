//! Test utilities

use scrape_core::{BrokerConfig, DataSource, Endpoint};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "scrape_dev=debug,scrape_broker=debug,scrape_collectors=debug,scrape_agent=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Broker configuration pointing nowhere, with test-friendly limits
pub fn test_broker_config() -> BrokerConfig {
    BrokerConfig {
        max_concurrent_requests: 2,
        page_size: 2,
        ..BrokerConfig::default()
    }
}

/// Endpoint over `families`, each matching everything
pub fn test_endpoint(name: &str, families: &[&str], refresh_interval: Duration) -> Endpoint {
    Endpoint::new(
        name,
        families.iter().map(|f| DataSource::new(*f)).collect(),
        refresh_interval,
    )
}
