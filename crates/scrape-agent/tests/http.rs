//! HTTP front end exercised through the router

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use scrape_agent::{Agent, AgentBuilder, AgentConfig};
use scrape_core::{EndpointConfig, SourceConfig};
use scrape_dev::fixtures::{version_xml, xml_reply};
use scrape_dev::{test_broker_config, MockBroker};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn agent(broker: &MockBroker) -> Agent {
    let mut config = AgentConfig::default();
    config.exporter.broker = test_broker_config();
    config.exporter.endpoints = vec![
        EndpointConfig {
            name: "background".to_string(),
            path: Some("/metrics/broker".to_string()),
            refresh_interval_seconds: 30,
            sources: vec![SourceConfig::new("Version", "*|*")],
        },
        EndpointConfig {
            name: "ondemand".to_string(),
            path: None,
            refresh_interval_seconds: 0,
            sources: vec![SourceConfig::new("Version", "*|*")],
        },
    ];

    AgentBuilder::new()
        .with_config(config)
        .with_transport(Arc::new(broker.clone()))
        .build()
        .unwrap()
}

fn version_broker() -> MockBroker {
    let broker = MockBroker::new();
    broker.on("<version/>", xml_reply(&version_xml("soltr_10.4", 120), None));
    broker
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_background_endpoint_before_and_after_first_cycle() {
    let broker = version_broker();
    let mut agent = agent(&broker);
    let router = agent.router();

    let (status, body) = get(&router, "/metrics/broker").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "not yet collected");

    agent.start_actors();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let (status, body) = get(&router, "/metrics/broker").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("broker_system_version_info{version=\"soltr_10.4\"} 1"));
    assert!(body.contains("broker_system_uptime_seconds 120"));
    assert!(body.contains("broker_up{error=\"\"} 1"));

    // Reads are served from the snapshot
    assert_eq!(broker.request_count(), 1);

    agent.stop().await;
}

#[tokio::test]
async fn test_zero_interval_endpoint_collects_per_read() {
    let broker = version_broker();
    let agent = agent(&broker);
    let router = agent.router();

    for expected in 1..=2 {
        let (status, body) = get(&router, "/ondemand").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("broker_up{error=\"\"} 1"));
        assert_eq!(broker.request_count(), expected);
    }
}

#[tokio::test]
async fn test_down_snapshot_is_served_with_ok_status() {
    let broker = MockBroker::new();
    broker.fail("<version/>", "connection refused");
    let agent = agent(&broker);

    let (status, body) = get(&agent.router(), "/ondemand").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("broker_up{error=\"Version: Transport error: connection refused\"} 0"));
}

#[tokio::test]
async fn test_adhoc_scrape() {
    let broker = version_broker();
    let agent = agent(&broker);
    let router = agent.router();

    let (status, body) = get(&router, "/scrape?m.Version=*%7C*").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("broker_system_version_info"));

    let (status, body) = get(&router, "/scrape?m.Bogus=*%7C*").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Unknown metric family 'Bogus'"));

    let (status, _) = get(&router, "/scrape").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(broker.request_count(), 1);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let agent = agent(&MockBroker::new());
    let (status, _) = get(&agent.router(), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_health_status_and_self_metrics() {
    let broker = version_broker();
    let mut agent = agent(&broker);
    let router = agent.router();
    agent.start_actors();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let (status, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["endpoints"], 2);

    let (status, body) = get(&router, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let status_json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let background = &status_json["endpoints"][0];
    assert_eq!(background["name"], "background");
    assert_eq!(background["state"], "sleeping");
    assert_eq!(background["generation"], 1);
    assert_eq!(background["up"], true);
    let ondemand = &status_json["endpoints"][1];
    assert!(ondemand["state"].is_null());
    assert_eq!(ondemand["generation"], 0);

    let (status, body) = get(&router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("broker_exporter_cycles_total{endpoint=\"background\",outcome=\"up\"} 1"));
    assert!(body.contains("broker_exporter_admission_in_flight 0"));

    agent.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reads_of_zero_interval_endpoint_publish_in_order() {
    let broker = MockBroker::new().with_latency(Duration::from_secs(5));
    broker.on_sequence(
        "<version/>",
        vec![
            xml_reply(&version_xml("soltr_10.4", 120), None),
            xml_reply(&version_xml("soltr_10.5", 130), None),
        ],
    );
    let agent = agent(&broker);
    let router = agent.router();

    let (first, second) = tokio::join!(get(&router, "/ondemand"), get(&router, "/ondemand"));
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert_eq!(broker.request_count(), 2);
    assert_eq!(broker.high_water_mark(), 1);

    let store = &agent.state().endpoints[1].store;
    assert_eq!(store.generation(), 2);
    let published = scrape_metrics::render_snapshot(store.read().snapshot().unwrap()).unwrap();
    assert!(published.contains("version=\"soltr_10.5\""));
}
