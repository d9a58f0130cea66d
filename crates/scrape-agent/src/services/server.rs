//! HTTP front end
//!
//! Endpoint paths serve the endpoint's published snapshot, or collect on
//! the spot for zero-interval endpoints. `/scrape` collects an ad-hoc list
//! of data sources through the same admission controller and dispatcher.
//!
//! On-demand collections of one endpoint are serialized so its store only
//! ever sees one writer. A configuration defect surfacing during an
//! on-demand collection is handed to the agent, which shuts down.

use super::{ActorState, Dispatcher};
use crate::{AgentError, Result};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use scrape_collectors::CollectContext;
use scrape_core::{DataSource, Endpoint, Snapshot};
use scrape_metrics::{render_snapshot, ExporterMetrics, CONTENT_TYPE};
use scrape_state::{SnapshotStore, SnapshotView};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Query-parameter prefix naming a family in `/scrape`
const SCRAPE_PARAM_PREFIX: &str = "m.";

/// Endpoint name ad-hoc collections are recorded under
const SCRAPE_ENDPOINT: &str = "scrape";

/// One configured endpoint as seen by the front end
pub struct EndpointEntry {
    pub endpoint: Endpoint,
    pub store: Arc<SnapshotStore>,
    pub actor_state: Option<watch::Receiver<ActorState>>,
    collect_lock: Mutex<()>,
}

impl EndpointEntry {
    pub fn new(
        endpoint: Endpoint,
        store: Arc<SnapshotStore>,
        actor_state: Option<watch::Receiver<ActorState>>,
    ) -> Self {
        Self {
            endpoint,
            store,
            actor_state,
            collect_lock: Mutex::new(()),
        }
    }
}

/// State shared by the HTTP handlers
pub struct ServerState {
    pub endpoints: Vec<EndpointEntry>,
    pub dispatcher: Arc<Dispatcher>,
    pub context: CollectContext,
    pub metrics: ExporterMetrics,
    pub started_at: DateTime<Utc>,
    pub fatal: mpsc::Sender<scrape_core::Error>,
}

impl ServerState {
    fn entry(&self, path: &str) -> Option<&EndpointEntry> {
        self.endpoints.iter().find(|e| e.endpoint.path == path)
    }

    /// Hand a fatal collection error to the agent and answer with a 500
    fn fail(&self, e: scrape_core::Error) -> Response {
        let body = e.to_string();
        error!("Fatal error during on-demand collection: {}", body);
        if self.fatal.try_send(e).is_err() {
            debug!("A fatal error is already pending");
        }
        text(StatusCode::INTERNAL_SERVER_ERROR, body)
    }
}

/// Build the router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/scrape", get(scrape_handler))
        .fallback(endpoint_handler)
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` fires
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<()> {
    info!("Serving HTTP on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AgentError::Service(format!("HTTP server failed: {}", e)))
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body.into()).into_response()
}

fn exposition(snapshot: &Snapshot) -> Response {
    match render_snapshot(snapshot) {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            warn!("Failed to render snapshot of {}: {}", snapshot.endpoint(), e);
            text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Handler for configured endpoint paths
async fn endpoint_handler(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let Some(entry) = state.entry(uri.path()) else {
        return text(StatusCode::NOT_FOUND, "not found");
    };

    if entry.endpoint.is_background() {
        return match entry.store.read() {
            SnapshotView::NotYetCollected => text(StatusCode::SERVICE_UNAVAILABLE, "not yet collected"),
            SnapshotView::Ready(snapshot) => exposition(&snapshot),
        };
    }

    let _writer = entry.collect_lock.lock().await;
    debug!("Collecting endpoint {} on demand", entry.endpoint.name);
    match state
        .dispatcher
        .collect(&entry.endpoint.name, &entry.endpoint.sources, &state.context)
        .await
    {
        Ok(snapshot) => {
            let response = exposition(&snapshot);
            entry.store.publish(snapshot);
            response
        }
        Err(e) => state.fail(e),
    }
}

/// Parse `m.<Family>=<scope>|<item>` pairs into validated data sources
fn parse_scrape_query(
    params: &[(String, String)],
    dispatcher: &Dispatcher,
) -> scrape_core::Result<Vec<DataSource>> {
    let mut sources = Vec::new();
    for (key, value) in params {
        let family = key.strip_prefix(SCRAPE_PARAM_PREFIX).ok_or_else(|| {
            scrape_core::Error::config(format!(
                "Unexpected parameter '{}'; expected {}<Family>=<scope>|<item>",
                key, SCRAPE_PARAM_PREFIX
            ))
        })?;
        let source = DataSource::new(family).with_filter(value)?;
        dispatcher.registry().validate_source(&source)?;
        sources.push(source);
    }

    if sources.is_empty() {
        return Err(scrape_core::Error::config("No data sources requested"));
    }
    Ok(sources)
}

/// Handler for ad-hoc collection
async fn scrape_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let sources = match parse_scrape_query(&params, &state.dispatcher) {
        Ok(sources) => sources,
        Err(e) => return text(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state
        .dispatcher
        .collect(SCRAPE_ENDPOINT, &sources, &state.context)
        .await
    {
        Ok(snapshot) => exposition(&snapshot),
        Err(e) => state.fail(e),
    }
}

/// Handler for exporter self-metrics
async fn metrics_handler(State(state): State<Arc<ServerState>>) -> Response {
    state
        .metrics
        .set_admission_in_flight(state.context.executor().admission().in_flight());

    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Handler for liveness
async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "started_at": state.started_at,
        "endpoints": state.endpoints.len(),
    }))
}

#[derive(Debug, Serialize)]
struct EndpointStatus {
    name: String,
    path: String,
    refresh_interval_seconds: u64,
    state: Option<ActorState>,
    generation: u64,
    up: Option<bool>,
    error: Option<String>,
    collected_at: Option<DateTime<Utc>>,
    duration_ms: Option<u128>,
}

impl EndpointStatus {
    fn of(entry: &EndpointEntry) -> Self {
        let view = entry.store.read();
        let snapshot = view.snapshot();
        Self {
            name: entry.endpoint.name.clone(),
            path: entry.endpoint.path.clone(),
            refresh_interval_seconds: entry.endpoint.refresh_interval.as_secs(),
            state: entry.actor_state.as_ref().map(|rx| *rx.borrow()),
            generation: entry.store.generation(),
            up: snapshot.map(|s| s.is_up()),
            error: snapshot.and_then(|s| s.error().map(str::to_string)),
            collected_at: snapshot.map(|s| s.collected_at()),
            duration_ms: snapshot.map(|s| s.duration().as_millis()),
        }
    }
}

/// Handler for per-endpoint status
async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let endpoints: Vec<EndpointStatus> = state.endpoints.iter().map(EndpointStatus::of).collect();
    Json(serde_json::json!({ "endpoints": endpoints }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrape_collectors::CollectorRegistry;

    #[test]
    fn test_parse_scrape_query() {
        let dispatcher = Dispatcher::new(CollectorRegistry::with_defaults(), ExporterMetrics::default());
        let params = vec![
            ("m.QueueStats".to_string(), "default|orders*".to_string()),
            ("m.Version".to_string(), "*|*".to_string()),
        ];
        let sources = parse_scrape_query(&params, &dispatcher).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].scope, "default");
        assert_eq!(sources[0].item, "orders*");

        let unknown = vec![("m.Bogus".to_string(), "*|*".to_string())];
        assert!(parse_scrape_query(&unknown, &dispatcher).is_err());

        let unprefixed = vec![("QueueStats".to_string(), "*|*".to_string())];
        assert!(parse_scrape_query(&unprefixed, &dispatcher).is_err());

        assert!(parse_scrape_query(&[], &dispatcher).is_err());
    }
}
