//! Core agent implementation

use crate::services::{server, Dispatcher, EndpointEntry, RefreshActor, ServerState};
use crate::{config::AgentConfig, AgentError, Result};
use axum::Router;
use scrape_broker::{AdmissionController, BrokerClient, QueryExecutor};
use scrape_collectors::{CollectContext, CollectorRegistry};
use scrape_core::BrokerTransport;
use scrape_metrics::{ExporterMetrics, MetricsError};
use scrape_state::SnapshotStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The exporter daemon: refresh actors plus the HTTP front end
pub struct Agent {
    config: AgentConfig,
    state: Arc<ServerState>,
    pending: Vec<RefreshActor>,
    tasks: Vec<TaskHandle>,
    fatal: mpsc::Receiver<scrape_core::Error>,
    shutdown: CancellationToken,
}

/// Handle to a supervised task
struct TaskHandle {
    name: String,
    handle: JoinHandle<Result<()>>,
}

impl Agent {
    /// Get the agent configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// State shared with the HTTP handlers
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Router serving this agent's endpoints
    pub fn router(&self) -> Router {
        server::router(Arc::clone(&self.state))
    }

    /// Token cancelled when the agent shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn one refresh actor per background endpoint
    pub fn start_actors(&mut self) {
        for actor in std::mem::take(&mut self.pending) {
            let name = format!("refresh actor '{}'", actor.endpoint().name);
            let handle = actor.spawn(self.shutdown.child_token());
            self.tasks.push(TaskHandle { name, handle });
        }
        info!("Started {} refresh actors", self.tasks.len());
    }

    /// Start the refresh actors and the HTTP server
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting broker exporter for {}", self.config.exporter.broker.url);

        self.start_actors();

        let listener = TcpListener::bind(self.config.exporter.listen_addr).await?;
        let router = self.router();
        let shutdown = self.shutdown.clone();
        self.tasks.push(TaskHandle {
            name: "HTTP server".to_string(),
            handle: tokio::spawn(server::serve(listener, router, shutdown)),
        });

        info!("Broker exporter started successfully");
        Ok(())
    }

    /// Run until a termination signal or a fatal task failure
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let outcome = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C signal");
                Ok(())
            }
            _ = wait_for_termination() => {
                info!("Received termination signal");
                Ok(())
            }
            failure = self.supervise() => Err(failure),
        };

        self.stop().await;
        outcome
    }

    /// Wait for the first supervised task to end, or for a fatal error
    /// reported by the HTTP front end, and report why
    pub async fn supervise(&mut self) -> AgentError {
        let Agent { tasks, fatal, .. } = self;
        tokio::select! {
            Some(e) = fatal.recv() => AgentError::from(e),
            failure = first_task_exit(tasks) => failure,
        }
    }

    /// Signal shutdown and wait for every task to finish
    pub async fn stop(&mut self) {
        info!("Stopping broker exporter");
        self.shutdown.cancel();

        for task in self.tasks.drain(..) {
            match task.handle.await {
                Ok(Ok(())) => info!("{} stopped", task.name),
                Ok(Err(e)) => error!("{} stopped with error: {}", task.name, e),
                Err(e) => error!("{} panicked: {}", task.name, e),
            }
        }

        info!("Broker exporter stopped");
    }
}

async fn first_task_exit(tasks: &mut Vec<TaskHandle>) -> AgentError {
    if tasks.is_empty() {
        return std::future::pending().await;
    }

    let (result, index, remaining) =
        futures::future::select_all(tasks.iter_mut().map(|t| &mut t.handle)).await;
    drop(remaining);
    let task = tasks.remove(index);

    match result {
        Ok(Ok(())) => AgentError::Service(format!("{} exited unexpectedly", task.name)),
        Ok(Err(e)) => {
            error!("{} failed: {}", task.name, e);
            e
        }
        Err(e) => AgentError::Service(format!("{} panicked: {}", task.name, e)),
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Wait for SIGTERM
#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    std::future::pending::<()>().await;
}

/// Builder for creating agents
#[derive(Default)]
pub struct AgentBuilder {
    config: Option<AgentConfig>,
    transport: Option<Arc<dyn BrokerTransport>>,
    registry: Option<CollectorRegistry>,
}

impl AgentBuilder {
    /// Create a new agent builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the agent configuration
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Talk to the broker through `transport` instead of HTTP
    pub fn with_transport(mut self, transport: Arc<dyn BrokerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom collector registry
    pub fn with_registry(mut self, registry: CollectorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate the configuration and wire the collection pipeline
    pub fn build(self) -> Result<Agent> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let registry = self.registry.unwrap_or_else(CollectorRegistry::with_defaults);
        let endpoints = config.exporter.build_endpoints()?;
        for endpoint in &endpoints {
            registry.validate_endpoint(endpoint)?;
        }

        let broker = &config.exporter.broker;
        let transport: Arc<dyn BrokerTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(BrokerClient::new(broker)?),
        };
        let admission = Arc::new(AdmissionController::new(broker.max_concurrent_requests));
        let executor = QueryExecutor::new(transport, admission).with_max_pages(broker.max_pages);

        let shutdown = CancellationToken::new();
        let context =
            CollectContext::new(executor, broker.page_size).with_cancel(shutdown.child_token());

        let metrics = ExporterMetrics::new().map_err(MetricsError::from)?;
        let dispatcher = Arc::new(Dispatcher::new(registry, metrics.clone()));

        let mut entries = Vec::with_capacity(endpoints.len());
        let mut pending = Vec::new();
        for endpoint in endpoints {
            let store = Arc::new(SnapshotStore::new(endpoint.name.clone()));
            let actor_state = if endpoint.is_background() {
                let actor = RefreshActor::new(
                    endpoint.clone(),
                    Arc::clone(&dispatcher),
                    context.clone(),
                    Arc::clone(&store),
                );
                let state = actor.state();
                pending.push(actor);
                Some(state)
            } else {
                None
            };
            entries.push(EndpointEntry::new(endpoint, store, actor_state));
        }

        let (fatal_tx, fatal) = mpsc::channel(1);
        let state = Arc::new(ServerState {
            endpoints: entries,
            dispatcher,
            context,
            metrics,
            started_at: chrono::Utc::now(),
            fatal: fatal_tx,
        });

        Ok(Agent {
            config,
            state,
            pending,
            tasks: Vec::new(),
            fatal,
            shutdown,
        })
    }
}
