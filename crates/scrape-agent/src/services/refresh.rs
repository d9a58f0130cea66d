//! Per-endpoint refresh actor
//!
//! The actor cycles `Collecting -> Publishing -> Sleeping` until shutdown.
//! A cycle starts one refresh interval after the previous one started; a
//! cycle that overruns the interval is followed by the next one at once, so
//! the next start is never earlier than the end of the previous cycle.
//! Shutdown is observed between cycles and while waiting for admission,
//! never in the middle of a broker call.

use super::Dispatcher;
use crate::Result;
use scrape_collectors::CollectContext;
use scrape_core::Endpoint;
use scrape_state::SnapshotStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Lifecycle state of a refresh actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorState {
    Idle,
    Collecting,
    Publishing,
    Sleeping,
    Stopped,
}

/// Background task keeping one endpoint's snapshot fresh
pub struct RefreshActor {
    endpoint: Endpoint,
    dispatcher: Arc<Dispatcher>,
    context: CollectContext,
    store: Arc<SnapshotStore>,
    state: watch::Sender<ActorState>,
}

impl RefreshActor {
    pub fn new(
        endpoint: Endpoint,
        dispatcher: Arc<Dispatcher>,
        context: CollectContext,
        store: Arc<SnapshotStore>,
    ) -> Self {
        let (state, _) = watch::channel(ActorState::Idle);
        Self {
            endpoint,
            dispatcher,
            context,
            store,
            state,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Observe the actor's state
    pub fn state(&self) -> watch::Receiver<ActorState> {
        self.state.subscribe()
    }

    /// Spawn the actor on the runtime
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run cycles until `shutdown` fires.
    ///
    /// Returns an error only for configuration defects; every other failure
    /// is published as a down snapshot and retried on the next cycle.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let name = self.endpoint.name.clone();
        let interval = self.endpoint.refresh_interval;
        let context = self.context.clone().with_cancel(shutdown.clone());
        info!("Starting refresh actor for endpoint {} every {:?}", name, interval);

        while !shutdown.is_cancelled() {
            let cycle_start = Instant::now();
            self.state.send_replace(ActorState::Collecting);

            let snapshot = match self
                .dispatcher
                .collect(&name, &self.endpoint.sources, &context)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("Refresh actor for endpoint {} stopping: {}", name, e);
                    self.state.send_replace(ActorState::Stopped);
                    return Err(e.into());
                }
            };

            if shutdown.is_cancelled() {
                debug!("Discarding cycle of endpoint {} interrupted by shutdown", name);
                break;
            }

            self.state.send_replace(ActorState::Publishing);
            self.store.publish(snapshot);

            self.state.send_replace(ActorState::Sleeping);
            let Some(next_start) = cycle_start.checked_add(interval) else {
                // Past the end of the clock: no further cycle is due
                shutdown.cancelled().await;
                break;
            };
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep_until(next_start) => {}
            }
        }

        self.state.send_replace(ActorState::Stopped);
        info!("Refresh actor for endpoint {} stopped", name);
        Ok(())
    }
}
