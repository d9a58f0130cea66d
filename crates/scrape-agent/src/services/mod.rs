//! Collection services run by the exporter daemon

pub mod dispatcher;
pub mod refresh;
pub mod server;

// Re-export service implementations
pub use dispatcher::Dispatcher;
pub use refresh::{ActorState, RefreshActor};
pub use server::{EndpointEntry, ServerState};
