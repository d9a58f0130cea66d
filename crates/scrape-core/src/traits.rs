//! Core traits for scrape components

use crate::{Measurement, Result};
use async_trait::async_trait;
use std::fmt;

/// Ordered collector of measurements that collector functions push into
pub trait MetricSink: Send {
    /// Append a measurement
    fn push(&mut self, measurement: Measurement);

    /// Number of measurements pushed so far
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricSink for Vec<Measurement> {
    fn push(&mut self, measurement: Measurement) {
        Vec::push(self, measurement);
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// One call against the broker's management interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerRequest {
    /// XML command posted to the command endpoint
    Command { body: String },

    /// JSON resource fetched with GET; either a path relative to the broker
    /// URL or an absolute URI handed out by the broker
    Fetch { target: String },
}

impl fmt::Display for BrokerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerRequest::Command { body } => write!(f, "POST {} bytes", body.len()),
            BrokerRequest::Fetch { target } => write!(f, "GET {}", target),
        }
    }
}

/// Raw reply to a [`BrokerRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerResponse {
    pub status: u16,
    pub body: String,
}

impl BrokerResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Carrier for broker calls
///
/// Authorization is split from sending so callers can resolve credentials
/// before taking an admission ticket.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Resolve the `Authorization` header value for the next call
    async fn authorize(&self) -> Result<Option<String>>;

    /// Issue one call. Network failures and timeouts are transport errors;
    /// non-2xx statuses are returned as responses.
    async fn send(
        &self,
        request: &BrokerRequest,
        authorization: Option<&str>,
    ) -> Result<BrokerResponse>;
}
