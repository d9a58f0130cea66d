//! Scripted broker transport for tests
//!
//! Replies are scripted per pattern. A request matches the first pattern,
//! in registration order, that its body (commands) or target (fetches)
//! contains. Scripted replies are handed out in order; the last one repeats.

use async_trait::async_trait;
use scrape_core::{BrokerRequest, BrokerResponse, BrokerTransport, Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// One scripted outcome
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(BrokerResponse),
    TransportFailure(String),
}

#[derive(Debug)]
struct Script {
    pattern: String,
    replies: VecDeque<MockReply>,
}

impl Script {
    fn next(&mut self) -> Option<MockReply> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

/// Mock broker implementing [`BrokerTransport`]
#[derive(Debug, Clone)]
pub struct MockBroker {
    inner: Arc<MockBrokerInner>,
}

#[derive(Debug)]
struct MockBrokerInner {
    scripts: Mutex<Vec<Script>>,
    requests: Mutex<Vec<BrokerRequest>>,
    authorizations: Mutex<Vec<Option<String>>>,
    auth_failure: Mutex<Option<String>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    authorize_calls: AtomicUsize,
    held: watch::Sender<bool>,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroker {
    /// Create a mock broker with no scripted replies
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        let inner = MockBrokerInner {
            scripts: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            authorizations: Mutex::new(Vec::new()),
            auth_failure: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            authorize_calls: AtomicUsize::new(0),
            held,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Delay every reply by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.inner.latency) = latency;
    }

    /// Queue a reply for requests containing `pattern`
    pub fn on(&self, pattern: &str, response: BrokerResponse) -> &Self {
        self.script(pattern, MockReply::Response(response))
    }

    /// Queue several replies for `pattern`, handed out in order
    pub fn on_sequence(&self, pattern: &str, responses: Vec<BrokerResponse>) -> &Self {
        for response in responses {
            self.on(pattern, response);
        }
        self
    }

    /// Queue a transport failure for `pattern`
    pub fn fail(&self, pattern: &str, message: &str) -> &Self {
        self.script(pattern, MockReply::TransportFailure(message.to_string()))
    }

    /// Make every authorization attempt fail
    pub fn fail_authorization(&self, message: &str) {
        *lock(&self.inner.auth_failure) = Some(message.to_string());
    }

    /// Block every call until [`MockBroker::release`]
    pub fn hold(&self) {
        self.inner.held.send_replace(true);
    }

    /// Let held calls proceed
    pub fn release(&self) {
        self.inner.held.send_replace(false);
    }

    /// Drop every scripted reply
    pub fn clear(&self) {
        lock(&self.inner.scripts).clear();
    }

    fn script(&self, pattern: &str, reply: MockReply) -> &Self {
        let mut scripts = lock(&self.inner.scripts);
        match scripts.iter_mut().find(|s| s.pattern == pattern) {
            Some(script) => script.replies.push_back(reply),
            None => scripts.push(Script {
                pattern: pattern.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<BrokerRequest> {
        lock(&self.inner.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.inner.requests).len()
    }

    /// Requests whose body or target contains `pattern`
    pub fn requests_matching(&self, pattern: &str) -> usize {
        lock(&self.inner.requests)
            .iter()
            .filter(|r| request_text(r).contains(pattern))
            .count()
    }

    /// Authorization header values sent, in arrival order
    pub fn authorizations(&self) -> Vec<Option<String>> {
        lock(&self.inner.authorizations).clone()
    }

    pub fn authorize_calls(&self) -> usize {
        self.inner.authorize_calls.load(Ordering::SeqCst)
    }

    /// Calls currently inside `send`
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent calls observed
    pub fn high_water_mark(&self) -> usize {
        self.inner.high_water.load(Ordering::SeqCst)
    }

    fn next_reply(&self, request: &BrokerRequest) -> Option<MockReply> {
        let text = request_text(request);
        lock(&self.inner.scripts)
            .iter_mut()
            .find(|s| text.contains(&s.pattern))
            .and_then(Script::next)
    }
}

fn request_text(request: &BrokerRequest) -> &str {
    match request {
        BrokerRequest::Command { body } => body,
        BrokerRequest::Fetch { target } => target,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl BrokerTransport for MockBroker {
    async fn authorize(&self) -> Result<Option<String>> {
        self.inner.authorize_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.inner.auth_failure).clone() {
            Some(message) => Err(Error::auth(message)),
            None => Ok(Some("Bearer mock-token".to_string())),
        }
    }

    async fn send(
        &self,
        request: &BrokerRequest,
        authorization: Option<&str>,
    ) -> Result<BrokerResponse> {
        lock(&self.inner.requests).push(request.clone());
        lock(&self.inner.authorizations).push(authorization.map(str::to_string));

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.inner.in_flight);
        self.inner.high_water.fetch_max(now, Ordering::SeqCst);

        let mut held = self.inner.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        let latency = *lock(&self.inner.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.next_reply(request) {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::TransportFailure(message)) => Err(Error::transport(message)),
            None => {
                debug!("No scripted reply for {}", request);
                Ok(BrokerResponse::new(404, "no scripted reply"))
            }
        }
    }
}
