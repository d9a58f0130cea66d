//! Process-wide admission control for broker calls
//!
//! Every broker-bound call holds an [`AdmissionTicket`] for its duration.
//! The controller is a counting gate over a tokio semaphore; a ticket gives
//! its permit back when dropped, so release happens on every exit path.

use scrape_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Waits at least this long are logged
const DEFAULT_SLOW_WAIT: Duration = Duration::from_millis(500);

/// Counting gate bounding concurrent broker calls
#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    slow_wait: Duration,
}

/// A held permit; returned to the controller when dropped
#[derive(Debug)]
pub struct AdmissionTicket {
    _permit: OwnedSemaphorePermit,
    waited: Duration,
}

impl AdmissionTicket {
    /// Time spent waiting for this ticket
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl AdmissionController {
    /// Create a controller admitting at most `capacity` concurrent calls
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            slow_wait: DEFAULT_SLOW_WAIT,
        }
    }

    /// Log waits longer than `threshold`
    pub fn with_slow_wait_threshold(mut self, threshold: Duration) -> Self {
        self.slow_wait = threshold;
        self
    }

    /// Wait for a ticket.
    ///
    /// The wait is abandoned when `cancel` fires; that surfaces as a
    /// transport error so the call is reported like any other skipped call.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<AdmissionTicket> {
        let started = Instant::now();

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::transport("Admission wait cancelled"));
            }
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| Error::transport("Admission controller closed"))?
            }
        };

        let waited = started.elapsed();
        if waited >= self.slow_wait {
            debug!(
                "Waited {:?} for broker admission ({} of {} in flight)",
                waited,
                self.in_flight(),
                self.capacity
            );
        }

        Ok(AdmissionTicket {
            _permit: permit,
            waited,
        })
    }

    /// Return a ticket's permit
    pub fn release(&self, ticket: AdmissionTicket) {
        drop(ticket);
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tickets currently held
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_acquire_and_release() {
        let admission = AdmissionController::new(2);
        let cancel = CancellationToken::new();

        let first = admission.acquire(&cancel).await.unwrap();
        let second = admission.acquire(&cancel).await.unwrap();
        assert_eq!(admission.in_flight(), 2);

        admission.release(first);
        assert_eq!(admission.in_flight(), 1);

        drop(second);
        assert_eq!(admission.in_flight(), 0);
        assert_eq!(admission.capacity(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_capacity() {
        let admission = Arc::new(AdmissionController::new(2));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let admission = Arc::clone(&admission);
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                let _ticket = admission.acquire(&cancel).await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(admission.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_wait_is_transport_error() {
        let admission = AdmissionController::new(1);
        let cancel = CancellationToken::new();
        let _held = admission.acquire(&cancel).await.unwrap();

        let waiter_cancel = CancellationToken::new();
        let waiter = {
            let admission = admission.clone();
            let token = waiter_cancel.clone();
            tokio::spawn(async move { admission.acquire(&token).await })
        };

        tokio::task::yield_now().await;
        waiter_cancel.cancel();

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), scrape_core::ErrorKind::Transport);
        assert_eq!(admission.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_ticket_released_on_panic() {
        let admission = AdmissionController::new(1);

        let task = {
            let admission = admission.clone();
            tokio::spawn(async move {
                let _ticket = admission.acquire(&CancellationToken::new()).await.unwrap();
                panic!("collector blew up");
            })
        };
        assert!(task.await.is_err());

        assert_eq!(admission.in_flight(), 0);
    }
}
