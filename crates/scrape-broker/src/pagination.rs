//! Paginated query execution
//!
//! A [`PagedQuery`] describes one logical query: how to build the first and
//! follow-up requests, how to decode a page, and how to key a row. The
//! [`QueryExecutor`] drives it page by page through the admission
//! controller, threading a [`PaginationState`] through the loop.

use crate::admission::AdmissionController;
use scrape_core::{BrokerRequest, BrokerResponse, BrokerTransport, Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default bound on pages followed by one query
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// One decoded page of rows
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub rows: Vec<R>,

    /// Continuation token; `None` or empty means no more pages
    pub next_cursor: Option<String>,
}

impl<R> Page<R> {
    pub fn new(rows: Vec<R>, next_cursor: Option<String>) -> Self {
        Self { rows, next_cursor }
    }

    /// A page with no continuation
    pub fn last(rows: Vec<R>) -> Self {
        Self::new(rows, None)
    }
}

/// One logical broker query
pub trait PagedQuery: Send + Sync {
    type Row: Send;

    /// Request for the first page
    fn first_request(&self) -> BrokerRequest;

    /// Request for the page named by `cursor`
    fn next_request(&self, cursor: &str) -> BrokerRequest;

    /// Decode a successful response
    fn decode(&self, response: &BrokerResponse) -> Result<Page<Self::Row>>;

    /// Deduplication key of a row
    fn row_key(&self, row: &Self::Row) -> String;

    /// Turn a non-2xx response into an error
    fn classify_status(&self, response: &BrokerResponse) -> Error {
        Error::transport(format!("Broker returned HTTP {}", response.status))
    }
}

/// Per-invocation pagination bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    cursor: Option<String>,
    last_key: Option<String>,
    pages_fetched: usize,
}

impl PaginationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor of the next page, if any
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Key of the last row emitted so far
    pub fn last_key(&self) -> Option<&str> {
        self.last_key.as_deref()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Whether at least one page was taken and no continuation remains
    pub fn is_exhausted(&self) -> bool {
        self.pages_fetched > 0 && self.cursor.is_none()
    }

    /// Take one page: drop rows repeating the previous page's last row,
    /// remember this page's last emitted key and advance the cursor.
    ///
    /// A continuation equal to the cursor just used is rejected so a page is
    /// never requested twice.
    pub fn accept<R>(&mut self, page: Page<R>, key: impl Fn(&R) -> String) -> Result<Vec<R>> {
        let boundary = self.last_key.clone();
        let mut emitted = Vec::with_capacity(page.rows.len());

        for row in page.rows {
            let row_key = key(&row);
            if boundary.as_deref() == Some(row_key.as_str()) {
                debug!("Skipping boundary row {} repeated from previous page", row_key);
                continue;
            }
            self.last_key = Some(row_key);
            emitted.push(row);
        }

        let next = page.next_cursor.filter(|c| !c.is_empty());
        if let (Some(next), Some(current)) = (&next, &self.cursor) {
            if next == current {
                return Err(Error::protocol(format!(
                    "Broker repeated continuation token after page {}",
                    self.pages_fetched + 1
                )));
            }
        }

        self.cursor = next;
        self.pages_fetched += 1;
        Ok(emitted)
    }
}

/// Drives [`PagedQuery`]s against the broker
#[derive(Clone)]
pub struct QueryExecutor {
    transport: Arc<dyn BrokerTransport>,
    admission: Arc<AdmissionController>,
    max_pages: usize,
}

impl QueryExecutor {
    pub fn new(transport: Arc<dyn BrokerTransport>, admission: Arc<AdmissionController>) -> Self {
        Self {
            transport,
            admission,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Run a query to completion and return its deduplicated rows.
    ///
    /// Rows are returned only when every page succeeds. Authorization is
    /// resolved before the ticket is taken, and the ticket is held for the
    /// send alone.
    pub async fn execute<Q: PagedQuery>(
        &self,
        query: &Q,
        cancel: &CancellationToken,
    ) -> Result<Vec<Q::Row>> {
        let mut state = PaginationState::new();
        let mut rows = Vec::new();
        let mut request = query.first_request();

        loop {
            if state.pages_fetched() >= self.max_pages {
                return Err(Error::protocol(format!(
                    "Query still paginating after {} pages",
                    self.max_pages
                )));
            }

            let authorization = self.transport.authorize().await?;

            let response = {
                let ticket = self.admission.acquire(cancel).await?;
                let result = self.transport.send(&request, authorization.as_deref()).await;
                self.admission.release(ticket);
                result?
            };

            if !response.is_success() {
                return Err(query.classify_status(&response));
            }

            let page = query.decode(&response)?;
            let page_rows = page.rows.len();
            let emitted = state.accept(page, |row| query.row_key(row))?;
            debug!(
                "Page {} decoded {} rows, emitted {}",
                state.pages_fetched(),
                page_rows,
                emitted.len()
            );
            rows.extend(emitted);

            match state.cursor() {
                Some(cursor) => request = query.next_request(cursor),
                None => break,
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrape_core::ErrorKind;
    use scrape_dev::MockBroker;

    /// Rows are `key=value` lines; a trailing `next:<cursor>` line continues
    struct LineQuery;

    impl PagedQuery for LineQuery {
        type Row = (String, u32);

        fn first_request(&self) -> BrokerRequest {
            BrokerRequest::Fetch {
                target: "/lines".to_string(),
            }
        }

        fn next_request(&self, cursor: &str) -> BrokerRequest {
            BrokerRequest::Fetch {
                target: format!("/lines?cursor={}", cursor),
            }
        }

        fn decode(&self, response: &BrokerResponse) -> Result<Page<Self::Row>> {
            let mut rows = Vec::new();
            let mut next = None;
            for line in response.body.lines() {
                if let Some(cursor) = line.strip_prefix("next:") {
                    next = Some(cursor.to_string());
                    continue;
                }
                let (key, value) = line
                    .split_once('=')
                    .ok_or_else(|| Error::protocol(format!("bad line '{}'", line)))?;
                let value = value
                    .parse()
                    .map_err(|_| Error::protocol(format!("bad value '{}'", value)))?;
                rows.push((key.to_string(), value));
            }
            Ok(Page::new(rows, next))
        }

        fn row_key(&self, row: &Self::Row) -> String {
            row.0.clone()
        }
    }

    fn executor(broker: &MockBroker, capacity: usize) -> QueryExecutor {
        QueryExecutor::new(
            Arc::new(broker.clone()),
            Arc::new(AdmissionController::new(capacity)),
        )
    }

    #[test]
    fn test_state_skips_repeated_boundary_row() {
        let mut state = PaginationState::new();

        let first = state
            .accept(Page::new(vec!["a", "b"], Some("c1".to_string())), |r| r.to_string())
            .unwrap();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(state.last_key(), Some("b"));
        assert_eq!(state.cursor(), Some("c1"));

        let second = state
            .accept(Page::last(vec!["b", "c"]), |r| r.to_string())
            .unwrap();
        assert_eq!(second, vec!["c"]);
        assert!(state.is_exhausted());
        assert_eq!(state.pages_fetched(), 2);
    }

    #[test]
    fn test_state_empty_cursor_ends_pagination() {
        let mut state = PaginationState::new();
        state
            .accept(Page::new(vec![1], Some(String::new())), |r| r.to_string())
            .unwrap();
        assert!(state.is_exhausted());
    }

    #[test]
    fn test_state_keeps_boundary_across_empty_page() {
        let mut state = PaginationState::new();
        state
            .accept(Page::new(vec!["a"], Some("c1".to_string())), |r| r.to_string())
            .unwrap();
        let middle = state
            .accept(Page::new(vec!["a"], Some("c2".to_string())), |r| r.to_string())
            .unwrap();
        assert!(middle.is_empty());
        assert_eq!(state.last_key(), Some("a"));

        let last = state.accept(Page::last(vec!["a", "b"]), |r| r.to_string()).unwrap();
        assert_eq!(last, vec!["b"]);
    }

    #[test]
    fn test_state_rejects_repeated_cursor() {
        let mut state = PaginationState::new();
        state
            .accept(Page::new(vec![1], Some("same".to_string())), |r| r.to_string())
            .unwrap();
        let err = state
            .accept(Page::new(vec![2], Some("same".to_string())), |r| r.to_string())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_execute_follows_cursor_and_dedups() {
        let broker = MockBroker::new();
        broker.on("/lines?cursor=p2", BrokerResponse::ok("b=2\nc=3"));
        broker.on("/lines", BrokerResponse::ok("a=1\nb=2\nnext:p2"));

        let rows = executor(&broker, 2)
            .execute(&LineQuery, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            rows,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3)
            ]
        );
        assert_eq!(broker.request_count(), 2);
    }

    #[tokio::test]
    async fn test_execute_issues_one_request_per_page() {
        let broker = MockBroker::new();
        broker.on("/lines?cursor=p4", BrokerResponse::ok("d=4"));
        broker.on("/lines?cursor=p3", BrokerResponse::ok("c=3\nnext:p4"));
        broker.on("/lines?cursor=p2", BrokerResponse::ok("b=2\nnext:p3"));
        broker.on("/lines", BrokerResponse::ok("a=1\nnext:p2"));

        let rows = executor(&broker, 1)
            .execute(&LineQuery, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(broker.request_count(), 4);
        assert_eq!(broker.high_water_mark(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_discards_rows() {
        let broker = MockBroker::new();
        broker.on("/lines?cursor=p2", BrokerResponse::ok("garbage"));
        broker.on("/lines", BrokerResponse::ok("a=1\nnext:p2"));

        let err = executor(&broker, 1)
            .execute(&LineQuery, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(broker.request_count(), 2);
    }

    #[tokio::test]
    async fn test_non_success_status_uses_classifier() {
        let broker = MockBroker::new();
        broker.on("/lines", BrokerResponse::new(503, "busy"));

        let err = executor(&broker, 1)
            .execute(&LineQuery, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let broker = MockBroker::new();
        broker.fail("/lines", "connection reset");

        let err = executor(&broker, 1)
            .execute(&LineQuery, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_auth_failure_consumes_no_ticket() {
        let broker = MockBroker::new();
        broker.on("/lines", BrokerResponse::ok("a=1"));
        broker.fail_authorization("token endpoint unreachable");

        let executor = executor(&broker, 1);
        let err = executor
            .execute(&LineQuery, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(broker.request_count(), 0);
        assert_eq!(executor.admission().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_max_pages_bound() {
        let broker = MockBroker::new();
        broker.on("/lines?cursor=p3", BrokerResponse::ok("c=3\nnext:p4"));
        broker.on("/lines?cursor=p2", BrokerResponse::ok("b=2\nnext:p3"));
        broker.on("/lines", BrokerResponse::ok("a=1\nnext:p2"));

        let err = executor(&broker, 1)
            .with_max_pages(2)
            .execute(&LineQuery, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(broker.request_count(), 2);
    }
}
