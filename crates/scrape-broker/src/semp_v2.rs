//! JSON monitor flavor of the management protocol
//!
//! Collections are fetched with `GET /SEMP/v2/monitor/…`. Every reply carries
//! a `meta` object with the response code, an optional error and, for paged
//! collections, the URI of the next page.

use crate::pagination::Page;
use scrape_core::{BrokerResponse, Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Root of the monitor API
pub const MONITOR_PATH: &str = "/SEMP/v2/monitor";

/// Builder for a monitor collection request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorRequest {
    resource: String,
    count: Option<u32>,
    where_clauses: Vec<String>,
    select: Vec<String>,
}

impl MonitorRequest {
    /// Request `resource`, a path below the monitor root such as `/msgVpns`
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Narrow by `attribute==pattern`; a bare wildcard adds nothing
    pub fn with_match(mut self, attribute: &str, pattern: &str) -> Self {
        if pattern != scrape_core::WILDCARD {
            self.where_clauses.push(format!("{}=={}", attribute, pattern));
        }
        self
    }

    /// Restrict the returned attributes
    pub fn with_select<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Path and query relative to the broker URL
    pub fn to_target(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(count) = self.count {
            query.append_pair("count", &count.to_string());
        }
        for clause in &self.where_clauses {
            query.append_pair("where", clause);
        }
        if !self.select.is_empty() {
            query.append_pair("select", &self.select.join(","));
        }
        let query = query.finish();

        if query.is_empty() {
            format!("{}{}", MONITOR_PATH, self.resource)
        } else {
            format!("{}{}?{}", MONITOR_PATH, self.resource, query)
        }
    }
}

/// Percent-encode one path segment such as a VPN name
pub fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    meta: Meta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    response_code: u16,
    #[serde(default)]
    error: Option<MetaError>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct MetaError {
    #[serde(default)]
    description: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paging {
    #[serde(default)]
    next_page_uri: Option<String>,
}

impl MetaError {
    fn into_error(self) -> Error {
        match (self.description.is_empty(), self.status.is_empty()) {
            (false, false) => Error::rejected(format!("{} ({})", self.description, self.status)),
            (false, true) => Error::rejected(self.description),
            (true, false) => Error::rejected(self.status),
            (true, true) => Error::rejected("unspecified error"),
        }
    }
}

/// Decode one page of a collection; the continuation is `nextPageUri`
pub fn decode_collection<T: DeserializeOwned>(body: &str) -> Result<Page<T>> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| Error::protocol(format!("Malformed monitor response: {}", e)))?;

    if envelope.meta.response_code != 200 {
        return Err(match envelope.meta.error {
            Some(error) => error.into_error(),
            None => Error::rejected(format!("responseCode {}", envelope.meta.response_code)),
        });
    }

    let next = envelope.meta.paging.and_then(|p| p.next_page_uri);
    Ok(Page::new(envelope.data, next))
}

/// Classify a non-2xx reply: a broker error description is an upstream
/// rejection, anything else a transport failure
pub fn classify_status(response: &BrokerResponse) -> Error {
    match serde_json::from_str::<ErrorEnvelope>(&response.body) {
        Ok(ErrorEnvelope {
            meta: Meta {
                error: Some(error),
                ..
            },
        }) => error.into_error(),
        _ => Error::transport(format!("Broker returned HTTP {}", response.status)),
    }
}
