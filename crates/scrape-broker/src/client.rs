//! HTTP transport to the broker's management interface

use crate::auth::BrokerAuth;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use scrape_core::{BrokerConfig, BrokerRequest, BrokerResponse, BrokerTransport, Error, Result};
use tracing::debug;
use url::Url;

/// Path XML commands are posted to
pub const COMMAND_PATH: &str = "/SEMP";

/// Broker client backed by a pooled `reqwest` client
#[derive(Debug)]
pub struct BrokerClient {
    http: reqwest::Client,
    base_url: Url,
    command_url: Url,
    auth: BrokerAuth,
}

impl BrokerClient {
    /// Build a client from broker configuration
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let command_url = config
            .url
            .join(COMMAND_PATH)
            .map_err(|e| Error::config(format!("Invalid broker URL {}: {}", config.url, e)))?;

        Ok(Self {
            auth: BrokerAuth::from_config(&config.auth, http.clone()),
            http,
            base_url: config.url.clone(),
            command_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a fetch target against the broker URL; absolute URIs pass through
    fn resolve(&self, target: &str) -> Result<Url> {
        self.base_url
            .join(target)
            .map_err(|e| Error::protocol(format!("Invalid request target '{}': {}", target, e)))
    }
}

#[async_trait]
impl BrokerTransport for BrokerClient {
    async fn authorize(&self) -> Result<Option<String>> {
        self.auth.header().await
    }

    async fn send(
        &self,
        request: &BrokerRequest,
        authorization: Option<&str>,
    ) -> Result<BrokerResponse> {
        let builder = match request {
            BrokerRequest::Command { body } => self
                .http
                .post(self.command_url.clone())
                .header(CONTENT_TYPE, "application/xml")
                .body(body.clone()),
            BrokerRequest::Fetch { target } => self
                .http
                .get(self.resolve(target)?)
                .header(ACCEPT, "application/json"),
        };

        let builder = match authorization {
            Some(value) => builder.header(AUTHORIZATION, value),
            None => builder,
        };

        debug!("Sending broker request: {}", request);
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::transport(format!("Broker request timed out: {}", e))
            } else {
                Error::transport(format!("Broker request failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(format!("Failed to read broker response: {}", e)))?;

        Ok(BrokerResponse { status, body })
    }
}
