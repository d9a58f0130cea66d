//! Broker authorization
//!
//! Resolves the `Authorization` header for a broker call. OAuth tokens are
//! fetched with the client-credentials grant and cached until shortly
//! before they expire.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use scrape_core::{AuthConfig, Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

/// Upper bound on the lifetime honored from `expires_in`
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(86_400);

/// Authorization scheme resolved from configuration
#[derive(Debug)]
pub enum BrokerAuth {
    None,
    Basic { header: String },
    OAuth(OAuthTokenSource),
}

impl BrokerAuth {
    pub fn from_config(config: &AuthConfig, http: reqwest::Client) -> Self {
        match config {
            AuthConfig::None => BrokerAuth::None,
            AuthConfig::Basic { username, password } => BrokerAuth::Basic {
                header: basic_header(username, password),
            },
            AuthConfig::OAuth {
                token_url,
                client_id,
                client_secret,
                scope,
            } => BrokerAuth::OAuth(OAuthTokenSource {
                http,
                token_url: token_url.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                scope: scope.clone(),
                cached: Mutex::new(None),
            }),
        }
    }

    /// Header value for the next call
    pub async fn header(&self) -> Result<Option<String>> {
        match self {
            BrokerAuth::None => Ok(None),
            BrokerAuth::Basic { header } => Ok(Some(header.clone())),
            BrokerAuth::OAuth(source) => {
                let token = source.token().await?;
                Ok(Some(format!("Bearer {}", token)))
            }
        }
    }
}

fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

/// OAuth2 client-credentials token source
#[derive(Debug)]
pub struct OAuthTokenSource {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl CachedToken {
    fn new(value: String, lifetime: Duration, now: Instant) -> Self {
        let valid_for = lifetime.min(MAX_TOKEN_LIFETIME).saturating_sub(REFRESH_MARGIN);
        Self {
            value,
            refresh_at: now.checked_add(valid_for).unwrap_or(now),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl OAuthTokenSource {
    /// Current access token, fetching a new one when the cached token is stale
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        let response = self.fetch().await.inspect_err(|e| {
            warn!("Failed to obtain OAuth token from {}: {}", self.token_url, e);
        })?;
        let lifetime = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);

        debug!("Obtained OAuth token valid for {:?}", lifetime);
        let token = CachedToken::new(response.access_token, lifetime, Instant::now());
        let value = token.value.clone();
        *cached = Some(token);

        Ok(value)
    }

    async fn fetch(&self) -> Result<TokenResponse> {
        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::auth(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::auth(format!("Token endpoint returned {}", status)));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::auth(format!("Invalid token response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_header() {
        assert_eq!(basic_header("admin", "admin"), "Basic YWRtaW46YWRtaW4=");
    }

    #[tokio::test]
    async fn test_none_and_basic_headers() {
        let http = reqwest::Client::new();
        assert_eq!(
            BrokerAuth::from_config(&AuthConfig::None, http.clone())
                .header()
                .await
                .unwrap(),
            None
        );

        let basic = BrokerAuth::from_config(
            &AuthConfig::Basic {
                username: "admin".to_string(),
                password: "admin".to_string(),
            },
            http,
        );
        assert_eq!(
            basic.header().await.unwrap().as_deref(),
            Some("Basic YWRtaW46YWRtaW4=")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_token_refreshes_before_expiry() {
        let now = Instant::now();
        let token = CachedToken::new("abc".to_string(), Duration::from_secs(120), now);

        assert!(token.is_fresh(now));
        assert!(token.is_fresh(now + Duration::from_secs(89)));
        assert!(!token.is_fresh(now + Duration::from_secs(90)));

        let short = CachedToken::new("xyz".to_string(), Duration::from_secs(10), now);
        assert!(!short.is_fresh(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_token_lifetime_is_capped() {
        let now = Instant::now();
        let token = CachedToken::new("abc".to_string(), Duration::from_secs(u64::MAX), now);

        assert!(token.is_fresh(now + MAX_TOKEN_LIFETIME - REFRESH_MARGIN - Duration::from_secs(1)));
        assert!(!token.is_fresh(now + MAX_TOKEN_LIFETIME));
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_auth_error() {
        let auth = BrokerAuth::from_config(
            &AuthConfig::OAuth {
                token_url: Url::parse("http://127.0.0.1:1/token").unwrap(),
                client_id: "exporter".to_string(),
                client_secret: "secret".to_string(),
                scope: None,
            },
            reqwest::Client::new(),
        );

        let err = auth.header().await.unwrap_err();
        assert_eq!(err.kind(), scrape_core::ErrorKind::Auth);
    }
}
