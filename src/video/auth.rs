//! Bearer tokens for providers that authenticate through a token service.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Lifetime assumed when the token service does not report one.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
/// Tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) < self.expires_at
    }
}

/// Hands out a currently valid bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String>;

    /// Drops any cached token so the next [`TokenProvider::token`] call
    /// fetches a new one. Called after the provider answers 401.
    async fn invalidate(&self);
}

/// Performs the raw token fetch; caching is left to [`CachedTokenProvider`].
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<AccessToken>;
}

/// Caches a token until shortly before it expires.
pub struct CachedTokenProvider<S> {
    source: S,
    cached: Mutex<Option<AccessToken>>,
}

impl<S: TokenSource> CachedTokenProvider<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<S: TokenSource> TokenProvider for CachedTokenProvider<S> {
    async fn token(&self) -> Result<String> {
        // Held across the fetch so concurrent callers share one refresh.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh_at(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let token = self.source.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}

/// A fixed credential such as an API key. Never expires.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }

    async fn invalidate(&self) {}
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// Fetches tokens with a plain GET against a token service URL.
pub struct HttpTokenSource {
    client: Client,
    url: String,
}

impl HttpTokenSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch(&self) -> Result<AccessToken> {
        info!("fetching authentication token");

        let resp = self
            .client
            .get(&self.url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| {
                error!("could not fetch token from {}: {}", self.url, e);
                Error::Auth(format!("token request to {} failed: {}", self.url, e))
            })?;

        let status = resp.status();
        if !status.is_success() {
            error!("token service answered HTTP {}", status.as_u16());
            return Err(Error::Auth(format!(
                "token service answered HTTP {}",
                status.as_u16()
            )));
        }

        let raw = resp.text().await.map_err(|e| Error::Auth(e.to_string()))?;
        let token = parse_token_response(&raw, Utc::now())?;
        info!(expires_at = %token.expires_at, "token fetched successfully");
        Ok(token)
    }
}

fn parse_token_response(raw: &str, now: DateTime<Utc>) -> Result<AccessToken> {
    let body: TokenResponse = serde_json::from_str(raw)
        .map_err(|e| Error::Auth(format!("invalid JSON from token service: {}", e)))?;

    let value = body
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Auth("token service response has no access_token".to_string()))?;

    let lifetime = body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    let expires_at = Duration::try_seconds(lifetime)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| Error::Auth(format!("token service reported unusable expires_in {}", lifetime)))?;
    Ok(AccessToken { value, expires_at })
}
