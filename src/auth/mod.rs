//! Entra ID authentication
//!
//! OAuth2 client-credentials flow for app-only access, with a process-wide
//! token cache keyed by scope. Graph and Azure RM tokens live side by side
//! in the same cache.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    TokenRequestFailed(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Token parse error: {0}")]
    ParseError(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Token response from the identity endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: String,
    expires_in: u64,
    #[allow(dead_code)]
    #[serde(default)]
    ext_expires_in: u64,
}

/// Cached token with expiry tracking
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        // Consider token expired 60 seconds before actual expiry
        self.expires_at > Instant::now() + Duration::from_secs(60)
    }
}

/// Per-scope bearer-token cache backed by the client-credentials flow
#[derive(Debug)]
pub struct TokenCache {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    http_client: Client,
    tokens: RwLock<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> Self {
        Self {
            tenant_id,
            client_id,
            client_secret,
            http_client: Client::new(),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Token endpoint URL for this tenant
    fn token_endpoint(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        )
    }

    /// Return a cached token for the scope, or acquire a fresh one.
    pub async fn acquire(&self, scope: &str) -> Result<String, AuthError> {
        if let Some(token) = self.cached(scope).await {
            tracing::debug!("using cached token for {}", scope);
            return Ok(token);
        }

        tracing::info!("acquiring new access token for scope: {}", scope);
        self.acquire_fresh(scope).await
    }

    /// Cached token for the scope while still inside its validity window.
    async fn cached(&self, scope: &str) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens
            .get(scope)
            .filter(|cached| cached.is_valid())
            .map(|cached| cached.access_token.clone())
    }

    /// Exchange client credentials for a token and cache it.
    async fn acquire_fresh(&self, scope: &str) -> Result<String, AuthError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("scope", scope),
        ];

        let response = self
            .http_client
            .post(self.token_endpoint())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("token request failed: {} - {}", status, body);
            return Err(AuthError::TokenRequestFailed(format!(
                "Status: {}, Body: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ParseError(format!("Failed to parse token response: {}", e)))?;

        let cached = CachedToken {
            access_token: token_response.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token_response.expires_in),
        };

        {
            let mut tokens = self.tokens.write().await;
            tokens.insert(scope.to_string(), cached);
        }

        tracing::info!(
            "token for {} acquired, expires in {} seconds",
            scope,
            token_response.expires_in
        );

        Ok(token_response.access_token)
    }

    /// Drop the cached token for one scope.
    pub async fn invalidate(&self, scope: &str) {
        let mut tokens = self.tokens.write().await;
        tokens.remove(scope);
    }

    /// Drop every cached token.
    pub async fn clear(&self) {
        let mut tokens = self.tokens.write().await;
        tokens.clear();
    }

    #[cfg(test)]
    async fn seed(&self, scope: &str, token: &str, ttl: Duration) {
        let mut tokens = self.tokens.write().await;
        tokens.insert(
            scope.to_string(),
            CachedToken {
                access_token: token.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TokenCache {
        TokenCache::new(
            "my-tenant".to_string(),
            "client-id".to_string(),
            "secret".to_string(),
        )
    }

    #[test]
    fn test_token_endpoint() {
        assert_eq!(
            cache().token_endpoint(),
            "https://login.microsoftonline.com/my-tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_cached_token_validity_window() {
        let valid = CachedToken {
            access_token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        assert!(valid.is_valid());

        // Inside the 60-second skew counts as expired
        let near_expiry = CachedToken {
            access_token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!near_expiry.is_valid());
    }

    #[tokio::test]
    async fn test_scopes_are_cached_independently() {
        let cache = cache();
        cache
            .seed(
                "https://graph.microsoft.com/.default",
                "graph-token",
                Duration::from_secs(3600),
            )
            .await;

        assert_eq!(
            cache.cached("https://graph.microsoft.com/.default").await,
            Some("graph-token".to_string())
        );
        assert_eq!(
            cache.cached("https://management.azure.com/.default").await,
            None
        );
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_returned() {
        let cache = cache();
        cache
            .seed("scope", "stale-token", Duration::from_secs(10))
            .await;

        // 10s remaining is inside the 60s skew, so the entry is unusable
        assert_eq!(cache.cached("scope").await, None);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = cache();
        cache.seed("a", "token-a", Duration::from_secs(3600)).await;
        cache.seed("b", "token-b", Duration::from_secs(3600)).await;

        cache.invalidate("a").await;
        assert_eq!(cache.cached("a").await, None);
        assert_eq!(cache.cached("b").await, Some("token-b".to_string()));

        cache.clear().await;
        assert_eq!(cache.cached("b").await, None);
    }
}
