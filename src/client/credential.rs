//! Short-lived hub credentials and their cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::ClientError;

/// Source of hub credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fetch a fresh credential. `Ok(None)` means the caller has no session.
    async fn fetch(&self) -> Result<Option<String>, ClientError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

/// Fetches credentials from the server's token endpoint, forwarding the
/// caller's session bearer.
pub struct HttpCredentialProvider {
    client: reqwest::Client,
    url: String,
    session_token: Option<String>,
}

impl HttpCredentialProvider {
    pub fn new(url: impl Into<String>, session_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            session_token,
        }
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn fetch(&self) -> Result<Option<String>, ClientError> {
        let mut request = self.client.get(&self.url);
        if let Some(ref session) = self.session_token {
            request = request.bearer_auth(session);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ClientError::Credential(e.to_string()))?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Credential(e.to_string()))?;
        Ok(body.token)
    }
}

#[derive(Debug, Clone)]
struct CachedCredential {
    token: String,
    expires_at: Instant,
}

/// The client's single cached credential.
///
/// Every read-then-replace goes through one mutex, held across the fetch, so
/// a reconnect never observes a credential the refresh cycle is halfway
/// through replacing.
pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    lifetime: Duration,
    current: Mutex<Option<CachedCredential>>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn CredentialProvider>, lifetime: Duration) -> Self {
        Self {
            provider,
            lifetime,
            current: Mutex::new(None),
        }
    }

    /// Fetch a credential for a new handshake.
    ///
    /// Failure yields `None`; the handshake then goes ahead without one and
    /// fails like any other connect attempt.
    pub async fn fetch_for_connect(&self) -> Option<String> {
        let mut current = self.current.lock().await;

        match self.provider.fetch().await {
            Ok(Some(token)) => {
                *current = Some(CachedCredential {
                    token: token.clone(),
                    expires_at: Instant::now() + self.lifetime,
                });
                Some(token)
            }
            Ok(None) => {
                tracing::warn!("Credential endpoint returned no token");
                *current = None;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Credential fetch failed");
                None
            }
        }
    }

    /// Background refresh: replace the cached credential, keeping the old one on failure
    pub async fn refresh(&self) -> bool {
        let mut current = self.current.lock().await;

        match self.provider.fetch().await {
            Ok(Some(token)) => {
                *current = Some(CachedCredential {
                    token,
                    expires_at: Instant::now() + self.lifetime,
                });
                tracing::debug!("Hub credential refreshed");
                true
            }
            Ok(None) => {
                tracing::warn!("Credential refresh returned no token, keeping cached credential");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Credential refresh failed, keeping cached credential");
                false
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn current(&self) -> Option<String> {
        let current = self.current.lock().await;
        current
            .as_ref()
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.token.clone())
    }
}
