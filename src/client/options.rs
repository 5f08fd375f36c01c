use std::time::Duration;

use super::ClientError;

/// Default interval between client keep-alive pings
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
/// Default tolerance for server silence
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(60);
/// Default background credential refresh period
pub const DEFAULT_CREDENTIAL_REFRESH: Duration = Duration::from_secs(12 * 60);
/// Default lifetime of a hub credential
pub const DEFAULT_CREDENTIAL_LIFETIME: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Hub endpoint, e.g. `ws://localhost:8081/hubs/chat`
    pub hub_url: String,
    /// Credential endpoint, e.g. `http://localhost:8081/api/auth/hub-token`
    pub credential_url: String,
    pub keep_alive_interval: Duration,
    /// Server silence after which the connection is treated as dropped
    pub server_timeout: Duration,
    pub credential_refresh_interval: Duration,
    pub credential_lifetime: Duration,
}

impl ClientOptions {
    pub fn new(hub_url: impl Into<String>, credential_url: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            credential_url: credential_url.into(),
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            credential_refresh_interval: DEFAULT_CREDENTIAL_REFRESH,
            credential_lifetime: DEFAULT_CREDENTIAL_LIFETIME,
        }
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    pub fn with_credential_refresh(mut self, refresh: Duration, lifetime: Duration) -> Self {
        self.credential_refresh_interval = refresh;
        self.credential_lifetime = lifetime;
        self
    }

    /// Internal consistency of the client's own timings
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.keep_alive_interval.is_zero() || self.credential_refresh_interval.is_zero() {
            return Err(ClientError::InvalidOptions(
                "keep-alive and refresh intervals must be non-zero".to_string(),
            ));
        }
        if self.keep_alive_interval >= self.server_timeout {
            return Err(ClientError::InvalidOptions(format!(
                "keep-alive interval {:?} must be shorter than server timeout {:?}",
                self.keep_alive_interval, self.server_timeout
            )));
        }
        if self.credential_refresh_interval >= self.credential_lifetime {
            return Err(ClientError::InvalidOptions(format!(
                "credential refresh {:?} must happen before expiry {:?}",
                self.credential_refresh_interval, self.credential_lifetime
            )));
        }
        Ok(())
    }

    /// Check the client's silence tolerance against the server's timings.
    ///
    /// The client must wait strictly longer than the server's keep-alive
    /// interval plus its client timeout before declaring the connection dead.
    pub fn validate_against(
        &self,
        server_keep_alive: Duration,
        server_client_timeout: Duration,
    ) -> Result<(), ClientError> {
        self.validate()?;

        let server_window = server_keep_alive + server_client_timeout;
        if self.server_timeout <= server_window {
            return Err(ClientError::InvalidOptions(format!(
                "server timeout {:?} must exceed server keep-alive + client timeout ({:?})",
                self.server_timeout, server_window
            )));
        }
        Ok(())
    }
}
