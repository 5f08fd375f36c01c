use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub membership: MembershipConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Path of the negotiated hub endpoint
    #[serde(default = "default_hub_path")]
    pub path: String,
    /// Interval in seconds between server keep-alive pings
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_seconds: u64,
    /// Seconds of client silence after which the server drops the connection
    #[serde(default = "default_client_timeout")]
    pub client_timeout_seconds: u64,
    /// Eviction sweep interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Per-connection outbound buffer (frames)
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

impl HubConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_seconds)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_seconds)
    }
}

fn default_hub_path() -> String {
    "/hubs/chat".to_string()
}

fn default_keep_alive_interval() -> u64 {
    15
}

fn default_client_timeout() -> u64 {
    30
}

fn default_cleanup_interval() -> u64 {
    10
}

fn default_send_buffer() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipConfig {
    /// Lifetime of a channel member snapshot in seconds
    #[serde(default = "default_membership_ttl")]
    pub ttl_seconds: u64,
}

impl MembershipConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn default_membership_ttl() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Lifetime of minted hub credentials in seconds
    #[serde(default = "default_hub_token_lifetime")]
    pub hub_token_lifetime_seconds: u64,
}

fn default_hub_token_lifetime() -> u64 {
    15 * 60
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "chat-presence-hub".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("hub.path", default_hub_path())?
            .set_default("hub.keep_alive_interval_seconds", default_keep_alive_interval())?
            .set_default("hub.client_timeout_seconds", default_client_timeout())?
            .set_default("hub.cleanup_interval_seconds", default_cleanup_interval())?
            .set_default("membership.ttl_seconds", default_membership_ttl())?
            .set_default("jwt.hub_token_lifetime_seconds", default_hub_token_lifetime())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, JWT__SECRET, HUB__CLIENT_TIMEOUT_SECONDS, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            path: default_hub_path(),
            keep_alive_interval_seconds: default_keep_alive_interval(),
            client_timeout_seconds: default_client_timeout(),
            cleanup_interval_seconds: default_cleanup_interval(),
            send_buffer: default_send_buffer(),
        }
    }
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_membership_ttl(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
