use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::HubConfig;
use crate::connection_manager::ConnectionRegistry;
use crate::hub::ServerMessage;
use crate::metrics::HeartbeatMetrics;
use crate::presence::PresenceCoordinator;

/// Timeout for individual keep-alive sends
const HEARTBEAT_SEND_TIMEOUT_MS: u64 = 5000;

/// Maximum concurrent keep-alive sends per batch
const MAX_CONCURRENT_HEARTBEATS: usize = 1000;

/// Background task for hub keep-alive pings and silent-connection eviction
pub struct HeartbeatTask {
    config: HubConfig,
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceCoordinator>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: HubConfig,
        registry: Arc<ConnectionRegistry>,
        presence: Arc<PresenceCoordinator>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            presence,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut heartbeat_timer = tokio::time::interval(self.config.keep_alive_interval());
        let mut cleanup_timer =
            tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_seconds));

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            keep_alive_secs = self.config.keep_alive_interval_seconds,
            cleanup_interval_secs = self.config.cleanup_interval_seconds,
            client_timeout_secs = self.config.client_timeout_seconds,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats().await;
                }
                _ = cleanup_timer.tick() => {
                    self.evict_silent_connections();
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Ping every connection, in parallel batches
    async fn send_heartbeats(&self) {
        let connections = self.registry.all();
        let total_count = connections.len();

        if total_count == 0 {
            return;
        }

        let start = Instant::now();
        let sent = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        for batch in connections.chunks(MAX_CONCURRENT_HEARTBEATS) {
            let futures: Vec<_> = batch
                .iter()
                .map(|conn| {
                    let sent = sent.clone();
                    let failed = failed.clone();
                    let conn = conn.clone();

                    async move {
                        let send_timeout = Duration::from_millis(HEARTBEAT_SEND_TIMEOUT_MS);
                        match timeout(send_timeout, conn.send(ServerMessage::Ping)).await {
                            Ok(Ok(_)) => {
                                sent.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Err(_)) | Err(_) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!(
                                    connection_id = %conn.id,
                                    "Keep-alive not delivered, connection may be dead"
                                );
                            }
                        }
                    }
                })
                .collect();

            join_all(futures).await;
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        HeartbeatMetrics::record_duration_ms(elapsed_ms);

        tracing::debug!(
            total = total_count,
            sent = sent.load(Ordering::Relaxed),
            failed = failed.load(Ordering::Relaxed),
            elapsed_ms = elapsed_ms,
            "Heartbeat round completed"
        );

        if elapsed_ms > (self.config.keep_alive_interval_seconds * 1000 / 2) {
            tracing::warn!(
                elapsed_ms = elapsed_ms,
                keep_alive_ms = self.config.keep_alive_interval_seconds * 1000,
                connections = total_count,
                "Heartbeat round took more than 50% of interval"
            );
        }
    }

    /// Drop connections silent for longer than the client timeout.
    ///
    /// Goes through presence so the last eviction for a user announces them offline.
    fn evict_silent_connections(&self) -> usize {
        let stale = self.registry.find_stale(self.config.client_timeout_seconds);
        let mut evicted = 0;

        for connection_id in stale {
            let Some(conn) = self.registry.get(&connection_id) else {
                continue;
            };
            self.presence.connection_closed(&connection_id);
            conn.close();
            evicted += 1;
        }

        if evicted > 0 {
            HeartbeatMetrics::record_evictions(evicted as u64);
            tracing::info!(
                evicted = evicted,
                timeout_secs = self.config.client_timeout_seconds,
                "Evicted silent connections"
            );
        }

        evicted
    }
}
