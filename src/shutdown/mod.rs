//! Graceful shutdown for the hub server.
//!
//! 1. Send a `close` frame to every live connection
//! 2. Signal background tasks to stop
//! 3. Wait briefly for connections to drain out of the registry

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection_manager::ConnectionRegistry;
use crate::hub::{OutboundMessage, ServerMessage};

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for connections to close after the close frame
    pub drain_timeout: Duration,
    /// Reason carried in the close frame
    pub reason: Option<String>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            reason: Some("Server shutting down".to_string()),
        }
    }
}

pub struct GracefulShutdown {
    registry: Arc<ConnectionRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<ConnectionRegistry>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(registry, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        registry: Arc<ConnectionRegistry>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            registry,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.registry.stats().total_connections)
    )]
    pub async fn execute(&self) -> ShutdownResult {
        let start = std::time::Instant::now();

        tracing::info!("Graceful shutdown - phase 1: closing client connections");
        let clients_notified = self.notify_clients();

        tracing::info!("Graceful shutdown - phase 2: stopping background tasks");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Graceful shutdown - phase 3: draining connections");
        let connections_closed = self.wait_for_connections_to_close().await;

        let result = ShutdownResult {
            clients_notified,
            connections_closed,
            remaining: self.registry.stats().total_connections,
            duration: start.elapsed(),
        };

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            remaining = result.remaining,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    /// Queue a close frame on every connection; the writer closes the socket after sending it
    fn notify_clients(&self) -> usize {
        let frame = OutboundMessage::Raw(ServerMessage::close(self.config.reason.clone()));
        let connections = self.registry.all();

        let notified = connections
            .iter()
            .filter(|conn| {
                let queued = conn.try_send(frame.clone());
                if !queued {
                    // Buffer full; ask the writer to close directly
                    conn.close();
                }
                queued
            })
            .count();

        tracing::info!(
            notified = notified,
            total = connections.len(),
            "Close frames queued"
        );
        notified
    }

    async fn wait_for_connections_to_close(&self) -> usize {
        let initial = self.registry.stats().total_connections;
        if initial == 0 {
            return 0;
        }

        let wait = async {
            while self.registry.stats().total_connections > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        let _ = timeout(self.config.drain_timeout, wait).await;

        let remaining = self.registry.stats().total_connections;
        if remaining > 0 {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close gracefully"
            );
        }

        initial.saturating_sub(remaining)
    }
}

#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub clients_notified: usize,
    pub connections_closed: usize,
    pub remaining: usize,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::Connection;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let (tx, _) = broadcast::channel(1);
        let shutdown = GracefulShutdown::new(Arc::new(ConnectionRegistry::new()), tx);

        let result = shutdown.execute().await;

        assert_eq!(result.clients_notified, 0);
        assert_eq!(result.connections_closed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_sends_close_and_signals_tasks() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn_tx, mut conn_rx) = mpsc::channel(4);
        registry
            .add(Arc::new(Connection::new("c1".into(), "alice", conn_tx)))
            .unwrap();
        let (tx, mut task_rx) = broadcast::channel(1);

        // Simulate the transport task closing on the close frame
        let closer = registry.clone();
        tokio::spawn(async move {
            if let Some(msg) = conn_rx.recv().await {
                assert!(msg.is_close());
                closer.remove(&"c1".into());
            }
        });

        let shutdown = GracefulShutdown::with_config(
            registry,
            tx,
            ShutdownConfig {
                drain_timeout: Duration::from_secs(2),
                reason: None,
            },
        );
        let result = shutdown.execute().await;

        assert_eq!(result.clients_notified, 1);
        assert_eq!(result.connections_closed, 1);
        assert_eq!(result.remaining, 0);
        assert!(task_rx.try_recv().is_ok());
    }
}
