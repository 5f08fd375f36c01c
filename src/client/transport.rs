//! Transport seam for the hub client.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use super::ClientError;

const FRAME_BUFFER: usize = 64;

/// One open transport connection, as a pair of text frame queues.
///
/// Dropping `outbound` closes the connection. `inbound` yields `None` once
/// the connection is gone for any reason.
pub struct TransportConnection {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Open a connection, attaching `credential` at handshake time
    async fn connect(
        &self,
        url: &str,
        credential: Option<&str>,
    ) -> Result<TransportConnection, ClientError>;
}

/// WebSocket transport; the credential travels as an `Authorization: Bearer` header
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HubTransport for WebSocketTransport {
    async fn connect(
        &self,
        url: &str,
        credential: Option<&str>,
    ) -> Result<TransportConnection, ClientError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ClientError::Transport(format!("invalid hub url: {}", e)))?;

        if let Some(token) = credential {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClientError::Transport(format!("invalid credential: {}", e)))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(FRAME_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(FRAME_BUFFER);
        let (mut sink, mut source) = stream.split();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => match frame {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                tracing::debug!(error = %e, "Hub send failed");
                                break;
                            }
                        }
                        None => {
                            let _ = sink.close().await;
                            break;
                        }
                    },
                    incoming = source.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if inbound_tx.send(text.as_str().to_owned()).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::debug!(frame = ?frame, "Hub closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!(error = %e, "Hub receive failed");
                            break;
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(TransportConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
