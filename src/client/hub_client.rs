use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::hub::{ClientMessage, ServerMessage};
use crate::retry::{RetryContext, RetryPolicy, ScheduledRetryPolicy};

use super::credential::{CredentialCache, CredentialProvider, HttpCredentialProvider};
use super::handlers::{HandlerTable, LifecycleCallbacks};
use super::transport::{HubTransport, TransportConnection, WebSocketTransport};
use super::{ClientError, ClientOptions, ConnectionState};

type PendingInvocations = DashMap<String, oneshot::Sender<Result<Value, ClientError>>>;

/// Why a live session ended
enum SessionEnd {
    Stopped,
    Lost(Option<String>),
}

#[derive(Default)]
struct Tasks {
    refresh: Option<JoinHandle<()>>,
    driver: Option<JoinHandle<()>>,
    stop: Option<watch::Sender<bool>>,
}

struct Inner {
    options: ClientOptions,
    transport: Arc<dyn HubTransport>,
    credentials: CredentialCache,
    retry_policy: Arc<dyn RetryPolicy>,
    state: watch::Sender<ConnectionState>,
    handlers: HandlerTable,
    lifecycle: LifecycleCallbacks,
    pending: PendingInvocations,
    next_invocation_id: AtomicU64,
    outbound: StdMutex<Option<mpsc::Sender<String>>>,
    tasks: Mutex<Tasks>,
}

/// Client side of the hub: keeps exactly one logical connection alive.
///
/// After the first successful connect, a dropped connection is retried
/// forever on the retry policy's schedule with a freshly fetched credential
/// per attempt. A background task refreshes the cached credential on a
/// fixed period until [`stop`](Self::stop).
#[derive(Clone)]
pub struct ResilientHubClient {
    inner: Arc<Inner>,
}

impl ResilientHubClient {
    pub fn new(
        options: ClientOptions,
        transport: Arc<dyn HubTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let lifetime = options.credential_lifetime;

        Self {
            inner: Arc::new(Inner {
                options,
                transport,
                credentials: CredentialCache::new(credentials, lifetime),
                retry_policy: Arc::new(ScheduledRetryPolicy::default()),
                state,
                handlers: HandlerTable::new(),
                lifecycle: LifecycleCallbacks::default(),
                pending: DashMap::new(),
                next_invocation_id: AtomicU64::new(1),
                outbound: StdMutex::new(None),
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    /// WebSocket transport plus the HTTP credential endpoint, authenticated
    /// with the caller's session token
    pub fn websocket(options: ClientOptions, session_token: Option<String>) -> Self {
        let credentials = Arc::new(HttpCredentialProvider::new(
            options.credential_url.clone(),
            session_token,
        ));
        Self::new(options, Arc::new(WebSocketTransport::new()), credentials)
    }

    /// Replace the default reconnect schedule. Only effective before `start`.
    pub fn with_retry_policy(self, policy: Arc<dyn RetryPolicy>) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.retry_policy = policy;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                tracing::warn!("Retry policy ignored: client is already shared");
                Self { inner }
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Register a typed handler; `Args` is decoded from the event's positional arguments
    pub fn on<Args, F>(&self, event: impl Into<String>, handler: F)
    where
        Args: DeserializeOwned,
        F: Fn(Args) + Send + Sync + 'static,
    {
        self.inner.handlers.register(event, handler);
    }

    pub fn on_reconnecting(&self, callback: impl Fn(Option<&str>) + Send + Sync + 'static) {
        self.inner.lifecycle.on_reconnecting(callback);
    }

    pub fn on_reconnected(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.lifecycle.on_reconnected(callback);
    }

    pub fn on_closed(&self, callback: impl Fn(Option<&str>) + Send + Sync + 'static) {
        self.inner.lifecycle.on_closed(callback);
    }

    /// Connect for the first time. A failure here is returned and the client
    /// goes back to `Idle`; later drops are retried internally.
    #[tracing::instrument(name = "hub_client.start", skip(self), fields(url = %self.inner.options.hub_url))]
    pub async fn start(&self) -> Result<(), ClientError> {
        self.inner.options.validate()?;

        let mut tasks = self.inner.tasks.lock().await;
        if !self
            .inner
            .transition(ConnectionState::Idle, ConnectionState::Connecting)
        {
            return Err(ClientError::InvalidState(self.state()));
        }

        let credential = self.inner.credentials.fetch_for_connect().await;
        let connection = match self
            .inner
            .transport
            .connect(&self.inner.options.hub_url, credential.as_deref())
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(error = %e, "Initial hub connect failed");
                self.inner
                    .transition(ConnectionState::Connecting, ConnectionState::Idle);
                return Err(e);
            }
        };

        let TransportConnection { outbound, inbound } = connection;
        self.inner.set_outbound(Some(outbound));
        self.inner
            .transition(ConnectionState::Connecting, ConnectionState::Connected);
        tracing::info!("Hub connected");

        let (stop_tx, stop_rx) = watch::channel(false);
        tasks.refresh = Some(spawn_refresh(self.inner.clone()));
        tasks.driver = Some(tokio::spawn(drive(self.inner.clone(), inbound, stop_rx)));
        tasks.stop = Some(stop_tx);

        Ok(())
    }

    /// Fire-and-forget invocation. Dropped silently unless connected.
    pub fn send(&self, method: &str, arguments: Vec<Value>) {
        if !self.state().is_connected() {
            tracing::trace!(method = %method, "Not connected, dropping send");
            return;
        }

        let frame = ClientMessage::Invocation {
            invocation_id: None,
            target: method.to_string(),
            arguments,
        };
        let Ok(text) = serde_json::to_string(&frame) else {
            return;
        };
        if let Some(outbound) = self.inner.outbound() {
            if outbound.try_send(text).is_err() {
                tracing::debug!(method = %method, "Outbound queue unavailable, dropping send");
            }
        }
    }

    /// Invoke a server method and wait for its completion.
    ///
    /// Fails immediately with [`ClientError::NotConnected`] unless connected.
    pub async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value, ClientError> {
        if !self.state().is_connected() {
            return Err(ClientError::NotConnected);
        }
        let outbound = self.inner.outbound().ok_or(ClientError::NotConnected)?;

        let invocation_id = self
            .inner
            .next_invocation_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let frame = serde_json::to_string(&ClientMessage::Invocation {
            invocation_id: Some(invocation_id.clone()),
            target: method.to_string(),
            arguments,
        })?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(invocation_id.clone(), tx);

        if outbound.send(frame).await.is_err() {
            self.inner.pending.remove(&invocation_id);
            return Err(ClientError::NotConnected);
        }

        rx.await.unwrap_or(Err(ClientError::ConnectionLost))
    }

    /// Tear everything down. Safe to call more than once.
    ///
    /// The credential refresh task is cancelled and awaited before the
    /// transport is closed.
    #[tracing::instrument(name = "hub_client.stop", skip(self))]
    pub async fn stop(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        let previous = self.inner.state.send_replace(ConnectionState::Closed);
        if previous == ConnectionState::Closed {
            return;
        }

        if let Some(refresh) = tasks.refresh.take() {
            refresh.abort();
            let _ = refresh.await;
        }

        if let Some(stop) = tasks.stop.take() {
            let _ = stop.send(true);
        }
        if let Some(driver) = tasks.driver.take() {
            let _ = driver.await;
        }
        self.inner.set_outbound(None);
        self.inner.fail_pending(|| ClientError::Closed);

        tracing::info!(previous = %previous, "Hub client stopped");
        if previous != ConnectionState::Idle {
            self.inner.lifecycle.fire_closed(None);
        }
    }
}

impl Inner {
    /// Atomic compare-and-set on the state
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn outbound(&self) -> Option<mpsc::Sender<String>> {
        self.outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_outbound(&self, sender: Option<mpsc::Sender<String>>) {
        *self
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = sender;
    }

    fn fail_pending(&self, error: impl Fn() -> ClientError) {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(error()));
            }
        }
    }

    fn send_frame(&self, message: &ClientMessage) {
        let Some(outbound) = self.outbound() else {
            return;
        };
        if let Ok(text) = serde_json::to_string(message) {
            let _ = outbound.try_send(text);
        }
    }

    fn handle_frame(&self, text: &str) -> Option<SessionEnd> {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed hub frame");
                return None;
            }
        };

        match message {
            ServerMessage::Event { target, arguments } => {
                self.handlers.dispatch(&target, &arguments);
            }
            ServerMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                let Some((_, tx)) = self.pending.remove(&invocation_id) else {
                    tracing::debug!(invocation_id = %invocation_id, "Completion for unknown invocation");
                    return None;
                };
                let outcome = match error {
                    Some(error) => Err(ClientError::InvocationFailed(error)),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(outcome);
            }
            ServerMessage::Ping => {}
            ServerMessage::Close { error } => {
                tracing::info!(error = ?error, "Hub closed the connection");
                return Some(SessionEnd::Lost(error));
            }
        }
        None
    }

    /// Pump one live session until it drops or the client stops
    async fn run_session(
        &self,
        inbound: &mut mpsc::Receiver<String>,
        stop: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let mut keep_alive = tokio::time::interval(self.options.keep_alive_interval);
        keep_alive.tick().await;
        let mut deadline = Instant::now() + self.options.server_timeout;

        loop {
            tokio::select! {
                _ = stop.changed() => return SessionEnd::Stopped,
                frame = inbound.recv() => match frame {
                    Some(text) => {
                        deadline = Instant::now() + self.options.server_timeout;
                        if let Some(end) = self.handle_frame(&text) {
                            return end;
                        }
                    }
                    None => return SessionEnd::Lost(None),
                },
                _ = keep_alive.tick() => self.send_frame(&ClientMessage::Ping),
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        timeout_secs = self.options.server_timeout.as_secs(),
                        "No frame from hub within server timeout"
                    );
                    return SessionEnd::Lost(Some("server timeout elapsed".to_string()));
                }
            }
        }
    }

    /// Retry until a connection is established or the client stops
    async fn reconnect(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> Option<mpsc::Receiver<String>> {
        let started = Instant::now();
        let mut previous_retry_count = 0u32;

        loop {
            let delay = self.retry_policy.next_delay(&RetryContext::new(
                previous_retry_count,
                started.elapsed(),
            ));
            tracing::info!(
                attempt = previous_retry_count + 1,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to hub"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop.changed() => return None,
            }

            let credential = self.credentials.fetch_for_connect().await;
            let attempt = tokio::select! {
                result = self.transport.connect(&self.options.hub_url, credential.as_deref()) => result,
                _ = stop.changed() => return None,
            };

            match attempt {
                Ok(TransportConnection { outbound, inbound }) => {
                    self.set_outbound(Some(outbound));
                    if !self.transition(ConnectionState::Reconnecting, ConnectionState::Connected) {
                        self.set_outbound(None);
                        return None;
                    }
                    tracing::info!(
                        attempts = previous_retry_count + 1,
                        "Hub reconnected"
                    );
                    return Some(inbound);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = previous_retry_count + 1,
                        "Hub reconnect attempt failed"
                    );
                    previous_retry_count = previous_retry_count.saturating_add(1);
                }
            }
        }
    }
}

/// Owns the connection from the first successful connect until stop
async fn drive(
    inner: Arc<Inner>,
    mut inbound: mpsc::Receiver<String>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let reason = match inner.run_session(&mut inbound, &mut stop).await {
            SessionEnd::Stopped => return,
            SessionEnd::Lost(reason) => reason,
        };

        inner.set_outbound(None);
        if !inner.transition(ConnectionState::Connected, ConnectionState::Reconnecting) {
            return;
        }
        tracing::warn!(reason = ?reason, "Hub connection lost");
        inner.fail_pending(|| ClientError::ConnectionLost);
        inner.lifecycle.fire_reconnecting(reason.as_deref());

        match inner.reconnect(&mut stop).await {
            Some(next) => {
                inbound = next;
                inner.lifecycle.fire_reconnected();
            }
            None => return,
        }
    }
}

/// Periodic credential refresh; the first refresh happens one period after connect
fn spawn_refresh(inner: Arc<Inner>) -> JoinHandle<()> {
    let period = inner.options.credential_refresh_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            inner.credentials.refresh().await;
        }
    })
}
