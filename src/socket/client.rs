//! Reconnecting socket client
//!
//! Wraps one duplex text connection. The connection itself lives on a tokio
//! task; the owner drives reconnection by calling [`ReconnectingSocketClient::tick`]
//! from its update loop. Nothing here blocks the caller: `connect` spawns,
//! `send` pushes onto an unbounded channel, and `tick` only does arithmetic.
//!
//! Handler callbacks run on the network task, never on the consumer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::Instrument;

use super::state::{AtomicConnectionState, ConnectionState};
use super::transport::{Connector, TransportError, WsConnector};

/// Fixed delay between reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// How long one dial may take before it counts as failed
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives connection events on the network task
///
/// Implementations must not block; hand work off (for example through an
/// [`crate::ingest::IngestProducer`]) instead.
pub trait SocketHandler: Send + Sync {
    fn on_open(&self) {}

    fn on_message(&self, text: &str);

    fn on_close(&self, _reason: &str) {}

    fn on_error(&self, _message: &str) {}
}

/// Point-in-time connection counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStats {
    pub state: ConnectionState,
    pub connect_attempts: u64,
    pub connections: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub last_connected_at: Option<DateTime<Utc>>,
}

enum Outbound {
    Text(String),
    Close,
}

#[derive(Default)]
struct Counters {
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
}

struct Shared {
    name: String,
    url: String,
    state: AtomicConnectionState,
    disposed: AtomicBool,
    handler: RwLock<Option<Arc<dyn SocketHandler>>>,
    /// Sender for the live connection task, if any
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    counters: Counters,
    last_connected_at: Mutex<Option<DateTime<Utc>>>,
}

impl Shared {
    fn handler(&self) -> Option<Arc<dyn SocketHandler>> {
        self.handler.read().clone()
    }

    /// Release the outbound channel before publishing Disconnected so a new
    /// `connect` never sees a stale sender.
    fn finish(&self) {
        *self.outbound.lock() = None;
        self.state.store(ConnectionState::Disconnected);
    }
}

/// Duplex text socket with fixed-interval reconnection
pub struct ReconnectingSocketClient {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    /// Seconds between reconnect attempts
    reconnect_interval: f32,
    reconnect_timer: f32,
    /// Connections already seen by `tick`; a change restarts the timer
    seen_connections: u64,
}

impl ReconnectingSocketClient {
    /// Client for a WebSocket URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_connector(name, url, Arc::new(WsConnector))
    }

    /// Client dialing through a custom connector
    pub fn with_connector(
        name: impl Into<String>,
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                url: url.into(),
                state: AtomicConnectionState::default(),
                disposed: AtomicBool::new(false),
                handler: RwLock::new(None),
                outbound: Mutex::new(None),
                counters: Counters::default(),
                last_connected_at: Mutex::new(None),
            }),
            connector,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL.as_secs_f32(),
            reconnect_timer: 0.0,
            seen_connections: 0,
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval.as_secs_f32();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Install the event handler; replaces any previous one
    pub fn set_handler(&self, handler: Arc<dyn SocketHandler>) {
        *self.shared.handler.write() = Some(handler);
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    pub fn is_alive(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Begin a connection attempt
    ///
    /// Idempotent: does nothing while connecting, connected, or disposed.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        if self.is_disposed() {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    name = %self.shared.name,
                    error = %e,
                    "Cannot connect outside a tokio runtime"
                );
                return;
            }
        };

        if !self
            .shared
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            tracing::trace!(name = %self.shared.name, "Connect already in progress");
            return;
        }

        self.shared
            .counters
            .connect_attempts
            .fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(tx);

        let span = tracing::info_span!("socket", name = %self.shared.name, url = %self.shared.url);
        runtime.spawn(
            run_connection(
                Arc::clone(&self.shared),
                Arc::clone(&self.connector),
                self.connect_timeout,
                rx,
            )
            .instrument(span),
        );
    }

    /// Queue a text message for the live connection
    ///
    /// Returns `false` (and logs) when not connected; nothing is buffered
    /// for later delivery.
    pub fn send(&self, text: impl Into<String>) -> bool {
        if !self.is_alive() {
            tracing::warn!(name = %self.shared.name, "WebSocket not connected; dropping message");
            self.shared
                .counters
                .send_failures
                .fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let queued = match self.shared.outbound.lock().as_ref() {
            Some(tx) => tx.send(Outbound::Text(text.into())).is_ok(),
            None => false,
        };

        if !queued {
            self.shared
                .counters
                .send_failures
                .fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Advance the reconnect timer
    ///
    /// The timer only runs while disconnected and restarts whenever a
    /// connection opens; once it reaches the reconnect interval a new
    /// attempt starts and the timer resets.
    pub fn tick(&mut self, dt: f32) {
        let connections = self.shared.counters.connections.load(Ordering::Relaxed);
        if connections != self.seen_connections {
            self.seen_connections = connections;
            self.reconnect_timer = 0.0;
        }

        if self.is_disposed() || self.state() != ConnectionState::Disconnected {
            return;
        }

        self.reconnect_timer += dt;
        if self.reconnect_timer >= self.reconnect_interval {
            tracing::debug!(name = %self.shared.name, "Attempting to reconnect");
            self.connect();
            self.reconnect_timer = 0.0;
        }
    }

    /// Stop reconnecting, close the connection and release the handler
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(tx) = self.shared.outbound.lock().as_ref() {
            let _ = tx.send(Outbound::Close);
        }
        *self.shared.handler.write() = None;
        tracing::debug!(name = %self.shared.name, "Socket client disposed");
    }

    pub fn stats(&self) -> ClientStats {
        let c = &self.shared.counters;
        ClientStats {
            state: self.state(),
            connect_attempts: c.connect_attempts.load(Ordering::Relaxed),
            connections: c.connections.load(Ordering::Relaxed),
            messages_received: c.messages_received.load(Ordering::Relaxed),
            messages_sent: c.messages_sent.load(Ordering::Relaxed),
            send_failures: c.send_failures.load(Ordering::Relaxed),
            last_connected_at: *self.shared.last_connected_at.lock(),
        }
    }
}

impl Drop for ReconnectingSocketClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Drive one connection from dial to close
async fn run_connection(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    tracing::debug!("Dialing");

    let dialed = match tokio::time::timeout(connect_timeout, connector.connect(&shared.url)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            url: shared.url.clone(),
            after: connect_timeout,
        }),
    };

    let (mut sink, mut stream) = match dialed {
        Ok(halves) => halves,
        Err(e) => {
            tracing::warn!(error = %e, "Connection failed");
            shared.finish();
            if let Some(handler) = shared.handler() {
                handler.on_error(&e.to_string());
            }
            return;
        }
    };

    if shared.disposed.load(Ordering::Acquire) {
        let _ = sink.close().await;
        shared.finish();
        return;
    }

    shared.state.store(ConnectionState::Connected);
    shared.counters.connections.fetch_add(1, Ordering::Relaxed);
    *shared.last_connected_at.lock() = Some(Utc::now());
    tracing::info!("WebSocket connected");

    if let Some(handler) = shared.handler() {
        handler.on_open();
    }

    let reason = loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(text).await {
                        shared.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, "WebSocket send failed");
                        if let Some(handler) = shared.handler() {
                            handler.on_error(&e.to_string());
                        }
                        break format!("send failed: {}", e);
                    }
                    shared.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.close().await;
                    break "closed by client".to_string();
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(text)) => {
                    shared.counters.messages_received.fetch_add(1, Ordering::Relaxed);
                    if let Some(handler) = shared.handler() {
                        handler.on_message(&text);
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    if let Some(handler) = shared.handler() {
                        handler.on_error(&e.to_string());
                    }
                    break format!("receive failed: {}", e);
                }
                None => break "closed by server".to_string(),
            },
        }
    };

    shared.finish();
    tracing::info!(reason = %reason, "WebSocket closed");

    if let Some(handler) = shared.handler() {
        handler.on_close(&reason);
    }
}
