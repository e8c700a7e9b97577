//! Reconnecting WebSocket Client
//!
//! Duplex text connections that survive drops without operator action:
//!
//! - **client**: `ReconnectingSocketClient` and the `SocketHandler` callbacks
//! - **state**: Atomic connection state shared with the network task
//! - **transport**: `Connector` seam and the tokio-tungstenite implementation
//!
//! # Architecture
//!
//! ```text
//! consumer tick ──tick(dt)──► reconnect timer ──connect()──► spawn task
//!               ──send()────► mpsc ──────────────────────────►  │ sink
//!                                                               │ stream
//!                                   SocketHandler::on_message ◄─┘
//! ```

mod client;
mod state;
mod transport;

pub use client::{
    ClientStats, ReconnectingSocketClient, SocketHandler, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_RECONNECT_INTERVAL,
};
pub use state::{AtomicConnectionState, ConnectionState};
pub use transport::{Connector, TextSink, TextStream, TransportError, WsConnector};

#[cfg(test)]
pub(crate) use client::tests::{wait_for, MockConnector, ServerEnd};
