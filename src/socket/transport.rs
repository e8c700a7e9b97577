//! Socket transport
//!
//! The client dials through a [`Connector`], which yields a text sink and a
//! text stream. [`WsConnector`] is the tokio-tungstenite implementation;
//! tests substitute in-memory channels.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::ready;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Transport-level failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("Timed out connecting to {url} after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("Connection closed")]
    Closed,
}

/// Outbound half of a connection
pub type TextSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a connection; ends when the peer closes
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Opens text connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(TextSink, TextStream), TransportError>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(TextSink, TextStream), TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let (write, read) = ws.split();

        let sink = write
            .with(|text: String| ready(Ok::<_, WsError>(Message::Text(text))))
            .sink_map_err(TransportError::from);

        // Close frames end the stream; binary frames are accepted if UTF-8
        let stream = read
            .take_while(|msg| ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => Some(Ok(text)),
                        Err(_) => {
                            tracing::debug!("Dropping non-UTF-8 binary frame");
                            None
                        }
                    },
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::from(e))),
                })
            });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
