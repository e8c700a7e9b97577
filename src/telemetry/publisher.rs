//! Telemetry publisher
//!
//! Sends the latest joint snapshots at a fixed interval over its own socket
//! client. Latest-wins: snapshots that change between publishes are never
//! queued, and a failed send is not retried.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::envelope::{PublishFilters, TelemetryEnvelope};
use crate::skeleton::LatestSnapshots;
use crate::socket::{ReconnectingSocketClient, SocketHandler};

/// Default publish period (2 Hz)
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(500);

/// Publish counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishStats {
    pub published: u64,
    pub send_failures: u64,
    pub serialize_failures: u64,
    pub last_published_at: Option<DateTime<Utc>>,
}

/// Logs lifecycle events of the telemetry channel
///
/// The remote does not send anything meaningful back; inbound text is only
/// logged.
#[derive(Debug, Default)]
pub struct TelemetryChannelLogger;

impl SocketHandler for TelemetryChannelLogger {
    fn on_open(&self) {
        tracing::info!("Telemetry channel opened");
    }

    fn on_message(&self, text: &str) {
        tracing::debug!(message = %text, "Telemetry channel message received");
    }

    fn on_close(&self, reason: &str) {
        tracing::info!(reason = %reason, "Telemetry channel closed");
    }

    fn on_error(&self, message: &str) {
        tracing::error!(error = %message, "Telemetry channel error");
    }
}

/// Fixed-rate JSON publisher
pub struct TelemetryPublisher {
    client: ReconnectingSocketClient,
    filters: PublishFilters,
    /// Seconds between publishes
    interval: f32,
    timer: f32,
    stats: PublishStats,
}

impl TelemetryPublisher {
    pub fn new(client: ReconnectingSocketClient, filters: PublishFilters, interval: Duration) -> Self {
        client.set_handler(std::sync::Arc::new(TelemetryChannelLogger));
        Self {
            client,
            filters,
            interval: interval.as_secs_f32(),
            timer: 0.0,
            stats: PublishStats::default(),
        }
    }

    /// Open the connection
    pub fn start(&self) {
        tracing::info!(url = %self.client.url(), "Starting telemetry publisher");
        self.client.connect();
    }

    /// Advance timers; publishes when the interval has elapsed
    ///
    /// The publish timer only runs while the connection is up, so a reconnect
    /// does not trigger an immediate burst. Returns the envelope that was
    /// handed to the socket, if any.
    pub fn tick(&mut self, dt: f32, latest: &LatestSnapshots) -> Option<TelemetryEnvelope> {
        self.client.tick(dt);

        if !self.client.is_alive() {
            return None;
        }

        self.timer += dt;
        if self.timer < self.interval {
            return None;
        }
        self.timer = 0.0;

        let envelope = TelemetryEnvelope::from_snapshots(latest, &self.filters);
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                self.stats.serialize_failures += 1;
                tracing::error!(error = %e, "Failed to serialize telemetry");
                return None;
            }
        };

        if self.client.send(json) {
            self.stats.published += 1;
            self.stats.last_published_at = Some(Utc::now());
            tracing::trace!(
                left = envelope.left_hand.as_ref().map(Vec::len),
                right = envelope.right_hand.as_ref().map(Vec::len),
                body = envelope.body.as_ref().map(Vec::len),
                "Telemetry published"
            );
            Some(envelope)
        } else {
            self.stats.send_failures += 1;
            None
        }
    }

    pub fn client(&self) -> &ReconnectingSocketClient {
        &self.client
    }

    pub fn filters(&self) -> &PublishFilters {
        &self.filters
    }

    pub fn stats(&self) -> &PublishStats {
        &self.stats
    }

    /// Close the connection and stop reconnecting
    pub fn dispose(&self) {
        self.client.dispose();
    }
}
