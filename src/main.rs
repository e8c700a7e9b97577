//! posebridge
//!
//! Runs the bridge loop: reads a tracking source, publishes joint telemetry,
//! and ingests JPEG frames and WHEP video until interrupted.
//!
//! Run with: cargo run --bin posebridge -- --config posebridge.toml
//!
//! Environment variables override the config file; see
//! `posebridge-cli config` for the full list. `RUST_LOG` wins over
//! `[logging] level`.

use anyhow::Context;
use clap::Parser;
use posebridge::bridge::{Bridge, BridgeParts, VideoSession};
use posebridge::config::{Config, LoggingConfig};
use posebridge::media::FrameTexture;
use posebridge::skeleton::{RigStyle, SkeletonRig, SnapshotBuilder, SyntheticTracker};
use posebridge::socket::ReconnectingSocketClient;
use posebridge::telemetry::TelemetryPublisher;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the run loop logs a status line
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "posebridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pose telemetry and media ingestion bridge")]
struct Args {
    /// Config file (default: search standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the synthetic tracking source regardless of config
    #[arg(long)]
    synthetic: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::load_default(),
    };

    init_logging(&config.logging)?;
    config.validate().context("Invalid configuration")?;

    tracing::info!("Starting posebridge v{}", env!("CARGO_PKG_VERSION"));

    let mut bridge = Bridge::new(build_parts(&config, args.synthetic)?);
    bridge.start();

    let mut interval = tokio::time::interval(config.bridge.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_tick = Instant::now();
    let mut last_status = Instant::now();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                bridge.tick(now.duration_since(last_tick).as_secs_f32());
                last_tick = now;

                if now.duration_since(last_status) >= STATUS_INTERVAL {
                    log_status(&bridge);
                    last_status = now;
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    bridge.shutdown().await;
    tracing::info!("posebridge stopped");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("posebridge={}", logging.level).into());

    let writer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .init();
    }

    Ok(())
}

fn build_parts(config: &Config, force_synthetic: bool) -> anyhow::Result<BridgeParts> {
    let tracking = &config.tracking;
    let builder = SnapshotBuilder::new(tracking.hand_filter()?, tracking.body_filter()?);
    let mut parts = BridgeParts::new(builder);

    if force_synthetic || tracking.source == "synthetic" {
        parts.tracker = Some(Box::new(SyntheticTracker::new()));
    } else {
        tracing::warn!(source = %tracking.source, "No built-in tracking source with this name");
    }
    parts.estimate_lower_body = tracking.estimate_lower_body;
    parts.skeletons = tracking.skeletons();

    if config.rig.enabled {
        let style = |base: RigStyle| RigStyle {
            draw_bones: config.rig.draw_bones,
            joint_size: config.rig.joint_size,
            bone_width: config.rig.bone_width,
            ..base
        };
        parts.rig = Some(SkeletonRig::new(style(RigStyle::hand()), style(RigStyle::body())));
    }

    let telemetry = &config.telemetry;
    if telemetry.enabled {
        let client = ReconnectingSocketClient::new("telemetry", telemetry.url.clone())
            .with_reconnect_interval(telemetry.reconnect_interval());
        parts.publisher = Some(TelemetryPublisher::new(
            client,
            telemetry.publish_filters()?,
            telemetry.publish_interval(),
        ));
    }

    let media = &config.media;
    if media.enabled || config.whep.enabled {
        parts.texture = Some(FrameTexture::with_size(media.texture_width, media.texture_height));
    }
    if media.enabled {
        parts.frame_client = Some(
            ReconnectingSocketClient::new("media", media.url.clone())
                .with_reconnect_interval(media.reconnect_interval()),
        );
        parts.queue_warn_depth = media.queue_warn_depth;
    }

    if config.whep.enabled {
        parts.video = video_session(config)?;
    }

    Ok(parts)
}

#[cfg(feature = "webrtc")]
fn video_session(config: &Config) -> anyhow::Result<Option<VideoSession>> {
    use posebridge::media::{MediaSessionController, RtcPeerFactory, WhepClient};
    use std::sync::Arc;

    let whep = &config.whep;
    let signaling = WhepClient::new(whep.request_timeout()).context("Failed to build WHEP client")?;
    let controller = MediaSessionController::new(
        Arc::new(RtcPeerFactory),
        Arc::new(signaling),
        whep.ice_servers.clone(),
    );

    Ok(Some(VideoSession {
        controller,
        endpoint: whep.endpoint.clone(),
        auto_start: whep.auto_start,
    }))
}

#[cfg(not(feature = "webrtc"))]
fn video_session(_config: &Config) -> anyhow::Result<Option<VideoSession>> {
    tracing::warn!("WHEP enabled but posebridge was built without the `webrtc` feature");
    Ok(None)
}

fn log_status(bridge: &Bridge) {
    if let Some(publisher) = bridge.publisher() {
        let stats = publisher.stats();
        tracing::info!(
            state = %publisher.client().state(),
            published = stats.published,
            send_failures = stats.send_failures,
            "Telemetry status"
        );
    }

    if let (Some(client), Some((decoded, rejected))) = (bridge.frame_client(), bridge.frame_counts()) {
        tracing::info!(
            state = %client.state(),
            decoded = decoded,
            rejected = rejected,
            applied = bridge.stats().frames_applied,
            "Frame channel status"
        );
    }

    if let Some(video) = bridge.video() {
        tracing::info!(state = %video.state(), "Video session status");
    }
}
