//! posebridge CLI
//!
//! Tooling around the bridge:
//! - Generate a default config file
//! - Print the joint hierarchy
//! - Decode a captured frame message
//! - Check a media WebSocket or WHEP endpoint

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use posebridge::media::{FrameDecoder, FrameTexture};
use posebridge::skeleton::{JointHierarchy, JointId, SkeletonKind};
use posebridge::socket::{Connector, WsConnector};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "posebridge-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tools for the posebridge pose and media bridge")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Hand,
    Body,
}

impl From<KindArg> for SkeletonKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Hand => SkeletonKind::Hand,
            KindArg::Body => SkeletonKind::Body,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the joint hierarchy as a tree
    Hierarchy {
        /// Skeleton kind (default: both)
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
    },

    /// Decode a captured frame message (envelope JSON or bare base64)
    Decode {
        /// File holding one message
        path: PathBuf,
        /// Write the decoded JPEG here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that an endpoint answers
    ///
    /// ws:// and wss:// URLs wait for one frame message; http:// and https://
    /// URLs run a WHEP negotiation (needs the `webrtc` feature).
    Check {
        endpoint: String,
        /// Seconds to wait
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => {
            let content = posebridge::generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }

        Commands::Hierarchy { kind } => {
            let hierarchy = JointHierarchy::new();
            let kinds = match kind {
                Some(kind) => vec![kind.into()],
                None => vec![SkeletonKind::Hand, SkeletonKind::Body],
            };
            for kind in kinds {
                println!("{:?}", kind);
                print_tree(&hierarchy, kind, hierarchy.root_of(kind), 1);
                println!();
            }
        }

        Commands::Decode { path, output } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let frame = FrameDecoder::new()
                .decode(raw.trim())
                .context("Failed to decode frame message")?;

            println!("Payload: {} bytes", frame.bytes.len());
            match &frame.meta {
                Some(meta) => {
                    println!("Envelope: {}x{} at {}", meta.width, meta.height, meta.timestamp);
                    if let Some(id) = &meta.frame_id {
                        println!("Frame id: {}", id);
                    }
                }
                None => println!("Envelope: none (bare base64)"),
            }

            let mut texture = FrameTexture::new();
            match texture.load(&frame) {
                Ok(()) => {
                    let (w, h) = texture.dimensions();
                    println!("JPEG: {}x{}", w, h);
                }
                Err(e) => println!("JPEG: invalid ({})", e),
            }

            if let Some(out) = output {
                std::fs::write(&out, &frame.bytes)
                    .with_context(|| format!("Failed to write {:?}", out))?;
                println!("Wrote {:?}", out);
            }
        }

        Commands::Check { endpoint, timeout } => {
            let timeout = Duration::from_secs(timeout);
            if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
                check_socket(&endpoint, timeout).await?;
            } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                check_whep(&endpoint, timeout).await?;
            } else {
                bail!("Unsupported endpoint scheme: {}", endpoint);
            }
        }
    }

    Ok(())
}

fn print_tree(hierarchy: &JointHierarchy, kind: SkeletonKind, joint: JointId, depth: usize) {
    println!("{}{}", "  ".repeat(depth), joint);
    for child in hierarchy
        .joints(kind)
        .into_iter()
        .filter(|&j| hierarchy.parent_of(j) == Some(joint))
    {
        print_tree(hierarchy, kind, child, depth + 1);
    }
}

async fn check_socket(url: &str, timeout: Duration) -> anyhow::Result<()> {
    let (_sink, mut stream) = tokio::time::timeout(timeout, WsConnector.connect(url))
        .await
        .context("Timed out connecting")??;
    println!("Connected to {}", url);

    let message = tokio::time::timeout(timeout, stream.next())
        .await
        .context("No message received")?;

    match message {
        Some(Ok(text)) => match FrameDecoder::new().decode(&text) {
            Ok(frame) => println!("Received frame: {} bytes", frame.bytes.len()),
            Err(e) => println!("Received {} chars, not a frame: {}", text.len(), e),
        },
        Some(Err(e)) => bail!("Connection error: {}", e),
        None => bail!("Connection closed before any message"),
    }

    Ok(())
}

#[cfg(feature = "webrtc")]
async fn check_whep(endpoint: &str, timeout: Duration) -> anyhow::Result<()> {
    use posebridge::media::{MediaSessionController, RtcPeerFactory, WhepClient};
    use std::sync::Arc;

    let controller = MediaSessionController::new(
        Arc::new(RtcPeerFactory),
        Arc::new(WhepClient::new(timeout)?),
        vec!["stun:stun.l.google.com:19302".to_string()],
    );

    let result = controller.start_session(endpoint).await;
    println!("Session state: {}", controller.state());
    controller.stop_session().await;
    result.context("WHEP negotiation failed")?;
    Ok(())
}

#[cfg(not(feature = "webrtc"))]
async fn check_whep(_endpoint: &str, _timeout: Duration) -> anyhow::Result<()> {
    bail!("WHEP checks require building with `--features webrtc`")
}
