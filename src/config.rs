//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `POSEBRIDGE_*` environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::skeleton::{JointFilter, JointId, SkeletonId, SkeletonKind, UnknownJoint};
use crate::telemetry::PublishFilters;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub whep: WhepConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub rig: RigConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Outbound pose telemetry
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_url")]
    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_publish_interval")]
    pub publish_interval_ms: u64,

    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Publish the left hand; off means `null` on the wire
    #[serde(default = "default_true")]
    pub left_hand: bool,

    #[serde(default = "default_true")]
    pub right_hand: bool,

    #[serde(default = "default_true")]
    pub body: bool,

    /// Published hand joints by name; empty means all
    #[serde(default)]
    pub hand_joints: Vec<String>,

    /// Published body joints by name; empty means all
    #[serde(default = "default_published_body_joints")]
    pub body_joints: Vec<String>,
}

fn default_telemetry_url() -> String {
    "ws://127.0.0.1:9090".to_string()
}

fn default_publish_interval() -> u64 {
    500 // 2 Hz
}

fn default_reconnect_interval() -> u64 {
    5000
}

fn default_published_body_joints() -> Vec<String> {
    vec!["HEAD".to_string(), "HIPS".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: default_telemetry_url(),
            enabled: true,
            publish_interval_ms: default_publish_interval(),
            reconnect_interval_ms: default_reconnect_interval(),
            left_hand: true,
            right_hand: true,
            body: true,
            hand_joints: Vec::new(),
            body_joints: default_published_body_joints(),
        }
    }
}

impl TelemetryConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Resolve the configured joint names
    pub fn publish_filters(&self) -> Result<PublishFilters, ConfigError> {
        Ok(PublishFilters {
            skeletons: enabled_skeletons(self.left_hand, self.right_hand, self.body),
            hand: joint_filter("telemetry.hand_joints", &self.hand_joints, SkeletonKind::Hand)?,
            body: joint_filter("telemetry.body_joints", &self.body_joints, SkeletonKind::Body)?,
        })
    }
}

/// Inbound JPEG frame channel
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_url")]
    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Queue depth that triggers a consumer-stall warning
    #[serde(default = "default_queue_warn_depth")]
    pub queue_warn_depth: usize,

    #[serde(default = "default_texture_width")]
    pub texture_width: u32,

    #[serde(default = "default_texture_height")]
    pub texture_height: u32,
}

fn default_media_url() -> String {
    "ws://127.0.0.1:9091".to_string()
}

fn default_queue_warn_depth() -> usize {
    crate::ingest::DEFAULT_WARN_DEPTH
}

fn default_texture_width() -> u32 {
    1280
}

fn default_texture_height() -> u32 {
    720
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            url: default_media_url(),
            enabled: true,
            reconnect_interval_ms: default_reconnect_interval(),
            queue_warn_depth: default_queue_warn_depth(),
            texture_width: default_texture_width(),
            texture_height: default_texture_height(),
        }
    }
}

impl MediaConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// WHEP video session
#[derive(Debug, Clone, Deserialize)]
pub struct WhepConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_whep_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Start negotiating as soon as the bridge starts
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

fn default_whep_endpoint() -> String {
    "http://127.0.0.1:8889/vr_stream/whep".to_string()
}

fn default_ice_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for WhepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_whep_endpoint(),
            ice_servers: default_ice_servers(),
            request_timeout_secs: default_request_timeout(),
            auto_start: true,
        }
    }
}

impl WhepConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Tracking source and visualized joints
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Only "synthetic" is built in; other sources are injected by the host
    #[serde(default = "default_tracking_source")]
    pub source: String,

    /// Read the left hand each tick; off hides it from the rig and telemetry
    #[serde(default = "default_true")]
    pub left_hand: bool,

    #[serde(default = "default_true")]
    pub right_hand: bool,

    #[serde(default = "default_true")]
    pub body: bool,

    /// Visualized hand joints by name; empty means all
    #[serde(default)]
    pub hand_joints: Vec<String>,

    /// Visualized body joints by name; empty means all
    #[serde(default)]
    pub body_joints: Vec<String>,

    /// Fill in legs from the hips position
    #[serde(default = "default_true")]
    pub estimate_lower_body: bool,
}

fn default_tracking_source() -> String {
    "synthetic".to_string()
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            source: default_tracking_source(),
            left_hand: true,
            right_hand: true,
            body: true,
            hand_joints: Vec::new(),
            body_joints: Vec::new(),
            estimate_lower_body: true,
        }
    }
}

impl TrackingConfig {
    /// Skeletons read from the tracking source
    pub fn skeletons(&self) -> Vec<SkeletonId> {
        enabled_skeletons(self.left_hand, self.right_hand, self.body)
    }

    pub fn hand_filter(&self) -> Result<JointFilter, ConfigError> {
        joint_filter("tracking.hand_joints", &self.hand_joints, SkeletonKind::Hand)
    }

    pub fn body_filter(&self) -> Result<JointFilter, ConfigError> {
        joint_filter("tracking.body_joints", &self.body_joints, SkeletonKind::Body)
    }
}

/// Debug rig appearance
#[derive(Debug, Clone, Deserialize)]
pub struct RigConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub draw_bones: bool,

    #[serde(default = "default_joint_size")]
    pub joint_size: f32,

    #[serde(default = "default_bone_width")]
    pub bone_width: f32,
}

fn default_joint_size() -> f32 {
    0.02
}

fn default_bone_width() -> f32 {
    0.005
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            draw_bones: true,
            joint_size: default_joint_size(),
            bone_width: default_bone_width(),
        }
    }
}

/// Consumer loop
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
}

fn default_tick_rate() -> u32 {
    60
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
        }
    }
}

impl BridgeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

fn enabled_skeletons(left_hand: bool, right_hand: bool, body: bool) -> Vec<SkeletonId> {
    [
        (left_hand, SkeletonId::LEFT_HAND),
        (right_hand, SkeletonId::RIGHT_HAND),
        (body, SkeletonId::Body),
    ]
    .into_iter()
    .filter_map(|(enabled, skeleton)| enabled.then_some(skeleton))
    .collect()
}

fn joint_filter(
    field: &'static str,
    names: &[String],
    kind: SkeletonKind,
) -> Result<JointFilter, ConfigError> {
    if names.is_empty() {
        // Legs are estimated, never read from a source
        return Ok(JointFilter::new(JointId::all(kind).into_iter().filter(
            |joint| !matches!(joint, JointId::Body(body) if body.is_estimated()),
        )));
    }

    let filter = JointFilter::parse(names).map_err(|UnknownJoint(name)| ConfigError::Invalid {
        field,
        reason: format!("unknown joint {:?}", name),
    })?;

    if let Some(joint) = filter.joints().iter().find(|j| j.kind() != kind) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{} is not a {:?} joint", joint.wire_name(), kind),
        });
    }

    Ok(filter)
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("posebridge").join("config.toml")),
            Some(PathBuf::from("/etc/posebridge/config.toml")),
            Some(PathBuf::from("./posebridge.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!(path = ?path, "Loaded config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "Failed to load config");
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check everything that is resolved lazily at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.telemetry.publish_filters()?;
        self.tracking.hand_filter()?;
        self.tracking.body_filter()?;

        if self.telemetry.publish_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "telemetry.publish_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.bridge.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid {
                field: "bridge.tick_rate_hz",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        // Telemetry overrides
        if let Ok(url) = std::env::var("POSEBRIDGE_TELEMETRY_URL") {
            self.telemetry.url = url;
        }
        if let Ok(interval) = std::env::var("POSEBRIDGE_PUBLISH_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.telemetry.publish_interval_ms = ms;
            }
        }

        // Media overrides
        if let Ok(url) = std::env::var("POSEBRIDGE_MEDIA_URL") {
            self.media.url = url;
        }

        // WHEP overrides
        if let Ok(endpoint) = std::env::var("POSEBRIDGE_WHEP_ENDPOINT") {
            self.whep.endpoint = endpoint;
        }
        if let Ok(enabled) = std::env::var("POSEBRIDGE_WHEP_ENABLED") {
            if let Ok(b) = enabled.parse() {
                self.whep.enabled = b;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("POSEBRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("POSEBRIDGE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# posebridge Configuration
#
# Environment variables override these settings:
# - POSEBRIDGE_TELEMETRY_URL
# - POSEBRIDGE_PUBLISH_INTERVAL_MS
# - POSEBRIDGE_MEDIA_URL
# - POSEBRIDGE_WHEP_ENDPOINT
# - POSEBRIDGE_WHEP_ENABLED
# - POSEBRIDGE_LOG_LEVEL
# - POSEBRIDGE_LOG_FORMAT

[telemetry]
# WebSocket endpoint receiving joint positions
url = "ws://127.0.0.1:9090"
enabled = true

# Publish period (ms)
publish_interval_ms = 500

# Re-dial period while disconnected (ms)
reconnect_interval_ms = 5000

# Skeletons included in the envelope; disabled ones publish null
left_hand = true
right_hand = true
body = true

# Joint names to publish; empty means all
hand_joints = []
body_joints = ["HEAD", "HIPS"]

[media]
# WebSocket endpoint sending base64 JPEG frames
url = "ws://127.0.0.1:9091"
enabled = true
reconnect_interval_ms = 5000

# Warn when this many frames wait for the consumer
queue_warn_depth = 64

# Initial texture size before the first frame arrives
texture_width = 1280
texture_height = 720

[whep]
# Receive video over WebRTC (requires the `webrtc` feature)
enabled = false
endpoint = "http://127.0.0.1:8889/vr_stream/whep"
ice_servers = ["stun:stun.l.google.com:19302"]
request_timeout_secs = 10
auto_start = true

[tracking]
# Tracking source: synthetic
source = "synthetic"

# Skeletons read each tick (rig and telemetry)
left_hand = true
right_hand = true
body = true

# Joint names to visualize; empty means all
hand_joints = []
body_joints = []

# Estimate legs from the hips position
estimate_lower_body = true

[rig]
enabled = true
draw_bones = true
joint_size = 0.02
bone_width = 0.005

[bridge]
# Consumer tick rate
tick_rate_hz = 60

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/posebridge/posebridge.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{BodyJoint, HandJoint};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_parses_to_defaults() {
        let parsed: Config = toml::from_str(&generate_default_config()).unwrap();
        let defaults = Config::default();

        assert_eq!(parsed.telemetry.url, defaults.telemetry.url);
        assert_eq!(parsed.telemetry.publish_interval(), Duration::from_millis(500));
        assert_eq!(parsed.telemetry.body_joints, defaults.telemetry.body_joints);
        assert_eq!(parsed.media.reconnect_interval(), Duration::from_secs(5));
        assert_eq!(parsed.whep.ice_servers, defaults.whep.ice_servers);
        assert!(!parsed.whep.enabled);
        assert_eq!(parsed.bridge.tick_rate_hz, 60);
        parsed.validate().unwrap();
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[telemetry]
url = "ws://10.0.0.5:9090"
hand_joints = ["Wrist", "IndexTip"]

[media]
enabled = false
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.telemetry.url, "ws://10.0.0.5:9090");
        assert_eq!(config.telemetry.publish_interval_ms, 500);
        assert!(!config.media.enabled);
        assert_eq!(config.logging.level, "info");

        let filters = config.telemetry.publish_filters().unwrap();
        assert_eq!(filters.hand.len(), 2);
        assert!(filters.hand.contains(JointId::Hand(HandJoint::IndexTip)));
        assert!(filters.body.contains(JointId::Body(BodyJoint::Hips)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load(Path::new("/nonexistent/posebridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry\nurl = ").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_joint_rejected() {
        let mut config = Config::default();
        config.tracking.hand_joints = vec!["Wrist".to_string(), "Elbow".to_string()];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "tracking.hand_joints", .. }));
    }

    #[test]
    fn test_body_joint_in_hand_list_rejected() {
        let mut config = Config::default();
        config.telemetry.hand_joints = vec!["HEAD".to_string()];
        assert!(config.telemetry.publish_filters().is_err());
    }

    #[test]
    fn test_empty_joint_list_means_all() {
        let config = Config::default();
        assert_eq!(config.tracking.hand_filter().unwrap().len(), 12);
        let body = config.tracking.body_filter().unwrap();
        assert_eq!(body.len(), 16);
        assert!(!body.contains(JointId::Body(BodyJoint::LeftKnee)));
    }

    #[test]
    fn test_publish_flags_do_not_hide_tracked_skeletons() {
        let mut config = Config::default();
        config.telemetry.body = false;

        let filters = config.telemetry.publish_filters().unwrap();
        assert!(!filters.publishes(SkeletonId::Body));
        assert!(filters.publishes(SkeletonId::LEFT_HAND));
        assert!(config.tracking.skeletons().contains(&SkeletonId::Body));

        config.tracking.right_hand = false;
        assert_eq!(
            config.tracking.skeletons(),
            vec![SkeletonId::LEFT_HAND, SkeletonId::Body]
        );
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("POSEBRIDGE_MEDIA_URL", "ws://override:1234");
        let config = Config::from_env();
        std::env::remove_var("POSEBRIDGE_MEDIA_URL");
        assert_eq!(config.media.url, "ws://override:1234");
    }
}
