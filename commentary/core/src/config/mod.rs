//! TOML Configuration File Support
//!
//! Centralized configuration loading for the commentary engine, backed by a
//! TOML file at `~/.config/autorec/commentary.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [connection]
//! host = "nx-jikkyo.tsukumijima.net"
//! retry_max = 3
//! retry_delay_ms = 5000
//! default_keep_interval_secs = 30
//!
//! [display]
//! lane_count = 12
//! comment_lifetime_ms = 6000
//! overlay_cap = 50
//! sidebar_cap = 200
//!
//! [compositor]
//! width = 960
//! height = 540
//!
//! [catalog]
//! base_url = "http://localhost:8080"
//!
//! [rooms]
//! "NHK総合" = "jk1"
//! "Eテレ" = "jk2"
//! ```

mod rooms;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::MIN_KEEP_INTERVAL;

pub use rooms::BroadcasterMap;

/// Default commentary server host
pub const DEFAULT_HOST: &str = "nx-jikkyo.tsukumijima.net";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Connection and retry behaviour of the commentary session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Commentary server host used for default endpoints
    pub host: String,
    /// Retry attempts after a watch-socket failure
    pub retry_max: u32,
    /// Fixed backoff between retries
    pub retry_delay: Duration,
    /// Keepalive interval used when the server sends none (or zero)
    pub default_keep_interval: Duration,
    /// Timeout for opening either socket
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            retry_max: 3,
            retry_delay: Duration::from_millis(5000),
            default_keep_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    /// Watch (stage-1) endpoint for a room
    #[must_use]
    pub fn watch_url(&self, room_id: &str) -> String {
        format!("wss://{}/api/v1/channels/{room_id}/ws/watch", self.host)
    }

    /// Default comment (stage-2) endpoint for a room
    #[must_use]
    pub fn comment_url(&self, room_id: &str) -> String {
        format!("wss://{}/api/v1/channels/{room_id}/ws/comment", self.host)
    }

    /// Short timings for tests
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            host: "jikkyo.test".to_string(),
            retry_max: 3,
            retry_delay: Duration::from_millis(5000),
            default_keep_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(1),
        }
    }
}

/// Display geometry shared by the sinks
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Number of lanes
    pub lane_count: usize,
    /// Time a comment stays active
    pub comment_lifetime: Duration,
    /// Maximum concurrently animating overlay elements
    pub overlay_cap: usize,
    /// Maximum sidebar entries
    pub sidebar_cap: usize,
    /// Lane height in pixels
    pub row_height: f32,
    /// Font size in pixels
    pub font_size: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            lane_count: crate::lanes::DEFAULT_LANE_COUNT,
            comment_lifetime: crate::buffer::DEFAULT_COMMENT_LIFETIME,
            overlay_cap: 50,
            sidebar_cap: 200,
            row_height: 36.0,
            font_size: 28.0,
        }
    }
}

/// Offscreen compositor settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// Surface width in pixels
    pub width: u32,
    /// Surface height in pixels
    pub height: u32,
    /// Render loop tick
    pub frame_interval: Duration,
    /// Font family for comment text
    pub font_family: String,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 540,
            frame_interval: Duration::from_millis(16),
            font_family: "sans-serif".to_string(),
        }
    }
}

/// Centralized configuration for the commentary engine
///
/// Use [`load_config`] to load with proper priority handling.
#[derive(Clone, Debug)]
pub struct CommentaryConfig {
    /// Connection settings
    pub connection: ConnectionConfig,
    /// Display settings
    pub display: DisplayConfig,
    /// Compositor settings
    pub compositor: CompositorConfig,
    /// Base URL of the recorder web API
    pub catalog_base_url: String,
    /// Broadcaster name to room id
    pub rooms: BroadcasterMap,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for CommentaryConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            display: DisplayConfig::default(),
            compositor: CompositorConfig::default(),
            catalog_base_url: "http://localhost:8080".to_string(),
            rooms: BroadcasterMap::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl CommentaryConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Reject values the engine cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display.lane_count == 0 {
            return Err(ConfigError::ValidationError(
                "display.lane_count must be at least 1".into(),
            ));
        }
        if self.display.comment_lifetime.is_zero() {
            return Err(ConfigError::ValidationError(
                "display.comment_lifetime_ms must be positive".into(),
            ));
        }
        if self.compositor.width == 0 || self.compositor.height == 0 {
            return Err(ConfigError::ValidationError(
                "compositor width and height must be positive".into(),
            ));
        }
        if self.connection.default_keep_interval < MIN_KEEP_INTERVAL {
            return Err(ConfigError::ValidationError(
                "connection.default_keep_interval_secs must be at least 1".into(),
            ));
        }
        if self.connection.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "connection.host must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Connection section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionToml {
    /// Commentary server host
    pub host: Option<String>,
    /// Retry attempts after failure
    pub retry_max: Option<u32>,
    /// Backoff between retries in milliseconds
    pub retry_delay_ms: Option<u64>,
    /// Fallback keepalive interval in seconds
    pub default_keep_interval_secs: Option<u64>,
    /// Socket open timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Display section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayToml {
    /// Number of lanes
    pub lane_count: Option<usize>,
    /// Comment lifetime in milliseconds
    pub comment_lifetime_ms: Option<u64>,
    /// Overlay element cap
    pub overlay_cap: Option<usize>,
    /// Sidebar entry cap
    pub sidebar_cap: Option<usize>,
    /// Lane height in pixels
    pub row_height: Option<f32>,
    /// Font size in pixels
    pub font_size: Option<f32>,
}

/// Compositor section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorToml {
    /// Surface width
    pub width: Option<u32>,
    /// Surface height
    pub height: Option<u32>,
    /// Frame interval in milliseconds
    pub frame_interval_ms: Option<u64>,
    /// Font family
    pub font_family: Option<String>,
}

/// Catalog section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogToml {
    /// Base URL of the recorder web API
    pub base_url: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentaryToml {
    /// Connection section
    pub connection: ConnectionToml,
    /// Display section
    pub display: DisplayToml,
    /// Compositor section
    pub compositor: CompositorToml,
    /// Catalog section
    pub catalog: CatalogToml,
    /// Broadcaster name to room id
    pub rooms: BroadcasterMap,
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/autorec/commentary.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("autorec").join("commentary.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// merged result fails validation. A missing file is not an error.
pub fn load_config() -> Result<CommentaryConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the merged result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CommentaryConfig, ConfigError> {
    let mut config = CommentaryConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CommentaryToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                rooms = config.rooms.len(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut CommentaryConfig, toml: CommentaryToml) {
    let CommentaryToml {
        connection,
        display,
        compositor,
        catalog,
        rooms,
    } = toml;

    if let Some(host) = connection.host {
        config.connection.host = host;
    }
    if let Some(n) = connection.retry_max {
        config.connection.retry_max = n;
    }
    if let Some(ms) = connection.retry_delay_ms {
        config.connection.retry_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = connection.default_keep_interval_secs {
        config.connection.default_keep_interval = Duration::from_secs(secs);
    }
    if let Some(ms) = connection.connect_timeout_ms {
        config.connection.connect_timeout = Duration::from_millis(ms);
    }

    if let Some(n) = display.lane_count {
        config.display.lane_count = n;
    }
    if let Some(ms) = display.comment_lifetime_ms {
        config.display.comment_lifetime = Duration::from_millis(ms);
    }
    if let Some(n) = display.overlay_cap {
        config.display.overlay_cap = n;
    }
    if let Some(n) = display.sidebar_cap {
        config.display.sidebar_cap = n;
    }
    if let Some(px) = display.row_height {
        config.display.row_height = px;
    }
    if let Some(px) = display.font_size {
        config.display.font_size = px;
    }

    if let Some(w) = compositor.width {
        config.compositor.width = w;
    }
    if let Some(h) = compositor.height {
        config.compositor.height = h;
    }
    if let Some(ms) = compositor.frame_interval_ms {
        config.compositor.frame_interval = Duration::from_millis(ms.max(1));
    }
    if let Some(family) = compositor.font_family {
        config.compositor.font_family = family;
    }

    if let Some(url) = catalog.base_url {
        config.catalog_base_url = url;
    }

    if !rooms.is_empty() {
        config.rooms = rooms;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut CommentaryConfig) {
    if let Ok(host) = std::env::var("COMMENTARY_HOST") {
        if !host.is_empty() {
            config.connection.host = host;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(n) = env_parse::<u32>("COMMENTARY_RETRY_MAX") {
        config.connection.retry_max = n;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env_parse::<u64>("COMMENTARY_RETRY_DELAY_MS") {
        config.connection.retry_delay = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(n) = env_parse::<usize>("COMMENTARY_LANES") {
        config.display.lane_count = n;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env_parse::<u64>("COMMENTARY_LIFETIME_MS") {
        config.display.comment_lifetime = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Ok(url) = std::env::var("COMMENTARY_CATALOG_URL") {
        if !url.is_empty() {
            config.catalog_base_url = url;
            config.source = ConfigSource::Env;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
