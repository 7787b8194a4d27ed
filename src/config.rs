//! Configuration management for Fleetwire.
//!
//! Dialect behavior is an explicit configuration value passed into the
//! framer, decoders and pipeline at session-construction time — there
//! is no process-wide mutable state, so multiple concurrently
//! configured server instances can coexist.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::Dialect;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-dialect handling configuration.
    #[serde(default)]
    pub dialect: DialectTable,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_packet_len < 8 {
            return Err(Error::InvalidConfig(
                "max_packet_len must cover at least one minimal packet".into(),
            ));
        }

        for dialect in Dialect::ALL {
            let cfg = self.dialect.for_dialect(dialect);
            if cfg.minimum_speed_kmh < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{dialect}: minimum_speed_kmh must be non-negative"
                )));
            }
            if cfg.minimum_moved_meters < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{dialect}: minimum_moved_meters must be non-negative"
                )));
            }
        }

        Ok(())
    }

    /// Resolve the effective configuration for a dialect.
    pub fn dialect(&self, dialect: Dialect) -> &DialectConfig {
        self.dialect.for_dialect(dialect)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Optional UDP listen address; each datagram is one packet buffer.
    pub udp_addr: Option<SocketAddr>,

    /// Maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Connection idle timeout.
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// Maximum length of a single framed packet.
    #[serde(default = "default_max_packet_len")]
    pub max_packet_len: usize,

    /// Disable Nagle on accepted connections.
    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], crate::DEFAULT_PORT))
}
fn default_max_connections() -> usize {
    4096
}
fn default_idle_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_max_packet_len() -> usize {
    crate::DEFAULT_MAX_PACKET_LEN
}
fn default_tcp_nodelay() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            udp_addr: None,
            max_connections: default_max_connections(),
            idle_timeout: default_idle_timeout(),
            max_packet_len: default_max_packet_len(),
            tcp_nodelay: default_tcp_nodelay(),
        }
    }
}

/// Per-dialect configuration table: shared defaults plus optional
/// per-dialect overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialectTable {
    /// Applied to every dialect without an override.
    #[serde(default)]
    pub defaults: DialectConfig,

    pub csv: Option<DialectConfig>,
    pub paren: Option<DialectConfig>,
    pub bracket: Option<DialectConfig>,
    pub dollar: Option<DialectConfig>,
}

impl DialectTable {
    /// Effective configuration for one dialect.
    pub fn for_dialect(&self, dialect: Dialect) -> &DialectConfig {
        let specific = match dialect {
            Dialect::Csv => self.csv.as_ref(),
            Dialect::Paren => self.paren.as_ref(),
            Dialect::Bracket => self.bracket.as_ref(),
            Dialect::Dollar => self.dollar.as_ref(),
        };
        specific.unwrap_or(&self.defaults)
    }
}

/// Handling policy for one dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialectConfig {
    /// Decoded speeds below this are zeroed (heading with them).
    #[serde(default = "default_minimum_speed")]
    pub minimum_speed_kmh: f64,

    /// Estimate odometer from great-circle travel when the dialect
    /// supplies none.
    #[serde(default = "default_true")]
    pub estimate_odometer: bool,

    /// Synthesize geofence enter/exit events.
    #[serde(default = "default_true")]
    pub simulate_geozones: bool,

    /// Digital-input bits that synthesize edge events on change.
    #[serde(default = "default_input_mask")]
    pub input_mask_of_interest: u32,

    /// A plain "location" event is persisted only after moving at least
    /// this far from the last valid location.
    #[serde(default = "default_minimum_moved")]
    pub minimum_moved_meters: f64,

    /// Retarget "location" to "in-motion" when speed is positive.
    #[serde(default)]
    pub location_to_in_motion: bool,

    /// Substitute the last known valid fix for invalid GPS samples.
    #[serde(default = "default_true")]
    pub use_last_valid_fix: bool,

    /// Frame line-oriented dialects to end-of-stream instead of a line
    /// terminator (datagram transports).
    #[serde(default)]
    pub frame_to_eof: bool,

    /// Largest credible odometer jump between consecutive packets.
    #[serde(default = "default_odometer_jump")]
    pub max_odometer_jump_km: f64,
}

fn default_minimum_speed() -> f64 {
    4.0
}
fn default_input_mask() -> u32 {
    0xFF
}
fn default_minimum_moved() -> f64 {
    150.0
}
fn default_odometer_jump() -> f64 {
    500.0
}
fn default_true() -> bool {
    true
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            minimum_speed_kmh: default_minimum_speed(),
            estimate_odometer: default_true(),
            simulate_geozones: default_true(),
            input_mask_of_interest: default_input_mask(),
            minimum_moved_meters: default_minimum_moved(),
            location_to_in_motion: false,
            use_last_valid_fix: default_true(),
            frame_to_eof: false,
            max_odometer_jump_km: default_odometer_jump(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}
