//! Configuration for the FOCAL server
//!
//! Values are layered, later sources winning:
//! 1. Built-in defaults
//! 2. `~/.focal_mcp/config.toml` (optional)
//! 3. `FOCAL_*` environment variables
//! 4. Command-line flags, applied by the caller through [`ConfigOverrides`]

use crate::error::{FocalError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Directory under the home directory holding config and the default workspace
pub const CONFIG_DIR_NAME: &str = ".focal_mcp";

/// Default listen address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8765";

/// Default per-channel notification buffer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default bound on a single filesystem call from an HTTP handler
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 5000;

/// Default idle time after which an HTTP MCP session is evicted
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 1800;

/// Default quiet period before external workspace changes are announced
pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 100;

/// Resolved server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocalConfig {
    /// Directory served as the workspace
    pub workspace_root: PathBuf,
    /// HTTP listen address
    pub addr: String,
    /// Optional shared secret for HTTP routes
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Buffered notifications per subscriber before it is dropped
    pub channel_capacity: usize,
    /// Timeout for one filesystem call, in milliseconds
    pub io_timeout_ms: u64,
    /// HTTP sessions idle for longer than this are dropped, in seconds
    pub session_idle_secs: u64,
    /// Batching window for filesystem watch events, in milliseconds
    pub watch_debounce_ms: u64,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workspace_root: Option<PathBuf>,
    pub addr: Option<String>,
    pub auth_token: Option<String>,
}

/// `~/.focal_mcp`, falling back to the current directory without a home
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Default workspace root: `~/.focal_mcp/workspace`
pub fn default_workspace_root() -> PathBuf {
    config_dir().join("workspace")
}

impl FocalConfig {
    /// Load from the default config file and the environment
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        Self::load_from(&config_dir().join("config.toml"), overrides)
    }

    /// Load using an explicit config file path (which may be absent)
    pub fn load_from(config_file: &Path, overrides: ConfigOverrides) -> Result<Self> {
        debug!("Loading configuration from {}", config_file.display());

        let settings = Config::builder()
            .set_default(
                "workspace_root",
                default_workspace_root().to_string_lossy().to_string(),
            )?
            .set_default("addr", DEFAULT_ADDR)?
            .set_default("channel_capacity", DEFAULT_CHANNEL_CAPACITY as i64)?
            .set_default("io_timeout_ms", DEFAULT_IO_TIMEOUT_MS as i64)?
            .set_default("session_idle_secs", DEFAULT_SESSION_IDLE_SECS as i64)?
            .set_default("watch_debounce_ms", DEFAULT_WATCH_DEBOUNCE_MS as i64)?
            .add_source(File::from(config_file).required(false))
            .add_source(Environment::with_prefix("FOCAL"))
            .set_override_option(
                "workspace_root",
                overrides
                    .workspace_root
                    .map(|p| p.to_string_lossy().to_string()),
            )?
            .set_override_option("addr", overrides.addr)?
            .set_override_option("auth_token", overrides.auth_token)?
            .build()?;

        let config: FocalConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(FocalError::Config(config::ConfigError::Message(
                "channel_capacity must be at least 1".to_string(),
            )));
        }
        if self.io_timeout_ms == 0 {
            return Err(FocalError::Config(config::ConfigError::Message(
                "io_timeout_ms must be at least 1".to_string(),
            )));
        }
        if self.watch_debounce_ms == 0 {
            return Err(FocalError::Config(config::ConfigError::Message(
                "watch_debounce_ms must be at least 1".to_string(),
            )));
        }
        if self.session_idle_secs == 0 {
            return Err(FocalError::Config(config::ConfigError::Message(
                "session_idle_secs must be at least 1".to_string(),
            )));
        }
        self.socket_addr()?;
        Ok(())
    }

    /// Listen address as a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.addr.parse().map_err(|e| {
            FocalError::Config(config::ConfigError::Message(format!(
                "Invalid address '{}': {}",
                self.addr, e
            )))
        })
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }
}
