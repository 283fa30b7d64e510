//! File configuration for the engine binary.
//!
//! Settings live in `~/.config/thestuu/native.toml` by default:
//!
//! ```toml
//! [server]
//! socket_path = "/tmp/thestuu-native.sock"
//! tick_interval_ms = 40
//! backend_timeout_ms = 5000
//!
//! [audio]
//! sample_rate = 48000.0
//! buffer_size = 256
//! ```
//!
//! Command-line flags and their environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stuu_server::{
    BackendConfig, ServerConfig, default_socket_path, is_valid_buffer_size, is_valid_sample_rate,
};
use tracing::warn;

use crate::cli::Cli;
use crate::error::{EngineError, EngineResult};

/// Contents of `native.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    /// Socket and loop settings.
    pub server: ServerSettings,

    /// Settings passed through to the audio backend.
    pub audio: AudioSettings,
}

/// `[server]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Path to the engine socket.
    pub socket_path: Option<PathBuf>,

    /// Interval between tick events, in milliseconds.
    pub tick_interval_ms: u64,

    /// Upper bound for one backend call, in milliseconds.
    pub backend_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            socket_path: None,
            tick_interval_ms: duration_ms(defaults.tick_interval),
            backend_timeout_ms: duration_ms(defaults.backend_timeout),
        }
    }
}

/// `[audio]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Sample rate in Hz.
    pub sample_rate: f64,

    /// Buffer size in frames.
    pub buffer_size: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        let defaults = BackendConfig::default();
        Self {
            sample_rate: defaults.sample_rate,
            buffer_size: defaults.buffer_size,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl NativeConfig {
    /// Loads configuration from the default path, or defaults when the file is missing.
    pub fn load() -> EngineResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            EngineError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("thestuu")
            .join("native.toml")
    }

    /// Socket path: `--socket` / `STUU_NATIVE_SOCKET`, then the file, then the default.
    pub fn socket_path(&self, cli: &Cli) -> PathBuf {
        cli.socket
            .clone()
            .or_else(|| self.server.socket_path.clone())
            .unwrap_or_else(default_socket_path)
    }

    /// Server configuration with command-line overrides applied.
    pub fn server_config(&self, cli: &Cli) -> ServerConfig {
        ServerConfig::new(self.socket_path(cli))
            .with_tick_interval(Duration::from_millis(self.server.tick_interval_ms))
            .with_backend_timeout(Duration::from_millis(self.server.backend_timeout_ms))
    }

    /// Backend configuration with command-line overrides applied.
    ///
    /// Values that are out of range or do not parse are logged and skipped.
    pub fn backend_config(&self, cli: &Cli) -> BackendConfig {
        let mut sample_rate = self.audio.sample_rate;
        if !is_valid_sample_rate(sample_rate) {
            warn!(sample_rate, "Ignoring invalid sample rate from config file");
            sample_rate = BackendConfig::default().sample_rate;
        }
        if let Some(raw) = cli.sample_rate.as_deref() {
            match parse_sample_rate(raw) {
                Some(rate) => sample_rate = rate,
                None => warn!(value = raw, sample_rate, "Ignoring invalid sample rate"),
            }
        }

        let mut buffer_size = self.audio.buffer_size;
        if !is_valid_buffer_size(buffer_size) {
            warn!(buffer_size, "Ignoring invalid buffer size from config file");
            buffer_size = BackendConfig::default().buffer_size;
        }
        if let Some(raw) = cli.buffer_size.as_deref() {
            match parse_buffer_size(raw) {
                Some(size) => buffer_size = size,
                None => warn!(value = raw, buffer_size, "Ignoring invalid buffer size"),
            }
        }

        BackendConfig::default()
            .with_sample_rate(sample_rate)
            .with_buffer_size(buffer_size)
    }
}

/// Parses a sample rate, rejecting non-finite and non-positive values.
pub fn parse_sample_rate(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|rate| is_valid_sample_rate(*rate))
}

/// Parses a buffer size, rejecting values outside the accepted range.
pub fn parse_buffer_size(raw: &str) -> Option<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|size| is_valid_buffer_size(*size))
}
