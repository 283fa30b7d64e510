//! Server and backend configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

/// Default Unix socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/thestuu-native.sock";

/// Largest accepted audio buffer size, in frames.
pub const MAX_BUFFER_SIZE: u32 = 8192;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,

    /// Interval between `transport.tick` events.
    pub tick_interval: Duration,

    /// Pause after a failed accept before retrying.
    pub poll_timeout: Duration,

    /// Upper bound for a single backend call.
    pub backend_timeout: Duration,

    /// Upper bound for writing one frame to the client. A client that stops
    /// reading for longer is disconnected.
    pub write_timeout: Duration,

    /// Whether to remove stale socket on startup.
    pub cleanup_stale_socket: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            tick_interval: Duration::from_millis(40),
            poll_timeout: Duration::from_millis(20),
            backend_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            cleanup_stale_socket: true,
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration with the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    /// Builder: set tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Builder: set the accept retry pause.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Builder: set backend call timeout.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Builder: set the per-frame write deadline.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Builder: set cleanup stale socket.
    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }

    /// Rejects settings the event loop cannot run with.
    pub fn validate(&self) -> ServerResult<()> {
        if self.tick_interval.is_zero() {
            return Err(ServerError::config("tick interval must be greater than zero"));
        }
        if self.backend_timeout.is_zero() {
            return Err(ServerError::config(
                "backend timeout must be greater than zero",
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(ServerError::config("write timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Returns the default socket path.
pub fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

/// Audio settings handed to the backend at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendConfig {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Buffer size in frames.
    pub buffer_size: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            buffer_size: 256,
        }
    }
}

impl BackendConfig {
    /// Builder: set the sample rate. Non-finite or non-positive rates are ignored.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        if is_valid_sample_rate(sample_rate) {
            self.sample_rate = sample_rate;
        }
        self
    }

    /// Builder: set the buffer size. Values outside `1..=MAX_BUFFER_SIZE` are ignored.
    pub fn with_buffer_size(mut self, buffer_size: u32) -> Self {
        if is_valid_buffer_size(buffer_size) {
            self.buffer_size = buffer_size;
        }
        self
    }
}

/// Returns true for sample rates a backend can open a device with.
pub fn is_valid_sample_rate(sample_rate: f64) -> bool {
    sample_rate.is_finite() && sample_rate > 0.0
}

/// Returns true for buffer sizes in `1..=MAX_BUFFER_SIZE`.
pub fn is_valid_buffer_size(buffer_size: u32) -> bool {
    (1..=MAX_BUFFER_SIZE).contains(&buffer_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/thestuu-native.sock"));
        assert_eq!(config.tick_interval, Duration::from_millis(40));
        assert_eq!(config.poll_timeout, Duration::from_millis(20));
        assert_eq!(config.backend_timeout, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(1));
        assert!(config.cleanup_stale_socket);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn custom_config() {
        let config = ServerConfig::new("/custom/path.sock")
            .with_tick_interval(Duration::from_millis(10))
            .with_poll_timeout(Duration::from_millis(5))
            .with_backend_timeout(Duration::from_secs(1))
            .with_write_timeout(Duration::from_millis(250))
            .with_cleanup_stale_socket(false);

        assert_eq!(config.socket_path, PathBuf::from("/custom/path.sock"));
        assert_eq!(config.tick_interval, Duration::from_millis(10));
        assert_eq!(config.poll_timeout, Duration::from_millis(5));
        assert_eq!(config.backend_timeout, Duration::from_secs(1));
        assert_eq!(config.write_timeout, Duration::from_millis(250));
        assert!(!config.cleanup_stale_socket);
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let config = ServerConfig::default().with_tick_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ServerError::Config { .. })));
    }

    #[test]
    fn zero_write_timeout_is_rejected() {
        let config = ServerConfig::default().with_write_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ServerError::Config { .. })));
    }

    #[test]
    fn backend_config_ignores_invalid_values() {
        let config = BackendConfig::default()
            .with_sample_rate(f64::NAN)
            .with_buffer_size(0);
        assert_eq!(config, BackendConfig::default());

        let config = BackendConfig::default()
            .with_sample_rate(44_100.0)
            .with_buffer_size(8192);
        assert_eq!(config.sample_rate, 44_100.0);
        assert_eq!(config.buffer_size, 8192);

        assert!(!is_valid_buffer_size(8193));
        assert!(!is_valid_sample_rate(-1.0));
    }
}
