//! Binary error types.

use std::path::PathBuf;

use stuu_core::TracingError;
use stuu_protocol::ProtocolError;
use stuu_server::{BackendError, ServerError};
use thiserror::Error;

/// Result type for binary operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that end a `stuu-native` invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging could not be set up.
    #[error(transparent)]
    Tracing(#[from] TracingError),

    /// Server error.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Backend worker error.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Framing or codec error while talking to an engine.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connecting to the engine socket failed.
    #[error("cannot connect to {}: {source}", path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The `--payload` argument is not a JSON object.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// No response arrived in time.
    #[error("timeout: no response after {0}s")]
    Timeout(u64),

    /// The engine closed the connection before answering.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    /// The engine answered with `ok: false`.
    #[error("request failed: {0}")]
    RequestFailed(String),
}

impl EngineError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
