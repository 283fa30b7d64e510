//! Server error types.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, etc.).
    #[error("Protocol error: {0}")]
    Protocol(#[from] stuu_protocol::ProtocolError),

    /// Backend could not be started or stopped.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Socket path already in use.
    #[error("Socket path already in use: {path}")]
    SocketInUse { path: String },

    /// Socket path parent directory does not exist.
    #[error("Socket path parent directory does not exist: {path}")]
    SocketPathInvalid { path: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a socket in use error.
    pub fn socket_in_use(path: impl Into<String>) -> Self {
        Self::SocketInUse { path: path.into() }
    }

    /// Creates a socket path invalid error.
    pub fn socket_path_invalid(path: impl Into<String>) -> Self {
        Self::SocketPathInvalid { path: path.into() }
    }
}

/// Errors reported by the audio engine backend or its worker.
///
/// The `Display` text is sent verbatim as the `error` of a failed response.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend rejected the operation.
    #[error("{0}")]
    Failed(String),

    /// The running backend has no implementation of this command.
    #[error("{command} requires an audio engine backend")]
    Unsupported { command: &'static str },

    /// The worker did not answer in time.
    #[error("backend call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The worker thread is gone.
    #[error("backend worker stopped")]
    WorkerStopped,

    /// The worker thread could not be spawned.
    #[error("failed to start backend worker: {0}")]
    Spawn(#[source] io::Error),
}

impl BackendError {
    /// Creates a failure with a backend-provided message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates an unsupported-command error.
    pub fn unsupported(command: &'static str) -> Self {
        Self::Unsupported { command }
    }
}

/// Reasons a command handler fails. Rendered into the response `error`.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Handler needs a payload map and none was sent.
    #[error("{0} requires payload")]
    MissingPayload(&'static str),

    /// A required field is missing or out of range.
    #[error("{command} requires {what}")]
    MissingField {
        command: &'static str,
        what: &'static str,
    },

    /// The backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}
