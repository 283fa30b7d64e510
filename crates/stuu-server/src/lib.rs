//! Engine daemon: socket event loop, command dispatch, backend worker.
//!
//! This crate provides the stuu native engine server that handles:
//! - Unix socket IPC with a single controller at a time
//! - Periodic `transport.tick` events from the transport clock
//! - Command dispatch through a name lookup table
//! - Marshalled calls into an audio engine backend on its own thread
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use stuu_server::{
//!     BackendConfig, BackendWorker, Dispatcher, EngineState, ServerConfig, SignalHandler,
//!     SocketServer, StubBackend,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let worker = BackendWorker::spawn(
//!         Box::new(StubBackend::new(BackendConfig::default())),
//!         config.backend_timeout,
//!     )?;
//!     let mut dispatcher = Dispatcher::new(EngineState::new(worker.handle()));
//!
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener();
//!
//!     let server = SocketServer::bind(config).await?;
//!     server.run(&mut dispatcher, &signals.shutdown_handle()).await?;
//!     worker.shutdown(Duration::from_secs(2)).await?;
//!     Ok(())
//! }
//! ```

mod backend;
mod config;
mod dispatch;
mod error;
mod signals;
mod socket;
mod worker;

pub use backend::{
    AnalyzerSnapshot, AudioDeviceInfo, AudioStatus, Backend, BackendInfo, ClipImportRequest,
    ClipImportResult, EditClipInfo, FadeCurve, LoadPluginResult, PluginInfo, PluginParameterInfo,
    StubBackend,
};
pub use config::{
    BackendConfig, DEFAULT_SOCKET_PATH, MAX_BUFFER_SIZE, ServerConfig, default_socket_path,
    is_valid_buffer_size, is_valid_sample_rate,
};
pub use dispatch::{Command, Dispatcher, EngineState};
pub use error::{BackendError, BackendResult, CommandError, ServerError, ServerResult};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::SocketServer;
pub use worker::{BackendHandle, BackendWorker};
