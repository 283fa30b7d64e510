//! Serve command: runs the engine socket in the foreground.
//!
//! Startup order:
//! - backend worker thread (owns the audio backend)
//! - signal handler (SIGTERM/SIGINT)
//! - socket server
//!
//! The worker outlives the server so in-flight calls finish before it stops.

use std::time::Duration;

use tracing::{info, warn};

use stuu_server::{
    BackendWorker, Dispatcher, EngineState, SignalHandler, SocketServer, StubBackend,
};

use crate::cli::Cli;
use crate::config::NativeConfig;
use crate::error::EngineResult;

/// How long to wait for the backend thread to exit.
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Serves the engine socket until SIGTERM/SIGINT.
pub async fn run(cli: &Cli, config: &NativeConfig) -> EngineResult<()> {
    let server_config = config.server_config(cli);
    let backend_config = config.backend_config(cli);
    server_config.validate()?;

    info!(
        sample_rate = backend_config.sample_rate,
        buffer_size = backend_config.buffer_size,
        "Starting backend"
    );
    let worker = BackendWorker::spawn(
        Box::new(StubBackend::new(backend_config)),
        server_config.backend_timeout,
    )?;
    let backend = worker.handle();
    info!(
        authoritative = backend.is_authoritative(),
        description = %backend.info().description,
        "Backend ready"
    );

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    let socket_path = server_config.socket_path.clone();
    let result = match SocketServer::bind(server_config).await {
        Ok(server) => {
            info!(path = %socket_path.display(), "Engine listening");
            let mut dispatcher = Dispatcher::new(EngineState::new(backend));
            server
                .run(&mut dispatcher, &signal_handler.shutdown_handle())
                .await
        }
        Err(e) => Err(e),
    };

    info!("Shutting down...");
    if let Err(e) = worker.shutdown(WORKER_SHUTDOWN_GRACE).await {
        warn!(error = %e, "Backend worker did not stop cleanly");
    }

    result?;
    info!("Engine stopped");
    Ok(())
}
