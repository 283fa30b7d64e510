//! Unix socket listener and per-connection event loop.
//!
//! One client is served at a time. While a client is connected the loop
//! multiplexes three sources:
//!
//! ```text
//!   socket readable ──► FrameBuffer ──► decode ──► Dispatcher ──► response
//!   tick interval   ──► Dispatcher::tick_event ──────────────────► event
//!   shutdown        ──► close
//! ```
//!
//! Responses and events share the socket; every frame is written whole
//! before the next one starts.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use stuu_protocol::{FrameBuffer, ProtocolError, Response, Value, decode_body, encode_frame};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::signals::ShutdownHandle;

const READ_CHUNK: usize = 4096;

/// Unix socket server for the engine protocol.
pub struct SocketServer {
    /// Server configuration.
    config: ServerConfig,
    /// Unix socket listener.
    listener: UnixListener,
}

impl SocketServer {
    /// Binds the socket described by `config`.
    ///
    /// If `cleanup_stale_socket` is true, an existing socket file is removed
    /// unless another server is still answering on it.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let socket_path = &config.socket_path;

        if let Some(parent) = socket_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(ServerError::socket_path_invalid(
                parent.to_string_lossy().to_string(),
            ));
        }

        if config.cleanup_stale_socket && socket_path.exists() {
            match UnixStream::connect(socket_path).await {
                Ok(_) => {
                    return Err(ServerError::socket_in_use(
                        socket_path.to_string_lossy().to_string(),
                    ));
                }
                Err(_) => {
                    info!(path = %socket_path.display(), "Removing stale socket");
                    std::fs::remove_file(socket_path)?;
                }
            }
        } else if socket_path.exists() {
            return Err(ServerError::socket_in_use(
                socket_path.to_string_lossy().to_string(),
            ));
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(path = %socket_path.display(), "Socket server listening");

        Ok(Self { config, listener })
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Accepts and serves clients one at a time until shutdown.
    ///
    /// The dispatcher (and with it the transport clock) outlives each
    /// connection.
    pub async fn run(
        &self,
        dispatcher: &mut Dispatcher,
        shutdown: &ShutdownHandle,
    ) -> ServerResult<()> {
        let stop = shutdown.wait().wait();
        tokio::pin!(stop);

        loop {
            let stream = tokio::select! {
                _ = &mut stop => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(self.config.poll_timeout).await;
                        continue;
                    }
                },
            };

            info!("Client connected");
            match self.serve(stream, dispatcher, shutdown).await {
                Ok(()) => info!("Client disconnected"),
                Err(e) => warn!(error = %e, "Client connection closed with error"),
            }

            if shutdown.is_shutdown() {
                info!("Shutdown signal received");
                return Ok(());
            }
        }
    }

    /// Runs the event loop for one client until it disconnects, a fatal
    /// framing error occurs, or shutdown is requested.
    ///
    /// Each frame write is bounded by `write_timeout` and abandoned on
    /// shutdown, so a client that stops reading cannot stall the server.
    pub async fn serve(
        &self,
        mut stream: UnixStream,
        dispatcher: &mut Dispatcher,
        shutdown: &ShutdownHandle,
    ) -> ServerResult<()> {
        let stop = shutdown.wait().wait();
        tokio::pin!(stop);

        let write_timeout = self.config.write_timeout;
        let mut frames = FrameBuffer::new();
        let mut chunk = [0u8; READ_CHUNK];
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop => return Ok(()),
                read = stream.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(());
                    }
                    frames.feed(&chunk[..n]);
                    let answering =
                        answer_frames(&mut frames, &mut stream, dispatcher, write_timeout);
                    let keep_open = tokio::select! {
                        _ = &mut stop => return Ok(()),
                        answered = answering => answered?,
                    };
                    if !keep_open {
                        return Ok(());
                    }
                }
                _ = ticker.tick() => {
                    let event = dispatcher.tick_event().await.to_value();
                    let writing = write_value(&mut stream, &event, write_timeout);
                    tokio::select! {
                        _ = &mut stop => return Ok(()),
                        written = writing => written?,
                    }
                }
            }
        }
    }
}

/// Answers every complete frame in `frames`.
///
/// Returns `false` when the connection must be closed.
async fn answer_frames(
    frames: &mut FrameBuffer,
    stream: &mut UnixStream,
    dispatcher: &mut Dispatcher,
    write_timeout: Duration,
) -> ServerResult<bool> {
    loop {
        let body = match frames.next_frame() {
            Ok(Some(body)) => body,
            Ok(None) => return Ok(true),
            Err(e) => {
                // Oversized header: the body is never read, the stream is unusable.
                warn!(error = %e, "Closing connection");
                let response = Response::error(0, e.to_string());
                write_value(stream, &response.to_value(), write_timeout).await?;
                return Ok(false);
            }
        };

        let response = match decode_body(&body) {
            Ok(Value::Map(map)) => dispatcher.dispatch(map).await,
            Ok(_) => frame_error(ProtocolError::RootNotMap),
            Err(e) => frame_error(e),
        };
        write_value(stream, &response.to_value(), write_timeout).await?;
    }
}

fn frame_error(error: ProtocolError) -> Response {
    warn!(error = %error, "Rejected frame");
    Response::error(0, error.to_string())
}

/// Writes one whole frame, failing with `TimedOut` when the client does not
/// drain the socket within `deadline`.
async fn write_value(
    stream: &mut UnixStream,
    value: &Value,
    deadline: Duration,
) -> ServerResult<()> {
    let frame = encode_frame(value)?;
    match tokio::time::timeout(deadline, stream.write_all(&frame)).await {
        Ok(written) => Ok(written?),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("client did not read a frame within {}ms", deadline.as_millis()),
        )
        .into()),
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(
                    path = %self.config.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            } else {
                debug!(
                    path = %self.config.socket_path.display(),
                    "Removed socket file"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StubBackend;
    use crate::dispatch::EngineState;
    use crate::signals::SignalHandler;
    use crate::worker::BackendWorker;
    use std::time::Duration;
    use stuu_protocol::{Event, Request, TICK_EVENT};
    use tempfile::tempdir;

    async fn read_value(stream: &mut UnixStream) -> Value {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await.unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
        stream.read_exact(&mut body).await.unwrap();
        decode_body(&body).unwrap()
    }

    fn stub_worker() -> BackendWorker {
        BackendWorker::spawn(Box::new(StubBackend::default()), Duration::from_secs(1)).unwrap()
    }

    async fn next_response(stream: &mut UnixStream) -> Response {
        loop {
            let value = read_value(stream).await;
            if let Some(response) = Response::from_value(&value) {
                return response;
            }
        }
    }

    #[tokio::test]
    async fn socket_server_creates_socket_file() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let server = SocketServer::bind(ServerConfig::new(&socket_path)).await.unwrap();

        assert!(socket_path.exists());
        assert_eq!(server.socket_path(), socket_path);
        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn socket_server_rejects_duplicate() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let _server = SocketServer::bind(ServerConfig::new(&socket_path)).await.unwrap();

        let result = SocketServer::bind(ServerConfig::new(&socket_path)).await;
        assert!(matches!(result, Err(ServerError::SocketInUse { .. })));

        let config = ServerConfig::new(&socket_path).with_cleanup_stale_socket(false);
        let result = SocketServer::bind(config).await;
        assert!(matches!(result, Err(ServerError::SocketInUse { .. })));
    }

    #[tokio::test]
    async fn socket_server_cleans_stale_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        std::fs::write(&socket_path, b"stale").unwrap();

        let server = SocketServer::bind(ServerConfig::new(&socket_path)).await.unwrap();
        assert!(socket_path.exists());
        drop(server);
    }

    #[tokio::test]
    async fn socket_server_requires_parent_dir() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("missing").join("test.sock");

        let result = SocketServer::bind(ServerConfig::new(&socket_path)).await;
        assert!(matches!(result, Err(ServerError::SocketPathInvalid { .. })));
    }

    #[tokio::test]
    async fn serves_requests_and_ticks() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let config = ServerConfig::new(&socket_path).with_tick_interval(Duration::from_millis(10));
        let server = SocketServer::bind(config).await.unwrap();

        let worker = stub_worker();
        let mut dispatcher = Dispatcher::new(EngineState::new(worker.handle()));
        let signals = SignalHandler::new();
        let shutdown = signals.shutdown_handle();

        let client = tokio::spawn(async move {
            let mut stream = UnixStream::connect(&socket_path).await.unwrap();

            // First frame after connect is a tick.
            let first = read_value(&mut stream).await;
            let event = Event::from_value(&first).unwrap();
            assert_eq!(event.event, TICK_EVENT);

            let request = encode_frame(&Request::new(7, "health.ping").to_value()).unwrap();
            stream.write_all(&request).await.unwrap();
            let response = next_response(&mut stream).await;
            assert_eq!(response.id, 7);
            assert!(response.is_ok());

            // Non-map root is answered and the connection stays open.
            stream.write_all(&encode_frame(&Value::Int(1)).unwrap()).await.unwrap();
            let response = next_response(&mut stream).await;
            assert_eq!(response, Response::error(0, "frame root must be map"));

            // Garbage body.
            stream.write_all(&[0, 0, 0, 1, 0xc1]).await.unwrap();
            let response = next_response(&mut stream).await;
            assert_eq!(response.id, 0);
            assert!(!response.is_ok());

            // Trailing bytes.
            stream.write_all(&[0, 0, 0, 2, 0xc0, 0xc0]).await.unwrap();
            let response = next_response(&mut stream).await;
            let Err(message) = response.outcome else { panic!("expected error") };
            assert!(message.starts_with("unexpected trailing bytes"));
        });

        let (stream, _) = server.listener.accept().await.unwrap();
        let served = server.serve(stream, &mut dispatcher, &shutdown);
        let (served, client) = tokio::join!(served, client);
        served.unwrap();
        client.unwrap();
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let config = ServerConfig::new(&socket_path).with_tick_interval(Duration::from_secs(60));
        let server = SocketServer::bind(config).await.unwrap();

        let worker = stub_worker();
        let mut dispatcher = Dispatcher::new(EngineState::new(worker.handle()));
        let signals = SignalHandler::new();
        let shutdown = signals.shutdown_handle();

        let client = tokio::spawn(async move {
            let mut stream = UnixStream::connect(&socket_path).await.unwrap();
            stream.write_all(&(1_048_577u32).to_be_bytes()).await.unwrap();

            let response = next_response(&mut stream).await;
            assert_eq!(response.id, 0);
            let Err(message) = response.outcome else { panic!("expected error") };
            assert!(message.starts_with("frame too large"));

            // Server closed its end.
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
            assert!(rest.is_empty());
        });

        let (stream, _) = server.listener.accept().await.unwrap();
        server.serve(stream, &mut dispatcher, &shutdown).await.unwrap();
        drop(server);
        client.await.unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = SocketServer::bind(ServerConfig::new(&socket_path)).await.unwrap();

        let worker = stub_worker();
        let mut dispatcher = Dispatcher::new(EngineState::new(worker.handle()));
        let signals = SignalHandler::new();
        let shutdown = signals.shutdown_handle();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            server.run(&mut dispatcher, &shutdown),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    /// Connects a client that never reads, so tick frames pile up until the
    /// socket buffer is full.
    async fn stalled_client(socket_path: &Path) -> UnixStream {
        UnixStream::connect(socket_path).await.unwrap()
    }

    #[tokio::test]
    async fn shutdown_interrupts_blocked_write() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let config = ServerConfig::new(&socket_path)
            .with_tick_interval(Duration::from_millis(1))
            .with_write_timeout(Duration::from_secs(60));
        let server = SocketServer::bind(config).await.unwrap();

        let worker = stub_worker();
        let mut dispatcher = Dispatcher::new(EngineState::new(worker.handle()));
        let signals = SignalHandler::new();
        let shutdown = signals.shutdown_handle();

        let _client = stalled_client(&socket_path).await;
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            // Long enough for the socket buffer to fill.
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.trigger();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            server.run(&mut dispatcher, &shutdown),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn client_that_stops_reading_is_dropped() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let config = ServerConfig::new(&socket_path)
            .with_tick_interval(Duration::from_millis(1))
            .with_write_timeout(Duration::from_millis(100));
        let server = SocketServer::bind(config).await.unwrap();

        let worker = stub_worker();
        let mut dispatcher = Dispatcher::new(EngineState::new(worker.handle()));
        let signals = SignalHandler::new();
        let shutdown = signals.shutdown_handle();

        let stop = shutdown.clone();
        let client = tokio::spawn(async move {
            let _stalled = stalled_client(&socket_path).await;

            // Queued behind the stalled client until the server gives up on it.
            let mut next = UnixStream::connect(&socket_path).await.unwrap();
            let request = encode_frame(&Request::new(3, "health.ping").to_value()).unwrap();
            next.write_all(&request).await.unwrap();
            let response = tokio::time::timeout(Duration::from_secs(10), next_response(&mut next))
                .await
                .unwrap();
            assert_eq!(response.id, 3);
            assert!(response.is_ok());
            stop.trigger();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(15),
            server.run(&mut dispatcher, &shutdown),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
        client.await.unwrap();
    }

    #[tokio::test]
    async fn write_times_out_when_client_stops_reading() {
        let (mut server_end, _client_end) = UnixStream::pair().unwrap();
        let tick = Event::new(TICK_EVENT, stuu_protocol::Map::new()).to_value();

        let mut outcome = Ok(());
        for _ in 0..100_000 {
            outcome = write_value(&mut server_end, &tick, Duration::from_millis(50)).await;
            if outcome.is_err() {
                break;
            }
        }
        match outcome {
            Err(ServerError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected a write timeout, got {other:?}"),
        }
    }
}
