//! Drives a real server over a Unix socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use stuu_protocol::{
    Event, FrameBuffer, Map, Request, Response, TICK_EVENT, Value, decode_body, encode_frame,
};
use stuu_server::{
    BackendWorker, Dispatcher, EngineState, ServerConfig, ShutdownHandle, SignalHandler,
    SocketServer, StubBackend,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

struct Harness {
    socket_path: PathBuf,
    shutdown: ShutdownHandle,
    server: JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl Harness {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("engine.sock");
        let config = ServerConfig::new(&socket_path).with_tick_interval(Duration::from_millis(15));
        let server = SocketServer::bind(config).await.unwrap();

        let signals = SignalHandler::new();
        let shutdown = signals.shutdown_handle();
        let server_shutdown = shutdown.clone();

        let server = tokio::spawn(async move {
            let worker =
                BackendWorker::spawn(Box::new(StubBackend::default()), Duration::from_secs(1))
                    .unwrap();
            let mut dispatcher = Dispatcher::new(EngineState::new(worker.handle()));
            server.run(&mut dispatcher, &server_shutdown).await.unwrap();
            worker.shutdown(Duration::from_secs(1)).await.unwrap();
        });

        Self {
            socket_path,
            shutdown,
            server,
            _dir: dir,
        }
    }

    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), self.server)
            .await
            .unwrap()
            .unwrap();
        assert!(!self.socket_path.exists());
    }
}

/// Client side of a connection: reads frames, keeping events and responses apart.
struct Client {
    stream: UnixStream,
    frames: FrameBuffer,
    events: Vec<Event>,
}

impl Client {
    async fn connect(path: &Path) -> Self {
        Self {
            stream: UnixStream::connect(path).await.unwrap(),
            frames: FrameBuffer::new(),
            events: Vec::new(),
        }
    }

    async fn next_value(&mut self) -> Value {
        loop {
            if let Some(body) = self.frames.next_frame().unwrap() {
                return decode_body(&body).unwrap();
            }
            let mut chunk = [0u8; 1024];
            let n = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut chunk))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "server closed the connection");
            self.frames.feed(&chunk[..n]);
        }
    }

    async fn next_response(&mut self) -> Response {
        loop {
            let value = self.next_value().await;
            if let Some(response) = Response::from_value(&value) {
                return response;
            }
            self.events.push(Event::from_value(&value).unwrap());
        }
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }
}

fn frame(request: Request) -> Vec<u8> {
    encode_frame(&request.to_value()).unwrap()
}

fn with_payload(id: i64, cmd: &str, entries: &[(&str, Value)]) -> Request {
    let payload: Map = entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();
    Request::new(id, cmd).with_payload(payload)
}

fn position_beats(response: &Response) -> Option<f64> {
    let payload = response.outcome.as_ref().ok()?;
    payload.get("transport")?.get("positionBeats")?.as_f64()
}

#[tokio::test]
async fn pipelined_requests_are_answered_in_order() {
    let harness = Harness::start().await;
    let mut client = Client::connect(&harness.socket_path).await;

    let mut bytes = frame(with_payload(1, "transport.seek", &[("position_beats", Value::Int(4))]));
    bytes.extend(frame(Request::new(2, "transport.get_state")));
    client.send(&bytes).await;

    let seek = client.next_response().await;
    let state = client.next_response().await;
    assert_eq!(seek.id, 1);
    assert_eq!(state.id, 2);
    assert_eq!(position_beats(&seek), Some(4.0));
    assert_eq!(position_beats(&state), Some(4.0));

    harness.stop().await;
}

#[tokio::test]
async fn requests_split_across_writes() {
    let harness = Harness::start().await;
    let mut client = Client::connect(&harness.socket_path).await;

    let mut bytes = frame(Request::new(10, "health.ping"));
    bytes.extend(frame(Request::new(11, "backend.info")));
    for piece in [&bytes[..3], &bytes[3..9], &bytes[9..]] {
        client.send(piece).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let ping = client.next_response().await;
    let info = client.next_response().await;
    assert_eq!(ping.id, 10);
    assert_eq!(info.id, 11);
    let tracktion = info.outcome.unwrap().get("tracktion").cloned();
    assert_eq!(tracktion, Some(Value::Bool(false)));

    harness.stop().await;
}

#[tokio::test]
async fn ticks_keep_flowing_while_idle() {
    let harness = Harness::start().await;
    let mut client = Client::connect(&harness.socket_path).await;

    for _ in 0..3 {
        let event = Event::from_value(&client.next_value().await).unwrap();
        assert_eq!(event.event, TICK_EVENT);
        assert_eq!(event.payload.get("playing"), Some(&Value::Bool(false)));
    }

    harness.stop().await;
}

#[tokio::test]
async fn transport_survives_reconnect() {
    let harness = Harness::start().await;

    let mut first = Client::connect(&harness.socket_path).await;
    first
        .send(&frame(with_payload(1, "transport.seek", &[("position_bars", Value::Int(2))])))
        .await;
    assert_eq!(position_beats(&first.next_response().await), Some(8.0));
    drop(first);

    let mut second = Client::connect(&harness.socket_path).await;
    second.send(&frame(Request::new(2, "transport.get_state"))).await;
    assert_eq!(position_beats(&second.next_response().await), Some(8.0));

    harness.stop().await;
}

#[tokio::test]
async fn oversized_frame_gets_error_then_close() {
    let harness = Harness::start().await;
    let mut client = Client::connect(&harness.socket_path).await;

    client.send(&(1_048_577u32).to_be_bytes()).await;
    let response = client.next_response().await;
    assert_eq!(response.id, 0);
    assert!(response.outcome.unwrap_err().starts_with("frame too large"));

    let mut rest = Vec::new();
    client.stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    // The server accepts the next client.
    let mut next = Client::connect(&harness.socket_path).await;
    next.send(&frame(Request::new(5, "health.ping"))).await;
    assert!(next.next_response().await.is_ok());

    harness.stop().await;
}
