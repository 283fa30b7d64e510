//! Request command: sends one request to a running engine.

use std::io::{ErrorKind, Read};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use serde_json::Value as Json;
use tracing::debug;

use stuu_protocol::{Event, FrameReader, FrameWriter, ProtocolError, Request, Response, Value};

use crate::error::{EngineError, EngineResult};

/// Sends `cmd` to the engine at `socket_path`, prints the response as JSON
/// and fails when the engine answered `ok: false`.
pub fn run(
    socket_path: &Path,
    cmd: &str,
    payload: Option<&str>,
    id: i64,
    timeout: Duration,
) -> EngineResult<()> {
    let request = build_request(id, cmd, payload)?;
    let response = send(socket_path, &request, timeout)?;

    let json = serde_json::to_string_pretty(&Json::from(response.to_value()))
        .map_err(|e| EngineError::InvalidPayload(e.to_string()))?;
    println!("{}", json);

    match response.outcome {
        Ok(_) => Ok(()),
        Err(message) => Err(EngineError::RequestFailed(message)),
    }
}

/// Builds a request, parsing `payload` as a JSON object.
pub fn build_request(id: i64, cmd: &str, payload: Option<&str>) -> EngineResult<Request> {
    let request = Request::new(id, cmd);
    let Some(raw) = payload else {
        return Ok(request);
    };

    let json: Json =
        serde_json::from_str(raw).map_err(|e| EngineError::InvalidPayload(e.to_string()))?;
    match Value::from(json) {
        Value::Map(map) => Ok(request.with_payload(map)),
        _ => Err(EngineError::InvalidPayload(
            "payload must be a JSON object".into(),
        )),
    }
}

/// Connects, writes `request` and waits for its response.
pub fn send(socket_path: &Path, request: &Request, timeout: Duration) -> EngineResult<Response> {
    let stream = UnixStream::connect(socket_path).map_err(|source| EngineError::Connection {
        path: socket_path.to_path_buf(),
        source,
    })?;
    stream.set_read_timeout(Some(timeout))?;

    let mut writer = FrameWriter::new(stream.try_clone()?);
    writer.write_value(&request.to_value())?;
    debug!(id = request.id, cmd = %request.cmd, "Request sent");

    let mut reader = FrameReader::new(stream);
    await_response(&mut reader, request.id).map_err(|e| match e {
        EngineError::Protocol(ProtocolError::Io(io))
            if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
        {
            EngineError::Timeout(timeout.as_secs())
        }
        other => other,
    })
}

/// Reads frames until the response for `id` arrives.
///
/// Events are skipped. A response with id 0 is a frame-level error from the
/// engine and is returned as well.
pub fn await_response<R: Read>(reader: &mut FrameReader<R>, id: i64) -> EngineResult<Response> {
    loop {
        let Some(value) = reader.read_value()? else {
            return Err(EngineError::ConnectionClosed);
        };

        if let Some(response) = Response::from_value(&value) {
            if response.id == id || response.id == 0 {
                return Ok(response);
            }
            debug!(id = response.id, "Skipping response for another request");
        } else if let Some(event) = Event::from_value(&value) {
            debug!(event = %event.event, "Skipping event");
        } else {
            debug!("Skipping unrecognised frame");
        }
    }
}
