//! Request, response and event views over map values.
//!
//! ```text
//! request   {type: "request",  id, cmd, payload?}
//! response  {type: "response", id, ok: true,  payload}
//!           {type: "response", id, ok: false, error}
//! event     {type: "event",    event, payload}
//! ```

use stuu_core::TransportSnapshot;

use crate::fields::Fields;
use crate::value::{Map, Value};

/// Name of the periodic transport event.
pub const TICK_EVENT: &str = "transport.tick";

const TYPE_REQUEST: &str = "request";
const TYPE_RESPONSE: &str = "response";
const TYPE_EVENT: &str = "event";

/// A command sent by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id echoed in the response.
    pub id: i64,
    /// Command name, e.g. `transport.play`.
    pub cmd: String,
    /// Command arguments, `None` when the field is absent or not a map.
    pub payload: Option<Map>,
}

/// A map that is not a usable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRejection {
    /// Id to answer with (0 when the map carried none).
    pub id: i64,
    /// Human readable reason.
    pub reason: String,
}

impl Request {
    /// Creates a request with an empty payload.
    pub fn new(id: i64, cmd: impl Into<String>) -> Self {
        Self {
            id,
            cmd: cmd.into(),
            payload: None,
        }
    }

    /// Builder: set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Map) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Payload map, empty when absent.
    pub fn payload_or_empty(&self) -> Map {
        self.payload.clone().unwrap_or_default()
    }

    /// Interprets a decoded map as a request.
    ///
    /// # Errors
    ///
    /// Rejects maps whose `type` is not `"request"`. The rejection still
    /// carries the map's `id` so the error response can be correlated.
    pub fn from_map(mut map: Map) -> Result<Self, RequestRejection> {
        let id = map.int_or("id", 0);
        if map.str_or("type", "") != TYPE_REQUEST {
            return Err(RequestRejection {
                id,
                reason: "message type must be \"request\"".to_string(),
            });
        }

        let cmd = map.str_or("cmd", "").to_string();
        let payload = match map.remove("payload") {
            Some(Value::Map(payload)) => Some(payload),
            _ => None,
        };
        Ok(Self { id, cmd, payload })
    }

    /// Renders the request as a wire map.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), TYPE_REQUEST.into());
        map.insert("id".into(), Value::Int(self.id));
        map.insert("cmd".into(), self.cmd.as_str().into());
        if let Some(payload) = &self.payload {
            map.insert("payload".into(), Value::Map(payload.clone()));
        }
        Value::Map(map)
    }
}

/// Reply to one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered.
    pub id: i64,
    /// Success payload or error message.
    pub outcome: Result<Map, String>,
}

impl Response {
    /// Successful response.
    pub fn ok(id: i64, payload: Map) -> Self {
        Self {
            id,
            outcome: Ok(payload),
        }
    }

    /// Failed response.
    pub fn error(id: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Err(message.into()),
        }
    }

    /// Returns true for successful responses.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Renders the response as a wire map.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), TYPE_RESPONSE.into());
        map.insert("id".into(), Value::Int(self.id));
        match &self.outcome {
            Ok(payload) => {
                map.insert("ok".into(), Value::Bool(true));
                map.insert("payload".into(), Value::Map(payload.clone()));
            }
            Err(message) => {
                map.insert("ok".into(), Value::Bool(false));
                map.insert("error".into(), message.as_str().into());
            }
        }
        Value::Map(map)
    }

    /// Parses a wire map, returning `None` unless it is a response.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_map()?;
        if map.str_or("type", "") != TYPE_RESPONSE {
            return None;
        }
        let id = map.int_or("id", 0);
        let outcome = if map.bool_or("ok", false) {
            Ok(map.map_field("payload").cloned().unwrap_or_default())
        } else {
            Err(map.str_or("error", "unknown error").to_string())
        };
        Some(Self { id, outcome })
    }
}

/// Unsolicited notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name.
    pub event: String,
    /// Event data.
    pub payload: Map,
}

impl Event {
    /// Creates an event.
    pub fn new(event: impl Into<String>, payload: Map) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// The periodic transport tick.
    pub fn tick(snapshot: &TransportSnapshot) -> Self {
        Self::new(TICK_EVENT, snapshot_map(snapshot))
    }

    /// Renders the event as a wire map.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), TYPE_EVENT.into());
        map.insert("event".into(), self.event.as_str().into());
        map.insert("payload".into(), Value::Map(self.payload.clone()));
        Value::Map(map)
    }

    /// Parses a wire map, returning `None` unless it is an event.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_map()?;
        if map.str_or("type", "") != TYPE_EVENT {
            return None;
        }
        Some(Self {
            event: map.str_or("event", "").to_string(),
            payload: map.map_field("payload").cloned().unwrap_or_default(),
        })
    }
}

/// Renders a transport snapshot with the controller's field names.
pub fn snapshot_map(snapshot: &TransportSnapshot) -> Map {
    let fields: [(&str, Value); 10] = [
        ("playing", snapshot.playing.into()),
        ("recording", snapshot.recording.into()),
        ("bpm", snapshot.bpm.into()),
        ("bar", snapshot.bar.into()),
        ("beat", snapshot.beat.into()),
        ("step", snapshot.step.into()),
        ("stepIndex", snapshot.step_index.into()),
        ("positionBars", snapshot.position_bars.into()),
        ("positionBeats", snapshot.position_beats.into()),
        ("timestamp", snapshot.timestamp.into()),
    ];
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
