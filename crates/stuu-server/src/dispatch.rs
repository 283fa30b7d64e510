//! Request dispatch.
//!
//! Requests are routed through a lookup table from command name to
//! [`Command`], so an unknown name takes a single code path. The
//! [`Dispatcher`] owns the [`EngineState`] (software clock plus backend
//! handle) and is the only thing that mutates it.

use std::collections::HashMap;
use std::time::Instant;

use stuu_core::{BEATS_PER_BAR, TransportClock, TransportSnapshot};
use stuu_protocol::{Event, Fields, Map, Request, Response, TICK_EVENT, Value, snapshot_map};
use tracing::{debug, trace, warn};

use crate::backend::{AnalyzerSnapshot, AudioDeviceInfo, Backend, ClipImportRequest, FadeCurve};
use crate::error::CommandError;
use crate::worker::BackendHandle;

type CommandResult = Result<Map, CommandError>;

/// Commands understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    TransportGetState,
    TransportPlay,
    TransportRecord,
    TransportPause,
    TransportStop,
    TransportSeek,
    TransportSetBpm,
    TransportEnsureContext,
    HealthPing,
    BackendInfo,
    EditReset,
    EditClearAudioClips,
    EditGetAudioClips,
    AudioGetOutputs,
    AudioSetOutput,
    AudioGetInputs,
    AudioSetInput,
    VstScan,
    VstLoad,
    VstEditorOpen,
    VstParamSet,
    ClipImportFile,
    TrackSetMute,
    TrackSetSolo,
    TrackSetRecordArm,
    TrackSetVolume,
    TrackSetPan,
}

impl Command {
    /// Every wire name, including aliases.
    pub const TABLE: &'static [(&'static str, Command)] = &[
        ("transport.get_state", Self::TransportGetState),
        ("transport.play", Self::TransportPlay),
        ("transport.record", Self::TransportRecord),
        ("transport.pause", Self::TransportPause),
        ("transport.stop", Self::TransportStop),
        ("transport.seek", Self::TransportSeek),
        ("transport.set_bpm", Self::TransportSetBpm),
        ("transport.ensure-context", Self::TransportEnsureContext),
        ("transport:ensure-context", Self::TransportEnsureContext),
        ("health.ping", Self::HealthPing),
        ("backend.info", Self::BackendInfo),
        ("edit:reset", Self::EditReset),
        ("edit:clear-audio-clips", Self::EditClearAudioClips),
        ("edit:get-audio-clips", Self::EditGetAudioClips),
        ("audio.get_outputs", Self::AudioGetOutputs),
        ("audio.set_output", Self::AudioSetOutput),
        ("audio.get_inputs", Self::AudioGetInputs),
        ("audio.set_input", Self::AudioSetInput),
        ("vst:scan", Self::VstScan),
        ("vst:load", Self::VstLoad),
        ("vst:editor:open", Self::VstEditorOpen),
        ("vst:param:set", Self::VstParamSet),
        ("clip:import-file", Self::ClipImportFile),
        ("track:set-mute", Self::TrackSetMute),
        ("track:set-solo", Self::TrackSetSolo),
        ("track:set-record-arm", Self::TrackSetRecordArm),
        ("track:set-volume", Self::TrackSetVolume),
        ("track:set-pan", Self::TrackSetPan),
    ];

    /// Canonical wire name.
    pub fn name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, command)| *command == self)
            .map_or("", |(name, _)| *name)
    }
}

/// Process-wide engine state.
///
/// Persists across client connections: a reconnecting controller sees the
/// transport where it left it.
#[derive(Debug)]
pub struct EngineState {
    clock: TransportClock,
    backend: BackendHandle,
}

impl EngineState {
    pub fn new(backend: BackendHandle) -> Self {
        Self {
            clock: TransportClock::new(),
            backend,
        }
    }

    /// The software transport clock.
    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    /// Current snapshot, preferring the backend's when it is authoritative.
    pub async fn snapshot(&self) -> TransportSnapshot {
        if self.backend.is_authoritative() {
            match self.backend.call(|backend| backend.transport_snapshot()).await {
                Ok(Some(snapshot)) => return snapshot,
                Ok(None) => {}
                Err(error) => debug!(error = %error, "Backend snapshot unavailable"),
            }
        }
        self.clock.snapshot()
    }

    /// Snapshot for a tick event, plus the analyzer readout when the
    /// authoritative backend has both.
    async fn tick_sources(&self) -> (TransportSnapshot, Option<AnalyzerSnapshot>) {
        if self.backend.is_authoritative() {
            let reported = self
                .backend
                .call(|backend| {
                    backend
                        .transport_snapshot()
                        .map(|snapshot| (snapshot, backend.analyzer_snapshot()))
                })
                .await;
            match reported {
                Ok(Some(sources)) => return sources,
                Ok(None) => {}
                Err(error) => debug!(error = %error, "Backend snapshot unavailable"),
            }
        }
        (self.clock.snapshot(), None)
    }
}

/// Routes requests to command handlers.
#[derive(Debug)]
pub struct Dispatcher {
    commands: HashMap<&'static str, Command>,
    state: EngineState,
}

impl Dispatcher {
    pub fn new(state: EngineState) -> Self {
        Self {
            commands: Command::TABLE.iter().copied().collect(),
            state,
        }
    }

    /// Engine state owned by this dispatcher.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Looks up a command by wire name.
    pub fn lookup(&self, name: &str) -> Option<Command> {
        self.commands.get(name).copied()
    }

    /// Handles one decoded request map and produces its response.
    pub async fn dispatch(&mut self, map: Map) -> Response {
        let response = match Request::from_map(map) {
            Ok(request) => self.handle(request).await,
            Err(rejection) => Response::error(rejection.id, rejection.reason),
        };

        if let Err(message) = &response.outcome {
            warn!(id = response.id, error = %message, "Request failed");
        }
        response
    }

    /// Handles a parsed request.
    pub async fn handle(&mut self, request: Request) -> Response {
        let Some(command) = self.lookup(&request.cmd) else {
            return Response::error(request.id, format!("unknown cmd: {}", request.cmd));
        };

        debug!(id = request.id, cmd = %request.cmd, "Handling request");
        match self.execute(command, request.payload).await {
            Ok(payload) => Response::ok(request.id, payload),
            Err(error) => Response::error(request.id, error.to_string()),
        }
    }

    /// Builds the periodic `transport.tick` event.
    ///
    /// An analyzer readout is included under `analyzer` only when it is
    /// marked available.
    pub async fn tick_event(&self) -> Event {
        let (snapshot, analyzer) = self.state.tick_sources().await;
        trace!(
            playing = snapshot.playing,
            position_beats = snapshot.position_beats,
            "Transport tick"
        );

        let mut payload = snapshot_map(&snapshot);
        if let Some(analyzer) = analyzer.filter(|analyzer| analyzer.available) {
            payload.insert("analyzer".into(), analyzer.to_value());
        }
        Event::new(TICK_EVENT, payload)
    }

    async fn execute(&mut self, command: Command, payload: Option<Map>) -> CommandResult {
        use Command::*;

        match command {
            TransportGetState => Ok(transport_payload(self.state.snapshot().await)),
            TransportPlay => {
                self.transport(|b| b.transport_play(), |clock, now| clock.play(now), true)
                    .await
            }
            // The software clock has no record mode; recording falls back to play.
            TransportRecord => {
                self.transport(|b| b.transport_record(), |clock, now| clock.play(now), true)
                    .await
            }
            TransportPause => {
                self.transport(|b| b.transport_pause(), |clock, now| clock.pause(now), false)
                    .await
            }
            TransportStop => {
                self.transport(|b| b.transport_stop(), |clock, now| clock.stop(now), false)
                    .await
            }
            TransportSeek => {
                let beats = seek_target(&payload.unwrap_or_default());
                self.transport(
                    move |b| b.transport_seek(beats),
                    move |clock, now| clock.seek(beats, now),
                    false,
                )
                .await
            }
            TransportSetBpm => {
                let bpm = payload
                    .unwrap_or_default()
                    .float_or("bpm", self.state.clock.bpm());
                self.transport(
                    move |b| b.transport_set_bpm(bpm),
                    move |clock, now| clock.set_bpm(bpm, now),
                    false,
                )
                .await
            }
            TransportEnsureContext => {
                if self.state.backend.is_authoritative() {
                    self.call(|b| b.transport_ensure_context()).await?;
                }
                Ok(Map::new())
            }
            HealthPing => Ok(single("pong", Value::Bool(true))),
            BackendInfo => {
                let info = self.state.backend.info();
                Ok(pairs([
                    ("tracktion", Value::Bool(info.authoritative)),
                    ("description", Value::from(info.description.as_str())),
                ]))
            }
            EditReset => {
                let payload = payload.unwrap_or_default();
                let requested = int_alias(&payload, "track_count", "trackCount", 16);
                let track_count = if requested > 0 { requested } else { 16 };
                self.call(move |b| b.reset_edit(track_count)).await??;
                Ok(single("trackCount", Value::from(track_count)))
            }
            EditClearAudioClips => {
                if self.state.backend.is_authoritative() {
                    self.call(|b| b.clear_audio_clips()).await??;
                }
                Ok(Map::new())
            }
            EditGetAudioClips => {
                let clips = if self.state.backend.is_authoritative() {
                    self.call(|b| b.audio_clips()).await??
                } else {
                    Vec::new()
                };
                let clips = clips.iter().map(|clip| clip.to_value()).collect();
                Ok(single("clips", Value::Arr(clips)))
            }
            AudioGetOutputs => {
                let (devices, current, status) = self
                    .call(|b| {
                        b.output_devices()
                            .map(|devices| (devices, b.current_output_device(), b.audio_status()))
                    })
                    .await??;
                let mut out = devices_payload(&devices, current);
                if let Some(status) = status {
                    out.insert("sampleRate".into(), Value::Float(status.sample_rate));
                    out.insert("blockSize".into(), Value::from(status.block_size));
                    out.insert(
                        "outputLatencySeconds".into(),
                        Value::Float(status.output_latency_seconds),
                    );
                    out.insert("outputChannels".into(), Value::from(status.output_channels));
                }
                Ok(out)
            }
            AudioGetInputs => {
                let (devices, current) = self
                    .call(|b| b.input_devices().map(|devices| (devices, b.current_input_device())))
                    .await??;
                Ok(devices_payload(&devices, current))
            }
            AudioSetOutput => {
                let device_id = device_id(command, payload.as_ref())?;
                self.call(move |b| b.set_output_device(&device_id)).await??;
                Ok(single("ok", Value::Bool(true)))
            }
            AudioSetInput => {
                let device_id = device_id(command, payload.as_ref())?;
                self.call(move |b| b.set_input_device(&device_id)).await??;
                Ok(single("ok", Value::Bool(true)))
            }
            VstScan => {
                let plugins = self.call(|b| b.scan_plugins()).await??;
                let plugins = plugins.iter().map(|plugin| plugin.to_value()).collect();
                Ok(single("plugins", Value::Arr(plugins)))
            }
            VstLoad => {
                let payload = required(command, payload)?;
                let uid = payload
                    .first_str(&["plugin_uid", "pluginUid", "name"])
                    .map(str::to_string)
                    .ok_or(CommandError::MissingField {
                        command: command.name(),
                        what: "plugin_uid",
                    })?;
                let track_id = track_id(&payload);
                let plugin = self.call(move |b| b.load_plugin(&uid, track_id)).await??;
                Ok(single("plugin", plugin.to_value()))
            }
            VstEditorOpen => {
                let payload = required(command, payload)?;
                let track_id = track_id(&payload);
                let plugin_index = int_alias(&payload, "plugin_index", "pluginIndex", -1);
                if track_id <= 0 || plugin_index < 0 {
                    return Err(CommandError::MissingField {
                        command: command.name(),
                        what: "track_id and plugin_index",
                    });
                }
                self.call(move |b| b.open_plugin_editor(track_id, plugin_index))
                    .await??;
                Ok(pairs([
                    ("trackId", Value::from(track_id)),
                    ("pluginIndex", Value::from(plugin_index)),
                    ("opened", Value::Bool(true)),
                ]))
            }
            VstParamSet => {
                let payload = required(command, payload)?;
                let track_id = track_id(&payload);
                let plugin_index = int_alias(&payload, "plugin_index", "pluginIndex", 0);
                let param_id = payload
                    .first_str(&["param_id", "paramId"])
                    .map(str::to_string)
                    .ok_or(CommandError::MissingField {
                        command: command.name(),
                        what: "param_id",
                    })?;
                let value = payload.float_or("value", 0.0);
                let parameter = self
                    .call(move |b| b.set_plugin_parameter(track_id, plugin_index, &param_id, value))
                    .await??;
                Ok(pairs([
                    ("trackId", Value::from(track_id)),
                    ("pluginIndex", Value::from(plugin_index)),
                    ("parameter", parameter.to_value()),
                ]))
            }
            ClipImportFile => {
                let request = clip_request(&required(command, payload)?);
                let result = self.call(move |b| b.import_clip(&request)).await??;
                Ok(pairs([
                    ("trackId", Value::from(result.track_id)),
                    ("startBars", Value::Float(result.start_bars)),
                    ("lengthBars", Value::Float(result.length_bars)),
                    ("sourcePath", Value::from(result.source_path)),
                ]))
            }
            TrackSetMute => {
                let payload = required(command, payload)?;
                let (track_id, mute) = (track_id(&payload), payload.bool_or("mute", false));
                self.call(move |b| b.set_track_mute(track_id, mute)).await??;
                Ok(track_payload(track_id, "mute", Value::Bool(mute)))
            }
            TrackSetSolo => {
                let payload = required(command, payload)?;
                let (track_id, solo) = (track_id(&payload), payload.bool_or("solo", false));
                self.call(move |b| b.set_track_solo(track_id, solo)).await??;
                Ok(track_payload(track_id, "solo", Value::Bool(solo)))
            }
            TrackSetRecordArm => {
                let payload = required(command, payload)?;
                let track_id = track_id(&payload);
                let armed = payload.bool_or("record_armed", payload.bool_or("recordArmed", false));
                self.call(move |b| b.set_track_record_arm(track_id, armed))
                    .await??;
                Ok(track_payload(track_id, "record_armed", Value::Bool(armed)))
            }
            TrackSetVolume => {
                let payload = required(command, payload)?;
                let (track_id, volume) = (track_id(&payload), payload.float_or("volume", 0.85));
                self.call(move |b| b.set_track_volume(track_id, volume))
                    .await??;
                Ok(track_payload(track_id, "volume", Value::Float(volume)))
            }
            TrackSetPan => {
                let payload = required(command, payload)?;
                let (track_id, pan) = (track_id(&payload), payload.float_or("pan", 0.0));
                self.call(move |b| b.set_track_pan(track_id, pan)).await??;
                Ok(track_payload(track_id, "pan", Value::Float(pan)))
            }
        }
    }

    /// Drives the authoritative backend when there is one, otherwise the
    /// software clock.
    async fn transport<B, L>(
        &mut self,
        on_backend: B,
        on_clock: L,
        force_playing: bool,
    ) -> CommandResult
    where
        B: FnOnce(&mut dyn Backend) + Send + 'static,
        L: FnOnce(&mut TransportClock, Instant),
    {
        if !self.state.backend.is_authoritative() {
            on_clock(&mut self.state.clock, Instant::now());
            return Ok(transport_payload(self.state.clock.snapshot()));
        }

        let reported = self
            .call(move |backend| {
                on_backend(backend);
                backend.transport_snapshot()
            })
            .await?;
        let snapshot = match reported {
            Some(mut snapshot) => {
                // Engines may start asynchronously; report the requested state.
                if force_playing {
                    snapshot.playing = true;
                }
                snapshot
            }
            None => self.state.clock.snapshot(),
        };
        Ok(transport_payload(snapshot))
    }

    async fn call<T, F>(&self, f: F) -> Result<T, CommandError>
    where
        F: FnOnce(&mut dyn Backend) -> T + Send + 'static,
        T: Send + 'static,
    {
        Ok(self.state.backend.call(f).await?)
    }
}

fn single(key: &str, value: Value) -> Map {
    pairs([(key, value)])
}

fn pairs<const N: usize>(entries: [(&str, Value); N]) -> Map {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn transport_payload(snapshot: TransportSnapshot) -> Map {
    single("transport", Value::Map(snapshot_map(&snapshot)))
}

fn track_payload(track_id: i32, key: &str, value: Value) -> Map {
    pairs([("trackId", Value::from(track_id)), (key, value)])
}

fn devices_payload(devices: &[AudioDeviceInfo], current: Option<String>) -> Map {
    let devices = devices.iter().map(|device| device.to_value()).collect();
    pairs([
        ("devices", Value::Arr(devices)),
        ("currentId", Value::from(current.unwrap_or_default())),
    ])
}

fn required(command: Command, payload: Option<Map>) -> Result<Map, CommandError> {
    payload.ok_or(CommandError::MissingPayload(command.name()))
}

/// Seek target in beats: explicit beats win over bars, absent means zero.
fn seek_target(payload: &Map) -> f64 {
    payload
        .first_float(&["position_beats", "positionBeats"])
        .or_else(|| {
            payload
                .first_float(&["position_bars", "positionBars"])
                .map(|bars| bars * BEATS_PER_BAR)
        })
        .unwrap_or(0.0)
}

/// Integer field under a snake_case key or its camelCase alias.
fn int_alias(payload: &Map, key: &str, alias: &str, fallback: i32) -> i32 {
    let value = payload.int_or(key, payload.int_or(alias, i64::from(fallback)));
    i32::try_from(value).unwrap_or(fallback)
}

fn track_id(payload: &Map) -> i32 {
    int_alias(payload, "track_id", "trackId", 1)
}

fn device_id(command: Command, payload: Option<&Map>) -> Result<String, CommandError> {
    payload
        .and_then(|payload| payload.first_str(&["device_id", "deviceId"]))
        .map(str::to_string)
        .ok_or(CommandError::MissingField {
            command: command.name(),
            what: "device_id",
        })
}

fn float_alias(payload: &Map, key: &str, alias: &str, fallback: f64) -> f64 {
    payload.float_or(key, payload.float_or(alias, fallback))
}

/// Non-negative seconds, `None` otherwise.
fn seconds(payload: &Map, key: &str, alias: &str) -> Option<f64> {
    Some(float_alias(payload, key, alias, -1.0)).filter(|seconds| *seconds >= 0.0)
}

fn fade_curve(payload: &Map, key: &str, alias: &str) -> FadeCurve {
    payload
        .first_str(&[key, alias])
        .map_or(FadeCurve::Linear, FadeCurve::from_name)
}

fn clip_request(payload: &Map) -> ClipImportRequest {
    ClipImportRequest {
        track_id: track_id(payload),
        source_path: payload
            .first_str(&["source_path", "sourcePath"])
            .unwrap_or_default()
            .to_string(),
        start_bars: payload.float_or("start", 0.0),
        length_bars: payload.float_or("length", 0.0),
        start_seconds: seconds(payload, "start_seconds", "startSeconds"),
        length_seconds: seconds(payload, "length_seconds", "lengthSeconds"),
        fade_in_seconds: float_alias(payload, "fade_in", "fadeIn", 0.0),
        fade_out_seconds: float_alias(payload, "fade_out", "fadeOut", 0.0),
        fade_in_curve: fade_curve(payload, "fade_in_curve", "fadeInCurve"),
        fade_out_curve: fade_curve(payload, "fade_out_curve", "fadeOutCurve"),
        clip_type: payload.str_or("type", "").to_string(),
        source_offset_seconds: seconds(payload, "source_offset_seconds", "sourceOffsetSeconds"),
    }
}
