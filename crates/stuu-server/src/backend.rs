//! Audio engine backend seam.
//!
//! Everything outside the transport clock (devices, plugins, clips, track
//! mixing, an authoritative transport) is reached through [`Backend`]. Every
//! method has a default that reports the command as unsupported, so a
//! backend implements only what its engine provides. [`StubBackend`]
//! implements nothing beyond [`Backend::info`].

use stuu_core::TransportSnapshot;
use stuu_protocol::{Map, Value};
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};

/// Static description of a backend, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    /// True when a real audio engine drives the transport.
    pub authoritative: bool,
    /// Human readable summary.
    pub description: String,
}

/// One automatable plugin parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginParameterInfo {
    pub id: String,
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub value: f64,
}

impl Default for PluginParameterInfo {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            min: 0.0,
            max: 1.0,
            value: 0.0,
        }
    }
}

impl PluginParameterInfo {
    pub fn to_value(&self) -> Value {
        [
            ("id", Value::from(self.id.as_str())),
            ("name", Value::from(self.name.as_str())),
            ("min", Value::Float(self.min)),
            ("max", Value::Float(self.max)),
            ("value", Value::Float(self.value)),
        ]
        .into_iter()
        .collect()
    }
}

/// A plugin known to the scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInfo {
    pub name: String,
    pub uid: String,
    /// Format, e.g. `VST3`.
    pub format: String,
    /// `effect` or `instrument`.
    pub kind: String,
    pub is_instrument: bool,
    pub is_native: bool,
    pub parameters: Vec<PluginParameterInfo>,
}

impl Default for PluginInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            uid: String::new(),
            format: String::new(),
            kind: "effect".to_string(),
            is_instrument: false,
            is_native: false,
            parameters: Vec::new(),
        }
    }
}

impl PluginInfo {
    fn to_map(&self) -> Map {
        let parameters = self
            .parameters
            .iter()
            .map(PluginParameterInfo::to_value)
            .collect::<Vec<_>>();
        [
            ("name", Value::from(self.name.as_str())),
            ("uid", Value::from(self.uid.as_str())),
            ("type", Value::from(self.format.as_str())),
            ("kind", Value::from(self.kind.as_str())),
            ("isInstrument", Value::Bool(self.is_instrument)),
            ("isNative", Value::Bool(self.is_native)),
            ("parameters", Value::Arr(parameters)),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Map(self.to_map())
    }
}

/// A plugin instance inserted on a track.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadPluginResult {
    pub track_id: i32,
    /// Position in the track's plugin chain.
    pub plugin_index: i32,
    pub plugin: PluginInfo,
}

impl LoadPluginResult {
    pub fn to_value(&self) -> Value {
        let mut map = self.plugin.to_map();
        map.insert("trackId".into(), Value::from(self.track_id));
        map.insert("pluginIndex".into(), Value::from(self.plugin_index));
        Value::Map(map)
    }
}

/// Fade shape for imported clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeCurve {
    #[default]
    Linear,
    Convex,
    Concave,
    SCurve,
}

impl FadeCurve {
    /// Parses a curve name. Unknown names are linear.
    pub fn from_name(name: &str) -> Self {
        match name {
            "convex" => Self::Convex,
            "concave" => Self::Concave,
            "sCurve" | "scurve" => Self::SCurve,
            _ => Self::Linear,
        }
    }
}

/// Placement of an audio file on a track.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipImportRequest {
    /// 1-based track.
    pub track_id: i32,
    pub source_path: String,
    pub start_bars: f64,
    pub length_bars: f64,
    /// Time-based placement; used instead of bars when both are set.
    pub start_seconds: Option<f64>,
    pub length_seconds: Option<f64>,
    pub fade_in_seconds: f64,
    pub fade_out_seconds: f64,
    pub fade_in_curve: FadeCurve,
    pub fade_out_curve: FadeCurve,
    /// Free-form clip type hint from the controller.
    pub clip_type: String,
    /// Skip this much of the source before playback starts.
    pub source_offset_seconds: Option<f64>,
}

impl ClipImportRequest {
    /// Returns true when the clip is placed by seconds rather than bars.
    pub fn placed_by_time(&self) -> bool {
        self.start_seconds.is_some() && self.length_seconds.is_some_and(|length| length > 0.0)
    }
}

/// Where an imported clip ended up.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipImportResult {
    pub track_id: i32,
    pub start_bars: f64,
    pub length_bars: f64,
    pub source_path: String,
}

/// An audio clip currently in the edit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditClipInfo {
    pub track_id: i32,
    pub source_path: String,
    pub start_seconds: f64,
    pub length_seconds: f64,
    pub name: String,
}

impl EditClipInfo {
    pub fn to_value(&self) -> Value {
        [
            ("track_id", Value::from(self.track_id)),
            ("source_path", Value::from(self.source_path.as_str())),
            ("start_seconds", Value::Float(self.start_seconds)),
            ("length_seconds", Value::Float(self.length_seconds)),
            ("name", Value::from(self.name.as_str())),
        ]
        .into_iter()
        .collect()
    }
}

/// An audio device as listed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
}

impl AudioDeviceInfo {
    pub fn to_value(&self) -> Value {
        [
            ("id", Value::from(self.id.as_str())),
            ("name", Value::from(self.name.as_str())),
        ]
        .into_iter()
        .collect()
    }
}

/// Current output stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioStatus {
    pub sample_rate: f64,
    pub block_size: i32,
    pub output_latency_seconds: f64,
    pub output_channels: i32,
}

/// Spectrum analyzer readout attached to tick events.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyzerSnapshot {
    /// False until the analyzer has seen a full window.
    pub available: bool,
    /// True when `pre_db` is a copy of `post_db`.
    pub pre_mirrors_post: bool,
    /// Tap point, e.g. `master`.
    pub scope: String,
    /// Channel layout, e.g. `mono`.
    pub channels: String,
    pub sample_rate: f64,
    pub fft_size: i64,
    pub min_db: f64,
    pub max_db: f64,
    /// Unix milliseconds of the newest analysed sample.
    pub timestamp: i64,
    /// Band centre frequencies; `pre_db` and `post_db` follow the same order.
    pub freqs_hz: Vec<f64>,
    pub pre_db: Vec<f64>,
    pub post_db: Vec<f64>,
}

impl AnalyzerSnapshot {
    pub fn to_value(&self) -> Value {
        let floats =
            |values: &[f64]| Value::Arr(values.iter().copied().map(Value::Float).collect());
        [
            ("available", Value::Bool(self.available)),
            ("preMirrorsPost", Value::Bool(self.pre_mirrors_post)),
            ("scope", Value::from(self.scope.as_str())),
            ("channels", Value::from(self.channels.as_str())),
            ("sampleRate", Value::Float(self.sample_rate)),
            ("fftSize", Value::Int(self.fft_size)),
            ("minDb", Value::Float(self.min_db)),
            ("maxDb", Value::Float(self.max_db)),
            ("timestamp", Value::Int(self.timestamp)),
            ("freqsHz", floats(&self.freqs_hz)),
            ("preDb", floats(&self.pre_db)),
            ("postDb", floats(&self.post_db)),
        ]
        .into_iter()
        .collect()
    }
}

/// Audio engine collaborator.
///
/// Calls are made from a single worker thread (see
/// [`BackendWorker`](crate::BackendWorker)), so implementations need `Send`
/// but not `Sync`.
pub trait Backend: Send {
    /// Describes the backend.
    fn info(&self) -> BackendInfo;

    /// Releases engine resources. Called once, on the worker thread.
    fn shutdown(&mut self) {}

    /// Transport state as reported by the engine, if it has one.
    fn transport_snapshot(&mut self) -> Option<TransportSnapshot> {
        None
    }

    /// Latest spectrum analyzer readout, if the engine runs one.
    fn analyzer_snapshot(&mut self) -> Option<AnalyzerSnapshot> {
        None
    }

    fn transport_play(&mut self) {}
    fn transport_record(&mut self) {}
    fn transport_pause(&mut self) {}
    fn transport_stop(&mut self) {}
    fn transport_seek(&mut self, _position_beats: f64) {}
    fn transport_set_bpm(&mut self, _bpm: f64) {}

    /// Rebuilds the playback graph so a following play starts immediately.
    fn transport_ensure_context(&mut self) {}

    /// Replaces the edit with `track_count` empty tracks.
    fn reset_edit(&mut self, _track_count: i32) -> BackendResult<()> {
        Err(BackendError::unsupported("edit:reset"))
    }

    /// Removes every audio clip, keeping tracks and plugins.
    fn clear_audio_clips(&mut self) -> BackendResult<()> {
        Err(BackendError::unsupported("edit:clear-audio-clips"))
    }

    fn audio_clips(&mut self) -> BackendResult<Vec<EditClipInfo>> {
        Err(BackendError::unsupported("edit:get-audio-clips"))
    }

    fn output_devices(&mut self) -> BackendResult<Vec<AudioDeviceInfo>> {
        Err(BackendError::unsupported("audio.get_outputs"))
    }

    fn current_output_device(&mut self) -> Option<String> {
        None
    }

    fn set_output_device(&mut self, _device_id: &str) -> BackendResult<()> {
        Err(BackendError::unsupported("audio.set_output"))
    }

    fn input_devices(&mut self) -> BackendResult<Vec<AudioDeviceInfo>> {
        Err(BackendError::unsupported("audio.get_inputs"))
    }

    fn current_input_device(&mut self) -> Option<String> {
        None
    }

    fn set_input_device(&mut self, _device_id: &str) -> BackendResult<()> {
        Err(BackendError::unsupported("audio.set_input"))
    }

    fn audio_status(&mut self) -> Option<AudioStatus> {
        None
    }

    fn scan_plugins(&mut self) -> BackendResult<Vec<PluginInfo>> {
        Err(BackendError::unsupported("vst:scan"))
    }

    fn load_plugin(
        &mut self,
        _plugin_uid: &str,
        _track_id: i32,
    ) -> BackendResult<LoadPluginResult> {
        Err(BackendError::unsupported("vst:load"))
    }

    fn open_plugin_editor(&mut self, _track_id: i32, _plugin_index: i32) -> BackendResult<()> {
        Err(BackendError::unsupported("vst:editor:open"))
    }

    fn set_plugin_parameter(
        &mut self,
        _track_id: i32,
        _plugin_index: i32,
        _param_id: &str,
        _value: f64,
    ) -> BackendResult<PluginParameterInfo> {
        Err(BackendError::unsupported("vst:param:set"))
    }

    fn import_clip(&mut self, _request: &ClipImportRequest) -> BackendResult<ClipImportResult> {
        Err(BackendError::unsupported("clip:import-file"))
    }

    fn set_track_mute(&mut self, _track_id: i32, _mute: bool) -> BackendResult<()> {
        Err(BackendError::unsupported("track:set-mute"))
    }

    fn set_track_solo(&mut self, _track_id: i32, _solo: bool) -> BackendResult<()> {
        Err(BackendError::unsupported("track:set-solo"))
    }

    fn set_track_record_arm(&mut self, _track_id: i32, _armed: bool) -> BackendResult<()> {
        Err(BackendError::unsupported("track:set-record-arm"))
    }

    /// Linear gain, `0.0..=1.0`.
    fn set_track_volume(&mut self, _track_id: i32, _volume: f64) -> BackendResult<()> {
        Err(BackendError::unsupported("track:set-volume"))
    }

    /// `-1.0` (left) to `1.0` (right).
    fn set_track_pan(&mut self, _track_id: i32, _pan: f64) -> BackendResult<()> {
        Err(BackendError::unsupported("track:set-pan"))
    }
}

/// Backend used when no audio engine is available.
///
/// The software transport clock stays in charge and every engine command
/// fails with "requires an audio engine backend".
#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    config: BackendConfig,
}

impl StubBackend {
    pub fn new(config: BackendConfig) -> Self {
        debug!(
            sample_rate = config.sample_rate,
            buffer_size = config.buffer_size,
            "Stub backend created"
        );
        Self { config }
    }

    /// Settings the backend was created with.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

impl Backend for StubBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            authoritative: false,
            description: "stub transport backend (no audio engine)".to_string(),
        }
    }
}
