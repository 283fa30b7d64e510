//! Core types: the software transport clock, snapshots and tracing setup.

pub mod tracing;
pub mod transport;

pub use tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
pub use transport::{
    BEATS_PER_BAR, DEFAULT_BPM, MAX_BPM, MIN_BPM, STEPS_PER_BAR, STEPS_PER_BEAT, TransportClock,
    TransportSnapshot, clamp_bpm,
};
