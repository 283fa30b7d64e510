//! Software transport clock.
//!
//! The clock simulates a playhead from monotonic time. There is no explicit
//! "paused" state: a paused transport is simply `playing == false` with a
//! non-zero `offset_beats`.
//!
//! ```text
//!            play()                 pause()
//!   stopped ───────► playing ──────────────► paused
//!      ▲                │  ▲                   │
//!      │     stop()     │  └──── play() ───────┘
//!      └────────────────┴──────────────────────┘ stop()
//! ```
//!
//! Every operation takes the current [`Instant`] explicitly so callers (and
//! tests) decide what "now" means.

use std::time::Instant;

use chrono::Utc;

/// Fixed time signature used by the software clock.
pub const BEATS_PER_BAR: f64 = 4.0;

/// Sixteenth-note resolution.
pub const STEPS_PER_BEAT: f64 = 4.0;

/// Steps in one bar (`BEATS_PER_BAR * STEPS_PER_BEAT`).
pub const STEPS_PER_BAR: i64 = 16;

/// Lowest accepted tempo.
pub const MIN_BPM: f64 = 20.0;

/// Highest accepted tempo.
pub const MAX_BPM: f64 = 300.0;

/// Tempo of a freshly created clock, also used for non-finite input.
pub const DEFAULT_BPM: f64 = 128.0;

/// Clamps a tempo into `[MIN_BPM, MAX_BPM]`.
///
/// NaN and infinities are not clamped to a bound, they reset to [`DEFAULT_BPM`].
pub fn clamp_bpm(bpm: f64) -> f64 {
    if !bpm.is_finite() {
        return DEFAULT_BPM;
    }
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Transport state rendered as bar/beat/step/position fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSnapshot {
    /// Whether the playhead is moving.
    pub playing: bool,
    /// Whether the engine is recording. Always false for the software clock.
    pub recording: bool,
    /// Current tempo.
    pub bpm: f64,
    /// 1-based bar number.
    pub bar: i64,
    /// 1-based beat within the bar.
    pub beat: i64,
    /// 1-based step within the bar.
    pub step: i64,
    /// 0-based step within the bar.
    pub step_index: i64,
    /// Position in (fractional) bars.
    pub position_bars: f64,
    /// Position in (fractional) beats.
    pub position_beats: f64,
    /// Wall-clock time of the snapshot, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl TransportSnapshot {
    /// Derives the bar/beat/step fields from a beat position.
    ///
    /// Backends that report their own position should build snapshots through
    /// this function so both sources agree on the derivation.
    pub fn from_position(playing: bool, bpm: f64, position_beats: f64, timestamp: i64) -> Self {
        let position_beats = position_beats.max(0.0);
        let position_bars = position_beats / BEATS_PER_BAR;
        let bar = position_bars.floor() as i64 + 1;
        let beat = (position_beats % BEATS_PER_BAR).floor() as i64 + 1;
        let step_index = (position_beats * STEPS_PER_BEAT).floor() as i64 % STEPS_PER_BAR;

        Self {
            playing,
            recording: false,
            bpm,
            bar,
            beat,
            step: step_index + 1,
            step_index,
            position_bars,
            position_beats,
            timestamp,
        }
    }

    /// Marks the snapshot as recording.
    #[must_use]
    pub fn with_recording(mut self, recording: bool) -> Self {
        self.recording = recording;
        self
    }
}

/// Process-wide software transport.
#[derive(Debug, Clone)]
pub struct TransportClock {
    playing: bool,
    bpm: f64,
    offset_beats: f64,
    anchor: Instant,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClock {
    /// Creates a stopped clock at position zero.
    pub fn new() -> Self {
        Self::anchored_at(Instant::now())
    }

    /// Creates a stopped clock whose anchor is `anchor`.
    pub fn anchored_at(anchor: Instant) -> Self {
        Self {
            playing: false,
            bpm: DEFAULT_BPM,
            offset_beats: 0.0,
            anchor,
        }
    }

    /// Returns true while the playhead moves.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Returns the current tempo.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Position accumulated up to the last anchor.
    pub fn offset_beats(&self) -> f64 {
        self.offset_beats
    }

    /// Starts playback from the current position. No-op when already playing.
    pub fn play(&mut self, now: Instant) {
        if self.playing {
            return;
        }
        self.anchor = now;
        self.playing = true;
    }

    /// Freezes the playhead at its current position. No-op when not playing.
    pub fn pause(&mut self, now: Instant) {
        if !self.playing {
            return;
        }
        self.fold_elapsed(now);
        self.playing = false;
    }

    /// Stops playback and rewinds to zero.
    pub fn stop(&mut self, now: Instant) {
        self.playing = false;
        self.offset_beats = 0.0;
        self.anchor = now;
    }

    /// Jumps to `beats`. Playback continues from there if the clock is running.
    ///
    /// Negative positions clamp to zero and non-finite ones are treated as zero.
    pub fn seek(&mut self, beats: f64, now: Instant) {
        let beats = if beats.is_finite() { beats } else { 0.0 };
        self.offset_beats = beats.max(0.0);
        self.anchor = now;
    }

    /// Changes the tempo, clamped to the accepted range.
    ///
    /// Beats elapsed at the old tempo are folded into the offset first, so a
    /// tempo change never rewrites the past.
    pub fn set_bpm(&mut self, bpm: f64, now: Instant) {
        let bpm = clamp_bpm(bpm);
        if self.playing {
            self.fold_elapsed(now);
        }
        self.bpm = bpm;
    }

    /// Position in beats at `now`, never negative.
    pub fn position_beats_at(&self, now: Instant) -> f64 {
        if !self.playing {
            return self.offset_beats.max(0.0);
        }
        let elapsed_ms = now.saturating_duration_since(self.anchor).as_millis() as f64;
        (self.offset_beats + elapsed_ms * (self.bpm / 60_000.0)).max(0.0)
    }

    /// Snapshot at `now`, stamped with `timestamp` (ms since the Unix epoch).
    pub fn snapshot_at(&self, now: Instant, timestamp: i64) -> TransportSnapshot {
        TransportSnapshot::from_position(
            self.playing,
            self.bpm,
            self.position_beats_at(now),
            timestamp,
        )
    }

    /// Snapshot at the current instant.
    pub fn snapshot(&self) -> TransportSnapshot {
        self.snapshot_at(Instant::now(), Utc::now().timestamp_millis())
    }

    fn fold_elapsed(&mut self, now: Instant) {
        self.offset_beats = self.position_beats_at(now);
        self.anchor = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn new_clock_is_stopped_at_zero() {
        let t0 = Instant::now();
        let clock = TransportClock::anchored_at(t0);
        assert!(!clock.is_playing());
        assert_eq!(clock.bpm(), DEFAULT_BPM);
        assert_eq!(clock.position_beats_at(t0 + ms(5000)), 0.0);
    }

    #[test]
    fn play_advances_two_beats_per_second_at_120() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);
        clock.set_bpm(120.0, t0);
        clock.play(t0);

        let position = clock.position_beats_at(t0 + ms(1000));
        assert!((position - 2.0).abs() < 1e-9, "got {position}");
    }

    #[test]
    fn play_twice_keeps_first_anchor() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);
        clock.set_bpm(120.0, t0);
        clock.play(t0);
        clock.play(t0 + ms(500));

        assert!((clock.position_beats_at(t0 + ms(1000)) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn pause_then_play_resumes_from_paused_position() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);
        clock.set_bpm(120.0, t0);
        clock.play(t0);
        clock.pause(t0 + ms(1000));

        // Frozen while paused.
        assert!((clock.position_beats_at(t0 + ms(3000)) - 2.0).abs() < 1e-9);

        clock.play(t0 + ms(3000));
        let position = clock.position_beats_at(t0 + ms(3500));
        assert!((position - 3.0).abs() < 1e-9, "got {position}");
    }

    #[test]
    fn pause_when_stopped_is_noop() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);
        clock.seek(6.0, t0);
        clock.pause(t0 + ms(1000));
        assert_eq!(clock.offset_beats(), 6.0);
        assert!(!clock.is_playing());
    }

    #[test]
    fn stop_rewinds_to_zero() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);
        clock.play(t0);
        clock.stop(t0 + ms(2000));

        assert!(!clock.is_playing());
        assert_eq!(clock.position_beats_at(t0 + ms(4000)), 0.0);
    }

    #[test]
    fn seek_normalizes_bad_input() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);

        clock.seek(-3.0, t0);
        assert_eq!(clock.offset_beats(), 0.0);

        clock.seek(f64::NAN, t0);
        assert_eq!(clock.offset_beats(), 0.0);

        clock.seek(f64::INFINITY, t0);
        assert_eq!(clock.offset_beats(), 0.0);
    }

    #[test]
    fn seek_while_playing_moves_forward_from_new_point() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);
        clock.set_bpm(60.0, t0);
        clock.play(t0);
        clock.seek(10.0, t0 + ms(5000));

        let position = clock.position_beats_at(t0 + ms(7000));
        assert!((position - 12.0).abs() < 1e-9, "got {position}");
    }

    #[test]
    fn seek_eight_beats_is_bar_three_beat_one() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);
        clock.seek(8.0, t0);

        let snapshot = clock.snapshot_at(t0, 0);
        assert_eq!(snapshot.bar, 3);
        assert_eq!(snapshot.beat, 1);
        assert_eq!(snapshot.step, 1);
        assert_eq!(snapshot.step_index, 0);
        assert_eq!(snapshot.position_bars, 2.0);
        assert_eq!(snapshot.position_beats, 8.0);
    }

    #[test]
    fn set_bpm_clamps_range() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);

        clock.set_bpm(5.0, t0);
        assert_eq!(clock.bpm(), MIN_BPM);

        clock.set_bpm(1000.0, t0);
        assert_eq!(clock.bpm(), MAX_BPM);

        clock.set_bpm(f64::NAN, t0);
        assert_eq!(clock.bpm(), DEFAULT_BPM);
    }

    #[test]
    fn set_bpm_while_playing_keeps_elapsed_beats() {
        let t0 = Instant::now();
        let mut clock = TransportClock::anchored_at(t0);
        clock.set_bpm(120.0, t0);
        clock.play(t0);

        // Two beats at 120, then one more second at 60 adds one beat.
        clock.set_bpm(60.0, t0 + ms(1000));
        let position = clock.position_beats_at(t0 + ms(2000));
        assert!((position - 3.0).abs() < 1e-9, "got {position}");
    }

    #[test]
    fn snapshot_derives_steps_within_bar() {
        // 5.75 beats: bar 2, beat 2, step index (23 % 16) = 7.
        let snapshot = TransportSnapshot::from_position(true, 120.0, 5.75, 42);
        assert_eq!(snapshot.bar, 2);
        assert_eq!(snapshot.beat, 2);
        assert_eq!(snapshot.step_index, 7);
        assert_eq!(snapshot.step, 8);
        assert_eq!(snapshot.timestamp, 42);
        assert!(snapshot.playing);
        assert!(!snapshot.recording);
    }

    #[test]
    fn snapshot_uses_wall_clock_timestamp() {
        let before = Utc::now().timestamp_millis();
        let snapshot = TransportClock::new().snapshot();
        assert!(snapshot.timestamp >= before);
    }
}
