//! Mirrored shared-metronome settings.
//!
//! The metronome itself ticks in each client; the broadcast only carries
//! transport state (running, tempo, meter, start time). The count-in
//! before a recording is derived from the same settings.

use std::time::Duration;

pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_TIME_SIGNATURE: u32 = 4;

/// Transport state of the shared metronome as last set or received.
#[derive(Debug, Clone, PartialEq)]
pub struct MetronomeSettings {
    pub running: bool,
    pub bpm: f64,
    /// Beats per bar; also the length of the recording count-in.
    pub time_signature: u32,
    pub start_time: i64,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            running: false,
            bpm: DEFAULT_BPM,
            time_signature: DEFAULT_TIME_SIGNATURE,
            start_time: 0,
        }
    }
}

impl MetronomeSettings {
    /// Mirror a metronome broadcast or a local toggle.
    pub fn apply(&mut self, running: bool, bpm: f64, time_signature: u32, start_time: i64) {
        self.running = running;
        self.bpm = sanitize_bpm(bpm);
        self.time_signature = time_signature.max(1);
        self.start_time = start_time;
    }

    /// Interval between beats at the current tempo.
    pub fn beat_interval(&self) -> Duration {
        Duration::from_millis((60_000.0 / self.bpm).round() as u64)
    }

    /// Count-in length before capture starts: one full bar.
    pub fn count_in_beats(&self) -> u32 {
        self.time_signature
    }

    pub fn count_in_duration(&self) -> Duration {
        self.beat_interval() * self.count_in_beats()
    }
}

/// Fall back to the default tempo on nonsense input, as the web client
/// does with unparseable BPM fields.
pub fn sanitize_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() && bpm > 0.0 {
        bpm
    } else {
        DEFAULT_BPM
    }
}
