// Tap tempo and measured BPM

use std::collections::VecDeque;

use crate::sequencer::timeline::{TEMPO_MAX, TEMPO_MIN};

/// Taps kept for averaging
pub const MAX_TAPS: usize = 5;
/// A gap longer than this starts a new tap sequence (ms)
pub const TAP_RESET_MS: f64 = 2000.0;
/// Audible beats kept for the measured tempo
pub const MAX_MEASURED_BEATS: usize = 16;

/// Mean interval between consecutive timestamps (ms)
fn mean_interval(times: &VecDeque<f64>) -> Option<f64> {
    if times.len() < 2 {
        return None;
    }
    let first = times.front()?;
    let last = times.back()?;
    Some((last - first) / (times.len() - 1) as f64)
}

/// Tempo from tapped wall-clock timestamps
#[derive(Debug, Clone, Default)]
pub struct TapTempo {
    taps: VecDeque<f64>,
}

impl TapTempo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tap at `now_ms`. Returns the new tempo once at least two
    /// taps are in the current sequence.
    pub fn tap(&mut self, now_ms: f64) -> Option<f64> {
        if let Some(&last) = self.taps.back()
            && now_ms - last > TAP_RESET_MS
        {
            self.taps.clear();
        }

        self.taps.push_back(now_ms);
        while self.taps.len() > MAX_TAPS {
            self.taps.pop_front();
        }

        let avg = mean_interval(&self.taps)?;
        if avg <= 0.0 {
            return None;
        }
        let bpm = (60_000.0 / avg).round().clamp(TEMPO_MIN, TEMPO_MAX);
        log::debug!("tap tempo: {:.0} ms average -> {} BPM", avg, bpm);
        Some(bpm)
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

/// Actual tempo measured from the times audible beats were played
#[derive(Debug, Clone, Default)]
pub struct BpmMeter {
    beats: VecDeque<f64>,
}

impl BpmMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an audible beat played at `time_ms`
    pub fn record(&mut self, time_ms: f64) {
        self.beats.push_back(time_ms);
        while self.beats.len() > MAX_MEASURED_BEATS {
            self.beats.pop_front();
        }
    }

    /// Measured tempo, once two beats were recorded
    pub fn bpm(&self) -> Option<f64> {
        let avg = mean_interval(&self.beats)?;
        (avg > 0.0).then(|| 60_000.0 / avg)
    }

    pub fn reset(&mut self) {
        self.beats.clear();
    }
}
