// Timeline - Tempo and interval arithmetic
// Converts BPM into per-subdivision durations and aligns polyrhythm cycles

use std::fmt;

use serde::{Deserialize, Serialize};

/// Slowest tempo the metronome accepts
pub const TEMPO_MIN: f64 = 15.0;
/// Fastest tempo the metronome accepts
pub const TEMPO_MAX: f64 = 240.0;

/// Errors raised by timing computations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimingError {
    #[error("Subdivision count must be at least 1")]
    ZeroSubdivisions,

    #[error("Invalid tempo: {0}")]
    InvalidTempo(f64),

    #[error("Tempo {bpm} BPM outside of [{min}, {max}]")]
    TempoOutOfRange { bpm: f64, min: f64, max: f64 },
}

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo
    /// BPM must be in range [15.0, 240.0]
    pub fn new(bpm: f64) -> Result<Self, TimingError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(TimingError::InvalidTempo(bpm));
        }
        if !(TEMPO_MIN..=TEMPO_MAX).contains(&bpm) {
            return Err(TimingError::TempoOutOfRange {
                bpm,
                min: TEMPO_MIN,
                max: TEMPO_MAX,
            });
        }
        Ok(Self { bpm })
    }

    /// Creates a tempo, pulling out-of-range values back into [15, 240]
    /// Non-finite input falls back to the default tempo
    pub fn clamped(bpm: f64) -> Self {
        if !bpm.is_finite() {
            return Self::default();
        }
        Self {
            bpm: bpm.clamp(TEMPO_MIN, TEMPO_MAX),
        }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set BPM value
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), TimingError> {
        *self = Self::new(bpm)?;
        Ok(())
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Interval between two clicks of a circle when every subdivision is one beat
    /// of the given beat mode (quarter = one beat, eighth = half a beat)
    pub fn beat_interval(&self, beat_mode: BeatMode) -> f64 {
        60.0 / (self.bpm * beat_mode.multiplier())
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl TryFrom<f64> for Tempo {
    type Error = TimingError;

    fn try_from(bpm: f64) -> Result<Self, Self::Error> {
        Self::new(bpm)
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Note value a circle counts in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatMode {
    #[default]
    Quarter,
    Eighth,
}

impl BeatMode {
    /// Clicks per quarter note
    pub fn multiplier(&self) -> f64 {
        match self {
            BeatMode::Quarter => 1.0,
            BeatMode::Eighth => 2.0,
        }
    }
}

/// Seconds between two subdivisions when one beat at `bpm` is split into
/// `subdivisions` equal parts
#[inline]
pub fn seconds_per_subdivision(bpm: f64, subdivisions: u32) -> Result<f64, TimingError> {
    if subdivisions == 0 {
        return Err(TimingError::ZeroSubdivisions);
    }
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(TimingError::InvalidTempo(bpm));
    }
    Ok((60.0 / bpm) / subdivisions as f64)
}

/// Greatest common divisor (Euclid), with gcd(0, y) = y
#[inline]
pub fn gcd(a: u64, b: u64) -> u64 {
    if a == 0 { b } else { gcd(b % a, a) }
}

/// Least common multiple of two subdivision counts
/// Zero counts are rejected instead of dividing by zero
#[inline]
pub fn lcm(a: u32, b: u32) -> Result<u64, TimingError> {
    if a == 0 || b == 0 {
        return Err(TimingError::ZeroSubdivisions);
    }
    let (a, b) = (a as u64, b as u64);
    Ok(a / gcd(a, b) * b)
}

/// Timing of a two-timeline polyrhythm sharing one BPM
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyrhythmTiming {
    /// Seconds between inner circle subdivisions
    pub inner_interval: f64,
    /// Seconds between outer circle subdivisions
    pub outer_interval: f64,
    /// lcm(inner, outer)
    pub cycle_lcm: u64,
    /// (lcm / inner) * inner_interval
    pub cycle_duration: f64,
    /// Duration of one measure of either circle (one beat)
    pub measure_duration: f64,
}

impl PolyrhythmTiming {
    pub fn new(tempo: Tempo, inner: u32, outer: u32) -> Result<Self, TimingError> {
        let inner_interval = seconds_per_subdivision(tempo.bpm(), inner)?;
        let outer_interval = seconds_per_subdivision(tempo.bpm(), outer)?;
        let cycle_lcm = lcm(inner, outer)?;
        let cycle_duration = (cycle_lcm as f64 / inner as f64) * inner_interval;

        log::debug!(
            "polyrhythm {}:{} at {}: inner {:.4}s, outer {:.4}s, lcm {}, cycle {:.4}s",
            inner,
            outer,
            tempo,
            inner_interval,
            outer_interval,
            cycle_lcm,
            cycle_duration
        );

        Ok(Self {
            inner_interval,
            outer_interval,
            cycle_lcm,
            cycle_duration,
            measure_duration: tempo.beat_duration_seconds(),
        })
    }
}
