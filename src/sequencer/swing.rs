// Swing and analog feel
// Uneven subdivision lengths and per-beat timing jitter

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Largest swing factor; 0.5 turns a straight pair into a 3:1 pair
pub const MAX_SWING: f64 = 0.5;

/// Half-width of the analog jitter window (15 ms)
pub const ANALOG_JITTER_SECONDS: f64 = 0.015;

/// Clamp a user swing value into [0, 0.5]; NaN counts as no swing
#[inline]
pub fn clamp_swing(swing: f64) -> f64 {
    if swing.is_nan() {
        0.0
    } else {
        swing.clamp(0.0, MAX_SWING)
    }
}

/// Duration of subdivision `index` after swing.
///
/// Even indices are lengthened by `(1 + swing)`, odd ones shortened by
/// `(1 - swing)`. Patterns with fewer than two subdivisions never swing,
/// otherwise a single-slot pattern would only ever play its long half.
#[inline]
pub fn swung_interval(base: f64, swing: f64, index: usize, subdivisions: usize) -> f64 {
    let swing = clamp_swing(swing);
    if subdivisions < 2 || swing == 0.0 {
        return base;
    }
    if index % 2 == 0 {
        base * (1.0 + swing)
    } else {
        base * (1.0 - swing)
    }
}

/// Per-subdivision durations of a whole pattern
pub fn swing_durations(base: f64, swing: f64, subdivisions: usize) -> Vec<f64> {
    (0..subdivisions)
        .map(|index| swung_interval(base, swing, index, subdivisions))
        .collect()
}

/// Random timing offsets for analog mode.
///
/// The random source is owned and injectable so tests can seed it.
pub struct AnalogJitter {
    rng: Box<dyn RngCore + Send>,
}

impl AnalogJitter {
    /// Jitter driven by an OS-seeded generator
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Jitter driven by the given random source
    pub fn with_rng<R: RngCore + Send + 'static>(rng: R) -> Self {
        Self { rng: Box::new(rng) }
    }

    /// Offset to add to the next trigger time: 0 when disabled,
    /// otherwise uniform in [-15 ms, +15 ms]. Recomputed on every call.
    pub fn offset(&mut self, enabled: bool) -> f64 {
        if !enabled {
            return 0.0;
        }
        self.rng
            .gen_range(-ANALOG_JITTER_SECONDS..=ANALOG_JITTER_SECONDS)
    }

    /// Uniform sample in [0, 1), shared with random-silence training
    pub fn unit(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }
}

impl Default for AnalogJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnalogJitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalogJitter").finish_non_exhaustive()
    }
}
