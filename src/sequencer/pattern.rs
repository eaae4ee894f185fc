// Pattern - Accent patterns and circle configurations
// A circle is one bar of subdivisions, each carrying an accent state

use serde::{Deserialize, Serialize};

use crate::sequencer::swing::clamp_swing;
use crate::sequencer::timeline::BeatMode;

/// Errors raised while editing patterns and circles
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("At least one circle must remain")]
    LastCircle,

    #[error("Circle index {index} out of range ({len} circles)")]
    CircleIndexOutOfRange { index: usize, len: usize },

    #[error("Beat index {index} out of range ({len} subdivisions)")]
    BeatIndexOutOfRange { index: usize, len: usize },

    #[error("Invalid accent value: {0} (expected 0..=3)")]
    InvalidAccent(u8),

    #[error("A pattern needs at least one subdivision")]
    EmptyPattern,
}

/// Accent state of one subdivision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AccentState {
    Muted = 0,
    #[default]
    Normal = 1,
    Accented = 2,
    FirstBeat = 3,
}

impl AccentState {
    /// Next state when the user clicks the position: muted -> normal -> accented -> muted
    pub fn cycle(self) -> Self {
        match (self as u8 + 1) % 3 {
            0 => AccentState::Muted,
            1 => AccentState::Normal,
            _ => AccentState::Accented,
        }
    }

    pub fn is_audible(&self) -> bool {
        !matches!(self, AccentState::Muted)
    }
}

impl TryFrom<u8> for AccentState {
    type Error = PatternError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AccentState::Muted),
            1 => Ok(AccentState::Normal),
            2 => Ok(AccentState::Accented),
            3 => Ok(AccentState::FirstBeat),
            other => Err(PatternError::InvalidAccent(other)),
        }
    }
}

impl From<AccentState> for u8 {
    fn from(state: AccentState) -> Self {
        state as u8
    }
}

/// Ordered accent states, one per subdivision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AccentState>", into = "Vec<AccentState>")]
pub struct BeatPattern {
    accents: Vec<AccentState>,
}

impl BeatPattern {
    /// Default pattern: first-beat sound on index 0, normal clicks elsewhere
    pub fn new(subdivisions: usize) -> Result<Self, PatternError> {
        if subdivisions == 0 {
            return Err(PatternError::EmptyPattern);
        }
        Ok(Self::first_beat_then_normal(subdivisions))
    }

    fn first_beat_then_normal(subdivisions: usize) -> Self {
        let mut accents = vec![AccentState::Normal; subdivisions.max(1)];
        accents[0] = AccentState::FirstBeat;
        Self { accents }
    }

    pub fn from_accents(accents: Vec<AccentState>) -> Result<Self, PatternError> {
        if accents.is_empty() {
            return Err(PatternError::EmptyPattern);
        }
        Ok(Self { accents })
    }

    /// Build from raw configuration values {0,1,2,3}
    pub fn from_values(values: &[u8]) -> Result<Self, PatternError> {
        let accents = values
            .iter()
            .map(|&v| AccentState::try_from(v))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_accents(accents)
    }

    pub fn len(&self) -> usize {
        self.accents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accents.is_empty()
    }

    pub fn accents(&self) -> &[AccentState] {
        &self.accents
    }

    /// Accent at `index`; positions past the end play as normal clicks
    pub fn accent_at(&self, index: usize) -> AccentState {
        self.accents.get(index).copied().unwrap_or(AccentState::Normal)
    }

    pub fn set_accent(&mut self, index: usize, accent: AccentState) {
        if let Some(slot) = self.accents.get_mut(index) {
            *slot = accent;
        }
    }

    /// Cycle the accent at `index` (click on a beat position)
    pub fn toggle(&mut self, index: usize) -> Option<AccentState> {
        let slot = self.accents.get_mut(index)?;
        *slot = slot.cycle();
        Some(*slot)
    }

    /// Change the subdivision count, keeping existing accents
    pub fn resize(&mut self, subdivisions: usize) -> Result<(), PatternError> {
        if subdivisions == 0 {
            return Err(PatternError::EmptyPattern);
        }
        self.accents.resize(subdivisions, AccentState::Normal);
        Ok(())
    }
}

impl TryFrom<Vec<AccentState>> for BeatPattern {
    type Error = PatternError;

    fn try_from(accents: Vec<AccentState>) -> Result<Self, Self::Error> {
        Self::from_accents(accents)
    }
}

impl From<BeatPattern> for Vec<AccentState> {
    fn from(pattern: BeatPattern) -> Self {
        pattern.accents
    }
}

/// One circle: an accent pattern with its own swing and beat unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleConfig {
    pub pattern: BeatPattern,
    #[serde(default)]
    swing: f64,
    #[serde(default)]
    pub beat_mode: BeatMode,
}

impl CircleConfig {
    pub fn new(subdivisions: usize) -> Result<Self, PatternError> {
        Ok(Self {
            pattern: BeatPattern::new(subdivisions)?,
            swing: 0.0,
            beat_mode: BeatMode::Quarter,
        })
    }

    pub fn with_pattern(pattern: BeatPattern) -> Self {
        Self {
            pattern,
            swing: 0.0,
            beat_mode: BeatMode::Quarter,
        }
    }

    pub fn subdivisions(&self) -> usize {
        self.pattern.len()
    }

    pub fn swing(&self) -> f64 {
        clamp_swing(self.swing)
    }

    /// Set swing factor (clamped to [0, 0.5])
    pub fn set_swing(&mut self, swing: f64) {
        self.swing = clamp_swing(swing);
    }
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self::with_pattern(BeatPattern {
            accents: vec![
                AccentState::FirstBeat,
                AccentState::Normal,
                AccentState::Normal,
                AccentState::Normal,
            ],
        })
    }
}

/// Ordered circles for multi-circle mode; insertion order is play order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CircleConfig>", into = "Vec<CircleConfig>")]
pub struct CircleSet {
    circles: Vec<CircleConfig>,
}

impl CircleSet {
    pub fn new(first: CircleConfig) -> Self {
        Self {
            circles: vec![first],
        }
    }

    pub fn from_circles(circles: Vec<CircleConfig>) -> Result<Self, PatternError> {
        if circles.is_empty() {
            return Err(PatternError::LastCircle);
        }
        Ok(Self { circles })
    }

    pub fn len(&self) -> usize {
        self.circles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CircleConfig> {
        self.circles.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CircleConfig> {
        self.circles.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CircleConfig> {
        self.circles.iter()
    }

    /// Append a circle; returns its index
    pub fn add(&mut self, circle: CircleConfig) -> usize {
        self.circles.push(circle);
        self.circles.len() - 1
    }

    /// Remove a circle; the last remaining circle cannot be removed
    pub fn remove(&mut self, index: usize) -> Result<CircleConfig, PatternError> {
        if index >= self.circles.len() {
            return Err(PatternError::CircleIndexOutOfRange {
                index,
                len: self.circles.len(),
            });
        }
        if self.circles.len() == 1 {
            return Err(PatternError::LastCircle);
        }
        Ok(self.circles.remove(index))
    }
}

impl Default for CircleSet {
    fn default() -> Self {
        Self::new(CircleConfig::default())
    }
}

impl TryFrom<Vec<CircleConfig>> for CircleSet {
    type Error = PatternError;

    fn try_from(circles: Vec<CircleConfig>) -> Result<Self, Self::Error> {
        Self::from_circles(circles)
    }
}

impl From<CircleSet> for Vec<CircleConfig> {
    fn from(set: CircleSet) -> Self {
        set.circles
    }
}

/// Inner and outer circle of a polyrhythm; each spans one beat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolyrhythmPattern {
    pub inner: BeatPattern,
    pub outer: BeatPattern,
}

impl PolyrhythmPattern {
    pub fn new(inner: usize, outer: usize) -> Result<Self, PatternError> {
        Ok(Self {
            inner: BeatPattern::new(inner)?,
            outer: BeatPattern::new(outer)?,
        })
    }

    /// Subdivision counts as (inner, outer)
    pub fn counts(&self) -> (usize, usize) {
        (self.inner.len(), self.outer.len())
    }
}

impl Default for PolyrhythmPattern {
    fn default() -> Self {
        Self {
            inner: BeatPattern::first_beat_then_normal(3),
            outer: BeatPattern::first_beat_then_normal(4),
        }
    }
}
