// Notifications published by the player to decoupled listeners (training UI, logs)

use crate::sequencer::circle::CircleTransition;
use crate::sequencer::player::PlayMode;

/// Announced at every measure boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureNotification {
    /// Measures since playback started (first boundary is 1)
    pub measure_index: u64,
    /// Whether the measure starting now is silent
    pub is_silent: bool,
    /// Estimated wall-clock time of the boundary (ms)
    pub timestamp: f64,
    pub mode: PlayMode,
}

/// Everything the player broadcasts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Notification {
    Measure(MeasureNotification),
    /// Silence training switched phase
    SilencePhaseChanged { is_silent: bool, timestamp: f64 },
    /// Tempo changed by speed training, tap tempo or acceleration
    TempoChanged { bpm: f64 },
    /// Multi-circle mode moved to another circle
    CircleChanged(CircleTransition),
}

impl Notification {
    pub fn measure(measure_index: u64, is_silent: bool, timestamp: f64, mode: PlayMode) -> Self {
        Notification::Measure(MeasureNotification {
            measure_index,
            is_silent,
            timestamp,
            mode,
        })
    }

    pub fn as_measure(&self) -> Option<MeasureNotification> {
        match self {
            Notification::Measure(measure) => Some(*measure),
            _ => None,
        }
    }

    /// Short tag for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Measure(_) => "measure",
            Notification::SilencePhaseChanged { .. } => "silence",
            Notification::TempoChanged { .. } => "tempo",
            Notification::CircleChanged(_) => "circle",
        }
    }
}
