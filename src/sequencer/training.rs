// Training - Practice modes evaluated at measure boundaries
// Silence phases, random silence and automatic tempo increase

use serde::{Deserialize, Serialize};

use crate::sequencer::swing::AnalogJitter;
use crate::sequencer::timeline::TEMPO_MAX;

/// Silence training
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroMode {
    #[default]
    Off,
    /// Play `measures_until_mute` measures, then stay silent for
    /// `mute_duration_measures`, and repeat
    FixedSilence {
        measures_until_mute: u32,
        mute_duration_measures: u32,
    },
    /// Each beat is silenced with this probability
    RandomSilence { probability: f64 },
}

impl MacroMode {
    pub fn name(&self) -> &'static str {
        match self {
            MacroMode::Off => "off",
            MacroMode::FixedSilence { .. } => "fixed_silence",
            MacroMode::RandomSilence { .. } => "random_silence",
        }
    }
}

/// Speed training
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedMode {
    #[default]
    Off,
    /// Raise the tempo by `tempo_increase_percent` every
    /// `measures_until_speed_up` audible measures
    Increase {
        measures_until_speed_up: u32,
        tempo_increase_percent: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub macro_mode: MacroMode,
    pub speed_mode: SpeedMode,
}

impl TrainingConfig {
    pub fn is_active(&self) -> bool {
        self.macro_mode != MacroMode::Off || self.speed_mode != SpeedMode::Off
    }
}

/// `round(bpm * (1 + percent / 100))`, never above 240
pub fn accelerated_tempo(bpm: f64, tempo_increase_percent: f64) -> f64 {
    let factor = 1.0 + tempo_increase_percent / 100.0;
    (bpm * factor).round().min(TEMPO_MAX)
}

/// Result of one measure boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureOutcome {
    /// Measures since playback started (first boundary is 1)
    pub measure_index: u64,
    /// Whether the measure that starts now is silent
    pub is_silent: bool,
    /// Set when the silence phase flipped at this boundary
    pub silence_changed: Option<bool>,
    /// New tempo when speed training kicked in
    pub new_tempo: Option<f64>,
}

/// Per-session training counters
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    config: TrainingConfig,
    measure_count: u32,
    mute_measure_count: u32,
    silence_phase: bool,
    measure_index: u64,
}

impl TrainingState {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Swap modes; counters restart
    pub fn set_config(&mut self, config: TrainingConfig) {
        self.config = config;
        self.reset();
    }

    /// Counters back to zero (playback start/stop)
    pub fn reset(&mut self) {
        self.measure_count = 0;
        self.mute_measure_count = 0;
        self.silence_phase = false;
        self.measure_index = 0;
    }

    pub fn measure_count(&self) -> u32 {
        self.measure_count
    }

    pub fn mute_measure_count(&self) -> u32 {
        self.mute_measure_count
    }

    pub fn is_silence_phase(&self) -> bool {
        self.silence_phase
    }

    pub fn measure_index(&self) -> u64 {
        self.measure_index
    }

    /// Advance counters at the start of a new measure
    pub fn on_measure_boundary(&mut self, current_bpm: f64) -> MeasureOutcome {
        self.measure_count += 1;
        self.measure_index += 1;
        let was_silent = self.silence_phase;

        if let MacroMode::FixedSilence {
            measures_until_mute,
            mute_duration_measures,
        } = self.config.macro_mode
        {
            if !self.silence_phase {
                if self.measure_count >= measures_until_mute {
                    self.silence_phase = true;
                    self.mute_measure_count = 0;
                    self.measure_count = 0;
                    log::info!("training: entering silence phase");
                }
            } else {
                self.mute_measure_count += 1;
                if self.mute_measure_count >= mute_duration_measures {
                    self.silence_phase = false;
                    self.mute_measure_count = 0;
                    self.measure_count = 0;
                    log::info!("training: leaving silence phase");
                }
            }
        }

        let mut new_tempo = None;
        if let SpeedMode::Increase {
            measures_until_speed_up,
            tempo_increase_percent,
        } = self.config.speed_mode
            && !self.silence_phase
            && self.measure_count >= measures_until_speed_up
        {
            let bpm = accelerated_tempo(current_bpm, tempo_increase_percent);
            self.measure_count = 0;
            log::info!("training: tempo raised to {} BPM", bpm);
            new_tempo = Some(bpm);
        }

        MeasureOutcome {
            measure_index: self.measure_index,
            is_silent: self.silence_phase,
            silence_changed: (was_silent != self.silence_phase).then_some(self.silence_phase),
            new_tempo,
        }
    }

    /// Whether the next beat is silenced by silence training
    pub fn should_mute(&self, rng: &mut AnalogJitter) -> bool {
        match self.config.macro_mode {
            MacroMode::Off => false,
            MacroMode::FixedSilence { .. } => self.silence_phase,
            MacroMode::RandomSilence { probability } => rng.unit() < probability,
        }
    }

    /// Manual "accelerate" using the speed training percentage (5% when
    /// speed training is off)
    pub fn manual_acceleration(&self, current_bpm: f64) -> f64 {
        let percent = match self.config.speed_mode {
            SpeedMode::Increase {
                tempo_increase_percent,
                ..
            } => tempo_increase_percent,
            SpeedMode::Off => 5.0,
        };
        accelerated_tempo(current_bpm, percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed(until: u32, duration: u32) -> TrainingConfig {
        TrainingConfig {
            macro_mode: MacroMode::FixedSilence {
                measures_until_mute: until,
                mute_duration_measures: duration,
            },
            speed_mode: SpeedMode::Off,
        }
    }

    #[test]
    fn test_accelerated_tempo() {
        assert_eq!(accelerated_tempo(120.0, 5.0), 126.0);
        assert_eq!(accelerated_tempo(100.0, 10.0), 110.0);
        assert_eq!(accelerated_tempo(235.0, 10.0), 240.0);
    }

    #[test]
    fn test_fixed_silence_cycle() {
        let mut state = TrainingState::new(fixed(2, 2));
        let phases: Vec<bool> = (0..8)
            .map(|_| state.on_measure_boundary(120.0).is_silent)
            .collect();
        // Two audible measures, two silent ones, and so on
        assert_eq!(
            phases,
            vec![false, true, true, false, false, true, true, false]
        );
    }

    #[test]
    fn test_silence_change_reported_once() {
        let mut state = TrainingState::new(fixed(1, 1));
        let first = state.on_measure_boundary(120.0);
        assert_eq!(first.silence_changed, Some(true));
        let second = state.on_measure_boundary(120.0);
        assert_eq!(second.silence_changed, Some(false));
        assert_eq!(second.measure_index, 2);
    }

    #[test]
    fn test_should_mute_follows_phase() {
        let mut rng = AnalogJitter::with_rng(StdRng::seed_from_u64(1));
        let mut state = TrainingState::new(fixed(1, 3));
        assert!(!state.should_mute(&mut rng));
        state.on_measure_boundary(120.0);
        assert!(state.should_mute(&mut rng));
    }

    #[test]
    fn test_random_silence_probability_bounds() {
        let mut rng = AnalogJitter::with_rng(StdRng::seed_from_u64(7));
        let never = TrainingState::new(TrainingConfig {
            macro_mode: MacroMode::RandomSilence { probability: 0.0 },
            speed_mode: SpeedMode::Off,
        });
        let always = TrainingState::new(TrainingConfig {
            macro_mode: MacroMode::RandomSilence { probability: 1.0 },
            speed_mode: SpeedMode::Off,
        });
        for _ in 0..100 {
            assert!(!never.should_mute(&mut rng));
            assert!(always.should_mute(&mut rng));
        }
    }

    #[test]
    fn test_speed_increase() {
        let mut state = TrainingState::new(TrainingConfig {
            macro_mode: MacroMode::Off,
            speed_mode: SpeedMode::Increase {
                measures_until_speed_up: 2,
                tempo_increase_percent: 10.0,
            },
        });
        assert_eq!(state.on_measure_boundary(100.0).new_tempo, None);
        assert_eq!(state.on_measure_boundary(100.0).new_tempo, Some(110.0));
        assert_eq!(state.measure_count(), 0);
        assert_eq!(state.on_measure_boundary(110.0).new_tempo, None);
    }

    #[test]
    fn test_no_speed_up_while_silent() {
        let mut state = TrainingState::new(TrainingConfig {
            macro_mode: MacroMode::FixedSilence {
                measures_until_mute: 1,
                mute_duration_measures: 5,
            },
            speed_mode: SpeedMode::Increase {
                measures_until_speed_up: 1,
                tempo_increase_percent: 10.0,
            },
        });
        for _ in 0..4 {
            assert_eq!(state.on_measure_boundary(100.0).new_tempo, None);
        }
    }

    #[test]
    fn test_manual_acceleration_default_percent() {
        let state = TrainingState::default();
        assert_eq!(state.manual_acceleration(100.0), 105.0);
    }
}
