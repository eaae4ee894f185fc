// Settings types - persisted metronome configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audio::ClickBank;
use crate::sequencer::animation::{
    AnimationSync, DEFAULT_ANIMATION_DURATION, DEFAULT_HIGHLIGHT_DURATION, DEFAULT_RENDER_DELAY,
};
use crate::sequencer::pattern::{BeatPattern, CircleConfig, CircleSet, PolyrhythmPattern};
use crate::sequencer::player::{Metronome, PlayMode, SchedulerConfig};
use crate::sequencer::swing::MAX_SWING;
use crate::sequencer::timeline::{BeatMode, TEMPO_MAX, TEMPO_MIN, Tempo};
use crate::sequencer::training::{MacroMode, SpeedMode, TrainingConfig};

use super::SettingsError;

/// One circle as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleSettings {
    pub subdivisions: u32,
    /// Accent per subdivision (0 muted, 1 normal, 2 accent, 3 first beat);
    /// empty means the default pattern
    pub accents: Vec<u8>,
    pub swing: f64,
    pub beat_mode: BeatMode,
}

impl Default for CircleSettings {
    fn default() -> Self {
        Self {
            subdivisions: 4,
            accents: vec![3, 1, 1, 1],
            swing: 0.0,
            beat_mode: BeatMode::Quarter,
        }
    }
}

impl CircleSettings {
    fn pattern(subdivisions: u32, accents: &[u8]) -> Result<BeatPattern, SettingsError> {
        let pattern = if accents.is_empty() {
            BeatPattern::new(subdivisions as usize)
        } else {
            BeatPattern::from_values(accents)
        };
        pattern.map_err(|e| SettingsError::ValidationFailed(e.to_string()))
    }

    pub fn to_circle(&self) -> Result<CircleConfig, SettingsError> {
        let mut circle = CircleConfig::with_pattern(Self::pattern(self.subdivisions, &self.accents)?);
        circle.set_swing(self.swing);
        circle.beat_mode = self.beat_mode;
        Ok(circle)
    }

    pub fn from_circle(circle: &CircleConfig) -> Self {
        Self {
            subdivisions: circle.subdivisions() as u32,
            accents: circle.pattern.accents().iter().map(|&a| u8::from(a)).collect(),
            swing: circle.swing(),
            beat_mode: circle.beat_mode,
        }
    }
}

/// Polyrhythm circles as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolyrhythmSettings {
    pub inner: u32,
    pub outer: u32,
    pub inner_accents: Vec<u8>,
    pub outer_accents: Vec<u8>,
}

impl Default for PolyrhythmSettings {
    fn default() -> Self {
        Self {
            inner: 3,
            outer: 4,
            inner_accents: Vec::new(),
            outer_accents: Vec::new(),
        }
    }
}

impl PolyrhythmSettings {
    pub fn to_pattern(&self) -> Result<PolyrhythmPattern, SettingsError> {
        Ok(PolyrhythmPattern {
            inner: CircleSettings::pattern(self.inner, &self.inner_accents)?,
            outer: CircleSettings::pattern(self.outer, &self.outer_accents)?,
        })
    }

    pub fn from_pattern(pattern: &PolyrhythmPattern) -> Self {
        let values = |p: &BeatPattern| -> Vec<u8> {
            p.accents().iter().map(|&a| u8::from(a)).collect()
        };
        Self {
            inner: pattern.inner.len() as u32,
            outer: pattern.outer.len() as u32,
            inner_accents: values(&pattern.inner),
            outer_accents: values(&pattern.outer),
        }
    }
}

/// Visual timing (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub animation_duration: f64,
    pub render_delay: f64,
    /// Polyrhythm highlight length; 0 keeps beats lit until the next one
    pub highlight_duration: f64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            animation_duration: DEFAULT_ANIMATION_DURATION,
            render_delay: DEFAULT_RENDER_DELAY,
            highlight_duration: DEFAULT_HIGHLIGHT_DURATION,
        }
    }
}

/// Everything the metronome persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    /// Tempo in BPM (15 to 240)
    pub tempo: f64,
    /// Output volume (0.0 to 1.0)
    pub volume: f32,
    pub mute: bool,
    pub analog_mode: bool,
    pub mode: PlayMode,
    /// Circles in play order
    pub circles: Vec<CircleSettings>,
    pub polyrhythm: PolyrhythmSettings,
    pub training: TrainingConfig,
    pub scheduler: SchedulerConfig,
    pub animation: AnimationConfig,
    /// Directory with normal.wav, accent.wav and first.wav
    pub sounds: Option<PathBuf>,
    /// Output device name; None for the default device
    pub output_device: Option<String>,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            volume: 0.5,
            mute: false,
            analog_mode: false,
            mode: PlayMode::Single,
            circles: vec![CircleSettings::default()],
            polyrhythm: PolyrhythmSettings::default(),
            training: TrainingConfig::default(),
            scheduler: SchedulerConfig::default(),
            animation: AnimationConfig::default(),
            sounds: None,
            output_device: None,
        }
    }
}

fn fail(message: String) -> Result<(), SettingsError> {
    Err(SettingsError::ValidationFailed(message))
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl MetronomeSettings {
    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(TEMPO_MIN..=TEMPO_MAX).contains(&self.tempo) {
            return fail(format!(
                "tempo {} outside of [{}, {}]",
                self.tempo, TEMPO_MIN, TEMPO_MAX
            ));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return fail(format!("volume {} outside of [0, 1]", self.volume));
        }

        if self.circles.is_empty() {
            return fail("at least one circle is required".into());
        }
        for (i, circle) in self.circles.iter().enumerate() {
            if circle.subdivisions == 0 {
                return fail(format!("circle {}: subdivisions must be at least 1", i));
            }
            if !circle.accents.is_empty() && circle.accents.len() != circle.subdivisions as usize {
                return fail(format!(
                    "circle {}: {} accents for {} subdivisions",
                    i,
                    circle.accents.len(),
                    circle.subdivisions
                ));
            }
            if let Some(bad) = circle.accents.iter().find(|&&a| a > 3) {
                return fail(format!("circle {}: invalid accent value {}", i, bad));
            }
            if !(0.0..=MAX_SWING).contains(&circle.swing) {
                return fail(format!("circle {}: swing {} outside of [0, 0.5]", i, circle.swing));
            }
        }

        let poly = &self.polyrhythm;
        for (name, count, accents) in [
            ("inner", poly.inner, &poly.inner_accents),
            ("outer", poly.outer, &poly.outer_accents),
        ] {
            if count == 0 {
                return fail(format!("polyrhythm {} count must be at least 1", name));
            }
            if !accents.is_empty() && accents.len() != count as usize {
                return fail(format!(
                    "polyrhythm {}: {} accents for {} beats",
                    name,
                    accents.len(),
                    count
                ));
            }
            if let Some(bad) = accents.iter().find(|&&a| a > 3) {
                return fail(format!("polyrhythm {}: invalid accent value {}", name, bad));
            }
        }

        match self.training.macro_mode {
            MacroMode::FixedSilence {
                measures_until_mute,
                mute_duration_measures,
            } if measures_until_mute == 0 || mute_duration_measures == 0 => {
                return fail("fixed silence needs at least one measure per phase".into());
            }
            MacroMode::RandomSilence { probability } if !(0.0..=1.0).contains(&probability) => {
                return fail(format!("silence probability {} outside of [0, 1]", probability));
            }
            _ => {}
        }
        if let SpeedMode::Increase {
            measures_until_speed_up,
            tempo_increase_percent,
        } = self.training.speed_mode
            && (measures_until_speed_up == 0 || !non_negative(tempo_increase_percent))
        {
            return fail("speed training needs at least one measure and a positive increase".into());
        }

        let scheduler = &self.scheduler;
        if !(scheduler.lookahead.is_finite() && scheduler.lookahead > 0.0) {
            return fail(format!("lookahead {} must be positive", scheduler.lookahead));
        }
        if scheduler.interval_ms == 0 {
            return fail("scheduler interval must be at least 1 ms".into());
        }
        if !non_negative(scheduler.start_delay) {
            return fail(format!("start delay {} must not be negative", scheduler.start_delay));
        }

        let animation = &self.animation;
        if !non_negative(animation.animation_duration)
            || !non_negative(animation.render_delay)
            || !non_negative(animation.highlight_duration)
        {
            return fail("animation timings must not be negative".into());
        }

        Ok(())
    }

    pub fn tempo(&self) -> Result<Tempo, SettingsError> {
        Tempo::new(self.tempo).map_err(|e| SettingsError::ValidationFailed(e.to_string()))
    }

    pub fn circle_set(&self) -> Result<CircleSet, SettingsError> {
        let circles = self
            .circles
            .iter()
            .map(CircleSettings::to_circle)
            .collect::<Result<Vec<_>, _>>()?;
        CircleSet::from_circles(circles).map_err(|e| SettingsError::ValidationFailed(e.to_string()))
    }

    pub fn animation_sync(&self) -> AnimationSync {
        AnimationSync::new(self.animation.animation_duration, self.animation.render_delay)
    }

    /// Validate, then build a stopped metronome playing `bank`
    pub fn build_metronome(&self, bank: ClickBank) -> Result<Metronome, SettingsError> {
        self.validate()?;

        let mut metronome = Metronome::new(bank)
            .with_scheduler_config(self.scheduler)
            .with_animation(self.animation_sync(), self.animation.highlight_duration);

        metronome
            .set_tempo(self.tempo()?.bpm())
            .map_err(|e| SettingsError::ValidationFailed(e.to_string()))?;
        metronome.set_volume(self.volume);
        metronome.set_muted(self.mute);
        metronome.set_analog(self.analog_mode);
        metronome.set_circles(self.circle_set()?);
        metronome.set_polyrhythm(self.polyrhythm.to_pattern()?);
        metronome.set_training(self.training);
        metronome.set_mode(self.mode);

        Ok(metronome)
    }

    /// Copy the live configuration of `metronome` back into these settings
    pub fn update_from(&mut self, metronome: &Metronome) {
        self.tempo = metronome.tempo().bpm();
        self.volume = metronome.volume();
        self.mute = metronome.is_muted();
        self.analog_mode = metronome.analog();
        self.mode = metronome.mode();
        self.circles = metronome.circles().iter().map(CircleSettings::from_circle).collect();
        self.polyrhythm = PolyrhythmSettings::from_pattern(metronome.polyrhythm());
        self.training = *metronome.training().config();
        self.scheduler = *metronome.scheduler_config();
    }
}
