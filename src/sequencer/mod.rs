// Sequencer module - Metronome scheduling core
// Tempo arithmetic, patterns, beat scheduling, circle sequencing and visual sync

pub mod animation;
pub mod circle;
pub mod metronome;
pub mod pattern;
pub mod player;
pub mod swing;
pub mod tap_tempo;
pub mod timeline;
pub mod training;

pub use animation::{AnimationSync, DeferredQueue, TaskId, TimelineId, VisualUpdate};
pub use circle::{CircleSequencer, CircleTransition, next_circle};
pub use metronome::{BeatRequest, BeatScheduler, ScheduledBeat, UnifiedBeat};
pub use pattern::{AccentState, BeatPattern, CircleConfig, CircleSet, PatternError, PolyrhythmPattern};
pub use player::{BeatObserver, Metronome, PlayMode, PlayState, SchedulerConfig};
pub use swing::AnalogJitter;
pub use tap_tempo::{BpmMeter, TapTempo};
pub use timeline::{BeatMode, PolyrhythmTiming, Tempo, TimingError};
pub use training::{MacroMode, SpeedMode, TrainingConfig, TrainingState};
