// LibreMetronome - Library exports for the binary, tests and benchmarks

pub mod audio;
pub mod messaging;
pub mod sequencer;
pub mod settings;

// Re-export commonly used types for convenience
pub use audio::timing::AudioTiming;
pub use audio::{AudioBackend, AudioError, ClickBank, CpalBackend, OfflineBackend};
pub use messaging::channels::{create_command_channel, create_notification_channel};
pub use messaging::{MetronomeCommand, Notification};
pub use sequencer::{
    AccentState, BeatMode, BeatObserver, BeatPattern, CircleConfig, CircleSet, Metronome,
    PlayMode, PlayState, PolyrhythmPattern, SchedulerConfig, Tempo, TimelineId, TrainingConfig,
};
pub use settings::{MetronomeSettings, SettingsError};
