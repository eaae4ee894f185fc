// Module audio - Output backends for scheduled clicks
//
// The scheduling core only talks to an `AudioBackend`: read the absolute
// clock, start a buffer at an absolute time through a gain stage, and
// release voices. `engine` drives a real cpal device, `offline` is a
// deterministic fake clock for tests and offline runs.

pub mod buffer;
pub mod device;
pub mod engine;
pub mod format_conversion;
pub mod offline;
pub mod timing;

pub use buffer::{ClickBank, ClickBuffer, ClickSound};
pub use engine::CpalBackend;
pub use offline::{OfflineBackend, StartedSource};
pub use timing::AudioTiming;

use std::fmt;

/// Audio layer errors
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No audio output device found")]
    NoOutputDevice,

    #[error("Output device not found: {0}")]
    DeviceNotFound(String),

    #[error("Default output config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("No buffer loaded for {0:?} click")]
    MissingBuffer(ClickSound),

    #[error("Audio clock unavailable")]
    ClockUnavailable,

    #[error("Start time {when:.4}s is in the past (clock at {now:.4}s)")]
    StartInPast { when: f64, now: f64 },

    #[error("Failed to start voice: {0}")]
    VoiceStart(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to one started source (source node + gain stage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Audio output backend shared by every timeline.
///
/// Only the beat scheduler starts voices on it.
pub trait AudioBackend {
    /// Whether the clock is running and voices can be started
    fn is_ready(&self) -> bool;

    /// Current absolute clock time in seconds
    fn current_time(&self) -> f64;

    /// Start `buffer` at absolute time `when` through a gain stage set to `gain`
    fn start_source(
        &mut self,
        buffer: &ClickBuffer,
        gain: f32,
        when: f64,
    ) -> Result<VoiceId, AudioError>;

    /// Whether the voice is still scheduled or sounding
    fn is_playing(&self, voice: VoiceId) -> bool;

    /// Stop and disconnect a voice
    fn release(&mut self, voice: VoiceId);
}
