// Settings persistence for LibreMetronome
// RON by default, JSON when the file name says so

pub mod manager;
pub mod types;

pub use manager::{
    SettingsError, SettingsFormat, default_settings_path, load_or_default, load_settings,
    save_settings,
};
pub use types::{AnimationConfig, CircleSettings, MetronomeSettings, PolyrhythmSettings};
