// Settings manager for loading and saving metronome configuration

use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::types::MetronomeSettings;

const APP_DIR: &str = "libremetronome";
const SETTINGS_FILE: &str = "settings.ron";

/// Settings error types
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings validation failed: {0}")]
    ValidationFailed(String),

    #[error("Unsupported settings format: {0}")]
    UnsupportedFormat(String),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
}

/// On-disk encoding, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Ron,
    Json,
}

impl SettingsFormat {
    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("ron") => Ok(SettingsFormat::Ron),
            Some("json") => Ok(SettingsFormat::Json),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Serialize settings in the given format
pub fn serialize_settings(
    settings: &MetronomeSettings,
    format: SettingsFormat,
) -> Result<String, SettingsError> {
    match format {
        SettingsFormat::Ron => Ok(ron::ser::to_string_pretty(
            settings,
            ron::ser::PrettyConfig::default(),
        )?),
        SettingsFormat::Json => Ok(serde_json::to_string_pretty(settings)?),
    }
}

/// Parse and validate settings
pub fn deserialize_settings(
    text: &str,
    format: SettingsFormat,
) -> Result<MetronomeSettings, SettingsError> {
    let settings: MetronomeSettings = match format {
        SettingsFormat::Ron => ron::from_str(text)?,
        SettingsFormat::Json => serde_json::from_str(text)?,
    };
    settings.validate()?;
    Ok(settings)
}

/// `<config dir>/libremetronome/settings.ron`
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
        .ok_or(SettingsError::NoConfigDir)
}

pub fn load_settings(path: &Path) -> Result<MetronomeSettings, SettingsError> {
    let format = SettingsFormat::from_path(path)?;
    let text = fs::read_to_string(path)?;
    let settings = deserialize_settings(&text, format)?;
    log::info!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Validate and write settings, creating parent directories as needed
pub fn save_settings(settings: &MetronomeSettings, path: &Path) -> Result<(), SettingsError> {
    settings.validate()?;
    let format = SettingsFormat::from_path(path)?;
    let text = serialize_settings(settings, format)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    log::info!("Saved settings to {}", path.display());
    Ok(())
}

/// Load `path`, falling back to defaults when the file does not exist
pub fn load_or_default(path: &Path) -> Result<MetronomeSettings, SettingsError> {
    if path.exists() {
        load_settings(path)
    } else {
        log::info!("No settings at {}, using defaults", path.display());
        Ok(MetronomeSettings::default())
    }
}
