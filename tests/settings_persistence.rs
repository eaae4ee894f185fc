// Integration test: settings persistence
//
// Save a live metronome configuration, load it back and rebuild an
// identical metronome.

use libremetronome::audio::OfflineBackend;
use libremetronome::sequencer::{MacroMode, SpeedMode};
use libremetronome::settings::{
    CircleSettings, MetronomeSettings, SettingsError, load_settings, save_settings,
};
use libremetronome::{AccentState, BeatMode, ClickBank, PlayMode, TimelineId};
use tempfile::TempDir;

fn bank() -> ClickBank {
    ClickBank::synthesized(44100)
}

#[test]
fn test_live_configuration_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.ron");

    let mut metronome = MetronomeSettings::default().build_metronome(bank()).unwrap();
    metronome.set_tempo(132.0).unwrap();
    metronome.set_volume(0.7);
    metronome.set_analog(true);
    metronome.set_mode(PlayMode::Polyrhythm);
    metronome.toggle_accent(0, 1).unwrap();
    metronome.toggle_poly_accent(TimelineId::Outer, 2).unwrap();

    let mut settings = MetronomeSettings::default();
    settings.update_from(&metronome);
    save_settings(&settings, &path).unwrap();

    let loaded = load_settings(&path).unwrap();
    assert_eq!(loaded, settings);

    let rebuilt = loaded.build_metronome(bank()).unwrap();
    assert_eq!(rebuilt.tempo().bpm(), 132.0);
    assert_eq!(rebuilt.volume(), 0.7);
    assert!(rebuilt.analog());
    assert_eq!(rebuilt.mode(), PlayMode::Polyrhythm);
    assert_eq!(
        rebuilt.circles().get(0).unwrap().pattern.accents(),
        metronome.circles().get(0).unwrap().pattern.accents()
    );
    assert_eq!(rebuilt.polyrhythm(), metronome.polyrhythm());
}

#[test]
fn test_json_file_with_training() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("practice.json");

    let mut settings = MetronomeSettings {
        mode: PlayMode::MultiCircle,
        circles: vec![
            CircleSettings::default(),
            CircleSettings {
                subdivisions: 6,
                accents: Vec::new(),
                swing: 0.0,
                beat_mode: BeatMode::Eighth,
            },
        ],
        ..Default::default()
    };
    settings.training.macro_mode = MacroMode::FixedSilence {
        measures_until_mute: 4,
        mute_duration_measures: 2,
    };
    settings.training.speed_mode = SpeedMode::Increase {
        measures_until_speed_up: 8,
        tempo_increase_percent: 5.0,
    };

    save_settings(&settings, &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("fixed_silence"));
    assert!(text.contains("multi_circle"));

    let loaded = load_settings(&path).unwrap();
    let metronome = loaded.build_metronome(bank()).unwrap();
    assert_eq!(metronome.circles().len(), 2);
    assert_eq!(metronome.training().config(), &settings.training);

    // Default pattern for the second circle got filled in
    let second = metronome.circles().get(1).unwrap();
    assert_eq!(second.subdivisions(), 6);
    assert_eq!(second.pattern.accent_at(0), AccentState::FirstBeat);
}

#[test]
fn test_hand_written_ron_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hand.ron");
    std::fs::write(
        &path,
        r#"(
    tempo: 72.0,
    mode: polyrhythm,
    polyrhythm: (inner: 2, outer: 3),
    training: (macro_mode: random_silence(probability: 0.25)),
)"#,
    )
    .unwrap();

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.tempo, 72.0);
    assert_eq!(settings.mode, PlayMode::Polyrhythm);
    assert_eq!(
        settings.training.macro_mode,
        MacroMode::RandomSilence { probability: 0.25 }
    );

    let metronome = settings.build_metronome(bank()).unwrap();
    assert_eq!(metronome.polyrhythm().counts(), (2, 3));

    let mut backend = OfflineBackend::default();
    let mut metronome = metronome;
    metronome.start(&mut backend).unwrap();
    backend.step();
    assert_eq!(metronome.tick(&mut backend, 4.0, &mut ()), 2);
}

#[test]
fn test_rejected_files() {
    let dir = TempDir::new().unwrap();

    let path = dir.path().join("bad.ron");
    std::fs::write(&path, "(tempo: 10.0)").unwrap();
    assert!(matches!(
        load_settings(&path),
        Err(SettingsError::ValidationFailed(_))
    ));

    let path = dir.path().join("settings.yaml");
    std::fs::write(&path, "tempo: 100").unwrap();
    assert!(matches!(
        load_settings(&path),
        Err(SettingsError::UnsupportedFormat(_))
    ));

    assert!(matches!(
        load_settings(&dir.path().join("missing.ron")),
        Err(SettingsError::Io(_))
    ));
}
