use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use libremetronome::audio::device::AudioDeviceManager;
use libremetronome::messaging::CommandProducer;
use libremetronome::sequencer::CircleTransition;
use libremetronome::settings::{default_settings_path, load_or_default, save_settings};
use libremetronome::{
    BeatObserver, ClickBank, CpalBackend, MetronomeCommand, Notification, TimelineId,
    create_command_channel,
};
use ringbuf::traits::{Consumer, Producer};

// Console commands arrive one line at a time; a handful of slots is plenty
const COMMAND_RINGBUFFER_CAPACITY: usize = 64;

/// Prints each beat as it lights up
struct ConsoleObserver;

impl BeatObserver for ConsoleObserver {
    fn on_beat_triggered(&mut self, timeline: TimelineId, index: usize) {
        match timeline {
            TimelineId::Primary => println!("  beat {}", index + 1),
            TimelineId::Inner => println!("  inner {}", index + 1),
            TimelineId::Outer => println!("  outer {}", index + 1),
        }
    }

    fn on_circle_change(&mut self, transition: CircleTransition) {
        println!("-> circle {}", transition.to + 1);
    }
}

fn print_usage() {
    println!("usage: libremetronome [SETTINGS.ron|SETTINGS.json] [SECONDS]");
    println!("       libremetronome --list-devices");
    println!();
    println!("commands: bpm N | vol X | mute | unmute | analog [off] | mode single|multi|poly");
    println!("          tap | + | accent C I | poly inner|outer I | add N | remove C");
    println!("          start | pause | resume | stop | quit");
}

fn spawn_console(mut commands: CommandProducer, epoch: Instant) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let now_ms = epoch.elapsed().as_secs_f64() * 1000.0;
            match MetronomeCommand::parse(&line, now_ms) {
                Some(command) => {
                    if commands.try_push(command).is_err() {
                        eprintln!("command queue full, dropped: {}", line.trim());
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("unknown command: {}", line.trim()),
            }
        }
    });
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== LibreMetronome ===");
    println!("Version {}\n", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let first = args.next();
    match first.as_deref() {
        Some("-h") | Some("--help") => {
            print_usage();
            return;
        }
        Some("--list-devices") => {
            for device in AudioDeviceManager::new().list_output_devices() {
                let marker = if device.is_default { " (default)" } else { "" };
                println!("{}{}", device.name, marker);
            }
            return;
        }
        _ => {}
    }

    let settings_path = match first.map(PathBuf::from).map(Ok).unwrap_or_else(default_settings_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };
    let run_for = args
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64);

    let mut settings = match load_or_default(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("ERROR: {}: {}", settings_path.display(), e);
            return;
        }
    };

    println!("Audio engine initialisation...");
    let mut backend = match CpalBackend::new(settings.output_device.as_deref()) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };

    let bank = match &settings.sounds {
        Some(dir) => match ClickBank::load_dir(dir, backend.sample_rate()) {
            Ok(bank) => bank,
            Err(e) => {
                log::warn!("cannot load sounds from {}: {}", dir.display(), e);
                ClickBank::synthesized(backend.sample_rate())
            }
        },
        None => ClickBank::synthesized(backend.sample_rate()),
    };

    let mut metronome = match settings.build_metronome(bank) {
        Ok(metronome) => metronome,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return;
        }
    };
    let mut notifications = metronome.subscribe();

    let epoch = Instant::now();
    let (command_tx, mut command_rx) = create_command_channel(COMMAND_RINGBUFFER_CAPACITY);
    spawn_console(command_tx, epoch);

    if let Err(e) = metronome.start(&mut backend) {
        eprintln!("ERROR: {}", e);
        return;
    }

    println!("\n=== Metronome started: {} at {} ===", metronome.mode(), metronome.tempo());
    print_usage();
    println!();

    let interval = Duration::from_millis(metronome.scheduler_config().interval_ms);
    let mut observer = ConsoleObserver;

    'running: loop {
        while let Some(command) = command_rx.try_pop() {
            if !metronome.apply_command(command, &mut backend) {
                break 'running;
            }
        }

        let wall_ms = epoch.elapsed().as_secs_f64() * 1000.0;
        metronome.tick(&mut backend, wall_ms, &mut observer);

        while let Some(notification) = notifications.try_pop() {
            match notification {
                Notification::Measure(measure) => log::debug!(
                    "measure {} ({}){}",
                    measure.measure_index,
                    measure.mode,
                    if measure.is_silent { " silent" } else { "" }
                ),
                Notification::SilencePhaseChanged { is_silent, .. } => {
                    println!("{}", if is_silent { "[silence]" } else { "[sound]" });
                }
                Notification::TempoChanged { bpm } => println!("tempo: {} BPM", bpm),
                Notification::CircleChanged(_) => {}
            }
        }

        if run_for.is_some_and(|limit| epoch.elapsed() >= limit) {
            metronome.stop(&mut backend);
            break;
        }
        thread::sleep(interval);
    }

    if let Some(bpm) = metronome.actual_bpm() {
        println!("measured tempo: {:.1} BPM", bpm);
    }

    settings.update_from(&metronome);
    if let Err(e) = save_settings(&settings, &settings_path) {
        log::warn!("cannot save settings to {}: {}", settings_path.display(), e);
    }

    println!("\n=== LibreMetronome stopped ===");
}
