// Integration test: look-ahead scheduling on the offline clock
//
// Drives the metronome the way the binary does (fixed tick, audio clock
// read each tick) and checks what reached the backend.

use libremetronome::audio::{AudioBackend, OfflineBackend};
use libremetronome::sequencer::swing::ANALOG_JITTER_SECONDS;
use libremetronome::sequencer::{AnalogJitter, CircleTransition, PolyrhythmTiming};
use libremetronome::{
    BeatObserver, BeatPattern, CircleConfig, CircleSet, ClickBank, Metronome, Notification,
    PlayMode, Tempo, TimelineId,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use ringbuf::traits::Consumer;

const START_DELAY: f64 = 0.05;
const EPS: f64 = 1e-9;

#[derive(Default)]
struct Recorder {
    triggered: Vec<(f64, TimelineId, usize)>,
    circles: Vec<CircleTransition>,
    wall_ms: f64,
}

impl BeatObserver for Recorder {
    fn on_beat_triggered(&mut self, timeline: TimelineId, index: usize) {
        self.triggered.push((self.wall_ms, timeline, index));
    }

    fn on_circle_change(&mut self, transition: CircleTransition) {
        self.circles.push(transition);
    }
}

fn metronome() -> Metronome {
    Metronome::new(ClickBank::synthesized(48000))
        .with_jitter(AnalogJitter::with_rng(StdRng::seed_from_u64(7)))
}

fn run(m: &mut Metronome, backend: &mut OfflineBackend, seconds: f64, recorder: &mut Recorder) {
    let steps = (seconds / backend.tick()).round() as usize;
    for _ in 0..steps {
        backend.step();
        recorder.wall_ms = backend.current_time() * 1000.0;
        let wall_ms = recorder.wall_ms;
        m.tick(backend, wall_ms, recorder);
    }
}

fn circle(subdivisions: usize) -> CircleConfig {
    CircleConfig::new(subdivisions).unwrap()
}

#[test]
fn test_never_schedules_in_the_past() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(200.0).unwrap();
    m.set_analog(true);
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 3.0, &mut Recorder::default());

    assert!(!backend.started().is_empty());
    for source in backend.started() {
        assert!(
            source.when >= source.issued_at,
            "start {} issued at {}",
            source.when,
            source.issued_at
        );
    }
}

#[test]
fn test_single_mode_is_monotonic_and_on_grid() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(120.0).unwrap();
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 4.0, &mut Recorder::default());

    let starts: Vec<f64> = backend.started().iter().map(|s| s.when).collect();
    assert!(starts.len() >= 7);
    for (n, when) in starts.iter().enumerate() {
        assert!((when - (START_DELAY + n as f64 * 0.5)).abs() < 1e-6);
    }
    assert!(starts.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_analog_jitter_does_not_accumulate() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(240.0).unwrap();
    m.set_analog(true);
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 10.0, &mut Recorder::default());

    let starts: Vec<f64> = backend.started().iter().map(|s| s.when).collect();
    assert!(starts.len() >= 35);
    let mut off_grid = 0;
    for (n, when) in starts.iter().enumerate() {
        let grid = START_DELAY + n as f64 * 0.25;
        let deviation = when - grid;
        assert!(deviation.abs() <= ANALOG_JITTER_SECONDS + EPS);
        if deviation.abs() > 1e-6 {
            off_grid += 1;
        }
    }
    assert!(off_grid > 0);
}

#[test]
fn test_beat_mode_scales_interval() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(60.0).unwrap();
    let mut eighths = circle(4);
    eighths.beat_mode = libremetronome::BeatMode::Eighth;
    m.set_circles(CircleSet::new(eighths));
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 2.0, &mut Recorder::default());

    let starts: Vec<f64> = backend.started().iter().map(|s| s.when).collect();
    let expected = Tempo::new(60.0)
        .unwrap()
        .beat_interval(libremetronome::BeatMode::Eighth);
    for pair in starts.windows(2) {
        assert!((pair[1] - pair[0] - expected).abs() < 1e-6);
    }
}

#[test]
fn test_multi_circle_alternates_two_circles() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(240.0).unwrap();
    m.set_circles(CircleSet::from_circles(vec![circle(4), circle(3)]).unwrap());
    m.set_mode(PlayMode::MultiCircle);
    let mut notifications = m.subscribe();

    let mut recorder = Recorder::default();
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 4.0, &mut recorder);

    let order: Vec<usize> = recorder.circles.iter().map(|t| t.to).collect();
    assert_eq!(order, vec![1, 0, 1, 0]);
    assert!(!recorder.circles[0].cycle_complete);
    assert!(recorder.circles[1].cycle_complete);
    assert_eq!(m.sequencer().completed_cycles(), 2);

    // 4 beats of circle 0, then 3 of circle 1
    let first_two_measures = backend
        .started()
        .iter()
        .filter(|s| s.when < START_DELAY + 1.0 + 0.75 - 1e-6)
        .count();
    assert_eq!(first_two_measures, 7);

    let mut changes = Vec::new();
    while let Some(notification) = notifications.try_pop() {
        if let Notification::CircleChanged(transition) = notification {
            changes.push(transition.to);
        }
    }
    assert_eq!(changes, order);
}

#[test]
fn test_multi_circle_three_circle_order() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(240.0).unwrap();
    m.set_circles(CircleSet::from_circles(vec![circle(4), circle(4), circle(4)]).unwrap());
    m.set_mode(PlayMode::MultiCircle);

    let mut recorder = Recorder::default();
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 6.0, &mut recorder);

    let order: Vec<usize> = recorder.circles.iter().map(|t| t.to).collect();
    assert!(order.len() >= 5);
    assert_eq!(&order[..5], &[1, 2, 0, 1, 2]);
    assert!(recorder.circles[2].cycle_complete);
}

#[test]
fn test_single_mode_never_changes_circle() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(240.0).unwrap();
    m.set_circles(CircleSet::from_circles(vec![circle(4), circle(3)]).unwrap());

    let mut recorder = Recorder::default();
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 3.0, &mut recorder);

    assert!(recorder.circles.is_empty());
    assert_eq!(m.current_circle(), 0);
}

#[test]
fn test_polyrhythm_unified_first_beat() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(120.0).unwrap();
    m.set_mode(PlayMode::Polyrhythm);

    let mut recorder = Recorder::default();
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 0.3, &mut recorder);

    let at_start: Vec<f64> = backend
        .started()
        .iter()
        .map(|s| s.when)
        .filter(|w| (w - START_DELAY).abs() < 1e-6)
        .collect();
    assert_eq!(at_start.len(), 2);
    assert_eq!(at_start[0], at_start[1]);

    // One visual task lights both first beats at the same moment
    let firsts: Vec<_> = recorder
        .triggered
        .iter()
        .filter(|(_, _, index)| *index == 0)
        .collect();
    assert_eq!(firsts.len(), 2);
    assert_eq!(firsts[0].0, firsts[1].0);
    assert_ne!(firsts[0].1, firsts[1].1);
}

#[test]
fn test_polyrhythm_measure_contents() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(120.0).unwrap();
    m.set_mode(PlayMode::Polyrhythm);
    let mut notifications = m.subscribe();

    let timing = PolyrhythmTiming::new(Tempo::new(120.0).unwrap(), 3, 4).unwrap();
    let measure_end = START_DELAY + timing.measure_duration;

    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, measure_end + 0.2, &mut Recorder::default());

    let in_measure = backend
        .started()
        .iter()
        .filter(|s| s.when < measure_end - 1e-6)
        .count();
    assert_eq!(in_measure, 7);

    // Second measure opens with another unified pair
    let at_boundary = backend
        .started()
        .iter()
        .filter(|s| (s.when - measure_end).abs() < 1e-6)
        .count();
    assert_eq!(at_boundary, 2);

    let measure = std::iter::from_fn(|| notifications.try_pop())
        .find_map(|n| n.as_measure())
        .unwrap();
    assert_eq!(measure.mode, PlayMode::Polyrhythm);
    assert_eq!(measure.measure_index, 1);
}

#[test]
fn test_polyrhythm_highlights_clear() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(60.0).unwrap();
    m.set_mode(PlayMode::Polyrhythm);
    m.start(&mut backend).unwrap();

    // Stop between the third measure's unified beat (2.05 s) and the next
    // outer beat (2.30 s); highlights last 40 ms
    let mut recorder = Recorder::default();
    run(&mut m, &mut backend, 2.16, &mut recorder);
    assert!(!recorder.triggered.is_empty());

    let last_wall = recorder.triggered.last().unwrap().0;
    assert!(backend.current_time() * 1000.0 - last_wall > 60.0);
    assert_eq!(m.indicator(TimelineId::Inner), None);
    assert_eq!(m.indicator(TimelineId::Outer), None);
}

#[test]
fn test_muted_accent_keeps_its_slot() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(120.0).unwrap();
    let pattern = BeatPattern::from_values(&[3, 0, 1, 1]).unwrap();
    m.set_circles(CircleSet::new(CircleConfig::with_pattern(pattern)));
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 2.0, &mut Recorder::default());

    let starts: Vec<f64> = backend.started().iter().map(|s| s.when).collect();
    assert!((starts[0] - START_DELAY).abs() < 1e-6);
    assert!((starts[1] - (START_DELAY + 1.0)).abs() < 1e-6);
    assert!((starts[2] - (START_DELAY + 1.5)).abs() < 1e-6);
}

#[test]
fn test_two_short_circles_alternate_every_measure() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(240.0).unwrap();
    m.set_circles(CircleSet::from_circles(vec![circle(1), circle(1)]).unwrap());
    m.set_mode(PlayMode::MultiCircle);

    // 250 ms measures, shorter than the transition lockout
    let mut recorder = Recorder::default();
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 2.0, &mut recorder);

    // One beat per measure from 0.05 s up to the look-ahead horizon: each
    // scheduled beat closes a measure
    let beats = backend.started().len();
    assert!(beats >= 8);
    assert_eq!(recorder.circles.len(), beats);

    let order: Vec<usize> = recorder.circles.iter().map(|t| t.to).collect();
    let expected: Vec<usize> = (0..order.len()).map(|i| (i + 1) % 2).collect();
    assert_eq!(order, expected);
    for transition in &recorder.circles {
        assert_ne!(transition.from, transition.to);
    }
}

#[test]
fn test_polyrhythm_tempo_change_waits_for_next_measure() {
    let mut backend = OfflineBackend::default();
    let mut m = metronome();
    m.set_tempo(30.0).unwrap();
    m.set_mode(PlayMode::Polyrhythm);
    let mut notifications = m.subscribe();

    // 3:4 at 30 BPM: one 2 s measure from 0.05 s, every beat of it
    // already scheduled by 1.6 s
    m.start(&mut backend).unwrap();
    run(&mut m, &mut backend, 1.6, &mut Recorder::default());
    while notifications.try_pop().is_some() {}
    let before = backend.started().len();
    assert_eq!(before, 7);

    m.set_tempo(240.0).unwrap();
    let tick = backend.tick();
    run(&mut m, &mut backend, tick, &mut Recorder::default());
    let measures = std::iter::from_fn(|| notifications.try_pop())
        .filter_map(|n| n.as_measure())
        .count();
    assert_eq!(measures, 0);
    assert_eq!(backend.started().len(), before);

    // The running measure ends on its original grid; 240 BPM starts there
    run(&mut m, &mut backend, 0.5, &mut Recorder::default());
    let measures = std::iter::from_fn(|| notifications.try_pop())
        .filter_map(|n| n.as_measure())
        .count();
    assert_eq!(measures, 1);

    let measure_end = START_DELAY + 2.0;
    let timing = PolyrhythmTiming::new(Tempo::new(240.0).unwrap(), 3, 4).unwrap();
    let new_starts: Vec<f64> = backend.started()[before..].iter().map(|s| s.when).collect();
    let expected = [
        measure_end,
        measure_end,
        measure_end + timing.outer_interval,
        measure_end + timing.inner_interval,
        measure_end + 2.0 * timing.outer_interval,
    ];
    assert_eq!(new_starts.len(), expected.len());
    for (start, want) in new_starts.iter().zip(expected) {
        assert!((start - want).abs() < EPS, "start {} expected {}", start, want);
    }
    for source in &backend.started()[before..] {
        assert!(source.when > source.issued_at);
    }
}
