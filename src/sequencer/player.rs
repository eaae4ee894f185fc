// Player - The look-ahead scheduling loop
// Drives single, multi-circle and polyrhythm playback on top of the beat scheduler

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::{AudioBackend, AudioError, ClickBank};
use crate::messaging::{MetronomeCommand, Notification, NotificationBus, NotificationConsumer};
use crate::sequencer::animation::{
    AnimationSync, DEFAULT_HIGHLIGHT_DURATION, TimelineId, VisualUpdate,
};
use crate::sequencer::circle::{CircleSequencer, CircleTransition};
use crate::sequencer::metronome::{BeatRequest, BeatScheduler, ScheduledBeat};
use crate::sequencer::pattern::{
    AccentState, CircleConfig, CircleSet, PatternError, PolyrhythmPattern,
};
use crate::sequencer::swing::{AnalogJitter, swung_interval};
use crate::sequencer::tap_tempo::{BpmMeter, TapTempo};
use crate::sequencer::timeline::{PolyrhythmTiming, Tempo, TimingError};
use crate::sequencer::training::{TrainingConfig, TrainingState};

/// Multi-circle mode looks a little further ahead so circle switches are
/// scheduled before they are due
pub const MULTI_CIRCLE_LOOKAHEAD_FACTOR: f64 = 1.2;

/// Playback mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    /// One circle on repeat
    #[default]
    Single,
    /// Circles played one after another
    MultiCircle,
    /// Inner and outer circle at once, sharing beat 1
    Polyrhythm,
}

impl PlayMode {
    pub fn name(&self) -> &'static str {
        match self {
            PlayMode::Single => "single",
            PlayMode::MultiCircle => "multi_circle",
            PlayMode::Polyrhythm => "polyrhythm",
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Look-ahead loop parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Events due before `now + lookahead` are scheduled on each tick (seconds)
    pub lookahead: f64,
    /// Period of the scheduler tick (ms)
    pub interval_ms: u64,
    /// Gap between start/resume and the first beat (seconds)
    pub start_delay: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead: 0.1,
            interval_ms: 25,
            start_delay: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// UI-side hooks, called from `Metronome::tick`
pub trait BeatObserver {
    /// Current subdivision of a timeline changed; None clears the highlight
    fn on_subdivision(&mut self, _timeline: TimelineId, _index: Option<usize>) {}

    /// A beat's visual moment has come
    fn on_beat_triggered(&mut self, _timeline: TimelineId, _index: usize) {}

    /// Multi-circle mode switched circles
    fn on_circle_change(&mut self, _transition: CircleTransition) {}
}

impl BeatObserver for () {}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    index: usize,
    next_time: f64,
}

/// Timing and counts of the polyrhythm measure in progress
#[derive(Debug, Clone, Copy)]
struct PolyMeasure {
    timing: PolyrhythmTiming,
    inner_n: usize,
    outer_n: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct PolyCursor {
    measure_start: f64,
    inner: usize,
    outer: usize,
    unified_pending: bool,
    /// Fixed once beat 1 is scheduled; tempo and count changes wait for the next measure
    measure: Option<PolyMeasure>,
}

/// The metronome: configuration plus per-session scheduling state
#[derive(Debug)]
pub struct Metronome {
    tempo: Tempo,
    mode: PlayMode,
    analog: bool,
    circles: CircleSet,
    polyrhythm: PolyrhythmPattern,
    config: SchedulerConfig,
    highlight_duration: f64,

    scheduler: BeatScheduler,
    sequencer: CircleSequencer,
    training: TrainingState,
    jitter: AnalogJitter,
    tap: TapTempo,
    meter: BpmMeter,
    notifications: NotificationBus,

    state: PlayState,
    primary: Cursor,
    poly: PolyCursor,
    immediate_pending: bool,
    last_scheduled: Option<f64>,
    indicators: [Option<usize>; 3],
}

impl Metronome {
    pub fn new(bank: ClickBank) -> Self {
        let circles = CircleSet::default();
        Self {
            tempo: Tempo::default(),
            mode: PlayMode::Single,
            analog: false,
            sequencer: CircleSequencer::new(circles.len()),
            circles,
            polyrhythm: PolyrhythmPattern::default(),
            config: SchedulerConfig::default(),
            highlight_duration: DEFAULT_HIGHLIGHT_DURATION,
            scheduler: BeatScheduler::new(bank),
            training: TrainingState::default(),
            jitter: AnalogJitter::new(),
            tap: TapTempo::new(),
            meter: BpmMeter::new(),
            notifications: NotificationBus::default(),
            state: PlayState::Stopped,
            primary: Cursor::default(),
            poly: PolyCursor::default(),
            immediate_pending: false,
            last_scheduled: None,
            indicators: [None; 3],
        }
    }

    pub fn with_scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Visual timing; a highlight duration of 0 keeps polyrhythm beats lit
    pub fn with_animation(mut self, sync: AnimationSync, highlight_duration: f64) -> Self {
        self.scheduler = self.scheduler.with_sync(sync);
        self.highlight_duration = highlight_duration.max(0.0);
        self
    }

    /// Random source for analog jitter and random silence
    pub fn with_jitter(mut self, jitter: AnalogJitter) -> Self {
        self.jitter = jitter;
        self
    }

    // ---- configuration -------------------------------------------------

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Set tempo in BPM (15 to 240)
    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), TimingError> {
        let tempo = Tempo::new(bpm)?;
        self.apply_tempo(tempo);
        Ok(())
    }

    fn apply_tempo(&mut self, tempo: Tempo) {
        if tempo == self.tempo {
            return;
        }
        self.tempo = tempo;
        log::info!("tempo: {}", tempo);
        self.notifications
            .publish(Notification::TempoChanged { bpm: tempo.bpm() });
    }

    pub fn volume(&self) -> f32 {
        self.scheduler.volume()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.scheduler.set_volume(volume);
    }

    pub fn is_muted(&self) -> bool {
        self.scheduler.is_muted()
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.scheduler.set_muted(muted);
    }

    pub fn analog(&self) -> bool {
        self.analog
    }

    pub fn set_analog(&mut self, analog: bool) {
        self.analog = analog;
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    /// Switch mode; while playing, the new mode starts from beat 1 at the
    /// next pending event time
    pub fn set_mode(&mut self, mode: PlayMode) {
        if mode == self.mode {
            return;
        }
        let anchor = self.pending_time();
        self.mode = mode;
        if self.state == PlayState::Playing {
            self.sequencer.start();
            self.reset_cursors(anchor);
        }
        log::info!("mode: {}", mode);
    }

    pub fn scheduler_config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn circles(&self) -> &CircleSet {
        &self.circles
    }

    /// Replace every circle; playback restarts from the first circle
    pub fn set_circles(&mut self, circles: CircleSet) {
        self.circles = circles;
        self.sequencer.set_count(self.circles.len());
    }

    pub fn circle_mut(&mut self, index: usize) -> Option<&mut CircleConfig> {
        self.circles.get_mut(index)
    }

    /// Append a circle; returns its index
    pub fn add_circle(&mut self, circle: CircleConfig) -> usize {
        let index = self.circles.add(circle);
        self.sequencer.set_count(self.circles.len());
        index
    }

    /// Remove a circle (at least one must remain)
    pub fn remove_circle(&mut self, index: usize) -> Result<CircleConfig, PatternError> {
        let removed = self.circles.remove(index)?;
        self.sequencer.set_count(self.circles.len());
        Ok(removed)
    }

    /// Cycle the accent of one circle position
    pub fn toggle_accent(&mut self, circle: usize, index: usize) -> Result<AccentState, PatternError> {
        let len = self.circles.len();
        let config = self
            .circles
            .get_mut(circle)
            .ok_or(PatternError::CircleIndexOutOfRange { index: circle, len })?;
        let subdivisions = config.subdivisions();
        config
            .pattern
            .toggle(index)
            .ok_or(PatternError::BeatIndexOutOfRange {
                index,
                len: subdivisions,
            })
    }

    pub fn polyrhythm(&self) -> &PolyrhythmPattern {
        &self.polyrhythm
    }

    pub fn set_polyrhythm(&mut self, polyrhythm: PolyrhythmPattern) {
        self.polyrhythm = polyrhythm;
    }

    /// Cycle the accent of an inner or outer polyrhythm position
    pub fn toggle_poly_accent(
        &mut self,
        timeline: TimelineId,
        index: usize,
    ) -> Result<AccentState, PatternError> {
        let pattern = match timeline {
            TimelineId::Outer => &mut self.polyrhythm.outer,
            _ => &mut self.polyrhythm.inner,
        };
        let len = pattern.len();
        pattern
            .toggle(index)
            .ok_or(PatternError::BeatIndexOutOfRange { index, len })
    }

    pub fn training(&self) -> &TrainingState {
        &self.training
    }

    pub fn set_training(&mut self, config: TrainingConfig) {
        self.training.set_config(config);
    }

    /// Tap tempo at wall-clock `now_ms`; returns the new tempo once known
    pub fn tap(&mut self, now_ms: f64) -> Option<f64> {
        let bpm = self.tap.tap(now_ms)?;
        self.apply_tempo(Tempo::clamped(bpm));
        Some(bpm)
    }

    /// Manual acceleration; returns the new tempo
    pub fn accelerate(&mut self) -> f64 {
        let bpm = self.training.manual_acceleration(self.tempo.bpm());
        self.apply_tempo(Tempo::clamped(bpm));
        self.tempo.bpm()
    }

    // ---- observation ----------------------------------------------------

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    /// Tempo measured over the last audible beats
    pub fn actual_bpm(&self) -> Option<f64> {
        self.meter.bpm()
    }

    /// Highlighted subdivision of a timeline
    pub fn indicator(&self, timeline: TimelineId) -> Option<usize> {
        self.indicators[timeline.slot()]
    }

    /// Circle currently playing in multi-circle mode
    pub fn current_circle(&self) -> usize {
        self.sequencer.current()
    }

    pub fn sequencer(&self) -> &CircleSequencer {
        &self.sequencer
    }

    pub fn scheduler(&self) -> &BeatScheduler {
        &self.scheduler
    }

    /// Audio-clock time of the last scheduled event
    pub fn last_scheduled_time(&self) -> Option<f64> {
        self.last_scheduled
    }

    /// Receive measure, silence, tempo and circle notifications
    pub fn subscribe(&mut self) -> NotificationConsumer {
        self.notifications.subscribe()
    }

    // ---- transport --------------------------------------------------------

    /// Start from beat 1 of the first circle
    pub fn start<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), AudioError> {
        if !backend.is_ready() {
            return Err(AudioError::ClockUnavailable);
        }
        if self.state != PlayState::Stopped {
            self.scheduler.release_all(backend);
        }

        let begin = backend.current_time() + self.config.start_delay;
        self.training.reset();
        self.meter.reset();
        self.sequencer.set_count(self.circles.len());
        self.sequencer.start();
        self.reset_cursors(begin);
        self.immediate_pending = false;
        self.last_scheduled = None;
        self.state = PlayState::Playing;

        log::info!("playback started: {} at {}", self.mode, self.tempo);
        Ok(())
    }

    /// Stop: release every voice, cancel pending visuals, reset session state
    pub fn stop<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) {
        self.scheduler.release_all(backend);
        self.sequencer.stop();
        self.training.reset();
        self.indicators = [None; 3];
        self.last_scheduled = None;
        if self.state != PlayState::Stopped {
            log::info!("playback stopped");
        }
        self.state = PlayState::Stopped;
    }

    /// Pause: like stop, but patterns, circle position and training counters stay
    pub fn pause<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.state != PlayState::Playing {
            return;
        }
        self.scheduler.release_all(backend);
        self.indicators = [None; 3];
        self.state = PlayState::Paused;
        log::info!("playback paused");
    }

    /// Resume at beat 1; the first beat renders without delay
    pub fn resume<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), AudioError> {
        if self.state != PlayState::Paused {
            return Ok(());
        }
        if !backend.is_ready() {
            return Err(AudioError::ClockUnavailable);
        }
        let begin = backend.current_time() + self.config.start_delay;
        self.reset_cursors(begin);
        self.immediate_pending = true;
        self.state = PlayState::Playing;
        log::info!("playback resumed");
        Ok(())
    }

    /// Apply a control command; returns false on `Quit`
    pub fn apply_command<B: AudioBackend + ?Sized>(
        &mut self,
        command: MetronomeCommand,
        backend: &mut B,
    ) -> bool {
        match command {
            MetronomeCommand::SetTempo(bpm) => {
                if let Err(e) = self.set_tempo(bpm) {
                    log::warn!("{}", e);
                }
            }
            MetronomeCommand::SetVolume(volume) => self.set_volume(volume),
            MetronomeCommand::SetMuted(muted) => self.set_muted(muted),
            MetronomeCommand::SetAnalog(analog) => self.set_analog(analog),
            MetronomeCommand::SetMode(mode) => self.set_mode(mode),
            MetronomeCommand::Tap(now_ms) => {
                self.tap(now_ms);
            }
            MetronomeCommand::Accelerate => {
                self.accelerate();
            }
            MetronomeCommand::ToggleAccent { circle, index } => {
                if let Err(e) = self.toggle_accent(circle, index) {
                    log::warn!("{}", e);
                }
            }
            MetronomeCommand::TogglePolyAccent { timeline, index } => {
                if let Err(e) = self.toggle_poly_accent(timeline, index) {
                    log::warn!("{}", e);
                }
            }
            MetronomeCommand::AddCircle(subdivisions) => match CircleConfig::new(subdivisions) {
                Ok(circle) => {
                    let index = self.add_circle(circle);
                    log::info!("circle {} added ({} subdivisions)", index, subdivisions);
                }
                Err(e) => log::warn!("{}", e),
            },
            MetronomeCommand::RemoveCircle(index) => {
                if let Err(e) = self.remove_circle(index) {
                    log::warn!("{}", e);
                }
            }
            MetronomeCommand::Start => {
                if let Err(e) = self.start(backend) {
                    log::error!("cannot start: {}", e);
                }
            }
            MetronomeCommand::Pause => self.pause(backend),
            MetronomeCommand::Resume => {
                if let Err(e) = self.resume(backend) {
                    log::error!("cannot resume: {}", e);
                }
            }
            MetronomeCommand::Stop => self.stop(backend),
            MetronomeCommand::Quit => {
                self.stop(backend);
                return false;
            }
        }
        true
    }

    // ---- scheduling loop ----------------------------------------------------

    /// One scheduler tick: schedule everything inside the look-ahead window,
    /// then fire the visual updates due at `wall_ms`.
    /// Returns the number of beats issued.
    pub fn tick<B, O>(&mut self, backend: &mut B, wall_ms: f64, observer: &mut O) -> usize
    where
        B: AudioBackend + ?Sized,
        O: BeatObserver + ?Sized,
    {
        let mut issued = 0;
        if self.state == PlayState::Playing {
            let now = backend.current_time();
            self.sequencer.update(now);
            issued = match self.mode {
                PlayMode::Single | PlayMode::MultiCircle => {
                    self.schedule_circles(backend, now, wall_ms, observer)
                }
                PlayMode::Polyrhythm => self.schedule_polyrhythm(backend, now, wall_ms, observer),
            };
        }
        self.dispatch_visuals(wall_ms, observer);
        issued
    }

    fn reset_cursors(&mut self, anchor: f64) {
        self.primary = Cursor {
            index: 0,
            next_time: anchor,
        };
        self.poly = PolyCursor {
            measure_start: anchor,
            inner: 0,
            outer: 0,
            unified_pending: true,
            measure: None,
        };
        self.indicators = [None; 3];
    }

    /// Time of the next event the current mode would schedule
    fn pending_time(&self) -> f64 {
        match self.mode {
            PlayMode::Single | PlayMode::MultiCircle => self.primary.next_time,
            PlayMode::Polyrhythm => {
                if self.poly.unified_pending {
                    return self.poly.measure_start;
                }
                if let Some(measure) = self.poly.measure {
                    return self.poly.measure_start + measure.timing.measure_duration;
                }
                let (inner_n, outer_n) = self.polyrhythm.counts();
                match PolyrhythmTiming::new(self.tempo, inner_n as u32, outer_n as u32) {
                    Ok(timing) => self.poly.measure_start + timing.measure_duration,
                    Err(_) => self.poly.measure_start,
                }
            }
        }
    }

    fn poly_measure(&mut self) -> Result<PolyMeasure, TimingError> {
        if let Some(measure) = self.poly.measure {
            return Ok(measure);
        }
        let (inner_n, outer_n) = self.polyrhythm.counts();
        let timing = PolyrhythmTiming::new(self.tempo, inner_n as u32, outer_n as u32)?;
        let measure = PolyMeasure {
            timing,
            inner_n,
            outer_n,
        };
        self.poly.measure = Some(measure);
        Ok(measure)
    }

    /// Beats that fell this far behind the clock are skipped, not replayed
    fn late_limit(&self, now: f64) -> f64 {
        now - self.config.lookahead
    }

    fn record_beat(&mut self, beat: &ScheduledBeat) {
        self.last_scheduled = Some(beat.when);
        if beat.is_audible() {
            self.meter.record(beat.when * 1000.0);
        }
    }

    fn schedule_circles<B, O>(&mut self, backend: &mut B, now: f64, wall_ms: f64, observer: &mut O) -> usize
    where
        B: AudioBackend + ?Sized,
        O: BeatObserver + ?Sized,
    {
        let multi = self.mode == PlayMode::MultiCircle;
        let factor = if multi { MULTI_CIRCLE_LOOKAHEAD_FACTOR } else { 1.0 };
        let horizon = now + self.config.lookahead * factor;
        let late_limit = self.late_limit(now);

        let mut issued = 0;
        let mut skipped = 0;

        while self.primary.next_time < horizon {
            let circle_index = if multi { self.sequencer.current() } else { 0 };
            let Some(circle) = self.circles.get(circle_index).or_else(|| self.circles.get(0)) else {
                break;
            };

            let subdivisions = circle.subdivisions();
            let index = self.primary.index % subdivisions;
            let accent = circle.pattern.accent_at(index);
            let base = self.tempo.beat_interval(circle.beat_mode);
            let interval = swung_interval(base, circle.swing(), index, subdivisions);
            let when = self.primary.next_time;

            if when < late_limit {
                skipped += 1;
            } else {
                let offset = self.jitter.offset(self.analog);
                let mut request = BeatRequest::new(TimelineId::Primary, index, accent, when + offset);
                request.silenced = self.training.should_mute(&mut self.jitter);
                request.immediate = std::mem::take(&mut self.immediate_pending);

                if let Some(beat) = self.scheduler.schedule_beat(backend, request, wall_ms) {
                    self.record_beat(&beat);
                    issued += 1;
                }
            }

            self.primary.next_time += interval;
            self.primary.index = (index + 1) % subdivisions;
            if self.primary.index == 0 {
                let boundary = self.primary.next_time;
                if boundary < late_limit {
                    log::debug!("measure at {:.3}s passed unheard", boundary);
                } else {
                    self.on_measure_boundary(boundary, now, wall_ms, observer);
                }
            }
        }

        if skipped > 0 {
            log::warn!("skipped {} late beats", skipped);
        }
        issued
    }

    fn schedule_polyrhythm<B, O>(
        &mut self,
        backend: &mut B,
        now: f64,
        wall_ms: f64,
        observer: &mut O,
    ) -> usize
    where
        B: AudioBackend + ?Sized,
        O: BeatObserver + ?Sized,
    {
        let horizon = now + self.config.lookahead;
        let late_limit = self.late_limit(now);

        let mut issued = 0;
        let mut skipped = 0;

        loop {
            let measure_start = self.poly.measure_start;

            if self.poly.unified_pending {
                if measure_start >= horizon {
                    break;
                }
                if measure_start < late_limit {
                    skipped += 2;
                } else {
                    let offset = self.jitter.offset(self.analog);
                    let silenced = self.training.should_mute(&mut self.jitter);
                    let immediate = std::mem::take(&mut self.immediate_pending);
                    let accents = (
                        self.polyrhythm.inner.accent_at(0),
                        self.polyrhythm.outer.accent_at(0),
                    );
                    if let Some(unified) = self.scheduler.schedule_unified_first_beat(
                        backend,
                        measure_start + offset,
                        accents,
                        silenced,
                        immediate,
                        wall_ms,
                    ) {
                        for beat in [unified.inner, unified.outer].into_iter().flatten() {
                            issued += 1;
                            self.last_scheduled = Some(beat.when);
                        }
                        if let Some(beat) = unified
                            .inner
                            .filter(|b| b.is_audible())
                            .or(unified.outer.filter(|b| b.is_audible()))
                        {
                            self.meter.record(beat.when * 1000.0);
                        }
                    }
                }
                self.poly.unified_pending = false;
                self.poly.inner = 1;
                self.poly.outer = 1;
                continue;
            }

            let PolyMeasure {
                timing,
                inner_n,
                outer_n,
            } = match self.poly_measure() {
                Ok(measure) => measure,
                Err(e) => {
                    log::error!("polyrhythm timing: {}", e);
                    break;
                }
            };

            let inner_at = (self.poly.inner < inner_n)
                .then(|| measure_start + self.poly.inner as f64 * timing.inner_interval);
            let outer_at = (self.poly.outer < outer_n)
                .then(|| measure_start + self.poly.outer as f64 * timing.outer_interval);

            let (timeline, index, when) = match (inner_at, outer_at) {
                (Some(i), Some(o)) if o < i => (TimelineId::Outer, self.poly.outer, o),
                (Some(i), _) => (TimelineId::Inner, self.poly.inner, i),
                (None, Some(o)) => (TimelineId::Outer, self.poly.outer, o),
                (None, None) => {
                    // Both circles done: next measure, realigned on a shared beat 1
                    let measure_end = measure_start + timing.measure_duration;
                    if measure_end >= horizon {
                        break;
                    }
                    self.poly = PolyCursor {
                        measure_start: measure_end,
                        inner: 0,
                        outer: 0,
                        unified_pending: true,
                        measure: None,
                    };
                    if measure_end < late_limit {
                        log::debug!("measure at {:.3}s passed unheard", measure_end);
                    } else {
                        self.on_measure_boundary(measure_end, now, wall_ms, observer);
                    }
                    continue;
                }
            };

            if when >= horizon {
                break;
            }

            if when < late_limit {
                skipped += 1;
            } else {
                let accent = match timeline {
                    TimelineId::Outer => self.polyrhythm.outer.accent_at(index),
                    _ => self.polyrhythm.inner.accent_at(index),
                };
                let offset = self.jitter.offset(self.analog);
                let mut request = BeatRequest::new(timeline, index, accent, when + offset);
                request.silenced = self.training.should_mute(&mut self.jitter);

                if let Some(beat) = self.scheduler.schedule_beat(backend, request, wall_ms) {
                    self.record_beat(&beat);
                    issued += 1;
                }
            }

            match timeline {
                TimelineId::Outer => self.poly.outer += 1,
                _ => self.poly.inner += 1,
            }
        }

        if skipped > 0 {
            log::warn!("skipped {} late beats", skipped);
        }
        issued
    }

    fn on_measure_boundary<O: BeatObserver + ?Sized>(
        &mut self,
        boundary: f64,
        now: f64,
        wall_ms: f64,
        observer: &mut O,
    ) {
        let outcome = self.training.on_measure_boundary(self.tempo.bpm());
        let timestamp = wall_ms + (boundary - now) * 1000.0;

        self.notifications.publish(Notification::measure(
            outcome.measure_index,
            outcome.is_silent,
            timestamp,
            self.mode,
        ));
        if let Some(is_silent) = outcome.silence_changed {
            self.notifications.publish(Notification::SilencePhaseChanged {
                is_silent,
                timestamp,
            });
        }
        if let Some(bpm) = outcome.new_tempo {
            self.apply_tempo(Tempo::clamped(bpm));
        }

        if self.mode == PlayMode::MultiCircle
            && let Some(transition) = self.sequencer.advance(boundary)
        {
            log::debug!(
                "circle {} -> {}{}",
                transition.from,
                transition.to,
                if transition.cycle_complete { " (cycle complete)" } else { "" }
            );
            observer.on_circle_change(transition);
            self.notifications
                .publish(Notification::CircleChanged(transition));
        }
    }

    fn dispatch_visuals<O: BeatObserver + ?Sized>(&mut self, wall_ms: f64, observer: &mut O) {
        for update in self.scheduler.visuals_mut().poll(wall_ms) {
            match update {
                VisualUpdate::Beat { timeline, index } => {
                    self.show_beat(timeline, index, wall_ms, observer);
                }
                VisualUpdate::UnifiedFirstBeat => {
                    self.show_beat(TimelineId::Inner, 0, wall_ms, observer);
                    self.show_beat(TimelineId::Outer, 0, wall_ms, observer);
                }
                VisualUpdate::Clear { timeline, index } => {
                    let slot = &mut self.indicators[timeline.slot()];
                    if *slot == Some(index) {
                        *slot = None;
                        observer.on_subdivision(timeline, None);
                    }
                }
            }
        }
    }

    fn show_beat<O: BeatObserver + ?Sized>(
        &mut self,
        timeline: TimelineId,
        index: usize,
        wall_ms: f64,
        observer: &mut O,
    ) {
        self.indicators[timeline.slot()] = Some(index);
        observer.on_subdivision(timeline, Some(index));
        observer.on_beat_triggered(timeline, index);

        if self.mode == PlayMode::Polyrhythm && self.highlight_duration > 0.0 {
            self.scheduler.visuals_mut().schedule(
                wall_ms + self.highlight_duration * 1000.0,
                VisualUpdate::Clear { timeline, index },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OfflineBackend;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use ringbuf::traits::Consumer;

    #[derive(Default)]
    struct Recorder {
        subdivisions: Vec<(TimelineId, Option<usize>)>,
        triggered: Vec<(TimelineId, usize)>,
        circles: Vec<CircleTransition>,
    }

    impl BeatObserver for Recorder {
        fn on_subdivision(&mut self, timeline: TimelineId, index: Option<usize>) {
            self.subdivisions.push((timeline, index));
        }

        fn on_beat_triggered(&mut self, timeline: TimelineId, index: usize) {
            self.triggered.push((timeline, index));
        }

        fn on_circle_change(&mut self, transition: CircleTransition) {
            self.circles.push(transition);
        }
    }

    fn metronome() -> Metronome {
        Metronome::new(ClickBank::synthesized(48000))
            .with_jitter(AnalogJitter::with_rng(StdRng::seed_from_u64(42)))
    }

    /// Run the loop for `seconds` of audio time, one tick per 4 ms
    fn run(m: &mut Metronome, backend: &mut OfflineBackend, seconds: f64, observer: &mut Recorder) {
        let steps = (seconds / backend.tick()).round() as usize;
        for _ in 0..steps {
            backend.step();
            let wall_ms = backend.current_time() * 1000.0;
            m.tick(backend, wall_ms, observer);
        }
    }

    #[test]
    fn test_single_mode_beat_spacing() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();
        m.set_tempo(120.0).unwrap();
        m.start(&mut backend).unwrap();
        run(&mut m, &mut backend, 2.0, &mut Recorder::default());

        let starts: Vec<f64> = backend.started().iter().map(|s| s.when).collect();
        assert!(starts.len() >= 4);
        for pair in starts.windows(2) {
            assert!((pair[1] - pair[0] - 0.5).abs() < 1e-9);
        }
        // First beat after the start delay
        assert!((starts[0] - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_never_schedules_in_past() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();
        m.set_analog(true);
        m.start(&mut backend).unwrap();
        run(&mut m, &mut backend, 3.0, &mut Recorder::default());

        for s in backend.started() {
            assert!(s.when > s.issued_at);
        }
    }

    #[test]
    fn test_visuals_fire_and_measures_notify() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();
        let mut rx = m.subscribe();
        let mut recorder = Recorder::default();

        m.start(&mut backend).unwrap();
        run(&mut m, &mut backend, 2.2, &mut recorder);

        // Default circle has 4 beats at 120 BPM: one measure every 2s
        let indices: Vec<usize> = recorder.triggered.iter().map(|(_, i)| *i).collect();
        assert_eq!(&indices[..4], &[0, 1, 2, 3]);

        let mut measures = Vec::new();
        while let Some(n) = rx.try_pop() {
            if let Notification::Measure(m) = n {
                measures.push(m);
            }
        }
        assert_eq!(measures.len(), 1);
        assert_eq!(measures[0].measure_index, 1);
        assert_eq!(measures[0].mode, PlayMode::Single);
        assert!(!measures[0].is_silent);
    }

    #[test]
    fn test_muted_accent_advances_and_updates_visuals() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();
        m.toggle_accent(0, 1).unwrap(); // normal -> accented
        m.toggle_accent(0, 1).unwrap(); // accented -> muted
        assert_eq!(m.circles().get(0).unwrap().pattern.accent_at(1), AccentState::Muted);

        let mut recorder = Recorder::default();
        m.start(&mut backend).unwrap();
        run(&mut m, &mut backend, 1.9, &mut recorder);

        // Beat 1 silent but still highlighted; 3 of 4 beats sounded
        assert!(recorder.triggered.contains(&(TimelineId::Primary, 1)));
        assert_eq!(backend.started().len(), 3);
    }

    #[test]
    fn test_stop_cancels_everything() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();
        let mut recorder = Recorder::default();
        m.start(&mut backend).unwrap();
        run(&mut m, &mut backend, 0.3, &mut recorder);
        assert!(!m.scheduler().visuals().is_empty() || !m.scheduler().active_voices().is_empty());

        m.stop(&mut backend);
        assert!(m.scheduler().visuals().is_empty());
        assert!(m.scheduler().active_voices().is_empty());
        assert_eq!(backend.active_voices(), 0);

        let before = backend.started().len();
        let seen = recorder.triggered.len();
        run(&mut m, &mut backend, 2.0, &mut recorder);
        assert_eq!(backend.started().len(), before);
        assert_eq!(recorder.triggered.len(), seen);
    }

    #[test]
    fn test_pause_resume_renders_first_beat_immediately() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();
        let mut recorder = Recorder::default();
        m.start(&mut backend).unwrap();
        run(&mut m, &mut backend, 0.8, &mut recorder);

        m.pause(&mut backend);
        assert_eq!(m.state(), PlayState::Paused);
        backend.advance(5.0);

        m.resume(&mut backend).unwrap();
        let now_ms = backend.current_time() * 1000.0;
        let mut after = Recorder::default();
        m.tick(&mut backend, now_ms, &mut after);

        // Same tick: index 0 shown with no audio-relative delay
        assert_eq!(after.triggered.first(), Some(&(TimelineId::Primary, 0)));
    }

    #[test]
    fn test_swing_alternates_intervals() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();
        m.circle_mut(0).unwrap().set_swing(0.2);
        m.start(&mut backend).unwrap();
        run(&mut m, &mut backend, 2.0, &mut Recorder::default());

        let starts: Vec<f64> = backend.started().iter().map(|s| s.when).collect();
        assert!((starts[1] - starts[0] - 0.6).abs() < 1e-9);
        assert!((starts[2] - starts[1] - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_tap_and_accelerate_change_tempo() {
        let mut m = metronome();
        let mut rx = m.subscribe();
        assert_eq!(m.tap(0.0), None);
        assert_eq!(m.tap(600.0), Some(100.0));
        assert_eq!(m.tempo().bpm(), 100.0);
        assert_eq!(m.accelerate(), 105.0);
        assert_eq!(rx.try_pop(), Some(Notification::TempoChanged { bpm: 100.0 }));
        assert_eq!(rx.try_pop(), Some(Notification::TempoChanged { bpm: 105.0 }));
    }

    #[test]
    fn test_remove_last_circle_fails() {
        let mut m = metronome();
        assert_eq!(m.remove_circle(0), Err(PatternError::LastCircle));
        let idx = m.add_circle(CircleConfig::new(3).unwrap());
        assert_eq!(idx, 1);
        assert_eq!(m.sequencer().count(), 2);
        assert!(m.remove_circle(1).is_ok());
        assert_eq!(m.sequencer().count(), 1);
    }

    #[test]
    fn test_toggle_accent_errors() {
        let mut m = metronome();
        assert_eq!(
            m.toggle_accent(4, 0),
            Err(PatternError::CircleIndexOutOfRange { index: 4, len: 1 })
        );
        assert_eq!(
            m.toggle_accent(0, 9),
            Err(PatternError::BeatIndexOutOfRange { index: 9, len: 4 })
        );
    }

    #[test]
    fn test_apply_quit_stops() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();
        m.start(&mut backend).unwrap();
        assert!(m.apply_command(MetronomeCommand::SetTempo(90.0), &mut backend));
        assert_eq!(m.tempo().bpm(), 90.0);
        assert!(!m.apply_command(MetronomeCommand::Quit, &mut backend));
        assert_eq!(m.state(), PlayState::Stopped);
    }

    #[test]
    fn test_apply_start_after_stop() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();
        m.start(&mut backend).unwrap();
        run(&mut m, &mut backend, 0.3, &mut Recorder::default());
        assert!(m.apply_command(MetronomeCommand::Stop, &mut backend));
        assert_eq!(m.state(), PlayState::Stopped);

        backend.take_started();
        assert!(m.apply_command(MetronomeCommand::Start, &mut backend));
        assert!(m.is_playing());
        run(&mut m, &mut backend, 0.3, &mut Recorder::default());
        assert_eq!(backend.started().len(), 1);
    }

    #[test]
    fn test_apply_circle_and_poly_accent_commands() {
        let mut backend = OfflineBackend::default();
        let mut m = metronome();

        assert!(m.apply_command(MetronomeCommand::AddCircle(3), &mut backend));
        assert_eq!(m.circles().len(), 2);
        assert_eq!(m.circles().get(1).unwrap().subdivisions(), 3);
        assert_eq!(m.sequencer().count(), 2);

        // Zero subdivisions and the last circle are refused without quitting
        assert!(m.apply_command(MetronomeCommand::AddCircle(0), &mut backend));
        assert_eq!(m.circles().len(), 2);
        assert!(m.apply_command(MetronomeCommand::RemoveCircle(0), &mut backend));
        assert!(m.apply_command(MetronomeCommand::RemoveCircle(0), &mut backend));
        assert_eq!(m.circles().len(), 1);
        assert_eq!(m.circles().get(0).unwrap().subdivisions(), 3);

        let command = MetronomeCommand::TogglePolyAccent {
            timeline: TimelineId::Outer,
            index: 2,
        };
        assert!(m.apply_command(command, &mut backend));
        assert_eq!(m.polyrhythm().outer.accent_at(2), AccentState::Accented);
    }

    #[test]
    fn test_start_requires_ready_backend() {
        let mut backend = OfflineBackend::default();
        backend.set_ready(false);
        let mut m = metronome();
        assert!(matches!(m.start(&mut backend), Err(AudioError::ClockUnavailable)));
        assert_eq!(m.state(), PlayState::Stopped);
    }
}
