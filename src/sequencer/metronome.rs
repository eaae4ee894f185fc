// Metronome - Beat scheduler
// Issues clicks at absolute audio-clock times and queues the matching visual updates

use crate::audio::{AudioBackend, AudioError, ClickBank, ClickSound, VoiceId};
use crate::sequencer::animation::{AnimationSync, DeferredQueue, TaskId, TimelineId, VisualUpdate};
use crate::sequencer::pattern::AccentState;

/// Forward nudge for start times that are already due (1 ms)
pub const PAST_DUE_EPSILON: f64 = 0.001;

/// Pick the sound for a subdivision.
///
/// A muted accent never sounds. Index 0 uses the first-beat sound when the
/// bank has one; otherwise the accent decides. A first-beat accent without a
/// first-beat buffer falls back to the accent sound.
pub fn select_sound(index: usize, accent: AccentState, bank: &ClickBank) -> Option<ClickSound> {
    match accent {
        AccentState::Muted => None,
        _ if index == 0 && bank.has(ClickSound::First) => Some(ClickSound::First),
        AccentState::Normal => Some(ClickSound::Normal),
        AccentState::Accented => Some(ClickSound::Accent),
        AccentState::FirstBeat if bank.has(ClickSound::First) => Some(ClickSound::First),
        AccentState::FirstBeat => Some(ClickSound::Accent),
    }
}

/// Start time the backend will accept: a trigger at or before `now` is
/// moved to `now + 1 ms`
#[inline]
pub fn clamp_start_time(when: f64, now: f64) -> f64 {
    if when <= now {
        now + PAST_DUE_EPSILON
    } else {
        when
    }
}

/// One subdivision to schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatRequest {
    pub timeline: TimelineId,
    pub index: usize,
    pub accent: AccentState,
    /// Absolute audio-clock time (swing and jitter already applied)
    pub when: f64,
    /// Silence this slot (training) without skipping it
    pub silenced: bool,
    /// Render the visual update without delay (first beat after resume)
    pub immediate: bool,
}

impl BeatRequest {
    pub fn new(timeline: TimelineId, index: usize, accent: AccentState, when: f64) -> Self {
        Self {
            timeline,
            index,
            accent,
            when,
            silenced: false,
            immediate: false,
        }
    }
}

/// What was issued for one subdivision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBeat {
    pub timeline: TimelineId,
    pub index: usize,
    /// Start time actually handed to the backend
    pub when: f64,
    /// None when the accent is muted
    pub sound: Option<ClickSound>,
    pub gain: f32,
    pub voice: Option<VoiceId>,
}

impl ScheduledBeat {
    /// Whether this beat can be heard
    pub fn is_audible(&self) -> bool {
        self.sound.is_some() && self.gain > 0.0
    }
}

/// Both index-0 beats of a polyrhythm, issued together
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnifiedBeat {
    pub when: f64,
    pub inner: Option<ScheduledBeat>,
    pub outer: Option<ScheduledBeat>,
    /// The single visual task shared by both timelines
    pub visual: TaskId,
}

/// Turns beat requests into backend voices and deferred visual updates
#[derive(Debug)]
pub struct BeatScheduler {
    bank: ClickBank,
    volume: f32,
    muted: bool,
    sync: AnimationSync,
    visuals: DeferredQueue<VisualUpdate>,
    active: Vec<VoiceId>,
}

impl BeatScheduler {
    pub fn new(bank: ClickBank) -> Self {
        Self {
            bank,
            volume: 0.5,
            muted: false,
            sync: AnimationSync::default(),
            visuals: DeferredQueue::new(),
            active: Vec::new(),
        }
    }

    pub fn with_sync(mut self, sync: AnimationSync) -> Self {
        self.sync = sync;
        self
    }

    pub fn bank(&self) -> &ClickBank {
        &self.bank
    }

    pub fn set_bank(&mut self, bank: ClickBank) {
        self.bank = bank;
    }

    /// Set volume (0.0 to 1.0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn sync(&self) -> &AnimationSync {
        &self.sync
    }

    pub fn visuals(&self) -> &DeferredQueue<VisualUpdate> {
        &self.visuals
    }

    pub fn visuals_mut(&mut self) -> &mut DeferredQueue<VisualUpdate> {
        &mut self.visuals
    }

    /// Voices started and not yet pruned
    pub fn active_voices(&self) -> &[VoiceId] {
        &self.active
    }

    fn gain_for(&self, silenced: bool) -> f32 {
        if self.muted || silenced {
            0.0
        } else {
            self.volume
        }
    }

    /// Schedule one subdivision and its visual update.
    ///
    /// Returns None when the beat could not be issued (backend not ready,
    /// missing buffer, start failure). The failure is logged and the caller
    /// just moves on to the next beat.
    pub fn schedule_beat<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        request: BeatRequest,
        wall_now_ms: f64,
    ) -> Option<ScheduledBeat> {
        if !backend.is_ready() {
            log::error!("schedule_beat: {}", AudioError::ClockUnavailable);
            return None;
        }
        self.prune(backend);

        let now = backend.current_time();
        let when = clamp_start_time(request.when, now);
        let beat = self.issue(
            backend,
            request.timeline,
            request.index,
            request.accent,
            when,
            request.silenced,
        )?;

        self.sync.schedule(
            &mut self.visuals,
            wall_now_ms,
            when,
            now,
            request.immediate,
            VisualUpdate::Beat {
                timeline: request.timeline,
                index: request.index,
            },
        );

        Some(beat)
    }

    /// Issue index 0 of both polyrhythm timelines at one explicit time, with a
    /// single visual task for both indicators
    pub fn schedule_unified_first_beat<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        when: f64,
        accents: (AccentState, AccentState),
        silenced: bool,
        immediate: bool,
        wall_now_ms: f64,
    ) -> Option<UnifiedBeat> {
        if !backend.is_ready() {
            log::error!("schedule_unified_first_beat: {}", AudioError::ClockUnavailable);
            return None;
        }
        self.prune(backend);

        let now = backend.current_time();
        let when = clamp_start_time(when, now);

        let inner = self.issue(backend, TimelineId::Inner, 0, accents.0, when, silenced);
        let outer = self.issue(backend, TimelineId::Outer, 0, accents.1, when, silenced);

        let visual = self.sync.schedule(
            &mut self.visuals,
            wall_now_ms,
            when,
            now,
            immediate,
            VisualUpdate::UnifiedFirstBeat,
        );

        log::debug!(
            "unified first beat at {:.4}s (clock {:.4}s): inner {:?}, outer {:?}",
            when,
            now,
            inner.map(|b| b.voice),
            outer.map(|b| b.voice)
        );

        Some(UnifiedBeat {
            when,
            inner,
            outer,
            visual,
        })
    }

    /// Start the source for an already clamped time
    fn issue<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        timeline: TimelineId,
        index: usize,
        accent: AccentState,
        when: f64,
        silenced: bool,
    ) -> Option<ScheduledBeat> {
        let Some(sound) = select_sound(index, accent, &self.bank) else {
            // Muted accent: slot kept, nothing to play
            return Some(ScheduledBeat {
                timeline,
                index,
                when,
                sound: None,
                gain: 0.0,
                voice: None,
            });
        };

        let Some(buffer) = self.bank.get(sound) else {
            log::error!("{:?} #{}: {}", timeline, index, AudioError::MissingBuffer(sound));
            return None;
        };

        let gain = self.gain_for(silenced);
        match backend.start_source(buffer, gain, when) {
            Ok(voice) => {
                self.active.push(voice);
                log::trace!(
                    "{:?} #{} {:?} at {:.4}s gain {:.2} ({})",
                    timeline,
                    index,
                    sound,
                    when,
                    gain,
                    voice
                );
                Some(ScheduledBeat {
                    timeline,
                    index,
                    when,
                    sound: Some(sound),
                    gain,
                    voice: Some(voice),
                })
            }
            Err(e) => {
                log::error!("{:?} #{} failed to sound: {}", timeline, index, e);
                None
            }
        }
    }

    /// Forget voices that finished playing
    pub fn prune<B: AudioBackend + ?Sized>(&mut self, backend: &B) {
        self.active.retain(|voice| backend.is_playing(*voice));
    }

    /// Release every active voice and cancel every pending visual update
    pub fn release_all<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) {
        for voice in self.active.drain(..) {
            backend.release(voice);
        }
        let cancelled = self.visuals.cancel_all();
        if cancelled > 0 {
            log::debug!("cancelled {} pending visual updates", cancelled);
        }
    }
}
