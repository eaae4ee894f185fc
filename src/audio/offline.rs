// Offline backend - fake audio clock
// Records every started source instead of playing it; time only moves when told to

use super::{AudioBackend, AudioError, ClickBuffer, VoiceId};

/// One recorded `start_source` call
#[derive(Debug, Clone, PartialEq)]
pub struct StartedSource {
    pub voice: VoiceId,
    /// Absolute start time requested from the backend
    pub when: f64,
    pub gain: f32,
    /// Clock time at which the start was issued
    pub issued_at: f64,
    pub duration: f64,
}

/// Deterministic backend with a manually advanced clock.
///
/// Like a browser audio context, it refuses start times in the past.
#[derive(Debug, Clone)]
pub struct OfflineBackend {
    now: f64,
    tick: f64,
    ready: bool,
    fail_starts: bool,
    next_voice: u64,
    started: Vec<StartedSource>,
    released: Vec<VoiceId>,
}

impl OfflineBackend {
    /// Clock starting at 0 that moves `tick` seconds per `step()`
    pub fn new(tick: f64) -> Self {
        Self {
            now: 0.0,
            tick,
            ready: true,
            fail_starts: false,
            next_voice: 0,
            started: Vec::new(),
            released: Vec::new(),
        }
    }

    /// Advance the clock by one tick
    pub fn step(&mut self) -> f64 {
        self.now += self.tick;
        self.now
    }

    pub fn advance(&mut self, seconds: f64) -> f64 {
        self.now += seconds;
        self.now
    }

    pub fn set_time(&mut self, seconds: f64) {
        self.now = seconds;
    }

    pub fn tick(&self) -> f64 {
        self.tick
    }

    /// Simulate a closed or missing audio context
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Make every following `start_source` call fail
    pub fn set_fail_starts(&mut self, fail: bool) {
        self.fail_starts = fail;
    }

    pub fn started(&self) -> &[StartedSource] {
        &self.started
    }

    pub fn released(&self) -> &[VoiceId] {
        &self.released
    }

    /// Drain the recorded starts
    pub fn take_started(&mut self) -> Vec<StartedSource> {
        std::mem::take(&mut self.started)
    }

    /// Voices started and neither released nor finished
    pub fn active_voices(&self) -> usize {
        self.started
            .iter()
            .filter(|s| self.is_playing(s.voice))
            .count()
    }
}

impl Default for OfflineBackend {
    fn default() -> Self {
        // Browser-like 4 ms polling step
        Self::new(0.004)
    }
}

impl AudioBackend for OfflineBackend {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn current_time(&self) -> f64 {
        self.now
    }

    fn start_source(
        &mut self,
        buffer: &ClickBuffer,
        gain: f32,
        when: f64,
    ) -> Result<VoiceId, AudioError> {
        if !self.ready {
            return Err(AudioError::ClockUnavailable);
        }
        if self.fail_starts {
            return Err(AudioError::VoiceStart("offline backend set to fail".into()));
        }
        if when < self.now {
            return Err(AudioError::StartInPast {
                when,
                now: self.now,
            });
        }

        let voice = VoiceId(self.next_voice);
        self.next_voice += 1;
        self.started.push(StartedSource {
            voice,
            when,
            gain,
            issued_at: self.now,
            duration: buffer.duration_seconds(),
        });
        Ok(voice)
    }

    fn is_playing(&self, voice: VoiceId) -> bool {
        if self.released.contains(&voice) {
            return false;
        }
        self.started
            .iter()
            .find(|s| s.voice == voice)
            .is_some_and(|s| self.now < s.when + s.duration)
    }

    fn release(&mut self, voice: VoiceId) {
        if !self.released.contains(&voice) {
            self.released.push(voice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click() -> ClickBuffer {
        ClickBuffer::new(vec![0.5; 480], 48000)
    }

    #[test]
    fn test_clock_steps() {
        let mut backend = OfflineBackend::new(0.004);
        assert_eq!(backend.current_time(), 0.0);
        backend.step();
        backend.step();
        assert!((backend.current_time() - 0.008).abs() < 1e-12);
        backend.advance(1.0);
        assert!((backend.current_time() - 1.008).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_past_start() {
        let mut backend = OfflineBackend::default();
        backend.set_time(1.0);
        let err = backend.start_source(&click(), 1.0, 0.5).unwrap_err();
        assert!(matches!(err, AudioError::StartInPast { .. }));
        assert!(backend.start_source(&click(), 1.0, 1.0).is_ok());
    }

    #[test]
    fn test_voice_lifecycle() {
        let mut backend = OfflineBackend::default();
        let voice = backend.start_source(&click(), 0.8, 0.1).unwrap();
        assert!(backend.is_playing(voice));
        assert_eq!(backend.active_voices(), 1);

        // 480 samples at 48kHz = 10ms
        backend.set_time(0.2);
        assert!(!backend.is_playing(voice));

        let other = backend.start_source(&click(), 0.8, 0.3).unwrap();
        backend.release(other);
        assert!(!backend.is_playing(other));
        assert_eq!(backend.released(), &[other]);
    }

    #[test]
    fn test_not_ready_refuses_starts() {
        let mut backend = OfflineBackend::default();
        backend.set_ready(false);
        assert!(matches!(
            backend.start_source(&click(), 1.0, 0.1),
            Err(AudioError::ClockUnavailable)
        ));
    }
}
