// Circle sequencer - Which circle plays next in multi-circle mode
// Strict successor order; three or more circles get a lockout between transitions

/// Minimum time between two accepted transitions with three or more circles (seconds)
pub const TRANSITION_LOCKOUT_SECONDS: f64 = 0.5;

/// Successor of `current` among `count` circles.
///
/// Two circles alternate, three rotate through a fixed table, any other
/// count uses modular increment.
pub fn next_circle(current: usize, count: usize) -> usize {
    match count {
        0 | 1 => 0,
        2 => 1 - current % 2,
        3 => [1, 2, 0][current % 3],
        n => (current + 1) % n,
    }
}

/// Lockout sub-state while transitioning
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lockout {
    /// Further transitions refused until the clock reaches `until`
    Active { until: f64 },
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SequencerState {
    Idle,
    Transitioning(Lockout),
}

/// An accepted move to the next circle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircleTransition {
    pub from: usize,
    pub to: usize,
    /// True exactly when moving from the last circle back to the first
    pub cycle_complete: bool,
}

/// State machine over circle indices `0..count`
#[derive(Debug, Clone)]
pub struct CircleSequencer {
    count: usize,
    current: usize,
    state: SequencerState,
    lockout: f64,
    cycle_complete: bool,
    completed_cycles: u64,
    last_accepted: Option<f64>,
}

impl CircleSequencer {
    pub fn new(count: usize) -> Self {
        Self {
            count: count.max(1),
            current: 0,
            state: SequencerState::Idle,
            lockout: TRANSITION_LOCKOUT_SECONDS,
            cycle_complete: false,
            completed_cycles: 0,
            last_accepted: None,
        }
    }

    /// Override the lockout window (seconds)
    pub fn with_lockout(mut self, seconds: f64) -> Self {
        self.lockout = seconds.max(0.0);
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SequencerState::Idle)
    }

    /// Whether the last accepted transition closed a full cycle
    pub fn cycle_complete(&self) -> bool {
        self.cycle_complete
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles
    }

    /// The circle that would play after the current one
    pub fn successor(&self) -> usize {
        next_circle(self.current, self.count)
    }

    /// Begin playback on circle 0
    pub fn start(&mut self) {
        self.current = 0;
        self.cycle_complete = false;
        self.completed_cycles = 0;
        self.last_accepted = None;
        self.state = SequencerState::Transitioning(Lockout::Released);
    }

    /// Back to idle; a running lockout is discarded
    pub fn stop(&mut self) {
        self.current = 0;
        self.cycle_complete = false;
        self.last_accepted = None;
        self.state = SequencerState::Idle;
    }

    /// Circle count changed (circle added or removed)
    pub fn set_count(&mut self, count: usize) {
        self.count = count.max(1);
        if self.current >= self.count {
            self.current = 0;
        }
    }

    /// Release the lockout once the clock passes its end
    pub fn update(&mut self, now: f64) {
        if let SequencerState::Transitioning(Lockout::Active { until }) = self.state
            && now >= until
        {
            self.state = SequencerState::Transitioning(Lockout::Released);
        }
    }

    /// Request a move to `requested` at audio-clock time `now`.
    ///
    /// Refused while idle or locked out. Two circles have no lockout and
    /// alternate on every measure; only a repeated request for a time already
    /// handled is refused. Any target other than the successor is corrected
    /// to the successor.
    pub fn request_transition(&mut self, requested: usize, now: f64) -> Option<CircleTransition> {
        self.update(now);
        let alternating = self.count == 2;

        match self.state {
            SequencerState::Idle => {
                log::debug!("transition to {} ignored: sequencer idle", requested);
                return None;
            }
            SequencerState::Transitioning(_)
                if alternating && self.last_accepted.is_some_and(|last| now <= last) =>
            {
                log::debug!("transition to {} refused: boundary already handled", requested);
                return None;
            }
            SequencerState::Transitioning(Lockout::Active { until }) if !alternating => {
                log::debug!(
                    "transition to {} refused: locked out for {:.0} ms",
                    requested,
                    (until - now) * 1000.0
                );
                return None;
            }
            SequencerState::Transitioning(_) => {}
        }

        let from = self.current;
        let to = self.successor();
        if requested != to {
            log::debug!("transition target {} corrected to {}", requested, to);
        }

        self.cycle_complete = from == self.count - 1 && to == 0;
        if self.cycle_complete {
            self.completed_cycles += 1;
        }
        self.current = to;
        self.last_accepted = Some(now);
        self.state = if alternating {
            SequencerState::Transitioning(Lockout::Released)
        } else {
            SequencerState::Transitioning(Lockout::Active {
                until: now + self.lockout,
            })
        };

        Some(CircleTransition {
            from,
            to,
            cycle_complete: self.cycle_complete,
        })
    }

    /// Request the successor itself
    pub fn advance(&mut self, now: f64) -> Option<CircleTransition> {
        let next = self.successor();
        self.request_transition(next, now)
    }
}

impl Default for CircleSequencer {
    fn default() -> Self {
        Self::new(1)
    }
}
