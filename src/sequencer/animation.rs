// Animation sync - Audio clock to wall clock
// Visual beat updates are deferred so the animation peak lands on the click

use serde::{Deserialize, Serialize};

/// Assumed length of a beat indicator animation (seconds)
pub const DEFAULT_ANIMATION_DURATION: f64 = 0.150;
/// Assumed delay between a state change and the next rendered frame (seconds)
pub const DEFAULT_RENDER_DELAY: f64 = 0.016;
/// How long a polyrhythm beat stays highlighted before it is cleared (seconds)
pub const DEFAULT_HIGHLIGHT_DURATION: f64 = 0.040;

/// Independent beat timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineId {
    /// The single circle, or the active circle in multi-circle mode
    Primary,
    /// Polyrhythm inner circle
    Inner,
    /// Polyrhythm outer circle
    Outer,
}

impl TimelineId {
    pub const ALL: [TimelineId; 3] = [TimelineId::Primary, TimelineId::Inner, TimelineId::Outer];

    pub fn slot(&self) -> usize {
        match self {
            TimelineId::Primary => 0,
            TimelineId::Inner => 1,
            TimelineId::Outer => 2,
        }
    }
}

/// Deferred change to the visual beat indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualUpdate {
    /// Highlight `index` on `timeline`
    Beat { timeline: TimelineId, index: usize },
    /// Highlight index 0 on both polyrhythm timelines at once
    UnifiedFirstBeat,
    /// Remove the highlight from `timeline` if it still shows `index`
    Clear { timeline: TimelineId, index: usize },
}

/// Handle to a deferred task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

#[derive(Debug, Clone)]
struct DeferredTask<T> {
    id: TaskId,
    due_ms: f64,
    payload: T,
}

/// Cancellable one-shot tasks keyed on wall-clock milliseconds.
///
/// Nothing runs by itself: the owner polls with the current wall time and
/// receives every payload that became due, oldest deadline first.
#[derive(Debug, Clone)]
pub struct DeferredQueue<T> {
    tasks: Vec<DeferredTask<T>>,
    next_id: u64,
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule `payload` to fire once the wall clock reaches `due_ms`
    pub fn schedule(&mut self, due_ms: f64, payload: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.push(DeferredTask {
            id,
            due_ms,
            payload,
        });
        id
    }

    /// Cancel one task; returns false if it already fired or was cancelled
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Cancel every pending task; returns how many were dropped
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.tasks.len();
        self.tasks.clear();
        dropped
    }

    /// Remove and return the payloads due at `now_ms`, ordered by deadline
    /// (ties keep scheduling order)
    pub fn poll(&mut self, now_ms: f64) -> Vec<T> {
        if !self.tasks.iter().any(|t| t.due_ms <= now_ms) {
            return Vec::new();
        }

        let mut due = Vec::new();
        let mut pending = Vec::with_capacity(self.tasks.len());
        for task in self.tasks.drain(..) {
            if task.due_ms <= now_ms {
                due.push(task);
            } else {
                pending.push(task);
            }
        }
        self.tasks = pending;

        due.sort_by(|a, b| a.due_ms.total_cmp(&b.due_ms).then(a.id.cmp(&b.id)));
        due.into_iter().map(|t| t.payload).collect()
    }

    /// Earliest pending deadline
    pub fn next_due(&self) -> Option<f64> {
        self.tasks.iter().map(|t| t.due_ms).min_by(|a, b| a.total_cmp(b))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts audio-clock trigger times into wall-clock delays for visual updates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationSync {
    /// Animation duration in seconds
    pub animation_duration: f64,
    /// Render delay in seconds
    pub render_delay: f64,
}

impl AnimationSync {
    pub fn new(animation_duration: f64, render_delay: f64) -> Self {
        Self {
            animation_duration: animation_duration.max(0.0),
            render_delay: render_delay.max(0.0),
        }
    }

    /// Wall-clock delay (ms) before a visual update for a click at `trigger_time`,
    /// started early by half the animation and by the render delay.
    /// Never negative.
    pub fn delay_ms(&self, trigger_time: f64, current_time: f64) -> f64 {
        let delay = (trigger_time - current_time) * 1000.0
            - self.animation_duration * 1000.0 / 2.0
            - self.render_delay * 1000.0;
        delay.max(0.0)
    }

    /// Same as `delay_ms`, but `immediate` bypasses the delay entirely
    /// (first beat after resume)
    pub fn visual_delay_ms(&self, trigger_time: f64, current_time: f64, immediate: bool) -> f64 {
        if immediate {
            0.0
        } else {
            self.delay_ms(trigger_time, current_time)
        }
    }

    /// Queue `update` so it fires in step with the click at `trigger_time`
    pub fn schedule<T>(
        &self,
        queue: &mut DeferredQueue<T>,
        wall_now_ms: f64,
        trigger_time: f64,
        current_time: f64,
        immediate: bool,
        update: T,
    ) -> TaskId {
        let delay = self.visual_delay_ms(trigger_time, current_time, immediate);
        queue.schedule(wall_now_ms + delay, update)
    }
}

impl Default for AnimationSync {
    fn default() -> Self {
        Self::new(DEFAULT_ANIMATION_DURATION, DEFAULT_RENDER_DELAY)
    }
}
