// Audio clock shared between the scheduler and the real-time callback

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sample-position clock
///
/// The audio callback advances it; the scheduler reads it as absolute seconds.
#[derive(Clone, Debug)]
pub struct AudioTiming {
    /// Current sample position (incremented by audio callback)
    sample_position: Arc<AtomicU64>,
    /// Sample rate (for timestamp conversions)
    sample_rate: f64,
}

impl AudioTiming {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate as f64,
        }
    }

    /// Get current sample position (first sample of the next rendered block)
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Advance sample position (called from audio callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::Release);
    }

    /// Current clock time in seconds
    pub fn current_time(&self) -> f64 {
        self.samples_to_seconds(self.current_sample())
    }

    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    /// Absolute time to the nearest sample; negative times map to 0
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        if seconds <= 0.0 {
            return 0;
        }
        (seconds * self.sample_rate).round() as u64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }
}
