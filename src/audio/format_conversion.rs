// Format conversion for CPAL output streams
//
// Clicks are mixed in mono f32, then written to every channel of the
// device frame in whatever sample format the device asked for.

use cpal::{FromSample, Sample};

/// Keep overlapping clicks inside [-1, 1]
#[inline]
pub fn clamp_mix(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Write one mono sample to all channels of an interleaved frame
#[inline]
pub fn write_mono_to_interleaved_frame<T>(internal_sample: f32, output_frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    let value: T = Sample::from_sample::<f32>(clamp_mix(internal_sample));
    for channel_sample in output_frame.iter_mut() {
        *channel_sample = value;
    }
}
