// Real-time output backend - CPAL callback
//
// The scheduler thread pushes voice commands into a lock-free ring buffer;
// the audio callback drains it, mixes every voice whose start sample has
// been reached, and advances the shared sample clock. Voice start times are
// resolved to the exact sample, so the audible click lands where the
// scheduler put it regardless of the callback block size.
//
// Note: on macOS (CoreAudio) the Stream is not Send, so the backend must
// stay on the thread that created it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};

use super::device::AudioDeviceManager;
use super::format_conversion::write_mono_to_interleaved_frame;
use super::timing::AudioTiming;
use super::{AudioBackend, AudioError, ClickBuffer, VoiceId};

/// Hard cap so the callback never reallocates its voice list
const MAX_VOICES: usize = 64;

/// Command queue capacity (scheduler -> callback)
const COMMAND_CAPACITY: usize = 256;

/// Commands understood by the audio callback
enum EngineCommand {
    Start {
        voice: VoiceId,
        samples: Arc<[f32]>,
        gain: f32,
        start_sample: u64,
    },
    Release(VoiceId),
}

struct ActiveVoice {
    voice: VoiceId,
    samples: Arc<[f32]>,
    gain: f32,
    start_sample: u64,
    position: usize,
}

type CommandProducer = ringbuf::HeapProd<EngineCommand>;
type CommandConsumer = ringbuf::HeapCons<EngineCommand>;

/// cpal-backed implementation of `AudioBackend`
pub struct CpalBackend {
    _device: Device,
    _stream: Stream,
    timing: AudioTiming,
    commands: CommandProducer,
    healthy: Arc<AtomicBool>,
    next_voice: u64,
    /// Voice -> sample index after its last sample
    voice_ends: HashMap<VoiceId, u64>,
}

impl CpalBackend {
    /// Open the named output device (or the default one) and start the stream
    pub fn new(device_name: Option<&str>) -> Result<Self, AudioError> {
        let manager = AudioDeviceManager::new();
        let device = manager.output_device(device_name)?;

        log::info!(
            "audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device.default_output_config()?;
        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        log::info!(
            "audio config: {} Hz, {} channels, {:?}",
            sample_rate,
            channels,
            sample_format
        );

        let timing = AudioTiming::new(sample_rate);
        let healthy = Arc::new(AtomicBool::new(true));
        let (commands, command_rx) = HeapRb::<EngineCommand>::new(COMMAND_CAPACITY).split();

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &config,
                channels,
                command_rx,
                timing.clone(),
                Arc::clone(&healthy),
            ),
            SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &config,
                channels,
                command_rx,
                timing.clone(),
                Arc::clone(&healthy),
            ),
            SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &config,
                channels,
                command_rx,
                timing.clone(),
                Arc::clone(&healthy),
            ),
            other => {
                return Err(AudioError::UnsupportedSampleFormat(format!("{:?}", other)));
            }
        }?;

        stream.play()?;

        Ok(Self {
            _device: device,
            _stream: stream,
            timing,
            commands,
            healthy,
            next_voice: 0,
            voice_ends: HashMap::new(),
        })
    }

    /// Device sample rate; click sounds should be rendered at this rate
    pub fn sample_rate(&self) -> u32 {
        self.timing.sample_rate()
    }

    /// Shared clock (for diagnostics)
    pub fn timing(&self) -> AudioTiming {
        self.timing.clone()
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        mut command_rx: CommandConsumer,
        timing: AudioTiming,
        healthy: Arc<AtomicBool>,
    ) -> Result<Stream, AudioError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let mut voices: Vec<ActiveVoice> = Vec::with_capacity(MAX_VOICES);
        let channels = channels.max(1);

        let err_healthy = Arc::clone(&healthy);
        let err_fn = move |err: cpal::StreamError| {
            log::error!("audio stream error: {}", err);
            err_healthy.store(false, Ordering::Relaxed);
        };

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // No allocations, no I/O, no locks in here

                while let Some(cmd) = command_rx.try_pop() {
                    match cmd {
                        EngineCommand::Start {
                            voice,
                            samples,
                            gain,
                            start_sample,
                        } => {
                            if voices.len() < MAX_VOICES {
                                voices.push(ActiveVoice {
                                    voice,
                                    samples,
                                    gain,
                                    start_sample,
                                    position: 0,
                                });
                            }
                        }
                        EngineCommand::Release(voice) => {
                            voices.retain(|v| v.voice != voice);
                        }
                    }
                }

                let block_start = timing.current_sample();
                let mut frames = 0usize;

                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    let now = block_start + i as u64;
                    let mut mixed = 0.0f32;

                    for v in voices.iter_mut() {
                        if now >= v.start_sample && v.position < v.samples.len() {
                            mixed += v.samples[v.position] * v.gain;
                            v.position += 1;
                        }
                    }

                    write_mono_to_interleaved_frame(mixed, frame);
                    frames += 1;
                }

                voices.retain(|v| v.position < v.samples.len());
                timing.advance(frames);
            },
            err_fn,
            None,
        )?;

        Ok(stream)
    }
}

impl AudioBackend for CpalBackend {
    fn is_ready(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    fn current_time(&self) -> f64 {
        self.timing.current_time()
    }

    fn start_source(
        &mut self,
        buffer: &ClickBuffer,
        gain: f32,
        when: f64,
    ) -> Result<VoiceId, AudioError> {
        if !self.is_ready() {
            return Err(AudioError::ClockUnavailable);
        }

        let now = self.timing.current_sample();
        let start_sample = self.timing.seconds_to_samples(when);
        if start_sample < now {
            return Err(AudioError::StartInPast {
                when,
                now: self.timing.samples_to_seconds(now),
            });
        }

        let voice = VoiceId(self.next_voice);
        let command = EngineCommand::Start {
            voice,
            samples: buffer.shared_samples(),
            gain: gain.clamp(0.0, 1.0),
            start_sample,
        };
        if self.commands.try_push(command).is_err() {
            return Err(AudioError::VoiceStart("command queue full".into()));
        }
        self.next_voice += 1;

        // Forget voices that have finished playing
        self.voice_ends.retain(|_, end| *end > now);
        self.voice_ends
            .insert(voice, start_sample + buffer.len() as u64);

        Ok(voice)
    }

    fn is_playing(&self, voice: VoiceId) -> bool {
        self.voice_ends
            .get(&voice)
            .is_some_and(|end| *end > self.timing.current_sample())
    }

    fn release(&mut self, voice: VoiceId) {
        if self.voice_ends.remove(&voice).is_some()
            && self.commands.try_push(EngineCommand::Release(voice)).is_err()
        {
            log::warn!("command queue full, {} will play out", voice);
        }
    }
}
