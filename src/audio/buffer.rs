// Click buffers - the three metronome sounds
// Synthesized by default, or loaded from a sound set directory of WAV files

use std::f32::consts::PI;
use std::path::Path;
use std::sync::Arc;

use super::AudioError;

/// Which metronome sound a beat uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickSound {
    /// Downbeat (index 0 of a bar)
    First,
    /// Accented subdivision
    Accent,
    /// Regular subdivision
    Normal,
}

impl ClickSound {
    /// File name inside a sound set directory
    pub fn file_name(&self) -> &'static str {
        match self {
            ClickSound::First => "first.wav",
            ClickSound::Accent => "accent.wav",
            ClickSound::Normal => "normal.wav",
        }
    }
}

/// Immutable mono sample data, cheap to clone and share with the audio thread
#[derive(Debug, Clone, PartialEq)]
pub struct ClickBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl ClickBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle on the sample data
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Short sine click with exponential decay
    pub fn synthesize(sample_rate: u32, frequency: f32, amplitude: f32) -> Self {
        let num_samples = ((ClickBank::CLICK_DURATION_MS / 1000.0) * sample_rate as f32) as usize;
        let phase_increment = 2.0 * PI * frequency / sample_rate as f32;

        let samples = (0..num_samples)
            .map(|i| {
                let t = i as f32 / num_samples as f32;
                let envelope = (-t * 8.0).exp();
                (i as f32 * phase_increment).sin() * envelope * amplitude
            })
            .collect();

        Self::new(samples, sample_rate)
    }

    /// Load a WAV file and downmix it to mono f32
    pub fn load_wav(path: &Path) -> Result<Self, AudioError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let mono = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Ok(Self::new(mono, spec.sample_rate))
    }
}

/// The three click sounds. A missing buffer means that sound cannot play.
#[derive(Debug, Clone, Default)]
pub struct ClickBank {
    normal: Option<ClickBuffer>,
    accent: Option<ClickBuffer>,
    first: Option<ClickBuffer>,
}

impl ClickBank {
    /// Duration of synthesized clicks
    const CLICK_DURATION_MS: f32 = 30.0;

    /// Empty bank (nothing loaded yet)
    pub fn new() -> Self {
        Self::default()
    }

    /// Default synthesized sounds; the first beat is highest and loudest
    pub fn synthesized(sample_rate: u32) -> Self {
        Self {
            normal: Some(ClickBuffer::synthesize(sample_rate, 800.0, 0.4)),
            accent: Some(ClickBuffer::synthesize(sample_rate, 1200.0, 0.6)),
            first: Some(ClickBuffer::synthesize(sample_rate, 1600.0, 0.8)),
        }
    }

    /// Load `normal.wav`, `accent.wav` and `first.wav` from a sound set directory.
    /// Missing files fall back to the synthesized sound.
    pub fn load_dir(dir: &Path, sample_rate: u32) -> Result<Self, AudioError> {
        let mut bank = Self::synthesized(sample_rate);
        for sound in [ClickSound::Normal, ClickSound::Accent, ClickSound::First] {
            let path = dir.join(sound.file_name());
            if !path.exists() {
                log::warn!("{} not found, using synthesized click", path.display());
                continue;
            }
            let buffer = ClickBuffer::load_wav(&path)?;
            if buffer.sample_rate() != sample_rate {
                log::warn!(
                    "{} is {} Hz, output runs at {} Hz; pitch will shift",
                    path.display(),
                    buffer.sample_rate(),
                    sample_rate
                );
            }
            bank.set(sound, Some(buffer));
        }
        Ok(bank)
    }

    pub fn get(&self, sound: ClickSound) -> Option<&ClickBuffer> {
        match sound {
            ClickSound::First => self.first.as_ref(),
            ClickSound::Accent => self.accent.as_ref(),
            ClickSound::Normal => self.normal.as_ref(),
        }
    }

    pub fn set(&mut self, sound: ClickSound, buffer: Option<ClickBuffer>) {
        match sound {
            ClickSound::First => self.first = buffer,
            ClickSound::Accent => self.accent = buffer,
            ClickSound::Normal => self.normal = buffer,
        }
    }

    pub fn has(&self, sound: ClickSound) -> bool {
        self.get(sound).is_some()
    }
}
