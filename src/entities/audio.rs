//! PCM audio buffers and snippets.
//!
//! All buffers share one fixed format (interleaved `f32`); backends convert
//! from the source's native layout while decoding.

use std::time::Duration;

use super::source::MediaSource;

/// Fixed PCM layout used for every cached buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
        }
    }
}

impl AudioFormat {
    /// Number of whole frames covering `d`, rounded to nearest.
    pub fn frames_for(&self, d: Duration) -> usize {
        (d.as_secs_f64() * self.sample_rate as f64).round() as usize
    }
}

/// Fully decoded audio track of one source. Immutable once built.
#[derive(Clone, PartialEq)]
pub struct AudioBuffer {
    format: AudioFormat,
    samples: Vec<f32>,
}

impl AudioBuffer {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn new(format: AudioFormat, mut samples: Vec<f32>) -> Self {
        let ch = format.channels.max(1) as usize;
        samples.truncate(samples.len() / ch * ch);
        Self { format, samples }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.format.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mem(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("format", &self.format)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Short fade-enveloped excerpt handed to the output voice.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub source: MediaSource,
    pub format: AudioFormat,
    /// Start of the excerpt within the source (seconds)
    pub offset_secs: f64,
    /// Interleaved samples
    pub samples: Vec<f32>,
}

impl Snippet {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }
}
