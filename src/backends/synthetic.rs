//! Procedural backend: generated frames and a sine-tone audio track.
//!
//! Used by the demo binary (`--synthetic`) and by tests. Every source name is
//! accepted; frames are a colour ramp keyed by source and time, so two frames
//! can be told apart by their pixels.

use crossbeam_channel::{Sender, unbounded};
use log::trace;
use std::f32::consts::TAU;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::entities::{
    AudioBuffer, AudioFormat, DecodeContext, DecodeHandle, MediaBackend, MediaError, MediaInfo,
    MediaSource, PreviewImage, SeekDone, SeekOutcome,
};

const NATIVE_WIDTH: u32 = 320;
const NATIVE_HEIGHT: u32 = 180;
const TONE_HZ: f32 = 440.0;

#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    duration: f64,
    latency: Duration,
}

impl SyntheticBackend {
    /// Every source lasts `duration` seconds.
    pub fn new(duration: f64) -> Self {
        Self {
            duration: duration.max(0.0),
            latency: Duration::ZERO,
        }
    }

    /// Simulated decode cost per seek/extraction.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }
}

impl MediaBackend for SyntheticBackend {
    fn open_handle(&self, source: &MediaSource) -> Result<Arc<dyn DecodeHandle>, MediaError> {
        Ok(Arc::new(SyntheticHandle::spawn(source, self.duration, self.latency)?))
    }

    fn open_context(&self, source: &MediaSource) -> Result<Box<dyn DecodeContext>, MediaError> {
        Ok(Box::new(SyntheticContext {
            seed: seed_of(source),
            duration: self.duration,
            latency: self.latency,
        }))
    }

    fn decode_audio(&self, source: &MediaSource, format: AudioFormat) -> Result<AudioBuffer, MediaError> {
        std::thread::sleep(self.latency);
        let channels = format.channels.max(1) as usize;
        let frames = (self.duration * format.sample_rate as f64) as usize;
        let rate = format.sample_rate.max(1) as f32;
        // Pitch varies per source so snippets from different clips differ
        let hz = TONE_HZ + (seed_of(source) % 8) as f32 * 55.0;

        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let s = (TAU * hz * i as f32 / rate).sin() * 0.25;
            samples.extend(std::iter::repeat_n(s, channels));
        }
        trace!("Synthesized {} audio frames for {}", frames, source.file_name());
        Ok(AudioBuffer::new(format, samples))
    }

    fn probe(&self, _source: &MediaSource) -> Result<MediaInfo, MediaError> {
        Ok(MediaInfo {
            duration_secs: self.duration,
            width: NATIVE_WIDTH,
            height: NATIVE_HEIGHT,
            has_audio: true,
        })
    }
}

type SeekCommand = (f64, SeekDone);

/// Live handle backed by a thread that serves seeks in order.
pub struct SyntheticHandle {
    commands: Mutex<Option<Sender<SeekCommand>>>,
    current: Arc<Mutex<Option<Arc<PreviewImage>>>>,
}

impl SyntheticHandle {
    fn spawn(source: &MediaSource, duration: f64, latency: Duration) -> Result<Self, MediaError> {
        let (tx, rx) = unbounded::<SeekCommand>();
        let current = Arc::new(Mutex::new(None));
        let frame_slot = Arc::clone(&current);
        let seed = seed_of(source);

        std::thread::Builder::new()
            .name(format!("synthetic-seek-{}", source.file_name()))
            .spawn(move || {
                // Exits once the handle is released and the queue drains
                for (time, done) in rx {
                    std::thread::sleep(latency);
                    let t = time.clamp(0.0, duration);
                    match render(seed, t, NATIVE_WIDTH, NATIVE_HEIGHT) {
                        Ok(img) => {
                            *frame_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(img));
                            done(SeekOutcome::Landed);
                        }
                        Err(_) => done(SeekOutcome::Failed),
                    }
                }
            })
            .map_err(|e| MediaError::Open(format!("Failed to spawn seek thread: {}", e)))?;

        Ok(Self {
            commands: Mutex::new(Some(tx)),
            current,
        })
    }
}

impl DecodeHandle for SyntheticHandle {
    fn seek_exact(&self, time: f64, done: SeekDone) {
        let tx = self.commands.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let rejected = match tx {
            Some(tx) => tx.send((time, done)).err().map(|e| e.into_inner().1),
            None => Some(done),
        };
        if let Some(done) = rejected {
            done(SeekOutcome::Failed);
        }
    }

    fn current_frame(&self) -> Option<Arc<PreviewImage>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn release(&self) {
        self.commands.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

struct SyntheticContext {
    seed: u64,
    duration: f64,
    latency: Duration,
}

impl DecodeContext for SyntheticContext {
    fn extract(&mut self, time: f64, width: u32, tolerance: f64) -> Result<PreviewImage, MediaError> {
        std::thread::sleep(self.latency);
        // Pretend the nearest keyframe sits on the tolerance grid
        let snapped = if tolerance > 0.0 {
            (time / tolerance).round() * tolerance
        } else {
            time
        };
        let width = width.max(1);
        let height = (width as u64 * NATIVE_HEIGHT as u64 / NATIVE_WIDTH as u64).max(1) as u32;
        render(self.seed, snapped.clamp(0.0, self.duration), width, height)
    }
}

fn seed_of(source: &MediaSource) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

/// Horizontal ramp; red follows the source, green the time, blue the column.
fn render(seed: u64, time: f64, width: u32, height: u32) -> Result<PreviewImage, MediaError> {
    let red = (seed % 256) as u8;
    let green = ((time * 25.0) as u64 % 256) as u8;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for _ in 0..height {
        for x in 0..width {
            let blue = (x * 255 / width.max(1)) as u8;
            pixels.extend_from_slice(&[red, green, blue, 255]);
        }
    }
    PreviewImage::from_rgba(width, height, pixels, time)
}
