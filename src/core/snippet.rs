//! Throttled audio scrub snippets on a single output voice.
//!
//! Each accepted scrub cuts a short window from the cached track, fades both
//! edges to avoid clicks and replaces whatever snippet was playing. Requests
//! closer together than the minimum interval are dropped.

use log::trace;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::audio_cache::AudioCache;
use super::workers::Workers;
use crate::entities::{AudioBuffer, AudioVoice, MediaSource, Snippet};

/// Snippet timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnippetSettings {
    pub min_interval: Duration,
    pub window: Duration,
    pub fade: Duration,
}

impl Default for SnippetSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(60),
            window: Duration::from_millis(80),
            fade: Duration::from_millis(5),
        }
    }
}

/// What happened to a scrub request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubOutcome {
    /// Snippet cut and sent to the voice
    Scheduled,
    /// Too soon after the previous snippet
    Throttled,
    /// Track not decoded yet; a decode was requested
    Buffering,
    /// Track decoded but holds no samples
    Silent,
}

#[derive(Debug, Default)]
struct SchedulerState {
    last_scheduled: Option<Instant>,
    active: Option<MediaSource>,
}

pub struct SnippetScheduler {
    voice: Arc<dyn AudioVoice>,
    settings: SnippetSettings,
    state: Mutex<SchedulerState>,
}

impl SnippetScheduler {
    pub fn new(voice: Arc<dyn AudioVoice>, settings: SnippetSettings) -> Self {
        Self {
            voice,
            settings,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Scrub at `time` seconds, as of `now`.
    pub fn scrub_at(
        &self,
        audio: &AudioCache,
        workers: &Workers,
        source: &MediaSource,
        time: f64,
        now: Instant,
    ) -> ScrubOutcome {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(last) = state.last_scheduled {
            if now.saturating_duration_since(last) < self.settings.min_interval {
                trace!("Snippet throttled: {} @ {:.3}", source.file_name(), time);
                return ScrubOutcome::Throttled;
            }
        }

        let Some(buffer) = audio.get(source) else {
            audio.prepare(workers, source);
            return ScrubOutcome::Buffering;
        };

        let Some(samples) = cut_window(&buffer, time, &self.settings) else {
            return ScrubOutcome::Silent;
        };
        let format = buffer.format();
        let offset_secs = window_start(&buffer, time, &self.settings) as f64 / format.sample_rate as f64;

        state.last_scheduled = Some(now);
        state.active = Some(source.clone());
        self.voice.stop();
        self.voice.play(Snippet {
            source: source.clone(),
            format,
            offset_secs,
            samples,
        });
        trace!("Snippet scheduled: {} @ {:.3}", source.file_name(), offset_secs);
        ScrubOutcome::Scheduled
    }

    /// Silence `source` if it owns the voice. Idempotent.
    pub fn stop(&self, source: &MediaSource) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.active.as_ref() != Some(source) {
            return false;
        }
        state.active = None;
        self.voice.stop();
        true
    }

    pub fn stop_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active = None;
        self.voice.stop();
    }

    pub fn active(&self) -> Option<MediaSource> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).active.clone()
    }

    pub fn settings(&self) -> SnippetSettings {
        self.settings
    }
}

fn window_frames(buffer: &AudioBuffer, settings: &SnippetSettings) -> usize {
    buffer
        .format()
        .frames_for(settings.window)
        .max(1)
        .min(buffer.frames())
}

/// First frame of the window, pulled back so the window ends inside the buffer.
fn window_start(buffer: &AudioBuffer, time: f64, settings: &SnippetSettings) -> usize {
    let total = buffer.frames();
    let len = window_frames(buffer, settings);
    let requested = if time.is_finite() && time > 0.0 {
        (time * buffer.format().sample_rate as f64) as usize
    } else {
        0
    };
    requested.min(total - len)
}

/// Cut the snippet window at `time` and apply linear fades to both edges.
pub fn cut_window(buffer: &AudioBuffer, time: f64, settings: &SnippetSettings) -> Option<Vec<f32>> {
    if buffer.is_empty() {
        return None;
    }
    let channels = buffer.format().channels.max(1) as usize;
    let len = window_frames(buffer, settings);
    let start = window_start(buffer, time, settings);

    let mut samples = buffer.samples()[start * channels..(start + len) * channels].to_vec();
    let fade = buffer.format().frames_for(settings.fade).min(len / 2);
    apply_fades(&mut samples, channels, fade);
    Some(samples)
}

/// Linear fade-in over the first `fade` frames and fade-out over the last.
fn apply_fades(samples: &mut [f32], channels: usize, fade: usize) {
    let frames = samples.len() / channels;
    if fade == 0 || frames == 0 {
        return;
    }
    for i in 0..fade {
        let gain = i as f32 / fade as f32;
        let head = i * channels;
        let tail = (frames - 1 - i) * channels;
        for c in 0..channels {
            samples[head + c] *= gain;
            samples[tail + c] *= gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::AudioFormat;

    fn buffer(sample_rate: u32, channels: u16, secs: f64) -> AudioBuffer {
        let fmt = AudioFormat { sample_rate, channels };
        let n = (sample_rate as f64 * secs) as usize * channels as usize;
        AudioBuffer::new(fmt, vec![1.0; n])
    }

    #[test]
    fn test_window_length_and_fades() {
        let buf = buffer(1000, 2, 10.0);
        let s = SnippetSettings::default();
        let cut = cut_window(&buf, 2.0, &s).unwrap();

        assert_eq!(cut.len(), 80 * 2);
        // First frame silent, ramps to full over 5 frames
        assert_eq!(cut[0], 0.0);
        assert_eq!(cut[1], 0.0);
        assert!((cut[2 * 2] - 0.4).abs() < 1e-6);
        assert_eq!(cut[5 * 2], 1.0);
        assert_eq!(cut[cut.len() - 1], 0.0);
        assert_eq!(cut[40 * 2], 1.0);
    }

    #[test]
    fn test_window_clamped_to_end() {
        let buf = buffer(1000, 1, 1.0);
        let s = SnippetSettings::default();
        assert_eq!(window_start(&buf, 0.99, &s), 920);
        assert_eq!(window_start(&buf, 50.0, &s), 920);
        assert_eq!(window_start(&buf, -3.0, &s), 0);
        assert_eq!(cut_window(&buf, 0.99, &s).unwrap().len(), 80);
    }

    #[test]
    fn test_short_buffer_uses_whole_track() {
        let buf = buffer(1000, 1, 0.03);
        let cut = cut_window(&buf, 0.5, &SnippetSettings::default()).unwrap();
        assert_eq!(cut.len(), 30);
    }

    #[test]
    fn test_empty_buffer() {
        let buf = AudioBuffer::new(AudioFormat::default(), Vec::new());
        assert!(cut_window(&buf, 0.0, &SnippetSettings::default()).is_none());
    }
}
