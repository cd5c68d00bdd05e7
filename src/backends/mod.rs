//! Concrete decode and audio-output backends.
//!
//! - `synthetic`: procedural media, always available
//! - `ffmpeg`: real files via playa-ffmpeg (feature "ffmpeg")
//! - `cpal_voice`: snippet playback on the default output device (feature "cpal-output")

pub mod synthetic;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(feature = "cpal-output")]
pub mod cpal_voice;

use log::trace;

use crate::entities::{AudioVoice, Snippet};

/// Voice that discards every snippet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVoice;

impl AudioVoice for NullVoice {
    fn play(&self, snippet: Snippet) {
        trace!(
            "NullVoice: {} frames of {} @ {:.3}",
            snippet.frames(),
            snippet.source.file_name(),
            snippet.offset_secs
        );
    }

    fn stop(&self) {}
}
