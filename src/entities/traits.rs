//! Abstract decode primitives.
//!
//! The pipeline never decodes anything itself. It decides when and how often
//! to call these traits; concrete backends live in `crate::backends`.

use std::sync::Arc;

use super::audio::{AudioBuffer, AudioFormat, Snippet};
use super::error::MediaError;
use super::preview::PreviewImage;
use super::source::MediaSource;

/// Result of one exact seek on a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Decoder landed on the requested time and a frame is visible
    Landed,
    /// Decoder could not reach the time (corrupt stream, released handle)
    Failed,
}

/// Completion callback for [`DecodeHandle::seek_exact`].
pub type SeekDone = Box<dyn FnOnce(SeekOutcome) + Send + 'static>;

/// Live, paused, muted decode object bound to one source.
///
/// Implementations may invoke the completion from any thread, including
/// synchronously from inside `seek_exact`.
pub trait DecodeHandle: Send + Sync {
    /// Zero-tolerance seek: land on exactly `time` seconds, then call `done`.
    fn seek_exact(&self, time: f64, done: SeekDone);

    /// Last frame produced by a landed seek.
    fn current_frame(&self) -> Option<Arc<PreviewImage>>;

    /// Stop playback and free decoder resources. Idempotent.
    fn release(&self);
}

/// Reusable parse state plus still-frame extractor for one source.
pub trait DecodeContext: Send {
    /// Extract a frame near `time`, accepting any frame within `tolerance`
    /// seconds, scaled to `width` pixels wide (aspect preserved).
    fn extract(&mut self, time: f64, width: u32, tolerance: f64) -> Result<PreviewImage, MediaError>;
}

/// Container-level facts about a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

/// Factory for every decode resource the pipeline pools.
pub trait MediaBackend: Send + Sync {
    fn open_handle(&self, source: &MediaSource) -> Result<Arc<dyn DecodeHandle>, MediaError>;

    fn open_context(&self, source: &MediaSource) -> Result<Box<dyn DecodeContext>, MediaError>;

    /// Decode the whole audio track into `format`. Blocking; runs on a worker.
    fn decode_audio(&self, source: &MediaSource, format: AudioFormat) -> Result<AudioBuffer, MediaError>;

    fn probe(&self, source: &MediaSource) -> Result<MediaInfo, MediaError>;
}

/// Single audio output voice. Playing a new snippet replaces the old one.
pub trait AudioVoice: Send + Sync {
    fn play(&self, snippet: Snippet);

    fn stop(&self);
}
