//! Entities module - value types and decode primitives shared by every subsystem
//!
//! - `MediaSource`: identity key of a media file
//! - `PreviewImage`, `AudioBuffer`, `Snippet`: decoded payloads
//! - `DecodeHandle`, `DecodeContext`, `MediaBackend`, `AudioVoice`: backend seams

pub mod audio;
pub mod error;
pub mod preview;
pub mod source;
pub mod traits;

pub use audio::{AudioBuffer, AudioFormat, Snippet};
pub use error::MediaError;
pub use preview::PreviewImage;
pub use source::MediaSource;
pub use traits::{
    AudioVoice, DecodeContext, DecodeHandle, MediaBackend, MediaInfo, SeekDone, SeekOutcome,
};
