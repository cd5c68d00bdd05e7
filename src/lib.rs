//! HOVERSCRUB - hover-scrub media preview pipeline
//!
//! Live exact-seek frames, cached still thumbnails and throttled audio
//! snippets for a grid of media clips. Re-exports all modules for the binary.

// Core engine (pools, caches, seek coordination, workers)
pub mod core;

// Decode and audio-output backends
pub mod backends;

// App modules
pub mod cli;
pub mod config;
pub mod entities;

// Re-export commonly used types from core
pub use core::pipeline::{PipelineStats, ScrubPipeline};
pub use core::seek::SeekDecision;
pub use core::snippet::ScrubOutcome;
pub use core::thumbnails::ThumbnailLookup;

// Re-export entities
pub use entities::{
    AudioBuffer, AudioFormat, AudioVoice, MediaBackend, MediaError, MediaSource, PreviewImage,
};
