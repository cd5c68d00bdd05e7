//! Core pipeline subsystems - pools, caches, coordination and workers
//!
//! Everything here is UI-agnostic and driven through [`ScrubPipeline`].

pub mod audio_cache;
pub mod context_pool;
pub mod epoch;
pub mod frame_cache;
pub mod handle_pool;
pub mod memory;
pub mod pipeline;
pub mod seek;
pub mod snippet;
pub mod thumbnails;
pub mod workers;

pub use audio_cache::AudioCache;
pub use context_pool::ContextPool;
pub use epoch::{EpochStamp, Epochs};
pub use frame_cache::{CacheStats, FrameCache, FrameKey};
pub use handle_pool::{Acquired, HandlePool, HandleRef};
pub use memory::MemoryBudget;
pub use pipeline::{PipelineStats, ScrubPipeline};
pub use seek::{SeekCoordinator, SeekDecision, SeekStatus};
pub use snippet::{ScrubOutcome, SnippetScheduler, SnippetSettings};
pub use thumbnails::{ThumbnailLookup, Thumbnailer};
pub use workers::Workers;
