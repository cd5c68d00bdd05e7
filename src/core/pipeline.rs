//! The scrub pipeline facade consumed by the presentation layer.
//!
//! **Why**: a hover over a clip grid produces one position request per mouse
//! move. Each request fans out to three independent, non-blocking paths:
//! 1. handle pool + seek coordinator (exact live frame)
//! 2. thumbnailer (cached still used until the live frame lands)
//! 3. snippet scheduler (audio preview)
//!
//! The caller never waits on a decode. Every subsystem guards its own state
//! with its own lock; decode work runs on `Workers` and only publishes results.
//!
//! Lock order where subsystems nest: handle pool -> seek coordinator,
//! snippet scheduler -> audio cache.

use log::{debug, info, trace};
use std::sync::Arc;
use std::time::Instant;

use super::audio_cache::AudioCache;
use super::epoch::Epochs;
use super::handle_pool::{HandlePool, HandleRef};
use super::memory::MemoryBudget;
use super::seek::{FirstFrameFn, SeekCoordinator, SeekDecision, SeekStatus};
use super::snippet::{ScrubOutcome, SnippetScheduler, SnippetSettings};
use super::thumbnails::{ThumbnailLookup, Thumbnailer};
use super::workers::Workers;
use crate::config::PipelineConfig;
use crate::entities::{AudioVoice, MediaBackend, MediaSource, PreviewImage};

/// Point-in-time view of pool/cache occupancy
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PipelineStats {
    pub live_handles: usize,
    pub tracked_seeks: usize,
    pub frame_entries: usize,
    pub frame_bytes: usize,
    pub decode_contexts: usize,
    pub audio_buffers: usize,
    pub audio_bytes: usize,
    pub frame_hits: u64,
    pub frame_misses: u64,
}

impl PipelineStats {
    pub fn cache_bytes(&self) -> usize {
        self.frame_bytes + self.audio_bytes
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.frame_hits + self.frame_misses;
        if total == 0 { 0.0 } else { self.frame_hits as f64 / total as f64 }
    }
}

pub struct ScrubPipeline {
    config: PipelineConfig,
    backend: Arc<dyn MediaBackend>,
    epochs: Arc<Epochs>,
    workers: Workers,
    handles: HandlePool,
    seeks: Arc<SeekCoordinator>,
    thumbnails: Thumbnailer,
    audio: AudioCache,
    snippets: SnippetScheduler,
    budget: MemoryBudget,
}

impl ScrubPipeline {
    /// Build the pipeline and spawn its decode workers.
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn MediaBackend>,
        voice: Arc<dyn AudioVoice>,
    ) -> std::io::Result<Self> {
        let config = config.normalized();
        let epochs = Arc::new(Epochs::new());
        let workers = Workers::new(config.worker_count(), epochs.global_ref())?;
        let budget = MemoryBudget::new(config.memory_fraction, config.memory_reserve_gb);

        info!(
            "ScrubPipeline init: handles={}, frames={}, contexts={}, audio={}, workers={}",
            config.handle_pool_size,
            config.frame_cache_size,
            config.context_pool_size,
            config.audio_cache_size,
            workers.thread_count()
        );

        Ok(Self {
            handles: HandlePool::new(Arc::clone(&backend), config.handle_pool_size),
            seeks: Arc::new(SeekCoordinator::new()),
            thumbnails: Thumbnailer::new(
                Arc::clone(&backend),
                Arc::clone(&epochs),
                config.frame_cache_size,
                config.context_pool_size,
                config.time_key_precision,
                config.thumbnail_tolerance_secs,
            ),
            audio: AudioCache::new(
                Arc::clone(&backend),
                Arc::clone(&epochs),
                config.audio_cache_size,
                config.audio_format,
            ),
            snippets: SnippetScheduler::new(
                voice,
                SnippetSettings {
                    min_interval: config.snippet_interval(),
                    window: config.snippet_window(),
                    fade: config.snippet_fade(),
                },
            ),
            budget,
            backend,
            epochs,
            workers,
            config,
        })
    }

    // --- Live frames: handle pool + seek coordinator ---

    /// Pooled handle for `source` (created on first use). `None` if it can't be opened.
    pub fn acquire_handle(&self, source: &MediaSource) -> Option<HandleRef> {
        let acquired = self.handles.acquire(source, |s| self.seeks.is_busy(s))?;
        for evicted in &acquired.evicted {
            self.seeks.forget(evicted);
        }
        Some(acquired.handle)
    }

    /// Hover exit: handle becomes evictable, first-frame callback re-arms.
    pub fn release_handle(&self, source: &MediaSource) -> bool {
        self.seeks.end_session(source);
        self.handles.release(source)
    }

    /// Coalesced zero-tolerance seek. `on_first_frame` fires at most once per hover session.
    pub fn seek(&self, handle: &HandleRef, time: f64, on_first_frame: impl FnOnce() + Send + 'static) -> SeekDecision {
        // A stale HandleRef would otherwise leave seek state behind for an unpooled source
        if !self.handles.holds(handle) {
            trace!("Seek on released handle for {} dropped", handle.source().file_name());
            return SeekDecision::Dropped;
        }
        let callback: FirstFrameFn = Box::new(on_first_frame);
        self.seeks.seek(handle, time.max(0.0), Some(callback))
    }

    pub fn seek_status(&self, source: &MediaSource) -> Option<SeekStatus> {
        self.seeks.status(source)
    }

    // --- Still frames: frame cache + decode contexts ---

    /// Cached frame or a pending extraction.
    pub fn thumbnail(&self, source: &MediaSource, time: f64, width: u32) -> ThumbnailLookup {
        self.thumbnails.thumbnail(&self.workers, source, time, width)
    }

    /// Never blocks; `None` on miss.
    pub fn cached_thumbnail_sync(&self, source: &MediaSource, time: f64, width: u32) -> Option<Arc<PreviewImage>> {
        self.thumbnails.cached(source, time, width)
    }

    /// Fill the cache with `count` evenly spaced frames at the configured width.
    pub fn prewarm(&self, source: &MediaSource, duration: f64, count: usize) {
        self.thumbnails
            .prewarm(&self.workers, source, duration, count, self.config.thumbnail_width);
    }

    // --- Audio ---

    pub fn prepare_audio(&self, source: &MediaSource) -> bool {
        self.audio.prepare(&self.workers, source)
    }

    pub fn scrub_audio(&self, source: &MediaSource, time: f64) -> ScrubOutcome {
        self.scrub_audio_at(source, time, Instant::now())
    }

    /// `scrub_audio` with an explicit clock reading.
    pub fn scrub_audio_at(&self, source: &MediaSource, time: f64, now: Instant) -> ScrubOutcome {
        self.snippets.scrub_at(&self.audio, &self.workers, source, time, now)
    }

    pub fn stop_audio(&self, source: &MediaSource) -> bool {
        self.snippets.stop(source)
    }

    // --- Combined hover helpers ---

    /// Route one hover position to all three paths.
    ///
    /// `t_norm` is the normalized position (0..1) over `duration` seconds.
    /// Returns the cached still for immediate display, if there is one.
    pub fn position(
        &self,
        source: &MediaSource,
        t_norm: f64,
        duration: f64,
        width: u32,
        on_first_frame: impl FnOnce() + Send + 'static,
    ) -> Option<Arc<PreviewImage>> {
        let t = if t_norm.is_finite() { t_norm.clamp(0.0, 1.0) } else { 0.0 };
        let time = (t * duration.max(0.0)).max(0.0);

        if let Some(handle) = self.acquire_handle(source) {
            self.seek(&handle, time, on_first_frame);
        }
        let fallback = match self.thumbnail(source, time, width) {
            ThumbnailLookup::Ready(img) => Some(img),
            ThumbnailLookup::Pending(_) => None,
        };
        self.scrub_audio(source, time);
        fallback
    }

    /// Hover left the clip: release the handle and silence audio.
    pub fn end_hover(&self, source: &MediaSource) {
        self.release_handle(source);
        self.stop_audio(source);
    }

    // --- Purging ---

    /// Drop every cached or pooled resource for one source.
    pub fn forget_source(&self, source: &MediaSource) {
        self.epochs.bump_source(source);
        self.handles.remove(source);
        self.seeks.forget(source);
        self.thumbnails.forget(source);
        self.audio.forget(source);
        self.snippets.stop(source);
        debug!("Forgot source {}", source.file_name());
    }

    /// Drop everything. Queued decode jobs are skipped; running ones discard their results.
    pub fn clear_all(&self) {
        let epoch = self.epochs.bump_all();
        self.handles.clear();
        self.seeks.clear();
        self.thumbnails.clear();
        self.audio.clear();
        self.snippets.stop_all();
        info!("Pipeline cleared (epoch {})", epoch);
    }

    /// Clear everything if cache memory exceeds the budget. Returns true if cleared.
    pub fn relieve_pressure(&self) -> bool {
        let used = self.stats().cache_bytes();
        if !self.budget.exceeded_by(used) {
            return false;
        }
        info!(
            "Cache memory {} MB over budget {} MB, clearing",
            used / 1024 / 1024,
            self.budget.limit() / 1024 / 1024
        );
        self.clear_all();
        true
    }

    // --- Introspection ---

    pub fn stats(&self) -> PipelineStats {
        let frame_stats = self.thumbnails.cache().stats();
        PipelineStats {
            live_handles: self.handles.len(),
            tracked_seeks: self.seeks.tracked_sources(),
            frame_entries: self.thumbnails.cache().len(),
            frame_bytes: self.thumbnails.cache().bytes(),
            decode_contexts: self.thumbnails.contexts().len(),
            audio_buffers: self.audio.len(),
            audio_bytes: self.audio.bytes(),
            frame_hits: frame_stats.hits(),
            frame_misses: frame_stats.misses(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn MediaBackend> {
        &self.backend
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn handles(&self) -> &HandlePool {
        &self.handles
    }

    pub fn thumbnails(&self) -> &Thumbnailer {
        &self.thumbnails
    }

    pub fn audio(&self) -> &AudioCache {
        &self.audio
    }

    pub fn snippets(&self) -> &SnippetScheduler {
        &self.snippets
    }
}

impl Drop for ScrubPipeline {
    fn drop(&mut self) {
        // Workers drop after this; release decoders first so handle threads exit.
        self.handles.clear();
        self.snippets.stop_all();
    }
}
