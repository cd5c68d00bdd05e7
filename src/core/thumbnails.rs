//! Still-frame generation on top of the frame cache and context pool.
//!
//! Hits return synchronously. Misses are extracted on a worker with a loose
//! tolerance (poster/fallback imagery, not live scrub) and published to the
//! cache. Concurrent misses on the same key share one extraction.

use crossbeam_channel::{Receiver, Sender};
use log::{trace, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::context_pool::ContextPool;
use super::epoch::{EpochStamp, Epochs};
use super::frame_cache::{FrameCache, FrameKey};
use super::workers::Workers;
use crate::entities::{MediaBackend, MediaError, MediaSource, PreviewImage};

type ThumbResult = Option<Arc<PreviewImage>>;

/// Outcome of a `thumbnail` request.
#[derive(Debug)]
pub enum ThumbnailLookup {
    /// Cache hit
    Ready(Arc<PreviewImage>),
    /// Extraction queued; receives `None` on decode failure or purge
    Pending(Receiver<ThumbResult>),
}

impl ThumbnailLookup {
    /// Block until the frame is available.
    pub fn wait(self) -> ThumbResult {
        match self {
            ThumbnailLookup::Ready(img) => Some(img),
            ThumbnailLookup::Pending(rx) => rx.recv().ok().flatten(),
        }
    }

    pub fn wait_timeout(self, timeout: Duration) -> ThumbResult {
        match self {
            ThumbnailLookup::Ready(img) => Some(img),
            ThumbnailLookup::Pending(rx) => rx.recv_timeout(timeout).ok().flatten(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ThumbnailLookup::Ready(_))
    }
}

struct Inflight {
    stamp: EpochStamp,
    waiters: Vec<Sender<ThumbResult>>,
}

struct ThumbShared {
    cache: FrameCache,
    contexts: ContextPool,
    inflight: Mutex<HashMap<FrameKey, Inflight>>,
    epochs: Arc<Epochs>,
    tolerance: f64,
}

pub struct Thumbnailer {
    shared: Arc<ThumbShared>,
}

impl Thumbnailer {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        epochs: Arc<Epochs>,
        cache_size: usize,
        context_pool_size: usize,
        precision: u32,
        tolerance: f64,
    ) -> Self {
        Self {
            shared: Arc::new(ThumbShared {
                cache: FrameCache::new(cache_size, precision),
                contexts: ContextPool::new(backend, context_pool_size),
                inflight: Mutex::new(HashMap::new()),
                epochs,
                tolerance,
            }),
        }
    }

    /// Non-blocking read path for render code. Touches LRU order on hit.
    pub fn cached(&self, source: &MediaSource, time: f64, width: u32) -> Option<Arc<PreviewImage>> {
        let key = self.shared.cache.key(source, time, width);
        self.shared.cache.get(&key)
    }

    /// Fetch from cache or queue an extraction.
    pub fn thumbnail(&self, workers: &Workers, source: &MediaSource, time: f64, width: u32) -> ThumbnailLookup {
        let key = self.shared.cache.key(source, time, width);
        if let Some(img) = self.shared.cache.get(&key) {
            return ThumbnailLookup::Ready(img);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let stamp = self.shared.epochs.stamp(source);
        if !self.shared.register(&key, Some(tx), stamp) {
            trace!("Thumbnail {}@{} already extracting", source.file_name(), key.time_bucket);
            return ThumbnailLookup::Pending(rx);
        }

        let shared = Arc::clone(&self.shared);
        workers.execute_with_epoch(stamp.global, move || {
            shared.generate(key, time, width, stamp);
        });
        ThumbnailLookup::Pending(rx)
    }

    /// Populate `count` evenly spaced frames of `source` in one background job.
    ///
    /// The whole run carries the epoch stamp taken here, so a purge of the
    /// source stops the remaining frames.
    pub fn prewarm(&self, workers: &Workers, source: &MediaSource, duration: f64, count: usize, width: u32) {
        if count == 0 || !duration.is_finite() || duration <= 0.0 {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let source = source.clone();
        let stamp = self.shared.epochs.stamp(&source);
        workers.execute_with_epoch(stamp.global, move || {
            for i in 0..count {
                if !shared.epochs.is_current(&source, stamp) {
                    trace!("Prewarm of {} stopped after {} frames", source.file_name(), i);
                    return;
                }
                let time = duration * i as f64 / count as f64;
                let key = shared.cache.key(&source, time, width);
                if shared.cache.contains(&key) {
                    continue;
                }
                if shared.register(&key, None, stamp) {
                    shared.generate(key, time, width, stamp);
                }
            }
            trace!("Prewarmed {} frames of {}", count, source.file_name());
        });
    }

    /// Purge one source's frames and extraction context.
    pub fn forget(&self, source: &MediaSource) {
        self.shared.epochs.bump_source(source);
        self.shared.cache.clear_source(source);
        self.shared.contexts.remove(source);
        let mut inflight = self.shared.inflight.lock().unwrap_or_else(|e| e.into_inner());
        // Dropping the senders wakes waiters with `None`
        inflight.retain(|k, _| &k.source != source);
    }

    pub fn clear(&self) {
        self.shared.cache.clear_all();
        self.shared.contexts.clear();
        self.shared
            .inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn cache(&self) -> &FrameCache {
        &self.shared.cache
    }

    pub fn contexts(&self) -> &ContextPool {
        &self.shared.contexts
    }
}

impl ThumbShared {
    /// Record interest in `key`. Returns true if the caller must run the extraction.
    fn register(&self, key: &FrameKey, waiter: Option<Sender<ThumbResult>>, stamp: EpochStamp) -> bool {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = inflight.get_mut(key) {
            entry.waiters.extend(waiter);
            return false;
        }
        inflight.insert(
            key.clone(),
            Inflight {
                stamp,
                waiters: waiter.into_iter().collect(),
            },
        );
        true
    }

    fn extract(&self, source: &MediaSource, time: f64, width: u32) -> Result<PreviewImage, MediaError> {
        let ctx = self.contexts.get_or_create(source)?;
        let mut ctx = ctx.lock().unwrap_or_else(|e| e.into_inner());
        ctx.extract(time.max(0.0), width, self.tolerance)
    }

    fn generate(&self, key: FrameKey, time: f64, width: u32, stamp: EpochStamp) {
        // A purged source must not get its context reopened by a queued job
        let result = if !self.epochs.is_current(&key.source, stamp) {
            trace!("Skipping extraction for purged {}", key.source.file_name());
            None
        } else {
            match self.extract(&key.source, time, width) {
                Ok(img) => Some(Arc::new(img)),
                Err(e) => {
                    warn!("Thumbnail extraction failed for {} @ {:.2}: {}", key.source.file_name(), time, e);
                    None
                }
            }
        };

        let waiters = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            // A purge may have replaced our entry with a newer request's
            if inflight.get(&key).is_some_and(|e| e.stamp == stamp) {
                inflight.remove(&key).map(|e| e.waiters).unwrap_or_default()
            } else {
                Vec::new()
            }
        };

        if let Some(img) = &result {
            if self.epochs.is_current(&key.source, stamp) {
                self.cache.insert(key.clone(), Arc::clone(img));
                // Insert-then-validate: a purge that raced the insert is caught here.
                if !self.epochs.is_current(&key.source, stamp) {
                    self.cache.remove(&key);
                }
            } else {
                trace!("Stale thumbnail for {} discarded", key.source.file_name());
                // The purge may have landed between the epoch check and get_or_create
                self.contexts.remove(&key.source);
            }
        }

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}
