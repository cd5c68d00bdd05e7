//! Preview frame cache with nested HashMap structure + LRU eviction
//!
//! Structure: HashMap<MediaSource, HashMap<(time_bucket, width), frame>>
//! - Outer map: source -> frames
//! - Inner map: (time bucket, target width) -> decoded frame
//!
//! Benefits:
//! - O(1) `clear_source()` - just remove outer key
//! - O(1) lookup by key
//! - Recency order in an `IndexSet` (front = least recently touched)

use indexmap::IndexSet;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::entities::{MediaSource, PreviewImage};

/// Cache statistics for monitoring hit rate
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Round `time` to `precision` decimal places, as an integer bucket.
///
/// Two decimals: 1.234 and 1.2349 share bucket 123.
pub fn time_bucket(time: f64, precision: u32) -> i64 {
    if !time.is_finite() {
        return 0;
    }
    (time * 10f64.powi(precision as i32)).round() as i64
}

/// Frame cache key: (source, bucketed time, target width)
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FrameKey {
    pub source: MediaSource,
    pub time_bucket: i64,
    pub width: u32,
}

#[derive(Debug, Default)]
struct CacheInner {
    frames: HashMap<MediaSource, HashMap<(i64, u32), Arc<PreviewImage>>>,
    /// Front = oldest
    lru_order: IndexSet<FrameKey>,
    bytes: usize,
}

impl CacheInner {
    fn touch(&mut self, key: &FrameKey) {
        // shift_remove keeps order (swap_remove would break it)
        if self.lru_order.shift_remove(key) {
            self.lru_order.insert(key.clone());
        }
    }

    fn remove(&mut self, key: &FrameKey) -> Option<Arc<PreviewImage>> {
        let frames = self.frames.get_mut(&key.source)?;
        let removed = frames.remove(&(key.time_bucket, key.width))?;
        if frames.is_empty() {
            self.frames.remove(&key.source);
        }
        self.lru_order.shift_remove(key);
        self.bytes = self.bytes.saturating_sub(removed.mem());
        Some(removed)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(key) = self.lru_order.first().cloned() else {
            return false;
        };
        match self.remove(&key) {
            Some(evicted) => {
                debug!(
                    "LRU evicted: {}@{} w{} ({} bytes)",
                    key.source.file_name(),
                    key.time_bucket,
                    key.width,
                    evicted.mem()
                );
                true
            }
            None => {
                // Order entry without a frame; drop it and keep going
                self.lru_order.shift_remove_index(0);
                true
            }
        }
    }
}

/// Bounded LRU cache of decoded preview frames.
#[derive(Debug)]
pub struct FrameCache {
    inner: Mutex<CacheInner>,
    stats: Arc<CacheStats>,
    capacity: usize,
    precision: u32,
}

impl FrameCache {
    /// * `capacity` - Maximum number of frames before eviction
    /// * `precision` - Decimal places kept from the time component of keys
    pub fn new(capacity: usize, precision: u32) -> Self {
        let capacity = capacity.max(1);
        debug!("FrameCache created: capacity={}, precision={}", capacity, precision);
        Self {
            inner: Mutex::new(CacheInner {
                lru_order: IndexSet::with_capacity(capacity + 1),
                ..Default::default()
            }),
            stats: Arc::new(CacheStats::new()),
            capacity,
            precision,
        }
    }

    pub fn key(&self, source: &MediaSource, time: f64, width: u32) -> FrameKey {
        FrameKey {
            source: source.clone(),
            time_bucket: time_bucket(time, self.precision),
            width,
        }
    }

    /// Get frame and mark it most recently used. Records hit/miss.
    pub fn get(&self, key: &FrameKey) -> Option<Arc<PreviewImage>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let found = inner
            .frames
            .get(&key.source)
            .and_then(|frames| frames.get(&(key.time_bucket, key.width)))
            .cloned();

        if found.is_some() {
            self.stats.record_hit();
            inner.touch(key);
        } else {
            self.stats.record_miss();
        }
        found
    }

    /// Check if frame exists (without updating LRU or stats)
    pub fn contains(&self, key: &FrameKey) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .frames
            .get(&key.source)
            .is_some_and(|frames| frames.contains_key(&(key.time_bucket, key.width)))
    }

    /// Insert frame as most recently used, evicting the oldest entries past capacity.
    pub fn insert(&self, key: FrameKey, frame: Arc<PreviewImage>) {
        let size = frame.mem();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.remove(&key).is_some() {
            debug!("Replaced frame: {}@{}", key.source.file_name(), key.time_bucket);
        }

        inner
            .frames
            .entry(key.source.clone())
            .or_default()
            .insert((key.time_bucket, key.width), frame);
        inner.lru_order.insert(key);
        inner.bytes += size;

        while inner.lru_order.len() > self.capacity {
            if !inner.evict_oldest() {
                break;
            }
        }
    }

    /// Remove one frame. Returns true if it was cached.
    pub fn remove(&self, key: &FrameKey) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.remove(key).is_some()
    }

    /// Remove all frames of one source - O(1) on the outer map
    pub fn clear_source(&self, source: &MediaSource) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(frames) = inner.frames.remove(source) else {
            return 0;
        };
        let freed: usize = frames.values().map(|f| f.mem()).sum();
        inner.bytes = inner.bytes.saturating_sub(freed);
        inner.lru_order.retain(|k| &k.source != source);
        debug!(
            "Cleared source {}: {} frames, {} KB freed",
            source.file_name(),
            frames.len(),
            freed / 1024
        );
        frames.len()
    }

    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.frames.clear();
        inner.lru_order.clear();
        inner.bytes = 0;
        debug!("Cleared entire frame cache");
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).lru_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of pixel data held
    pub fn bytes(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).bytes
    }

    pub fn has_source(&self, source: &MediaSource) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .frames
            .contains_key(source)
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> Vec<FrameKey> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.lru_order.iter().cloned().collect()
    }
}
