//! Bounded LRU cache of fully decoded audio tracks.
//!
//! `prepare` is idempotent: a source that is cached or already loading is
//! left alone. Decoding runs on a worker; only the finished buffer re-enters
//! the cache lock. A failed decode leaves the source uncached so the next
//! scrub retries.

use log::{debug, trace, warn};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use super::epoch::{EpochStamp, Epochs};
use super::workers::Workers;
use crate::entities::{AudioBuffer, AudioFormat, MediaBackend, MediaSource};

struct AudioInner {
    buffers: LruCache<MediaSource, Arc<AudioBuffer>>,
    loading: HashMap<MediaSource, EpochStamp>,
    bytes: usize,
}

struct AudioShared {
    backend: Arc<dyn MediaBackend>,
    format: AudioFormat,
    epochs: Arc<Epochs>,
    inner: Mutex<AudioInner>,
}

pub struct AudioCache {
    shared: Arc<AudioShared>,
}

impl AudioCache {
    pub fn new(backend: Arc<dyn MediaBackend>, epochs: Arc<Epochs>, capacity: usize, format: AudioFormat) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            shared: Arc::new(AudioShared {
                backend,
                format,
                epochs,
                inner: Mutex::new(AudioInner {
                    buffers: LruCache::new(capacity),
                    loading: HashMap::new(),
                    bytes: 0,
                }),
            }),
        }
    }

    /// Start a background decode unless `source` is cached or loading.
    /// Returns true if a decode was launched.
    pub fn prepare(&self, workers: &Workers, source: &MediaSource) -> bool {
        let stamp = {
            let mut inner = self.shared.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.buffers.contains(source) || inner.loading.contains_key(source) {
                return false;
            }
            let stamp = self.shared.epochs.stamp(source);
            inner.loading.insert(source.clone(), stamp);
            stamp
        };

        debug!("Audio decode queued: {}", source.file_name());
        let shared = Arc::clone(&self.shared);
        let source = source.clone();
        workers.execute_with_epoch(stamp.global, move || shared.load(source, stamp));
        true
    }

    /// Cached buffer, marked most recently used.
    pub fn get(&self, source: &MediaSource) -> Option<Arc<AudioBuffer>> {
        let mut inner = self.shared.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.buffers.get(source).cloned()
    }

    pub fn contains(&self, source: &MediaSource) -> bool {
        let inner = self.shared.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.buffers.contains(source)
    }

    pub fn is_loading(&self, source: &MediaSource) -> bool {
        let inner = self.shared.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.loading.contains_key(source)
    }

    pub fn forget(&self, source: &MediaSource) {
        self.shared.epochs.bump_source(source);
        let mut inner = self.shared.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.loading.remove(source);
        if let Some(buf) = inner.buffers.pop(source) {
            inner.bytes = inner.bytes.saturating_sub(buf.mem());
        }
    }

    pub fn clear(&self) {
        let mut inner = self.shared.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.buffers.clear();
        inner.loading.clear();
        inner.bytes = 0;
        debug!("Cleared audio cache");
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().unwrap_or_else(|e| e.into_inner()).buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> usize {
        self.shared.inner.lock().unwrap_or_else(|e| e.into_inner()).bytes
    }

    pub fn format(&self) -> AudioFormat {
        self.shared.format
    }
}

impl AudioShared {
    fn load(&self, source: MediaSource, stamp: EpochStamp) {
        let decoded = self.backend.decode_audio(&source, self.format);

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.loading.get(&source) == Some(&stamp) {
            inner.loading.remove(&source);
        }

        let buffer = match decoded {
            Ok(buf) => buf,
            Err(e) => {
                warn!("Audio decode failed for {}: {}", source.file_name(), e);
                return;
            }
        };
        if !self.epochs.is_current(&source, stamp) {
            trace!("Stale audio decode for {} discarded", source.file_name());
            return;
        }

        let size = buffer.mem();
        let frames = buffer.frames();
        if let Some((evicted_src, evicted)) = inner.buffers.push(source.clone(), Arc::new(buffer)) {
            inner.bytes = inner.bytes.saturating_sub(evicted.mem());
            if evicted_src != source {
                debug!("Audio cache evicted {}", evicted_src.file_name());
            }
        }
        inner.bytes += size;
        debug!("Audio cached: {} ({} frames)", source.file_name(), frames);
        drop(inner);

        // Insert-then-validate, same as the frame cache path
        if !self.epochs.is_current(&source, stamp) {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(buf) = inner.buffers.pop(&source) {
                inner.bytes = inner.bytes.saturating_sub(buf.mem());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::synthetic::SyntheticBackend;
    use std::time::{Duration, Instant};

    fn wait_cached(cache: &AudioCache, source: &MediaSource) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cache.contains(source) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let epochs = Arc::new(Epochs::new());
        let workers = Workers::new(2, epochs.global_ref()).unwrap();
        let cache = AudioCache::new(Arc::new(SyntheticBackend::new(1.0)), epochs, 2, AudioFormat::default());
        let a = MediaSource::new("a");

        assert!(cache.prepare(&workers, &a));
        assert!(!cache.prepare(&workers, &a));
        assert!(wait_cached(&cache, &a));
        assert!(!cache.prepare(&workers, &a));
        assert!(!cache.is_loading(&a));
        assert_eq!(cache.get(&a).unwrap().format(), AudioFormat::default());
    }

    #[test]
    fn test_lru_bound() {
        let epochs = Arc::new(Epochs::new());
        let workers = Workers::new(1, epochs.global_ref()).unwrap();
        let cache = AudioCache::new(Arc::new(SyntheticBackend::new(0.1)), epochs, 2, AudioFormat::default());
        let srcs: Vec<MediaSource> = ["a", "b", "c"].iter().map(|s| MediaSource::new(*s)).collect();

        for s in &srcs {
            cache.prepare(&workers, s);
            assert!(wait_cached(&cache, s));
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&srcs[0]));
        assert_eq!(cache.bytes(), cache.get(&srcs[1]).unwrap().mem() * 2);
    }

    #[test]
    fn test_forget_removes_buffer() {
        let epochs = Arc::new(Epochs::new());
        let workers = Workers::new(1, epochs.global_ref()).unwrap();
        let cache = AudioCache::new(Arc::new(SyntheticBackend::new(0.1)), epochs, 2, AudioFormat::default());
        let a = MediaSource::new("a");
        cache.prepare(&workers, &a);
        assert!(wait_cached(&cache, &a));

        cache.forget(&a);
        assert!(!cache.contains(&a));
        assert_eq!(cache.bytes(), 0);
    }
}
