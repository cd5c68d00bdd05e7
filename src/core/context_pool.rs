//! Pool of reusable still-extraction contexts, one per source.
//!
//! Opening a container and setting up an extractor costs far more than
//! pulling one frame out of it, so contexts are kept in a bounded LRU.
//! Evicting a context never touches the frame cache.

use log::{debug, trace};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::entities::{DecodeContext, MediaBackend, MediaError, MediaSource};

/// Context shared between the pool and the job currently extracting from it.
///
/// Extraction objects are stateful (read position), so one source's context
/// is used by one job at a time.
pub type SharedContext = Arc<Mutex<Box<dyn DecodeContext>>>;

pub struct ContextPool {
    backend: Arc<dyn MediaBackend>,
    contexts: Mutex<LruCache<MediaSource, SharedContext>>,
}

impl ContextPool {
    pub fn new(backend: Arc<dyn MediaBackend>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            backend,
            contexts: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Existing context (marked most recently used) or a freshly opened one.
    pub fn get_or_create(&self, source: &MediaSource) -> Result<SharedContext, MediaError> {
        {
            let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(ctx) = contexts.get(source) {
                return Ok(Arc::clone(ctx));
            }
        }

        // Open outside the lock; parsing a header can take a while.
        let opened: SharedContext = Arc::new(Mutex::new(self.backend.open_context(source)?));

        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = contexts.get(source) {
            trace!("Context for {} opened concurrently, reusing", source.file_name());
            return Ok(Arc::clone(existing));
        }
        if let Some((evicted, _)) = contexts.push(source.clone(), Arc::clone(&opened)) {
            debug!("Context pool evicted {}", evicted.file_name());
        }
        Ok(opened)
    }

    pub fn remove(&self, source: &MediaSource) -> bool {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts.pop(source).is_some()
    }

    pub fn clear(&self) {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn contains(&self, source: &MediaSource) -> bool {
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(source)
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::synthetic::SyntheticBackend;

    #[test]
    fn test_reuse_and_eviction() {
        let pool = ContextPool::new(Arc::new(SyntheticBackend::new(10.0)), 2);
        let a = MediaSource::new("a");
        let b = MediaSource::new("b");
        let c = MediaSource::new("c");

        let first = pool.get_or_create(&a).unwrap();
        let again = pool.get_or_create(&a).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        pool.get_or_create(&b).unwrap();
        pool.get_or_create(&a).unwrap(); // a is now most recent
        pool.get_or_create(&c).unwrap(); // evicts b

        assert_eq!(pool.len(), 2);
        assert!(pool.contains(&a));
        assert!(!pool.contains(&b));
        assert!(pool.contains(&c));
    }

    #[test]
    fn test_remove() {
        let pool = ContextPool::new(Arc::new(SyntheticBackend::new(10.0)), 4);
        let a = MediaSource::new("a");
        pool.get_or_create(&a).unwrap();
        assert!(pool.remove(&a));
        assert!(!pool.remove(&a));
        assert!(pool.is_empty());
    }
}
