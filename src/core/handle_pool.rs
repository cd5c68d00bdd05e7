//! Bounded LRU pool of live decode handles, one per source.
//!
//! Handles are created lazily on first `acquire`. When the pool grows past its
//! capacity the coldest handle is released: idle ones (no hover session, no
//! seek in flight) are preferred, so a handle that a seek is still decoding on
//! is only dropped if every other handle is busy too.

use log::{debug, trace, warn};
use lru::LruCache;
use std::sync::{Arc, Mutex};

use crate::entities::{DecodeHandle, MediaBackend, MediaSource, PreviewImage};

/// Borrowed reference to a pooled handle.
///
/// The pool owns the handle's lifetime: once it is evicted or released the
/// underlying decoder is shut down even if a `HandleRef` is still around.
#[derive(Clone)]
pub struct HandleRef {
    source: MediaSource,
    handle: Arc<dyn DecodeHandle>,
}

impl HandleRef {
    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    /// Latest frame the handle landed on
    pub fn current_frame(&self) -> Option<Arc<PreviewImage>> {
        self.handle.current_frame()
    }

    pub(crate) fn decoder(&self) -> &Arc<dyn DecodeHandle> {
        &self.handle
    }
}

impl std::fmt::Debug for HandleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRef").field("source", &self.source).finish()
    }
}

struct HandleSlot {
    handle: Arc<dyn DecodeHandle>,
    /// Acquired and not yet released (a hover session is running)
    hovered: bool,
}

/// Result of `HandlePool::acquire`
pub struct Acquired {
    pub handle: HandleRef,
    /// Sources whose handles were evicted to make room
    pub evicted: Vec<MediaSource>,
}

pub struct HandlePool {
    backend: Arc<dyn MediaBackend>,
    // Unbounded: eviction is done by hand to skip busy handles
    slots: Mutex<LruCache<MediaSource, HandleSlot>>,
    capacity: usize,
}

impl HandlePool {
    pub fn new(backend: Arc<dyn MediaBackend>, capacity: usize) -> Self {
        Self {
            backend,
            slots: Mutex::new(LruCache::unbounded()),
            capacity: capacity.max(1),
        }
    }

    /// Existing handle (LRU touch) or a new one. `None` if the backend can't open it.
    ///
    /// `is_busy` reports whether a source has a seek in flight; busy handles
    /// are evicted last.
    pub fn acquire(&self, source: &MediaSource, is_busy: impl Fn(&MediaSource) -> bool) -> Option<Acquired> {
        {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get_mut(source) {
                slot.hovered = true;
                return Some(Acquired {
                    handle: HandleRef {
                        source: source.clone(),
                        handle: Arc::clone(&slot.handle),
                    },
                    evicted: Vec::new(),
                });
            }
        }

        let opened = match self.backend.open_handle(source) {
            Ok(h) => h,
            Err(e) => {
                warn!("Failed to open decode handle for {}: {}", source.file_name(), e);
                return None;
            }
        };

        let mut released = Vec::new();
        let (handle, evicted) = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get_mut(source) {
                // Lost a race with another acquire; keep theirs
                trace!("Handle for {} opened concurrently, discarding ours", source.file_name());
                slot.hovered = true;
                released.push(opened);
                (Arc::clone(&slot.handle), Vec::new())
            } else {
                slots.push(
                    source.clone(),
                    HandleSlot {
                        handle: Arc::clone(&opened),
                        hovered: true,
                    },
                );
                debug!("Handle created for {} ({} live)", source.file_name(), slots.len());

                let mut evicted = Vec::new();
                while slots.len() > self.capacity {
                    let Some(victim) = Self::pick_victim(&slots, source, &is_busy) else {
                        break;
                    };
                    if let Some(slot) = slots.pop(&victim) {
                        debug!("Handle pool evicted {}", victim.file_name());
                        released.push(slot.handle);
                        evicted.push(victim);
                    }
                }
                (opened, evicted)
            }
        };

        // Tear down outside the lock; releasing may join a decoder thread.
        for h in released {
            h.release();
        }

        Some(Acquired {
            handle: HandleRef {
                source: source.clone(),
                handle,
            },
            evicted,
        })
    }

    /// Coldest idle handle, else coldest not-busy, else plain LRU.
    fn pick_victim(
        slots: &LruCache<MediaSource, HandleSlot>,
        keep: &MediaSource,
        is_busy: &impl Fn(&MediaSource) -> bool,
    ) -> Option<MediaSource> {
        // iter() runs most -> least recent; reverse for coldest first
        let candidates = || slots.iter().rev().filter(move |(s, _)| *s != keep);
        candidates()
            .find(|(s, slot)| !slot.hovered && !is_busy(*s))
            .or_else(|| candidates().find(|(s, _)| !is_busy(*s)))
            .or_else(|| candidates().next())
            .map(|(s, _)| s.clone())
    }

    /// End the hover session; the handle stays pooled but becomes evictable first.
    pub fn release(&self, source: &MediaSource) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.peek_mut(source) {
            Some(slot) => {
                slot.hovered = false;
                true
            }
            None => false,
        }
    }

    /// Drop a source's handle and shut its decoder down.
    pub fn remove(&self, source: &MediaSource) -> bool {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop(source);
        match slot {
            Some(slot) => {
                slot.handle.release();
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let drained: Vec<HandleSlot> = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let mut drained = Vec::with_capacity(slots.len());
            while let Some((_, slot)) = slots.pop_lru() {
                drained.push(slot);
            }
            drained
        };
        for slot in drained {
            slot.handle.release();
        }
    }

    /// True if `handle` is still the pooled handle for its source.
    pub fn holds(&self, handle: &HandleRef) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .peek(handle.source())
            .is_some_and(|slot| Arc::ptr_eq(&slot.handle, &handle.handle))
    }

    pub fn contains(&self, source: &MediaSource) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(source)
    }

    pub fn is_hovered(&self, source: &MediaSource) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .peek(source)
            .is_some_and(|slot| slot.hovered)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pooled sources, most recently used first
    pub fn sources(&self) -> Vec<MediaSource> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(s, _)| s.clone())
            .collect()
    }
}
