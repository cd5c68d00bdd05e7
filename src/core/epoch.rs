//! Epoch counters for discarding stale decode results.
//!
//! A background decode captures an [`EpochStamp`] when it is launched. Before
//! its result is published, the stamp is compared against the current epochs:
//! - the global epoch moves on `clear_all`
//! - a per-source epoch moves on `forget_source`
//!
//! A mismatch means the source was purged while the decode ran; the result is
//! dropped instead of repopulating a cache.

use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::entities::MediaSource;

/// Epochs observed when a job was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochStamp {
    pub global: u64,
    pub source: u64,
}

#[derive(Debug, Default)]
pub struct Epochs {
    global: Arc<AtomicU64>,
    per_source: Mutex<HashMap<MediaSource, u64>>,
}

impl Epochs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared global counter (handed to `Workers` for queue-time skipping)
    pub fn global_ref(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.global)
    }

    pub fn global(&self) -> u64 {
        self.global.load(Ordering::Acquire)
    }

    pub fn stamp(&self, source: &MediaSource) -> EpochStamp {
        let per_source = self.per_source.lock().unwrap_or_else(|e| e.into_inner());
        EpochStamp {
            global: self.global(),
            source: per_source.get(source).copied().unwrap_or(0),
        }
    }

    pub fn is_current(&self, source: &MediaSource, stamp: EpochStamp) -> bool {
        self.stamp(source) == stamp
    }

    /// Invalidate every in-flight job for `source`.
    ///
    /// The counter outlives the purge so late results stay detectable; one
    /// `u64` per forgotten source until the next `bump_all` drops them all.
    pub fn bump_source(&self, source: &MediaSource) {
        let mut per_source = self.per_source.lock().unwrap_or_else(|e| e.into_inner());
        *per_source.entry(source.clone()).or_insert(0) += 1;
    }

    /// Sources with a non-zero purge counter
    pub fn tracked_sources(&self) -> usize {
        self.per_source.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Invalidate every in-flight job and prune the per-source counters.
    /// Returns the new global epoch.
    pub fn bump_all(&self) -> u64 {
        let mut per_source = self.per_source.lock().unwrap_or_else(|e| e.into_inner());
        // Source counters restart from 0; stale stamps still differ in `global`.
        per_source.clear();
        let new_epoch = self.global.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Epoch incremented: {}", new_epoch);
        new_epoch
    }
}
