//! Per-source seek coalescing.
//!
//! Hover events arrive far faster than a decoder can seek. For each source
//! the coordinator keeps at most one zero-tolerance seek in flight and a
//! single pending slot:
//!
//! ```text
//!   Idle --seek(t)--> Seeking --done--> Idle
//!                      |  ^
//!        seek(t') -----+  +---- done with pending t' -> issue t'
//!        (pending = t')
//! ```
//!
//! A request arriving while a seek runs overwrites the pending slot, so the
//! decoder never sees a second seek before the first finishes and the most
//! recent position always wins. Intermediate positions are dropped.
//!
//! Completion chaining is a trampoline: if the backend completes a seek
//! synchronously while we are still inside `seek_exact`, the next seek is
//! queued in `relaunch` and issued by the outer loop instead of recursing.

use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::handle_pool::HandleRef;
use crate::entities::{MediaSource, SeekOutcome};

/// Callback fired once per hover session when a real frame is visible.
pub type FirstFrameFn = Box<dyn FnOnce() + Send + 'static>;

/// What `seek` did with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDecision {
    /// Decoder was idle; seek issued now
    Issued,
    /// A seek is in flight; request stored as the pending target
    Coalesced,
    /// The handle was evicted or forgotten; nothing issued
    Dropped,
}

enum FirstFrame {
    /// No frame shown yet this session; holds the first callback offered
    Waiting(Option<FirstFrameFn>),
    Shown,
}

struct SeekState {
    /// Distinguishes this registration from earlier ones for the same source
    generation: u64,
    in_flight: bool,
    pending: Option<f64>,
    /// Inside `seek_exact` on the launching thread
    issuing: bool,
    /// Next target handed back to the launch loop by a synchronous completion
    relaunch: Option<f64>,
    first_frame: FirstFrame,
    /// Last time the decoder landed on
    landed: Option<f64>,
    /// Seeks actually sent to the decoder
    issued: u64,
}

impl SeekState {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            in_flight: false,
            pending: None,
            issuing: false,
            relaunch: None,
            first_frame: FirstFrame::Waiting(None),
            landed: None,
            issued: 0,
        }
    }
}

/// Snapshot of one source's seek state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekStatus {
    pub in_flight: bool,
    pub pending: Option<f64>,
    pub landed: Option<f64>,
    pub issued: u64,
    pub first_frame_shown: bool,
}

#[derive(Default)]
pub struct SeekCoordinator {
    states: Mutex<HashMap<MediaSource, SeekState>>,
    next_generation: AtomicU64,
}

impl SeekCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that `handle` show `time`.
    ///
    /// Never blocks on the decoder. `on_first_frame` is kept only if no
    /// callback is waiting yet in this hover session.
    pub fn seek(self: &Arc<Self>, handle: &HandleRef, time: f64, on_first_frame: Option<FirstFrameFn>) -> SeekDecision {
        let source = handle.source();
        let generation = {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            let st = states
                .entry(source.clone())
                .or_insert_with(|| SeekState::new(self.next_generation.fetch_add(1, Ordering::Relaxed)));

            if let FirstFrame::Waiting(slot) = &mut st.first_frame {
                if slot.is_none() {
                    *slot = on_first_frame;
                }
            }

            if st.in_flight {
                trace!("Seek coalesced: {} -> {:.3}", source.file_name(), time);
                st.pending = Some(time);
                return SeekDecision::Coalesced;
            }
            st.in_flight = true;
            st.pending = None;
            st.generation
        };

        self.launch(handle.clone(), time, generation);
        SeekDecision::Issued
    }

    /// Issue seeks until no synchronous completion hands back a new target.
    fn launch(self: &Arc<Self>, handle: HandleRef, mut time: f64, generation: u64) {
        loop {
            {
                let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
                match states.get_mut(handle.source()) {
                    Some(st) if st.generation == generation => {
                        st.issuing = true;
                        st.issued += 1;
                    }
                    _ => return,
                }
            }

            trace!("Seek issued: {} @ {:.3}", handle.source().file_name(), time);
            let this = Arc::clone(self);
            let done_handle = handle.clone();
            handle.decoder().seek_exact(
                time,
                Box::new(move |outcome| this.complete(done_handle, time, generation, outcome)),
            );

            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            let Some(st) = states.get_mut(handle.source()) else {
                return;
            };
            if st.generation != generation {
                return;
            }
            st.issuing = false;
            match st.relaunch.take() {
                Some(next) => time = next,
                None => return,
            }
        }
    }

    fn complete(self: &Arc<Self>, handle: HandleRef, time: f64, generation: u64, outcome: SeekOutcome) {
        let (callback, next) = {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            let st = match states.get_mut(handle.source()) {
                Some(st) if st.generation == generation => st,
                _ => {
                    trace!("Stale seek completion for {} discarded", handle.source().file_name());
                    return;
                }
            };

            st.in_flight = false;
            let mut callback = None;
            match outcome {
                SeekOutcome::Landed => {
                    st.landed = Some(time);
                    if let FirstFrame::Waiting(slot) = &mut st.first_frame {
                        callback = slot.take();
                        st.first_frame = FirstFrame::Shown;
                    }
                }
                SeekOutcome::Failed => {
                    debug!("Seek failed: {} @ {:.3}", handle.source().file_name(), time);
                }
            }

            let mut next = None;
            if let Some(pending) = st.pending.take() {
                st.in_flight = true;
                if st.issuing {
                    st.relaunch = Some(pending);
                } else {
                    next = Some(pending);
                }
            }
            (callback, next)
        };

        if let Some(cb) = callback {
            cb();
        }
        if let Some(next) = next {
            self.launch(handle, next, generation);
        }
    }

    /// Hover exit: the next landed seek fires a fresh first-frame callback.
    pub fn end_session(&self, source: &MediaSource) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(st) = states.get_mut(source) {
            st.first_frame = FirstFrame::Waiting(None);
        }
    }

    /// Drop all state for a source. Completions still in flight become stale.
    pub fn forget(&self, source: &MediaSource) -> bool {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.remove(source).is_some()
    }

    pub fn clear(&self) {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// True while a seek for `source` is being decoded
    pub fn is_busy(&self, source: &MediaSource) -> bool {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
            .is_some_and(|st| st.in_flight)
    }

    pub fn status(&self, source: &MediaSource) -> Option<SeekStatus> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.get(source).map(|st| SeekStatus {
            in_flight: st.in_flight,
            pending: st.pending,
            landed: st.landed,
            issued: st.issued,
            first_frame_shown: matches!(st.first_frame, FirstFrame::Shown),
        })
    }

    pub fn tracked_sources(&self) -> usize {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
