//! Memory budget for the preview caches.
//!
//! The caches are bounded by entry count, but 2000 full-size frames plus a
//! dozen decoded tracks can still be large. `MemoryBudget` turns a fraction of
//! available system memory into a byte limit that the pipeline checks in
//! `relieve_pressure`.

use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};
use sysinfo::System;

#[derive(Debug)]
pub struct MemoryBudget {
    /// Maximum allowed cache memory (bytes); atomic for lock-free updates
    max_bytes: AtomicUsize,
}

impl MemoryBudget {
    /// Budget from system memory.
    ///
    /// * `mem_fraction` - Fraction of available memory (0.0-1.0)
    /// * `reserve_gb` - Memory left for the system (GB)
    pub fn new(mem_fraction: f64, reserve_gb: f64) -> Self {
        let limit = Self::compute_limit(mem_fraction, reserve_gb);
        info!(
            "MemoryBudget init: limit={} MB ({}% of available)",
            limit / 1024 / 1024,
            (mem_fraction * 100.0) as u32
        );
        Self {
            max_bytes: AtomicUsize::new(limit),
        }
    }

    /// Budget with an explicit byte limit
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            max_bytes: AtomicUsize::new(max_bytes),
        }
    }

    fn compute_limit(mem_fraction: f64, reserve_gb: f64) -> usize {
        let mut sys = System::new();
        sys.refresh_memory();

        let available = sys.available_memory() as usize;
        let reserve = (reserve_gb.max(0.0) * 1024.0 * 1024.0 * 1024.0) as usize;
        let usable = available.saturating_sub(reserve);
        (usable as f64 * mem_fraction.clamp(0.0, 1.0)) as usize
    }

    pub fn limit(&self) -> usize {
        self.max_bytes.load(Ordering::Relaxed)
    }

    pub fn set_limit(&self, max_bytes: usize) {
        self.max_bytes.store(max_bytes, Ordering::Relaxed);
        info!("Memory limit updated: {} MB", max_bytes / 1024 / 1024);
    }

    /// True if `used` bytes exceed the limit
    pub fn exceeded_by(&self, used: usize) -> bool {
        used > self.limit()
    }

    /// Fraction of the budget in use (0.0 when the limit is 0)
    pub fn usage_fraction(&self, used: usize) -> f64 {
        let limit = self.limit();
        if limit == 0 { 0.0 } else { used as f64 / limit as f64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_limit() {
        let budget = MemoryBudget::with_limit(1024);
        assert!(!budget.exceeded_by(1024));
        assert!(budget.exceeded_by(1025));
        assert_eq!(budget.usage_fraction(512), 0.5);
    }

    #[test]
    fn test_system_budget_is_bounded_by_fraction() {
        let half = MemoryBudget::new(0.5, 0.0).limit();
        let full = MemoryBudget::new(1.0, 0.0).limit();
        assert!(half <= full);
    }
}
