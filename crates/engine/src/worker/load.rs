//! Load tracking for the worker pool
//!
//! Counts attempts waiting for a slot and attempts running, using atomics so
//! worker tasks can update them without locks.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of pool load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    /// Attempts admitted but waiting for an execution slot
    pub queued: usize,

    /// Attempts currently executing
    pub running: usize,

    /// Free execution slots
    pub available_slots: usize,
}

/// Queued/running counters for a pool
#[derive(Debug)]
pub struct PoolLoad {
    queued: AtomicUsize,
    running: AtomicUsize,
    max_concurrency: usize,
}

impl PoolLoad {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Record that an attempt was admitted
    pub fn task_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a queued attempt took an execution slot
    pub fn task_started(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a running attempt finished
    pub fn task_finished(&self) {
        self.running.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record that a queued attempt left without running
    pub fn task_dropped(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Attempts currently executing
    pub fn current_load(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Running attempts relative to slots (0.0 - 1.0)
    pub fn load_ratio(&self) -> f64 {
        self.current_load() as f64 / self.max_concurrency as f64
    }

    pub fn available_slots(&self) -> usize {
        self.max_concurrency.saturating_sub(self.current_load())
    }

    pub fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot {
            queued: self.queued(),
            running: self.current_load(),
            available_slots: self.available_slots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_load() {
        let load = PoolLoad::new(4);
        assert_eq!(load.current_load(), 0);
        assert_eq!(load.queued(), 0);
        assert_eq!(load.available_slots(), 4);
        assert_eq!(load.load_ratio(), 0.0);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let load = PoolLoad::new(0);
        assert_eq!(load.max_concurrency(), 1);
    }

    #[test]
    fn test_task_lifecycle() {
        let load = PoolLoad::new(2);

        load.task_queued();
        load.task_queued();
        load.task_queued();
        assert_eq!(load.queued(), 3);

        load.task_started();
        load.task_started();
        assert_eq!(
            load.snapshot(),
            LoadSnapshot {
                queued: 1,
                running: 2,
                available_slots: 0
            }
        );
        assert_eq!(load.load_ratio(), 1.0);

        load.task_finished();
        load.task_dropped();
        assert_eq!(load.queued(), 0);
        assert_eq!(load.current_load(), 1);
        assert_eq!(load.available_slots(), 1);
    }
}
