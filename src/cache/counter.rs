//! Atomic counter shared between tasks

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter shared between concurrent producers.
///
/// Increments are single atomic read-modify-write operations, so no update is
/// lost however many tasks increment at once.
#[derive(Debug, Clone, Default)]
pub struct SharedCounter {
    value: Arc<AtomicU64>,
}

impl SharedCounter {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one and return the new value
    pub fn increment(&self) -> u64 {
        self.add(1)
    }

    /// Add `n` and return the new value
    pub fn add(&self, n: u64) -> u64 {
        self.value.fetch_add(n, Ordering::SeqCst) + n
    }

    /// Current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}
