//! Counting completion barrier
//!
//! Participants are registered up front and each one holds a [`BarrierGuard`].
//! A guard signals completion exactly once: either through [`BarrierGuard::done`]
//! or when it is dropped, which covers early returns, errors and panics.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::trace;

struct BarrierState {
    outstanding: AtomicUsize,
    notify: Notify,
}

/// Blocks until every registered participant has signalled completion
#[derive(Clone)]
pub struct CompletionBarrier {
    state: Arc<BarrierState>,
}

impl CompletionBarrier {
    /// Create a barrier with no outstanding participants
    pub fn new() -> Self {
        Self {
            state: Arc::new(BarrierState {
                outstanding: AtomicUsize::new(0),
                notify: Notify::new(),
            }),
        }
    }

    /// Register one participant
    pub fn register(&self) -> BarrierGuard {
        self.state.outstanding.fetch_add(1, Ordering::AcqRel);
        BarrierGuard {
            state: Some(self.state.clone()),
        }
    }

    /// Register `n` participants at once
    pub fn register_many(&self, n: usize) -> Vec<BarrierGuard> {
        self.state.outstanding.fetch_add(n, Ordering::AcqRel);
        (0..n)
            .map(|_| BarrierGuard {
                state: Some(self.state.clone()),
            })
            .collect()
    }

    /// Number of participants that have not signalled yet
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }

    /// Wait until the outstanding count reaches zero.
    ///
    /// Returns immediately when nothing is outstanding.
    pub async fn wait(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a release between the
            // check and the await still wakes us.
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionBarrier")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// One registered participant. Releases its slot exactly once.
#[must_use = "dropping the guard signals completion immediately"]
pub struct BarrierGuard {
    state: Option<Arc<BarrierState>>,
}

impl BarrierGuard {
    /// Signal completion now
    pub fn done(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(state) = self.state.take() {
            let previous = state.outstanding.fetch_sub(1, Ordering::AcqRel);
            trace!(remaining = previous - 1, "Barrier participant released");
            if previous == 1 {
                state.notify.notify_waiters();
            }
        }
    }
}

impl Drop for BarrierGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BarrierGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarrierGuard")
            .field("released", &self.state.is_none())
            .finish()
    }
}
