//! Batch Executor Implementation
//!
//! Fan-out/fan-in processing of work items:
//! - One worker task per item, each holding a completion barrier guard
//! - Results fanned back in over a single result channel
//! - The channel is closed by its owner only after the barrier opens
//! - Semaphore-based limit on how many transforms run at once
//! - Progress callbacks and a summary log per batch

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use futures::stream::{Stream, StreamExt};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::batch::types::*;
use crate::cache::SharedCounter;
use crate::channel::{self, ChannelOwner, ResultReceiver, ResultSender};
use crate::sync::{BarrierGuard, CompletionBarrier};
use crate::task::transform::{self, TransformError, TransformFn};

/// Batch executor fanning work items out to concurrent workers
pub struct BatchExecutor<I, O> {
    /// Per-item computation
    transform: TransformFn<I, O>,
    /// Concurrency and buffering settings
    config: BatchConfig,
    /// Progress callback
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl<I, O> BatchExecutor<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Create a batch executor around a fallible transform
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(I) -> Result<O, TransformError> + Send + Sync + 'static,
    {
        Self::from_transform(transform::fallible(f))
    }

    /// Create a batch executor around a transform that cannot fail
    pub fn infallible<F>(f: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Self::from_transform(transform::infallible(f))
    }

    /// Create a batch executor from an already shared transform
    pub fn from_transform(transform: TransformFn<I, O>) -> Self {
        Self {
            transform,
            config: BatchConfig::default(),
            progress_callback: None,
        }
    }

    /// Set concurrency limit (number of transforms running at once)
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.config.concurrency_limit = clamp_concurrency(limit);
        self
    }

    /// Set result buffering for streamed batches
    pub fn with_stream_buffer(mut self, buffer: StreamBuffer) -> Self {
        self.config.stream_buffer = buffer;
        self
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self.config.concurrency_limit = clamp_concurrency(self.config.concurrency_limit);
        self
    }

    /// Set progress callback
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(BatchProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Current configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Fan `items` out to one worker each and return the shared result channel.
    ///
    /// Returns immediately. The channel buffers one slot per item, so workers
    /// never wait on the consumer, and it closes after the last worker has
    /// finished. Results arrive in completion order, not input order. An
    /// empty batch yields an already closed channel.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, items), fields(item_count = items.len()))]
    pub fn run(&self, items: Vec<I>) -> ResultReceiver<WorkResult<O>> {
        let started = Instant::now();
        let total = items.len();
        if total == 0 {
            info!("No items to execute in batch");
            return channel::closed();
        }

        info!(
            total_items = total,
            concurrency_limit = self.config.concurrency_limit,
            "Starting batch execution"
        );

        let (owner, receiver) = channel::bounded(total);
        let barrier = CompletionBarrier::new();
        // Every guard exists before the first worker starts, so the barrier
        // cannot open early.
        let guards = barrier.register_many(total);
        let workers = self.workers(Some(total));

        for ((index, item), guard) in items.into_iter().enumerate().zip(guards) {
            workers.spawn(index, item, guard, owner.sender());
        }

        tokio::spawn(close_when_done(barrier, owner, workers.tally, started).in_current_span());

        receiver
    }

    /// Fan out items from a stream of unknown length.
    ///
    /// Results are buffered according to [`BatchConfig::stream_buffer`]. With
    /// [`StreamBuffer::Rendezvous`] or a small bound, the consumer must drain
    /// the receiver while the stream is still producing, or workers stall.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, items))]
    pub fn run_stream<S>(&self, items: S) -> ResultReceiver<WorkResult<O>>
    where
        S: Stream<Item = I> + Send + 'static,
    {
        let (owner, receiver) = match self.config.stream_buffer {
            StreamBuffer::Rendezvous => channel::bounded(1),
            StreamBuffer::Bounded(capacity) => channel::bounded(capacity),
            StreamBuffer::Unbounded => channel::unbounded(),
        };
        let workers = self.workers(None);

        info!(
            stream_buffer = ?self.config.stream_buffer,
            concurrency_limit = self.config.concurrency_limit,
            "Starting streamed batch execution"
        );

        tokio::spawn(
            async move {
                let started = Instant::now();
                let barrier = CompletionBarrier::new();
                let mut items = Box::pin(items);
                let mut index = 0;

                // A panicking stream ends the input; the owner still waits for
                // the workers already spawned before closing.
                loop {
                    match AssertUnwindSafe(items.next()).catch_unwind().await {
                        Ok(Some(item)) => {
                            workers.spawn(index, item, barrier.register(), owner.sender());
                            index += 1;
                        }
                        Ok(None) => {
                            debug!(total_items = index, "Input stream exhausted");
                            break;
                        }
                        Err(payload) => {
                            warn!(
                                total_items = index,
                                panic = %transform::panic_message(payload.as_ref()),
                                "Input stream panicked, treating it as exhausted"
                            );
                            break;
                        }
                    }
                }

                close_when_done(barrier, owner, workers.tally, started).await;
            }
            .in_current_span(),
        );

        receiver
    }

    /// Run a batch and wait for every result
    pub async fn collect(&self, items: Vec<I>) -> Vec<WorkResult<O>> {
        self.run(items).drain().await
    }

    fn workers(&self, total: Option<usize>) -> Workers<I, O> {
        Workers {
            transform: self.transform.clone(),
            semaphore: Arc::new(Semaphore::new(self.config.concurrency_limit)),
            tally: Arc::new(Tally::default()),
            progress: self.progress_callback.clone(),
            total,
        }
    }
}

/// Outcome counters shared by the workers of one batch
#[derive(Default)]
struct Tally {
    completed: SharedCounter,
    failed: SharedCounter,
}

/// Everything a worker of one batch needs
struct Workers<I, O> {
    transform: TransformFn<I, O>,
    semaphore: Arc<Semaphore>,
    tally: Arc<Tally>,
    progress: Option<Arc<ProgressCallback>>,
    total: Option<usize>,
}

impl<I, O> Workers<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn spawn(&self, index: usize, item: I, guard: BarrierGuard, sender: ResultSender<WorkResult<O>>) {
        let transform = self.transform.clone();
        let semaphore = self.semaphore.clone();
        let tally = self.tally.clone();
        let progress = self.progress.clone();
        let total = self.total;

        tokio::spawn(
            async move {
                let _guard = guard;
                // Declared after the guard so it is dropped first.
                let sender = sender;

                let (outcome, duration) = {
                    // The semaphore is never closed; a missing permit only lifts the limit.
                    let _permit = semaphore.acquire_owned().await.ok();
                    let start = Instant::now();
                    let outcome = transform::apply(&transform, item);
                    (outcome, start.elapsed())
                };

                let completed = tally.completed.increment() as usize;
                let failed = match &outcome {
                    Ok(_) => {
                        debug!(index, duration_ms = duration.as_millis(), "Work item completed");
                        tally.failed.get() as usize
                    }
                    Err(e) => {
                        warn!(index, error = %e, "Work item failed");
                        tally.failed.increment() as usize
                    }
                };

                if sender.send(WorkResult { index, outcome, duration }).await.is_err() {
                    debug!(index, "Result receiver dropped, discarding result");
                }

                if let Some(ref callback) = progress {
                    callback(BatchProgress { completed, failed, total });
                }
            }
            .in_current_span(),
        );
    }
}

/// Owner side of a batch: wait for every worker, then close the channel once
async fn close_when_done<T>(
    barrier: CompletionBarrier,
    owner: ChannelOwner<T>,
    tally: Arc<Tally>,
    started: Instant,
) {
    barrier.wait().await;
    owner.close();

    let completed = tally.completed.get();
    let failed = tally.failed.get();
    info!(
        completed,
        failed,
        batch_duration_ms = started.elapsed().as_millis(),
        "Batch execution completed"
    );

    if completed > 5 && failed * 5 > completed {
        warn!(completed, failed, "High failure rate detected in batch execution");
    }
}
