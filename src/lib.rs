//! # fanout
//!
//! Concurrency building blocks for dispatching work onto Tokio tasks and
//! collecting the results safely.
//!
//! ## Overview
//!
//! Three pieces carry all of the coordination:
//!
//! - [`cache::SharedCache`]: a mutex-guarded key/value store that many tasks can
//!   read and write without losing updates.
//! - [`task::AsyncTaskRunner`]: dispatches one unit of work onto its own task and
//!   hands back a [`task::TaskHandle`] that delivers exactly one result.
//! - [`batch::BatchExecutor`]: fans a collection of items out to one worker each,
//!   fans the results back in over a shared [`channel::ResultReceiver`], and closes
//!   the channel only after every worker has signalled a [`sync::CompletionBarrier`].
//!
//! ## Quick Start
//!
//! ```rust
//! use fanout::batch::BatchExecutor;
//!
//! # async fn example() -> fanout::Result<()> {
//! let executor = BatchExecutor::infallible(|x: i64| x * 2);
//! let mut results = executor.run(vec![1, 2, 3, 4, 5]);
//!
//! let mut doubled = Vec::new();
//! while let Some(result) = results.recv().await {
//!     doubled.push(result.into_output()?);
//! }
//! doubled.sort();
//! assert_eq!(doubled, vec![2, 4, 6, 8, 10]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: shared cache and counters
//! - [`sync`]: completion barrier
//! - [`channel`]: result channels with an explicit closed state
//! - [`task`]: single-item dispatch and transform plumbing
//! - [`batch`]: fan-out/fan-in batch execution
//! - [`telemetry`]: tracing subscriber setup

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::time::Duration;
use thiserror::Error;

/// Result type for fanout operations
pub type Result<T> = std::result::Result<T, FanoutError>;

/// Main error type for fanout operations
#[derive(Error, Debug)]
pub enum FanoutError {
    /// The per-item computation failed
    #[error("Transform error: {0}")]
    Transform(#[from] task::TransformError),

    /// No result arrived within the receive timeout
    #[error("Timed out after {0:?} waiting for a result")]
    Timeout(Duration),

    /// The result channel is closed and holds no further results
    #[error("Result channel closed")]
    ChannelClosed,

    /// The worker went away without delivering its result
    #[error("Worker lost: {0}")]
    WorkerLost(String),

    /// Join error from async tasks
    #[error("Async join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Shared cache and counters
pub mod cache;

/// Completion barrier
pub mod sync;

/// Result channels
pub mod channel;

/// Single-item dispatch
pub mod task;

/// Fan-out/fan-in batch execution
pub mod batch;

/// Tracing setup
pub mod telemetry;
