//! Single-item asynchronous dispatch
//!
//! [`AsyncTaskRunner::dispatch`] returns at once and computes the transform on
//! a separate Tokio task. The result travels over a oneshot channel, which has
//! room for the one value, so the producing task never waits on the consumer.
//! If the [`TaskHandle`] is dropped the result is discarded and the task ends.

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, Instrument};

use crate::cache::SharedCounter;
use crate::channel::ResultSender;
use crate::task::transform::{self, TransformError, TransformFn};
use crate::{FanoutError, Result};

type Outcome<O> = std::result::Result<O, TransformError>;

/// Dispatches single work items onto independent tasks
pub struct AsyncTaskRunner<I, O> {
    transform: TransformFn<I, O>,
    dispatched: SharedCounter,
}

impl<I, O> AsyncTaskRunner<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Create a runner around a fallible transform
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(I) -> Outcome<O> + Send + Sync + 'static,
    {
        Self::from_transform(transform::fallible(f))
    }

    /// Create a runner around a transform that cannot fail
    pub fn infallible<F>(f: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Self::from_transform(transform::infallible(f))
    }

    /// Create a runner from an already shared transform
    pub fn from_transform(transform: TransformFn<I, O>) -> Self {
        Self {
            transform,
            dispatched: SharedCounter::new(),
        }
    }

    /// Start computing `item` and return a handle to its result.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, item: I) -> TaskHandle<O> {
        let task_id = self.dispatched.increment();
        let (tx, rx) = oneshot::channel();
        let transform = self.transform.clone();

        tokio::spawn(
            async move {
                let outcome = transform::apply(&transform, item);
                if tx.send(outcome).is_err() {
                    debug!("Task handle dropped before the result was delivered");
                }
            }
            .instrument(debug_span!("dispatch", task_id)),
        );

        TaskHandle {
            task_id,
            rx: Some(rx),
        }
    }

    /// Start computing `item` and deliver the outcome on a caller-owned channel.
    ///
    /// On a bounded channel the send waits for buffer space, so the caller
    /// must keep a consumer running or size the channel for every dispatch.
    pub fn dispatch_into(&self, item: I, sender: ResultSender<Outcome<O>>) -> JoinHandle<()> {
        let task_id = self.dispatched.increment();
        let transform = self.transform.clone();

        tokio::spawn(
            async move {
                let outcome = transform::apply(&transform, item);
                if sender.send(outcome).await.is_err() {
                    debug!("Result receiver dropped before the result was delivered");
                }
            }
            .instrument(debug_span!("dispatch_into", task_id)),
        )
    }

    /// Number of items dispatched so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched.get()
    }
}

impl<I, O> Clone for AsyncTaskRunner<I, O> {
    fn clone(&self) -> Self {
        Self {
            transform: self.transform.clone(),
            dispatched: self.dispatched.clone(),
        }
    }
}

/// Receiving end for one dispatched item
pub struct TaskHandle<O> {
    task_id: u64,
    rx: Option<oneshot::Receiver<Outcome<O>>>,
}

impl<O> TaskHandle<O> {
    /// Identifier assigned at dispatch, starting at 1
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    /// Wait for the result with no bound.
    ///
    /// Prefer [`TaskHandle::recv_timeout`] unless the transform is known to finish.
    pub async fn recv(&mut self) -> Result<O> {
        let rx = self.rx.as_mut().ok_or(FanoutError::ChannelClosed)?;
        let received = rx.await;
        self.settle(received)
    }

    /// Wait for the result, giving up after `timeout`.
    ///
    /// A timeout leaves the handle usable, so the caller may wait again.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<O> {
        let rx = self.rx.as_mut().ok_or(FanoutError::ChannelClosed)?;
        let waited = tokio::time::timeout(timeout, rx).await;
        match waited {
            Ok(received) => self.settle(received),
            Err(_) => Err(FanoutError::Timeout(timeout)),
        }
    }

    /// Take the result if it has already arrived
    pub fn try_recv(&mut self) -> Result<Option<O>> {
        let rx = self.rx.as_mut().ok_or(FanoutError::ChannelClosed)?;
        match rx.try_recv() {
            Ok(outcome) => self.settle(Ok(outcome)).map(Some),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Err(self.lost())
            }
        }
    }

    fn settle(
        &mut self,
        received: std::result::Result<Outcome<O>, oneshot::error::RecvError>,
    ) -> Result<O> {
        self.rx = None;
        match received {
            Ok(outcome) => outcome.map_err(FanoutError::from),
            Err(_) => Err(self.lost()),
        }
    }

    fn lost(&self) -> FanoutError {
        FanoutError::WorkerLost(format!("task {} ended without a result", self.task_id))
    }
}

impl<O> std::fmt::Debug for TaskHandle<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_id", &self.task_id)
            .field("pending", &self.rx.is_some())
            .finish()
    }
}
