//! Result channels with an explicit closed state
//!
//! A channel has exactly one [`ChannelOwner`]. The owner hands out
//! [`ResultSender`] clones to producers and closes the channel once, by
//! consuming itself. The consumer holds the [`ResultReceiver`], which yields
//! `None` after the owner has closed and every sender is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tracing::debug;

use crate::{FanoutError, Result};

enum Tx<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for Tx<T> {
    fn clone(&self) -> Self {
        match self {
            Tx::Bounded(tx) => Tx::Bounded(tx.clone()),
            Tx::Unbounded(tx) => Tx::Unbounded(tx.clone()),
        }
    }
}

enum Rx<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

/// Create a channel buffering at most `capacity` results (minimum one)
pub fn bounded<T>(capacity: usize) -> (ChannelOwner<T>, ResultReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    pair(Tx::Bounded(tx), Rx::Bounded(rx))
}

/// Create a channel with an unbounded buffer
pub fn unbounded<T>() -> (ChannelOwner<T>, ResultReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    pair(Tx::Unbounded(tx), Rx::Unbounded(rx))
}

/// A receiver that is already closed and will never yield a result
pub fn closed<T>() -> ResultReceiver<T> {
    let (owner, receiver) = bounded(1);
    owner.close();
    receiver
}

fn pair<T>(tx: Tx<T>, rx: Rx<T>) -> (ChannelOwner<T>, ResultReceiver<T>) {
    let closed = Arc::new(AtomicBool::new(false));
    (
        ChannelOwner {
            tx,
            closed: closed.clone(),
        },
        ResultReceiver { rx, closed },
    )
}

/// The single party allowed to close a result channel
pub struct ChannelOwner<T> {
    tx: Tx<T>,
    closed: Arc<AtomicBool>,
}

impl<T> ChannelOwner<T> {
    /// Hand out a sender for one producer
    pub fn sender(&self) -> ResultSender<T> {
        ResultSender {
            tx: self.tx.clone(),
        }
    }

    /// Close the channel. Results already sent stay readable.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> Drop for ChannelOwner<T> {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Result channel closed");
        }
    }
}

impl<T> std::fmt::Debug for ChannelOwner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelOwner").finish_non_exhaustive()
    }
}

/// Producer side of a result channel
pub struct ResultSender<T> {
    tx: Tx<T>,
}

impl<T> ResultSender<T> {
    /// Send one result, waiting for buffer space on a bounded channel.
    ///
    /// Fails with [`FanoutError::ChannelClosed`] once the receiver is gone.
    pub async fn send(&self, value: T) -> Result<()> {
        match &self.tx {
            Tx::Bounded(tx) => tx.send(value).await.map_err(|_| FanoutError::ChannelClosed),
            Tx::Unbounded(tx) => tx.send(value).map_err(|_| FanoutError::ChannelClosed),
        }
    }
}

impl<T> Clone for ResultSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ResultSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.tx {
            Tx::Bounded(_) => "bounded",
            Tx::Unbounded(_) => "unbounded",
        };
        f.debug_struct("ResultSender").field("kind", &kind).finish()
    }
}

/// Consumer side of a result channel
pub struct ResultReceiver<T> {
    rx: Rx<T>,
    closed: Arc<AtomicBool>,
}

impl<T> ResultReceiver<T> {
    /// Receive the next result, or `None` once the channel is closed and drained
    pub async fn recv(&mut self) -> Option<T> {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Receive with an upper bound on the wait
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<T>> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| FanoutError::Timeout(timeout))
    }

    /// Whether the owner has closed the channel.
    ///
    /// Buffered results may still be waiting to be received.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Receive every remaining result until the channel is closed
    pub async fn drain(mut self) -> Vec<T> {
        let mut results = Vec::new();
        while let Some(result) = self.recv().await {
            results.push(result);
        }
        results
    }
}

impl<T: Send + 'static> ResultReceiver<T> {
    /// Consume the receiver as a stream of results
    pub fn into_stream(self) -> BoxStream<'static, T> {
        match self.rx {
            Rx::Bounded(rx) => ReceiverStream::new(rx).boxed(),
            Rx::Unbounded(rx) => UnboundedReceiverStream::new(rx).boxed(),
        }
    }
}

impl<T> std::fmt::Debug for ResultReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultReceiver")
            .field("closed", &self.is_closed())
            .finish()
    }
}
