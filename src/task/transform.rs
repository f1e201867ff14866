//! Per-item transforms and in-band failure capture

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single per-item computation.
///
/// Carried in-band inside results so a failing item never takes its
/// siblings or the process down with it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The transform reported an error
    #[error("transform failed: {0}")]
    Failed(String),

    /// The transform panicked; the payload message is kept
    #[error("transform panicked: {0}")]
    Panicked(String),
}

impl TransformError {
    /// Shorthand for [`TransformError::Failed`]
    pub fn failed(message: impl Into<String>) -> Self {
        TransformError::Failed(message.into())
    }
}

/// Shared, thread-safe transform from a work item to an outcome
pub type TransformFn<I, O> = Arc<dyn Fn(I) -> Result<O, TransformError> + Send + Sync>;

/// Wrap a fallible closure
pub fn fallible<I, O, F>(f: F) -> TransformFn<I, O>
where
    F: Fn(I) -> Result<O, TransformError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a total closure
pub fn infallible<I, O, F>(f: F) -> TransformFn<I, O>
where
    F: Fn(I) -> O + Send + Sync + 'static,
{
    Arc::new(move |item| Ok(f(item)))
}

/// Run `transform` on `item`, converting a panic into [`TransformError::Panicked`]
pub(crate) fn apply<I, O>(transform: &TransformFn<I, O>, item: I) -> Result<O, TransformError> {
    match panic::catch_unwind(AssertUnwindSafe(|| transform(item))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(TransformError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
