//! Results, progress snapshots and configuration for batch execution

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::task::TransformError;
use crate::{FanoutError, Result};

/// Result of one work item in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct WorkResult<O> {
    /// Position of the item in the input (arrival order on the channel is unspecified)
    pub index: usize,
    /// Output of the transform, or why it failed
    pub outcome: std::result::Result<O, TransformError>,
    /// Time spent in the transform
    pub duration: Duration,
}

impl<O> WorkResult<O> {
    /// Whether the transform succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Output of a successful transform
    pub fn output(&self) -> Option<&O> {
        self.outcome.as_ref().ok()
    }

    /// Error of a failed transform
    pub fn error(&self) -> Option<&TransformError> {
        self.outcome.as_ref().err()
    }

    /// Take the output, surfacing a failure as [`FanoutError::Transform`]
    pub fn into_output(self) -> Result<O> {
        self.outcome.map_err(FanoutError::from)
    }
}

/// Snapshot passed to the progress callback after each item finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Items finished so far, successful or not
    pub completed: usize,
    /// Items whose transform failed so far
    pub failed: usize,
    /// Batch size, when known up front
    pub total: Option<usize>,
}

/// Buffering of the result channel for streamed batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamBuffer {
    /// Single-slot handoff; the consumer must run alongside the batch
    Rendezvous,
    /// Buffer up to this many results
    Bounded(usize),
    /// Never block producers
    Unbounded,
}

/// Batch execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of transforms running at once
    pub concurrency_limit: usize,
    /// Result buffering for [`run_stream`](crate::batch::BatchExecutor::run_stream)
    pub stream_buffer: StreamBuffer,
}

impl BatchConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: BatchConfig = serde_json::from_str(json)?;
        config.concurrency_limit = clamp_concurrency(config.concurrency_limit);
        Ok(config)
    }
}

/// Keep a concurrency limit within what a semaphore can hold
pub(crate) fn clamp_concurrency(limit: usize) -> usize {
    limit.clamp(1, Semaphore::MAX_PERMITS)
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: num_cpus::get(),
            stream_buffer: StreamBuffer::Rendezvous,
        }
    }
}

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(BatchProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_partial_json() {
        let config = BatchConfig::from_json(r#"{"stream_buffer": {"bounded": 16}}"#).unwrap();
        assert_eq!(config.stream_buffer, StreamBuffer::Bounded(16));
        assert_eq!(config.concurrency_limit, num_cpus::get());
    }

    #[test]
    fn test_config_rejects_zero_concurrency() {
        let config = BatchConfig::from_json(r#"{"concurrency_limit": 0, "stream_buffer": "unbounded"}"#).unwrap();
        assert_eq!(config.concurrency_limit, 1);
        assert_eq!(config.stream_buffer, StreamBuffer::Unbounded);
    }

    #[test]
    fn test_config_clamps_huge_concurrency() {
        let config = BatchConfig::from_json(r#"{"concurrency_limit": 18446744073709551615}"#).unwrap();
        assert_eq!(config.concurrency_limit, Semaphore::MAX_PERMITS);
    }

    #[test]
    fn test_config_invalid_json() {
        assert!(matches!(BatchConfig::from_json("{"), Err(FanoutError::Config(_))));
    }

    #[test]
    fn test_work_result_accessors() {
        let ok = WorkResult { index: 0, outcome: Ok(4), duration: Duration::ZERO };
        assert!(ok.is_success());
        assert_eq!(ok.output(), Some(&4));
        assert_eq!(ok.into_output().unwrap(), 4);

        let failed: WorkResult<i32> = WorkResult {
            index: 1,
            outcome: Err(TransformError::failed("boom")),
            duration: Duration::ZERO,
        };
        assert_eq!(failed.error(), Some(&TransformError::failed("boom")));
        assert!(matches!(failed.into_output(), Err(FanoutError::Transform(_))));
    }
}
