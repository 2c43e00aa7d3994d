use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected processor configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
    #[error("worker count must be at least 1")]
    ZeroWorkerCount,
    #[error("processor requires a message source")]
    MissingMessageSource,
    #[error("processor requires a token store")]
    MissingTokenStore,
    #[error("processor requires an event handler invoker")]
    MissingHandlerInvoker,
}

/// Which processing failures roll back the batch transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Any handler failure rolls back the batch.
    #[default]
    AnyError,
    /// Handler failures never roll back; the batch commits past them.
    Never,
}

impl RollbackPolicy {
    /// Whether a handler failure must roll back the batch transaction.
    pub fn requires_rollback(&self) -> bool {
        matches!(self, RollbackPolicy::AnyError)
    }
}

/// Tuning knobs for a tracking processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Maximum events per transactional batch; upcast groups may exceed it.
    pub batch_size: usize,
    /// Segment rows created on first startup against an empty token store.
    pub initial_segment_count: u32,
    /// Upper bound on concurrent segment workers, including the one that
    /// runs on the launcher thread.
    pub max_worker_count: usize,
    /// Which failures roll back the batch transaction.
    pub rollback_policy: RollbackPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::for_single_worker()
    }
}

impl ProcessorConfig {
    /// One worker over one segment.
    pub fn for_single_worker() -> Self {
        Self {
            batch_size: 1,
            initial_segment_count: 1,
            max_worker_count: 1,
            rollback_policy: RollbackPolicy::AnyError,
        }
    }

    /// `workers` parallel workers over as many initial segments.
    pub fn for_parallel_processing(workers: usize) -> Self {
        Self {
            batch_size: 1,
            initial_segment_count: workers as u32,
            max_worker_count: workers,
            rollback_policy: RollbackPolicy::AnyError,
        }
    }

    /// Sets the maximum number of events per transactional batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the number of segment rows created against an empty store.
    pub fn with_initial_segment_count(mut self, count: u32) -> Self {
        self.initial_segment_count = count;
        self
    }

    /// Sets the rollback policy for handler failures.
    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_worker_count == 0 {
            return Err(ConfigError::ZeroWorkerCount);
        }
        Ok(())
    }
}
