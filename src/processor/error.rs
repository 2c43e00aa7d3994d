use thiserror::Error;

use crate::handler::HandlerError;
use crate::segment::Segment;
use crate::stream::message::{StreamError, TrackedEvent};
use crate::token::store::TokenStoreError;
use crate::transaction::TransactionError;

/// Error raised while processing a segment.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    TokenStore(#[from] TokenStoreError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl ProcessingError {
    /// Claim contention: another node owns the segment.
    pub fn is_claim_conflict(&self) -> bool {
        matches!(self, ProcessingError::TokenStore(error) if error.is_claim_conflict())
    }

    /// Whether retrying can help, as opposed to pausing the processor.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ProcessingError::TokenStore(error) => error.is_recoverable(),
            _ => true,
        }
    }

    /// Whether the loop should shut down instead of retrying.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, ProcessingError::Stream(StreamError::Interrupted))
    }
}

/// Context handed to the error handler when a batch fails.
pub struct ErrorContext<'a> {
    /// Name of the processor that failed.
    pub processor: &'a str,
    /// Segment the batch belonged to.
    pub segment: Segment,
    /// Events that were part of the failed batch.
    pub events: &'a [TrackedEvent],
    /// The failure itself.
    pub error: ProcessingError,
}

/// Decides whether a failed batch propagates, rolling the batch back so
/// the worker retries it, or is swallowed so the batch commits.
pub trait ErrorHandler: Send + Sync {
    /// Returns `Err` to propagate the failure.
    fn handle_error(&self, context: ErrorContext<'_>) -> Result<(), ProcessingError>;
}

/// Default error handler: always propagates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagatingErrorHandler;

impl ErrorHandler for PropagatingErrorHandler {
    fn handle_error(&self, context: ErrorContext<'_>) -> Result<(), ProcessingError> {
        Err(context.error)
    }
}

/// Error raised by [`TrackingProcessor::reset_tokens`].
///
/// [`TrackingProcessor::reset_tokens`]: super::tracking::TrackingProcessor::reset_tokens
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("the handlers assigned to processor {processor} do not support a reset")]
    NotSupported { processor: String },
    #[error("processor {processor} must be shut down before tokens can be reset")]
    StillActive { processor: String },
    #[error(transparent)]
    TokenStore(#[from] TokenStoreError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("reset hook failed: {0}")]
    Handler(#[from] HandlerError),
}
