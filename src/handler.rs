use thiserror::Error;

use crate::segment::Segment;
use crate::stream::message::TrackedEvent;

/// Error returned by event handlers or the reset hook.
#[derive(Debug, Error)]
#[error("event handler failed: {reason}")]
pub struct HandlerError {
    reason: String,
}

impl HandlerError {
    /// Creates a handler error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Human-readable description of the failure.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Dispatches events to the handlers registered for a processor.
pub trait EventHandlerInvoker: Send + Sync {
    /// Whether any handler wants this event within the given segment.
    fn can_handle(&self, event: &TrackedEvent, segment: &Segment) -> bool;

    /// Invokes the handlers for the event.
    fn handle(&self, event: &TrackedEvent, segment: &Segment) -> Result<(), HandlerError>;

    /// Whether the handlers support resetting to the start of the stream.
    fn supports_reset(&self) -> bool {
        false
    }

    /// Prepares the handlers for a replay, before tokens are rewound.
    fn perform_reset(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}
