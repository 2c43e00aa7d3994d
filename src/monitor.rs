use crate::handler::HandlerError;
use crate::stream::message::TrackedEvent;

/// Observation sink for events flowing through a processor.
pub trait MessageMonitor: Send + Sync {
    /// The event's handlers completed without error.
    fn report_success(&self, _event: &TrackedEvent) {}

    /// A handler rejected the event.
    fn report_failure(&self, _event: &TrackedEvent, _error: &HandlerError) {}

    /// The event was filtered out by the segment predicate.
    fn report_ignored(&self, _event: &TrackedEvent) {}
}

/// Monitor that discards all signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMessageMonitor;

impl MessageMonitor for NoOpMessageMonitor {}
