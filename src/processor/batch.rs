use std::time::Duration;

use super::error::ProcessingError;
use crate::handler::EventHandlerInvoker;
use crate::monitor::MessageMonitor;
use crate::segment::Segment;
use crate::stream::message::{MessageStream, TrackedEvent};
use crate::token::tracking::TrackingToken;

/// How long to wait for an event before treating the stream as idle.
pub const EVENT_AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(1);
/// Raw events inspected per batch are capped at `batch_size` times this,
/// so heavy filtering cannot starve the token advance.
pub const BATCH_SCAN_MULTIPLIER: usize = 10;

/// Outcome of draining one batch from the stream.
#[derive(Debug)]
pub enum AssembledBatch {
    /// No event arrived within the poll window; the claim should be
    /// extended instead.
    Idle,
    /// Every inspected event was filtered out; `last_token` must still be
    /// persisted so the segment's position advances.
    Filtered { last_token: TrackingToken },
    /// Events ready for dispatch, with the token of the last event that
    /// was inspected (not merely the last one kept).
    Events {
        events: Vec<TrackedEvent>,
        last_token: TrackingToken,
    },
}

/// Pulls bounded batches from a stream, filtering by segment and keeping
/// upcast groups whole.
#[derive(Debug, Clone, Copy)]
pub struct BatchAssembler {
    batch_size: usize,
}

impl BatchAssembler {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    /// Drains up to `batch_size` matching events from the stream.
    pub fn assemble(
        &self,
        segment: Segment,
        stream: &mut dyn MessageStream,
        invoker: &dyn EventHandlerInvoker,
        monitor: &dyn MessageMonitor,
    ) -> Result<AssembledBatch, ProcessingError> {
        if !stream.has_next_available(EVENT_AVAILABILITY_TIMEOUT)? {
            return Ok(AssembledBatch::Idle);
        }

        let mut events = Vec::new();
        let mut last_token = None;
        for _ in 0..self.batch_size * BATCH_SCAN_MULTIPLIER {
            if events.len() >= self.batch_size || !stream.has_next_available(Duration::ZERO)? {
                break;
            }
            let event = stream.next_available()?;
            last_token = Some(*event.tracking_token());
            if invoker.can_handle(&event, &segment) {
                events.push(event);
            } else {
                monitor.report_ignored(&event);
            }
        }

        let last_token = match last_token {
            Some(token) => token,
            None => return Ok(AssembledBatch::Idle),
        };

        if events.is_empty() {
            return Ok(AssembledBatch::Filtered { last_token });
        }

        // Trailing events sharing the last token are one upcast group and
        // must commit in this batch, even past `batch_size`.
        while stream
            .peek()
            .is_some_and(|next| *next.tracking_token() == last_token)
        {
            let event = stream.next_available()?;
            if invoker.can_handle(&event, &segment) {
                events.push(event);
            }
        }

        Ok(AssembledBatch::Events { events, last_token })
    }
}
