use std::time::Duration;
use thiserror::Error;

use crate::token::tracking::{SequenceToken, TrackingToken};

/// Event pulled from the stream together with its tracking token.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvent {
    token: TrackingToken,
    event_id: String,
    sequencing_key: Vec<u8>,
    payload: Vec<u8>,
}

impl TrackedEvent {
    /// Creates an event positioned at `token`.
    pub fn new(
        token: impl Into<TrackingToken>,
        event_id: impl Into<String>,
        sequencing_key: impl Into<Vec<u8>>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            token: token.into(),
            event_id: event_id.into(),
            sequencing_key: sequencing_key.into(),
            payload: payload.into(),
        }
    }

    /// Position of this event in the stream.
    pub fn tracking_token(&self) -> &TrackingToken {
        &self.token
    }

    /// Identifier of the event.
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Key used to route the event to a segment, typically the identifier
    /// of the aggregate that produced it.
    pub fn sequencing_key(&self) -> &[u8] {
        &self.sequencing_key
    }

    /// Raw event payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Rebuilds the event under a different tracking token.
    pub fn with_token(mut self, token: impl Into<TrackingToken>) -> Self {
        self.token = token.into();
        self
    }
}

/// Error raised by message sources and streams.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The source closed the stream underneath the reader.
    #[error("event stream closed by the source")]
    Closed,
    /// A blocking wait was interrupted; treated as a shutdown request.
    #[error("blocking wait on the event stream was interrupted")]
    Interrupted,
    /// Source-specific failure.
    #[error("event stream failure: {reason}")]
    Source { reason: String },
}

/// Source of totally-ordered tracked events.
pub trait MessageSource: Send + Sync {
    /// Opens a stream positioned immediately after `from`; `None` opens it
    /// at the start of the stream.
    fn open_stream(&self, from: Option<SequenceToken>) -> Result<Box<dyn MessageStream>, StreamError>;
}

/// Open cursor over the event stream.
pub trait MessageStream: Send {
    /// The next event, without consuming it.
    fn peek(&mut self) -> Option<TrackedEvent>;

    /// Waits up to `timeout` for an event to become available.
    fn has_next_available(&mut self, timeout: Duration) -> Result<bool, StreamError>;

    /// Consumes the next event, blocking until one is available.
    fn next_available(&mut self) -> Result<TrackedEvent, StreamError>;

    /// Releases resources held by the stream.
    fn close(&mut self);
}
