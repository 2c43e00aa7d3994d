use std::time::Duration;

use super::message::{MessageStream, StreamError, TrackedEvent};
use crate::token::replay::ReplayToken;
use crate::token::tracking::TrackingToken;

/// Stream decorator that rewrites the tokens of re-delivered events, so
/// progress persisted during a replay keeps its replay marker until the
/// window closes. `peek` passes the underlying event through untouched.
pub struct ReplayingStream {
    delegate: Box<dyn MessageStream>,
    last_replay: Option<ReplayToken>,
}

impl ReplayingStream {
    /// Wraps `delegate`, resuming the replay described by `token`.
    pub fn new(token: ReplayToken, delegate: Box<dyn MessageStream>) -> Self {
        Self {
            delegate,
            last_replay: Some(token),
        }
    }

    fn rewrite(&mut self, event: TrackedEvent) -> TrackedEvent {
        let Some(replay) = self.last_replay else {
            return event;
        };
        let TrackingToken::Live(position) = *event.tracking_token() else {
            return event;
        };
        let rewritten = replay.advanced_to(position);
        self.last_replay = match rewritten {
            TrackingToken::Replay(next) => Some(next),
            TrackingToken::Live(_) => None,
        };
        event.with_token(rewritten)
    }
}

impl MessageStream for ReplayingStream {
    fn peek(&mut self) -> Option<TrackedEvent> {
        self.delegate.peek()
    }

    fn has_next_available(&mut self, timeout: Duration) -> Result<bool, StreamError> {
        self.delegate.has_next_available(timeout)
    }

    fn next_available(&mut self) -> Result<TrackedEvent, StreamError> {
        let event = self.delegate.next_available()?;
        Ok(self.rewrite(event))
    }

    fn close(&mut self) {
        self.delegate.close()
    }
}
