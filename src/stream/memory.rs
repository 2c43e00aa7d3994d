use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::message::{MessageSource, MessageStream, StreamError, TrackedEvent};
use crate::token::tracking::SequenceToken;

/// In-memory append-only event log usable as a `MessageSource`. Every
/// open stream holds its own cursor over the shared log, so concurrent
/// segment workers never contend for events.
#[derive(Clone, Default)]
pub struct InMemoryMessageSource {
    shared: Arc<LogShared>,
}

#[derive(Default)]
struct LogShared {
    state: Mutex<LogState>,
    cv: Condvar,
}

#[derive(Default)]
struct LogState {
    events: Vec<TrackedEvent>,
    next_index: u64,
}

impl InMemoryMessageSource {
    /// Creates an empty event log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event, assigning it the next sequence position.
    pub fn publish(
        &self,
        event_id: impl Into<String>,
        sequencing_key: impl Into<Vec<u8>>,
        payload: impl Into<Vec<u8>>,
    ) -> SequenceToken {
        let mut guard = self.shared.state.lock().unwrap();
        let position = SequenceToken::new(guard.next_index);
        guard.next_index += 1;
        guard
            .events
            .push(TrackedEvent::new(position, event_id, sequencing_key, payload));
        self.shared.cv.notify_all();
        position
    }

    /// Appends a group of events sharing one tracking token, as produced
    /// when a single stored event upcasts into several logical events.
    /// Returns the shared position, or `None` when `events` is empty.
    pub fn publish_group<I>(&self, events: I) -> Option<SequenceToken>
    where
        I: IntoIterator<Item = (String, Vec<u8>, Vec<u8>)>,
    {
        let mut iter = events.into_iter();
        let first = iter.next()?;
        let mut guard = self.shared.state.lock().unwrap();
        let position = SequenceToken::new(guard.next_index);
        guard.next_index += 1;
        for (event_id, sequencing_key, payload) in std::iter::once(first).chain(iter) {
            guard
                .events
                .push(TrackedEvent::new(position, event_id, sequencing_key, payload));
        }
        self.shared.cv.notify_all();
        Some(position)
    }

    /// Number of events appended so far.
    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().events.len()
    }

    /// Whether the log holds no events yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSource for InMemoryMessageSource {
    fn open_stream(&self, from: Option<SequenceToken>) -> Result<Box<dyn MessageStream>, StreamError> {
        let guard = self.shared.state.lock().unwrap();
        let cursor = match from {
            None => 0,
            Some(after) => guard
                .events
                .iter()
                .position(|event| {
                    event
                        .tracking_token()
                        .position()
                        .is_some_and(|position| position > after)
                })
                .unwrap_or(guard.events.len()),
        };
        Ok(Box::new(InMemoryStream {
            shared: self.shared.clone(),
            cursor,
        }))
    }
}

struct InMemoryStream {
    shared: Arc<LogShared>,
    cursor: usize,
}

impl MessageStream for InMemoryStream {
    fn peek(&mut self) -> Option<TrackedEvent> {
        let guard = self.shared.state.lock().unwrap();
        guard.events.get(self.cursor).cloned()
    }

    fn has_next_available(&mut self, timeout: Duration) -> Result<bool, StreamError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.state.lock().unwrap();
        loop {
            if self.cursor < guard.events.len() {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            let (next_guard, _) = self.shared.cv.wait_timeout(guard, remaining).unwrap();
            guard = next_guard;
        }
    }

    fn next_available(&mut self) -> Result<TrackedEvent, StreamError> {
        let mut guard = self.shared.state.lock().unwrap();
        loop {
            if let Some(event) = guard.events.get(self.cursor) {
                self.cursor += 1;
                return Ok(event.clone());
            }
            guard = self.shared.cv.wait(guard).unwrap();
        }
    }

    fn close(&mut self) {}
}
