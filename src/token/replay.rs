use serde::{Deserialize, Serialize};

use super::tracking::{SequenceToken, TrackingToken};

/// Marker token recording that a replay is in progress: every event
/// before `reset_at` is a re-delivery of history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayToken {
    reset_at: SequenceToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current: Option<SequenceToken>,
}

impl ReplayToken {
    /// Marks a replay triggered while the processor stood at `reset_at`.
    pub fn starting_from(reset_at: SequenceToken) -> Self {
        Self {
            reset_at,
            current: None,
        }
    }

    /// Position the replay was triggered from.
    pub fn reset_at(&self) -> SequenceToken {
        self.reset_at
    }

    /// Live position inside the replay window, once an event has been
    /// re-delivered. `None` means the replay has not produced an event yet,
    /// so the stream must be opened at its start.
    pub fn current(&self) -> Option<SequenceToken> {
        self.current
    }

    /// Advances the replay window to `position`. Once the window closes
    /// (`position` reaches `reset_at`) the result is a plain live token.
    pub fn advanced_to(&self, position: SequenceToken) -> TrackingToken {
        if position >= self.reset_at {
            TrackingToken::Live(position)
        } else {
            TrackingToken::Replay(Self {
                reset_at: self.reset_at,
                current: Some(position),
            })
        }
    }
}
