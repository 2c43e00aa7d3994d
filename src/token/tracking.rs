use serde::{Deserialize, Serialize};
use std::fmt;

use super::replay::ReplayToken;

/// Opaque position in the totally-ordered event stream, expressed as a
/// global sequence index assigned by the message source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceToken {
    index: u64,
}

impl SequenceToken {
    /// Creates a token for the given global sequence index.
    pub fn new(index: u64) -> Self {
        Self { index }
    }

    /// Global sequence index this token points at.
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Progress marker persisted per segment. Compared by equality; the
/// message source decides how positions advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingToken {
    /// Live position in the stream.
    Live(SequenceToken),
    /// Position inside a replay window.
    Replay(ReplayToken),
}

impl TrackingToken {
    /// Whether this token marks preceding events as replays.
    pub fn is_replay(&self) -> bool {
        matches!(self, TrackingToken::Replay(_))
    }

    /// The stream position to resume reading after, if one was reached.
    pub fn position(&self) -> Option<SequenceToken> {
        match self {
            TrackingToken::Live(position) => Some(*position),
            TrackingToken::Replay(replay) => replay.current(),
        }
    }
}

impl From<SequenceToken> for TrackingToken {
    fn from(position: SequenceToken) -> Self {
        TrackingToken::Live(position)
    }
}

impl From<ReplayToken> for TrackingToken {
    fn from(replay: ReplayToken) -> Self {
        TrackingToken::Replay(replay)
    }
}

impl fmt::Display for TrackingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingToken::Live(position) => write!(f, "{position}"),
            TrackingToken::Replay(replay) => match replay.current() {
                Some(current) => write!(f, "replay({current} of {})", replay.reset_at()),
                None => write!(f, "replay(start of {})", replay.reset_at()),
            },
        }
    }
}
