use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stream::message::TrackedEvent;

/// Deterministic hash used to route a sequencing key to a segment.
pub fn hash_sequencing_key(key: impl AsRef<[u8]>) -> u64 {
    // 64-bit FNV-1a keeps the hash stable across toolchains without extra dependencies.
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    key.as_ref().iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Partition of the sequencing-key space. A key belongs to the segment
/// when its hash, masked with `mask`, equals the segment id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    id: u32,
    mask: u32,
}

impl Segment {
    /// Segment covering the entire key space.
    pub const ROOT: Segment = Segment { id: 0, mask: 0 };

    /// Creates a segment from its id and mask.
    pub fn new(id: u32, mask: u32) -> Self {
        Self { id, mask }
    }

    /// Identifier keying this segment's token row.
    pub fn segment_id(&self) -> u32 {
        self.id
    }

    /// Bit mask selecting the hash bits this segment matches on.
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Whether a key with the given hash belongs to this segment.
    pub fn matches(&self, key_hash: u64) -> bool {
        (key_hash & u64::from(self.mask)) == u64::from(self.id)
    }

    /// Whether the event's sequencing key routes to this segment.
    pub fn matches_event(&self, event: &TrackedEvent) -> bool {
        self.matches(hash_sequencing_key(event.sequencing_key()))
    }

    /// Splits this segment into two children that together cover exactly
    /// the keys of the parent.
    pub fn split(&self) -> (Segment, Segment) {
        let mask = (self.mask << 1) | 1;
        (
            Segment { id: self.id, mask },
            Segment {
                id: self.id | (self.mask + 1),
                mask,
            },
        )
    }

    /// Reconstructs the full segment set from the ids stored in a token
    /// store, in ascending id order.
    pub fn compute_segments(ids: &[u32]) -> Vec<Segment> {
        let mut segments: Vec<Segment> = ids
            .iter()
            .map(|&id| Segment {
                id,
                mask: compute_mask(id, ids),
            })
            .collect();
        segments.sort_unstable_by_key(|segment| segment.id);
        segments
    }
}

/// The mask of a segment is the narrowest one that distinguishes its id
/// from every other id in the set.
fn compute_mask(id: u32, ids: &[u32]) -> u32 {
    let mut mask = 0u32;
    while ids
        .iter()
        .any(|&other| other != id && (other & mask) == (id & mask))
    {
        mask = (mask << 1) | 1;
    }
    mask
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:#x}", self.id, self.mask)
    }
}
