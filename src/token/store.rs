use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::tracking::TrackingToken;

/// Default lease duration for in-memory claims.
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(10);

/// Error surfaced by token store operations.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// Another node currently holds the claim on the segment.
    #[error("token for processor {processor} segment {segment} is claimed by another node")]
    UnableToClaim { processor: String, segment: u32 },
    /// Segment rows already exist, so initialization lost the race.
    #[error("segments for processor {processor} are already initialized")]
    AlreadyInitialized { processor: String },
    /// No row exists for the segment.
    #[error("no token row for processor {processor} segment {segment}")]
    UnknownSegment { processor: String, segment: u32 },
    /// Backend temporarily unreachable; workers back off and retry.
    #[error("token store unavailable: {reason}")]
    Unavailable { reason: String },
    /// Backend state is corrupt; the processor pauses with an error.
    #[error("token store corrupted: {reason}")]
    Corrupt { reason: String },
    /// Token could not be round-tripped through the store.
    #[error("failed to serialize tracking token: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TokenStoreError {
    /// Whether the caller may retry later instead of pausing the processor.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            TokenStoreError::Corrupt { .. } | TokenStoreError::Serialization(_)
        )
    }

    /// Whether this is the distinguished claim-contention condition.
    pub fn is_claim_conflict(&self) -> bool {
        matches!(self, TokenStoreError::UnableToClaim { .. })
    }
}

/// Durable map of `(processor, segment)` to tracking token, with
/// exclusive per-segment claims enforcing single ownership across a
/// cluster.
pub trait TokenStore: Send + Sync {
    /// Segment ids known for the processor, in ascending order.
    fn fetch_segments(&self, processor: &str) -> Result<Vec<u32>, TokenStoreError>;

    /// Creates `count` empty segment rows. Fails when rows already exist,
    /// so concurrent initializers resolve to a single winner.
    fn initialize_segments(&self, processor: &str, count: u32) -> Result<(), TokenStoreError>;

    /// Returns the stored token for a segment, claiming the segment for
    /// the calling node as a side effect.
    fn fetch_token(&self, processor: &str, segment: u32)
        -> Result<Option<TrackingToken>, TokenStoreError>;

    /// Stores the token for a segment this node has claimed.
    fn store_token(
        &self,
        token: &TrackingToken,
        processor: &str,
        segment: u32,
    ) -> Result<(), TokenStoreError>;

    /// Refreshes the lease on a claim this node holds.
    fn extend_claim(&self, processor: &str, segment: u32) -> Result<(), TokenStoreError>;

    /// Releases this node's claim so other nodes may take the segment.
    fn release_claim(&self, processor: &str, segment: u32) -> Result<(), TokenStoreError>;
}

type TokenKey = (String, u32);

#[derive(Debug, Default)]
struct TokenRow {
    token: Option<String>,
    lease: Option<ClaimLease>,
}

#[derive(Debug, Clone)]
struct ClaimLease {
    node_id: String,
    leased_at: Instant,
}

/// In-memory `TokenStore` with lease-based claims. Handles produced by
/// [`InMemoryTokenStore::for_node`] share the same backing rows under
/// different node identities, which models a cluster against one store.
pub struct InMemoryTokenStore {
    node_id: String,
    claim_timeout: Duration,
    rows: Arc<Mutex<HashMap<TokenKey, TokenRow>>>,
}

impl InMemoryTokenStore {
    /// Creates a store owned by `node_id` with the default claim timeout.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self::with_claim_timeout(node_id, DEFAULT_CLAIM_TIMEOUT)
    }

    /// Creates a store owned by `node_id` whose claims expire after
    /// `claim_timeout` without an extension.
    pub fn with_claim_timeout(node_id: impl Into<String>, claim_timeout: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            claim_timeout,
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handle onto the same backing rows for another node.
    pub fn for_node(&self, node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            claim_timeout: self.claim_timeout,
            rows: self.rows.clone(),
        }
    }

    /// Identity under which this handle claims segments.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn claim_row<'a>(
        &self,
        rows: &'a mut HashMap<TokenKey, TokenRow>,
        processor: &str,
        segment: u32,
    ) -> Result<&'a mut TokenRow, TokenStoreError> {
        let row = rows
            .get_mut(&(processor.to_string(), segment))
            .ok_or_else(|| TokenStoreError::UnknownSegment {
                processor: processor.to_string(),
                segment,
            })?;
        if let Some(lease) = &row.lease {
            if lease.node_id != self.node_id && lease.leased_at.elapsed() < self.claim_timeout {
                return Err(TokenStoreError::UnableToClaim {
                    processor: processor.to_string(),
                    segment,
                });
            }
        }
        row.lease = Some(ClaimLease {
            node_id: self.node_id.clone(),
            leased_at: Instant::now(),
        });
        Ok(row)
    }
}

impl TokenStore for InMemoryTokenStore {
    fn fetch_segments(&self, processor: &str) -> Result<Vec<u32>, TokenStoreError> {
        let rows = self.rows.lock().unwrap();
        let mut segments: Vec<u32> = rows
            .keys()
            .filter(|(name, _)| name == processor)
            .map(|(_, segment)| *segment)
            .collect();
        segments.sort_unstable();
        Ok(segments)
    }

    fn initialize_segments(&self, processor: &str, count: u32) -> Result<(), TokenStoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.keys().any(|(name, _)| name == processor) {
            return Err(TokenStoreError::AlreadyInitialized {
                processor: processor.to_string(),
            });
        }
        for segment in 0..count {
            rows.insert((processor.to_string(), segment), TokenRow::default());
        }
        Ok(())
    }

    fn fetch_token(
        &self,
        processor: &str,
        segment: u32,
    ) -> Result<Option<TrackingToken>, TokenStoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = self.claim_row(&mut rows, processor, segment)?;
        match &row.token {
            Some(serialized) => Ok(Some(serde_json::from_str(serialized)?)),
            None => Ok(None),
        }
    }

    fn store_token(
        &self,
        token: &TrackingToken,
        processor: &str,
        segment: u32,
    ) -> Result<(), TokenStoreError> {
        let mut rows = self.rows.lock().unwrap();
        let serialized = serde_json::to_string(token)?;
        let row = self.claim_row(&mut rows, processor, segment)?;
        row.token = Some(serialized);
        Ok(())
    }

    fn extend_claim(&self, processor: &str, segment: u32) -> Result<(), TokenStoreError> {
        let mut rows = self.rows.lock().unwrap();
        self.claim_row(&mut rows, processor, segment).map(|_| ())
    }

    fn release_claim(&self, processor: &str, segment: u32) -> Result<(), TokenStoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&(processor.to_string(), segment)) {
            if row
                .lease
                .as_ref()
                .is_some_and(|lease| lease.node_id == self.node_id)
            {
                row.lease = None;
            }
        }
        Ok(())
    }
}
