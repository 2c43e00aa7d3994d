//! Tracking event processor over a segmented, totally-ordered event
//! stream. Progress is persisted per segment as opaque tracking tokens
//! in a token store whose claims guarantee that each segment is owned by
//! exactly one worker across a cluster. Replays re-deliver history under
//! a marker token so handlers can stay idempotent.

pub mod handler;
pub mod monitor;
pub mod segment;
pub mod transaction;

pub mod stream {
    pub mod memory;
    pub mod message;
    pub mod replay;

    pub use memory::*;
    pub use message::*;
    pub use replay::*;
}

pub mod token {
    pub mod replay;
    pub mod store;
    pub mod tracking;

    pub use replay::*;
    pub use store::*;
    pub use tracking::*;
}

pub mod processor {
    pub mod batch;
    pub mod config;
    pub mod error;
    mod launcher;
    pub mod state;
    pub mod tracking;
    mod worker;
    pub mod worker_pool;

    pub use batch::*;
    pub use config::*;
    pub use error::*;
    pub use state::*;
    pub use tracking::*;
    pub use worker_pool::*;
}

pub use handler::{EventHandlerInvoker, HandlerError};
pub use monitor::{MessageMonitor, NoOpMessageMonitor};
pub use processor::batch::{
    AssembledBatch, BatchAssembler, BATCH_SCAN_MULTIPLIER, EVENT_AVAILABILITY_TIMEOUT,
};
pub use processor::config::{ConfigError, ProcessorConfig, RollbackPolicy};
pub use processor::error::{
    ErrorContext, ErrorHandler, ProcessingError, PropagatingErrorHandler, ResetError,
};
pub use processor::state::ProcessorState;
pub use processor::tracking::{TrackingProcessor, TrackingProcessorBuilder};
pub use processor::worker_pool::{named_thread_factory, ThreadFactory};
pub use segment::{hash_sequencing_key, Segment};
pub use stream::memory::InMemoryMessageSource;
pub use stream::message::{MessageSource, MessageStream, StreamError, TrackedEvent};
pub use stream::replay::ReplayingStream;
pub use token::replay::ReplayToken;
pub use token::store::{InMemoryTokenStore, TokenStore, TokenStoreError, DEFAULT_CLAIM_TIMEOUT};
pub use token::tracking::{SequenceToken, TrackingToken};
pub use transaction::{
    in_transaction, NoTransactionManager, Transaction, TransactionError, TransactionManager,
};
