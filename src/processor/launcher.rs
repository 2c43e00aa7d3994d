use std::sync::Arc;
use std::time::Duration;

use super::error::ProcessingError;
use super::state::ProcessorState;
use super::tracking::ProcessorContext;
use super::worker::SegmentWorker;
use crate::segment::Segment;
use crate::transaction::in_transaction;

/// Delay between segment discovery rounds.
const SEGMENT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(5);

/// Discovers segments, claims their tokens, and dispatches segment
/// workers. The last worker that fills the pool runs on the launcher
/// thread itself, so `max_worker_count` segments need exactly that many
/// threads.
pub(crate) struct WorkerLauncher {
    context: Arc<ProcessorContext>,
}

impl WorkerLauncher {
    pub(crate) fn new(context: Arc<ProcessorContext>) -> Self {
        Self { context }
    }

    pub(crate) fn run(self) {
        let context = &self.context;
        while context.state.load().is_running() {
            let segment_ids = match self.discover_segments() {
                Ok(ids) => ids,
                Err(error) => {
                    if !error.is_recoverable() {
                        tracing::error!(
                            processor = %context.name,
                            error = %error,
                            "unrecoverable token store failure during discovery, pausing processor"
                        );
                        context.state.store(ProcessorState::PausedError);
                        break;
                    }
                    tracing::warn!(
                        processor = %context.name,
                        error = %error,
                        "segment discovery failed, retrying"
                    );
                    context.sleep_while_running(SEGMENT_DISCOVERY_INTERVAL);
                    continue;
                }
            };

            let mut inline_worker: Option<SegmentWorker> = None;
            let mut immediate_retry = false;

            for segment in Segment::compute_segments(&segment_ids) {
                if context.active_segments.len() >= context.config.max_worker_count {
                    break;
                }
                if !context.active_segments.insert(segment.segment_id()) {
                    continue;
                }
                match self.claim_token(segment) {
                    Err(error) if error.is_claim_conflict() => {
                        tracing::debug!(
                            segment = segment.segment_id(),
                            "token owned by another node, skipping segment"
                        );
                        context.active_segments.remove(&segment.segment_id());
                        immediate_retry = true;
                        continue;
                    }
                    Err(error) if !error.is_recoverable() => {
                        tracing::error!(
                            processor = %context.name,
                            segment = segment.segment_id(),
                            error = %error,
                            "unrecoverable failure while claiming token, pausing processor"
                        );
                        context.active_segments.remove(&segment.segment_id());
                        context.state.store(ProcessorState::PausedError);
                        break;
                    }
                    Err(error) => {
                        tracing::info!(
                            segment = segment.segment_id(),
                            error = %error,
                            "failed to claim token, will retry later"
                        );
                        context.active_segments.remove(&segment.segment_id());
                        continue;
                    }
                    Ok(()) => {}
                }

                let worker = SegmentWorker::new(self.context.clone(), segment);
                if context.pool.live_workers() < context.config.max_worker_count {
                    tracing::info!(
                        processor = %context.name,
                        segment = segment.segment_id(),
                        "dispatching segment worker"
                    );
                    let label = format!("segment-{}", segment.segment_id());
                    if let Err(error) = context.pool.spawn(&label, move || worker.run()) {
                        tracing::error!(
                            segment = segment.segment_id(),
                            error = %error,
                            "failed to spawn segment worker, pausing processor"
                        );
                        context.active_segments.remove(&segment.segment_id());
                        context.state.store(ProcessorState::PausedError);
                        break;
                    }
                } else {
                    inline_worker = Some(worker);
                    break;
                }
            }

            if let Some(worker) = inline_worker {
                tracing::info!(
                    processor = %context.name,
                    segment = worker.segment().segment_id(),
                    "running last segment worker on the launcher thread"
                );
                context.pool.run_inline(move || worker.run());
                break;
            }

            if !immediate_retry {
                context.sleep_while_running(SEGMENT_DISCOVERY_INTERVAL);
            }
        }
    }

    fn discover_segments(&self) -> Result<Vec<u32>, ProcessingError> {
        let context = &self.context;
        let ids = context.token_store.fetch_segments(&context.name)?;
        if !ids.is_empty() || context.config.initial_segment_count == 0 {
            return Ok(ids);
        }
        tracing::info!(
            processor = %context.name,
            count = context.config.initial_segment_count,
            "initializing token segments"
        );
        in_transaction(context.transactions.as_ref(), || {
            context
                .token_store
                .initialize_segments(&context.name, context.config.initial_segment_count)?;
            context
                .token_store
                .fetch_segments(&context.name)
                .map_err(ProcessingError::from)
        })
    }

    /// Fetching the token inside a transaction performs the claim.
    fn claim_token(&self, segment: Segment) -> Result<(), ProcessingError> {
        let context = &self.context;
        in_transaction(context.transactions.as_ref(), || {
            context
                .token_store
                .fetch_token(&context.name, segment.segment_id())
                .map(|_| ())
                .map_err(ProcessingError::from)
        })
    }
}
