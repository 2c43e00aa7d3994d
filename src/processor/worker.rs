use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use super::batch::{AssembledBatch, BatchAssembler};
use super::error::{ErrorContext, ProcessingError};
use super::state::ProcessorState;
use super::tracking::ProcessorContext;
use crate::segment::Segment;
use crate::stream::message::{MessageStream, TrackedEvent};
use crate::stream::replay::ReplayingStream;
use crate::token::tracking::TrackingToken;
use crate::transaction::in_transaction;

/// Backoff while another node holds the segment's claim (seconds).
const CLAIM_CONFLICT_WAIT_SECS: u64 = 5;
/// Ceiling for the exponential error backoff (seconds).
const MAX_ERROR_WAIT_SECS: u64 = 60;

/// Runs the processing loop for one claimed segment.
pub(crate) struct SegmentWorker {
    context: Arc<ProcessorContext>,
    segment: Segment,
    assembler: BatchAssembler,
}

impl SegmentWorker {
    pub(crate) fn new(context: Arc<ProcessorContext>, segment: Segment) -> Self {
        let assembler = BatchAssembler::new(context.config.batch_size);
        Self {
            context,
            segment,
            assembler,
        }
    }

    pub(crate) fn segment(&self) -> Segment {
        self.segment
    }

    /// Entry point for the worker thread. Nothing escapes: a panicking
    /// handler pauses the processor instead of unwinding further.
    pub(crate) fn run(self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.processing_loop()));
        if outcome.is_err() {
            tracing::error!(
                processor = %self.context.name,
                segment = self.segment.segment_id(),
                "processing loop ended with a panic, pausing processor"
            );
            self.context.state.store(ProcessorState::PausedError);
        }
        self.context.active_segments.remove(&self.segment.segment_id());
    }

    /// Cleanup runs even when a handler panic unwinds out of the loop;
    /// the panic then resumes so `run` can pause the processor.
    fn processing_loop(&self) {
        let mut stream: Option<Box<dyn MessageStream>> = None;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_loop(&mut stream)));
        close_stream(&mut stream);
        self.release_claim();
        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
    }

    fn run_loop(&self, stream: &mut Option<Box<dyn MessageStream>>) {
        let mut error_wait_secs = 1u64;
        while self.context.state.load().is_running() {
            match self.process_once(stream) {
                Ok(()) => error_wait_secs = 1,
                Err(error) if error.is_interrupt() => {
                    tracing::warn!(
                        processor = %self.context.name,
                        segment = self.segment.segment_id(),
                        "event stream interrupted, requesting shut down"
                    );
                    self.context.request_shutdown();
                }
                Err(error) if error.is_claim_conflict() => {
                    if error_wait_secs == 1 {
                        tracing::info!(
                            processor = %self.context.name,
                            segment = self.segment.segment_id(),
                            "token owned by another node, waiting for it to become available"
                        );
                    }
                    error_wait_secs = CLAIM_CONFLICT_WAIT_SECS;
                    self.wait_for(error_wait_secs);
                }
                Err(error) => {
                    if error_wait_secs == 1 {
                        tracing::warn!(
                            processor = %self.context.name,
                            segment = self.segment.segment_id(),
                            error = %error,
                            "processing error, entering retry mode"
                        );
                    }
                    tracing::warn!(
                        segment = self.segment.segment_id(),
                        wait_secs = error_wait_secs,
                        "releasing claim and preparing to retry"
                    );
                    self.release_claim();
                    close_stream(stream);
                    self.wait_for(error_wait_secs);
                    error_wait_secs = (error_wait_secs * 2).min(MAX_ERROR_WAIT_SECS);
                }
            }
        }
    }

    fn process_once(
        &self,
        stream: &mut Option<Box<dyn MessageStream>>,
    ) -> Result<(), ProcessingError> {
        self.ensure_stream_open(stream)?;
        match stream.as_mut() {
            Some(open) => self.process_batch(open.as_mut()),
            None => Ok(()),
        }
    }

    fn ensure_stream_open(
        &self,
        stream: &mut Option<Box<dyn MessageStream>>,
    ) -> Result<(), ProcessingError> {
        if stream.is_some() || !self.context.state.load().is_running() {
            return Ok(());
        }
        let context = &self.context;
        let token = in_transaction(context.transactions.as_ref(), || {
            context
                .token_store
                .fetch_token(&context.name, self.segment.segment_id())
                .map_err(ProcessingError::from)
        })?;
        tracing::info!(
            processor = %context.name,
            segment = self.segment.segment_id(),
            token = ?token,
            "fetched token, opening event stream"
        );
        *stream = Some(self.open_stream(token)?);
        Ok(())
    }

    fn open_stream(
        &self,
        token: Option<TrackingToken>,
    ) -> Result<Box<dyn MessageStream>, ProcessingError> {
        let source = self.context.source.as_ref();
        let stream = match token {
            Some(TrackingToken::Replay(replay)) => {
                let delegate = source.open_stream(replay.current())?;
                Box::new(ReplayingStream::new(replay, delegate)) as Box<dyn MessageStream>
            }
            Some(TrackingToken::Live(position)) => source.open_stream(Some(position))?,
            None => source.open_stream(None)?,
        };
        Ok(stream)
    }

    fn process_batch(&self, stream: &mut dyn MessageStream) -> Result<(), ProcessingError> {
        let context = &self.context;
        let assembled = self.assembler.assemble(
            self.segment,
            stream,
            context.invoker.as_ref(),
            context.monitor.as_ref(),
        )?;
        match assembled {
            AssembledBatch::Idle => in_transaction(context.transactions.as_ref(), || {
                context
                    .token_store
                    .extend_claim(&context.name, self.segment.segment_id())
                    .map_err(ProcessingError::from)
            }),
            AssembledBatch::Filtered { last_token } => {
                in_transaction(context.transactions.as_ref(), || {
                    context
                        .token_store
                        .store_token(&last_token, &context.name, self.segment.segment_id())
                        .map_err(ProcessingError::from)
                })
            }
            AssembledBatch::Events { events, last_token } => {
                self.commit_batch(&events, last_token)
            }
        }
    }

    /// Handles the batch inside one transaction: the claim is extended on
    /// entry, handler side effects run in the middle, and the token of the
    /// last inspected event is stored on exit.
    fn commit_batch(
        &self,
        events: &[TrackedEvent],
        last_token: TrackingToken,
    ) -> Result<(), ProcessingError> {
        let context = &self.context;
        in_transaction(context.transactions.as_ref(), || {
            context
                .token_store
                .extend_claim(&context.name, self.segment.segment_id())?;

            for event in events {
                match context.invoker.handle(event, &self.segment) {
                    Ok(()) => context.monitor.report_success(event),
                    Err(failure) => {
                        context.monitor.report_failure(event, &failure);
                        if context.config.rollback_policy.requires_rollback() {
                            context.error_handler.handle_error(ErrorContext {
                                processor: &context.name,
                                segment: self.segment,
                                events,
                                error: ProcessingError::from(failure),
                            })?;
                        } else {
                            tracing::debug!(
                                event_id = event.event_id(),
                                "handler failure ignored by rollback policy"
                            );
                        }
                    }
                }
            }

            context
                .token_store
                .store_token(&last_token, &context.name, self.segment.segment_id())
                .map_err(ProcessingError::from)
        })
    }

    fn release_claim(&self) {
        let context = &self.context;
        let released: Result<(), ProcessingError> =
            in_transaction(context.transactions.as_ref(), || {
                context
                    .token_store
                    .release_claim(&context.name, self.segment.segment_id())
                    .map_err(ProcessingError::from)
            });
        if let Err(error) = released {
            tracing::debug!(
                segment = self.segment.segment_id(),
                error = %error,
                "failed to release claim"
            );
        }
    }

    /// Backoff sleep in 100 ms slices, returning early once the processor
    /// stops running.
    fn wait_for(&self, seconds: u64) {
        self.context.sleep_while_running(Duration::from_secs(seconds));
    }
}

fn close_stream(stream: &mut Option<Box<dyn MessageStream>>) {
    if let Some(mut open) = stream.take() {
        open.close();
    }
}
