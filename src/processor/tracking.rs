use dashmap::DashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::config::{ConfigError, ProcessorConfig};
use super::error::{ErrorHandler, PropagatingErrorHandler, ResetError};
use super::launcher::WorkerLauncher;
use super::state::{ProcessorState, StateCell};
use super::worker_pool::{named_thread_factory, ThreadFactory, WorkerPool};
use crate::handler::EventHandlerInvoker;
use crate::monitor::{MessageMonitor, NoOpMessageMonitor};
use crate::stream::message::MessageSource;
use crate::token::replay::ReplayToken;
use crate::token::store::TokenStore;
use crate::token::tracking::TrackingToken;
use crate::transaction::{in_transaction, NoTransactionManager, TransactionManager};

/// Poll interval while awaiting worker termination during shut down.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Slice length for state-aware sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared state and collaborators for one processor instance.
pub(crate) struct ProcessorContext {
    pub(crate) name: String,
    pub(crate) config: ProcessorConfig,
    pub(crate) state: StateCell,
    pub(crate) active_segments: DashSet<u32>,
    pub(crate) pool: WorkerPool,
    pub(crate) source: Arc<dyn MessageSource>,
    pub(crate) token_store: Arc<dyn TokenStore>,
    pub(crate) transactions: Arc<dyn TransactionManager>,
    pub(crate) invoker: Arc<dyn EventHandlerInvoker>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) monitor: Arc<dyn MessageMonitor>,
}

impl ProcessorContext {
    /// Sets the shut-down state without awaiting workers; used from worker
    /// threads reacting to an interrupted stream.
    pub(crate) fn request_shutdown(&self) {
        self.state.store(ProcessorState::ShutDown);
    }

    /// Sleeps up to `duration` in 100 ms slices, returning early once the
    /// processor stops running.
    pub(crate) fn sleep_while_running(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.state.load().is_running() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(SLEEP_SLICE.min(remaining));
        }
    }
}

/// Event processor that tracks its progress per segment in a token store
/// and processes disjoint stream segments on a pool of worker threads.
///
/// The processor name keys every token row; two instances sharing a
/// store and a name form a cluster in which each segment is owned by at
/// most one worker at a time.
pub struct TrackingProcessor {
    context: Arc<ProcessorContext>,
}

impl TrackingProcessor {
    /// Starts building a processor with the given name. Renaming a
    /// processor orphans the tokens stored under the old name.
    pub fn builder(name: impl Into<String>) -> TrackingProcessorBuilder {
        TrackingProcessorBuilder::new(name.into())
    }

    /// Name keying this processor's rows in the token store.
    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessorState {
        self.context.state.load()
    }

    /// Whether workers are currently processing.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Whether the processor paused itself after an unrecoverable error.
    pub fn is_error(&self) -> bool {
        self.state() == ProcessorState::PausedError
    }

    /// Whether the assigned handlers support [`reset_tokens`].
    ///
    /// [`reset_tokens`]: TrackingProcessor::reset_tokens
    pub fn supports_reset(&self) -> bool {
        self.context.invoker.supports_reset()
    }

    /// Segment ids currently processed by this instance, ascending.
    pub fn active_segments(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .context
            .active_segments
            .iter()
            .map(|id| *id.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Approximate number of workers currently processing segments.
    pub fn active_worker_count(&self) -> usize {
        self.context.active_segments.len()
    }

    /// Transitions to `Started` and dispatches the launcher thread.
    /// Calling `start` while already running has no effect.
    pub fn start(&self) {
        let previous = self.context.state.swap(ProcessorState::Started);
        if previous.is_running() {
            return;
        }
        let launcher = WorkerLauncher::new(self.context.clone());
        if let Err(error) = self.context.pool.spawn("launcher", move || launcher.run()) {
            tracing::error!(
                processor = %self.context.name,
                error = %error,
                "failed to spawn launcher thread"
            );
            self.context.state.store(ProcessorState::PausedError);
        }
    }

    /// Transitions to `Paused` when running; workers drain their current
    /// batch, release their claims, and exit. `start` resumes processing.
    pub fn pause(&self) {
        self.context.state.update(|state| {
            if state.is_running() {
                ProcessorState::Paused
            } else {
                state
            }
        });
    }

    /// Shuts the processor down and blocks until every worker thread,
    /// including the launcher, has terminated.
    pub fn shut_down(&self) {
        let previous = self.context.state.swap(ProcessorState::ShutDown);
        if previous == ProcessorState::ShutDown {
            return;
        }
        tracing::info!(
            processor = %self.context.name,
            "shut-down state set, awaiting worker termination"
        );
        while self.context.pool.live_workers() > 0 {
            thread::sleep(SHUTDOWN_POLL_INTERVAL);
        }
    }

    /// Rewinds every segment by wrapping its stored token in a replay
    /// marker, inside a single transaction, so a partial reset is
    /// impossible. Fails unless the handlers support reset and the
    /// processor is stopped with no active workers; the fetch performed
    /// per segment claims it, so instances elsewhere in the cluster must
    /// be stopped as well.
    pub fn reset_tokens(&self) -> Result<(), ResetError> {
        if !self.supports_reset() {
            return Err(ResetError::NotSupported {
                processor: self.context.name.clone(),
            });
        }
        if self.is_running() || !self.context.active_segments.is_empty() {
            return Err(ResetError::StillActive {
                processor: self.context.name.clone(),
            });
        }
        let context = &self.context;
        in_transaction(context.transactions.as_ref(), || {
            let segments = context.token_store.fetch_segments(&context.name)?;
            let mut tokens = Vec::with_capacity(segments.len());
            for segment in &segments {
                tokens.push(context.token_store.fetch_token(&context.name, *segment)?);
            }
            context.invoker.perform_reset()?;
            for (segment, token) in segments.iter().zip(tokens) {
                if let Some(wrapped) = wrap_for_replay(token) {
                    context
                        .token_store
                        .store_token(&wrapped, &context.name, *segment)?;
                }
            }
            Ok(())
        })
    }
}

/// Replay marker for a stored token. Unstarted segments (`None`) stay
/// unset: they already deliver from the start of the stream. A pending
/// replay is re-wound to its original boundary with progress cleared.
fn wrap_for_replay(token: Option<TrackingToken>) -> Option<TrackingToken> {
    match token {
        Some(TrackingToken::Live(position)) => {
            Some(TrackingToken::Replay(ReplayToken::starting_from(position)))
        }
        Some(TrackingToken::Replay(replay)) => Some(TrackingToken::Replay(
            ReplayToken::starting_from(replay.reset_at()),
        )),
        None => None,
    }
}

/// Assembles a [`TrackingProcessor`] from its collaborators.
pub struct TrackingProcessorBuilder {
    name: String,
    config: ProcessorConfig,
    thread_factory: ThreadFactory,
    source: Option<Arc<dyn MessageSource>>,
    token_store: Option<Arc<dyn TokenStore>>,
    transactions: Arc<dyn TransactionManager>,
    invoker: Option<Arc<dyn EventHandlerInvoker>>,
    error_handler: Arc<dyn ErrorHandler>,
    monitor: Arc<dyn MessageMonitor>,
}

impl TrackingProcessorBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            config: ProcessorConfig::default(),
            thread_factory: named_thread_factory(),
            source: None,
            token_store: None,
            transactions: Arc::new(NoTransactionManager),
            invoker: None,
            error_handler: Arc::new(PropagatingErrorHandler),
            monitor: Arc::new(NoOpMessageMonitor),
        }
    }

    /// Replaces the default single-worker configuration.
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Stream of events to track. Required.
    pub fn with_message_source(mut self, source: Arc<dyn MessageSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Store recording per-segment progress and claims. Required.
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Transaction manager wrapping token operations and handler side
    /// effects. Defaults to [`NoTransactionManager`].
    pub fn with_transaction_manager(mut self, transactions: Arc<dyn TransactionManager>) -> Self {
        self.transactions = transactions;
        self
    }

    /// Component dispatching events to handlers. Required.
    pub fn with_handler_invoker(mut self, invoker: Arc<dyn EventHandlerInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Decides whether failed batches propagate or are swallowed.
    /// Defaults to [`PropagatingErrorHandler`].
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Observation sink for processed and ignored events.
    pub fn with_message_monitor(mut self, monitor: Arc<dyn MessageMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Factory producing the pool's threads. Defaults to named
    /// `thread::Builder` threads.
    pub fn with_thread_factory(mut self, factory: ThreadFactory) -> Self {
        self.thread_factory = factory;
        self
    }

    /// Validates the configuration and collaborators and builds the
    /// processor.
    pub fn build(self) -> Result<TrackingProcessor, ConfigError> {
        self.config.validate()?;
        let source = self.source.ok_or(ConfigError::MissingMessageSource)?;
        let token_store = self.token_store.ok_or(ConfigError::MissingTokenStore)?;
        let invoker = self.invoker.ok_or(ConfigError::MissingHandlerInvoker)?;
        let pool = WorkerPool::new(self.name.clone(), self.thread_factory);
        Ok(TrackingProcessor {
            context: Arc::new(ProcessorContext {
                name: self.name,
                config: self.config,
                state: StateCell::new(ProcessorState::NotStarted),
                active_segments: DashSet::new(),
                pool,
                source,
                token_store,
                transactions: self.transactions,
                invoker,
                error_handler: self.error_handler,
                monitor: self.monitor,
            }),
        })
    }
}
