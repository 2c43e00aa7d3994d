use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use retrace::{
    ErrorContext, ErrorHandler, EventHandlerInvoker, HandlerError, InMemoryMessageSource,
    InMemoryTokenStore, MessageMonitor, ProcessingError, ProcessorConfig, RollbackPolicy, Segment,
    SequenceToken, TokenStore, TokenStoreError, TrackedEvent, TrackingProcessor, TrackingToken,
};

fn wait_for<F>(timeout: Duration, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not met within {timeout:?}");
}

struct RecordingTokenStore {
    inner: InMemoryTokenStore,
    stored: Arc<Mutex<Vec<TrackingToken>>>,
}

impl RecordingTokenStore {
    fn new(inner: InMemoryTokenStore) -> Self {
        Self {
            inner,
            stored: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn stored(&self) -> Vec<TrackingToken> {
        self.stored.lock().unwrap().clone()
    }
}

impl TokenStore for RecordingTokenStore {
    fn fetch_segments(&self, processor: &str) -> Result<Vec<u32>, TokenStoreError> {
        self.inner.fetch_segments(processor)
    }

    fn initialize_segments(&self, processor: &str, count: u32) -> Result<(), TokenStoreError> {
        self.inner.initialize_segments(processor, count)
    }

    fn fetch_token(
        &self,
        processor: &str,
        segment: u32,
    ) -> Result<Option<TrackingToken>, TokenStoreError> {
        self.inner.fetch_token(processor, segment)
    }

    fn store_token(
        &self,
        token: &TrackingToken,
        processor: &str,
        segment: u32,
    ) -> Result<(), TokenStoreError> {
        self.inner.store_token(token, processor, segment)?;
        self.stored.lock().unwrap().push(*token);
        Ok(())
    }

    fn extend_claim(&self, processor: &str, segment: u32) -> Result<(), TokenStoreError> {
        self.inner.extend_claim(processor, segment)
    }

    fn release_claim(&self, processor: &str, segment: u32) -> Result<(), TokenStoreError> {
        self.inner.release_claim(processor, segment)
    }
}

/// Fails the first attempt at `failing_id`, succeeds afterwards.
struct FlakyInvoker {
    failing_id: String,
    failed_once: AtomicBool,
    handled: Arc<Mutex<Vec<String>>>,
}

impl FlakyInvoker {
    fn new(failing_id: &str) -> Self {
        Self {
            failing_id: failing_id.to_string(),
            failed_once: AtomicBool::new(false),
            handled: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl EventHandlerInvoker for FlakyInvoker {
    fn can_handle(&self, event: &TrackedEvent, segment: &Segment) -> bool {
        segment.matches_event(event)
    }

    fn handle(&self, event: &TrackedEvent, _segment: &Segment) -> Result<(), HandlerError> {
        if event.event_id() == self.failing_id && !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(HandlerError::new("simulated handler failure"));
        }
        self.handled.lock().unwrap().push(event.event_id().to_string());
        Ok(())
    }
}

fn live(index: u64) -> TrackingToken {
    TrackingToken::Live(SequenceToken::new(index))
}

#[test]
fn failed_batch_rolls_back_and_is_redelivered() {
    let source = InMemoryMessageSource::new();
    let store = Arc::new(RecordingTokenStore::new(InMemoryTokenStore::new("node-a")));
    let invoker = Arc::new(FlakyInvoker::new("e1"));
    let processor = TrackingProcessor::builder("orders")
        .config(ProcessorConfig::default().with_batch_size(2))
        .with_message_source(Arc::new(source.clone()))
        .with_token_store(store.clone())
        .with_handler_invoker(invoker.clone())
        .build()
        .unwrap();

    source.publish("e0", b"order-1".as_slice(), b"payload".as_slice());
    source.publish("e1", b"order-1".as_slice(), b"payload".as_slice());

    processor.start();
    wait_for(Duration::from_secs(10), || {
        invoker.handled.lock().unwrap().iter().any(|id| id == "e1")
    });
    processor.shut_down();

    // The rolled-back batch stored nothing; the retry delivered it again.
    assert_eq!(store.stored(), vec![live(1)]);
    assert_eq!(invoker.handled.lock().unwrap().as_slice(), ["e0", "e0", "e1"]);
}

#[test]
fn never_policy_commits_past_handler_failures() {
    #[derive(Clone, Default)]
    struct FailureMonitor {
        failures: Arc<Mutex<Vec<String>>>,
    }

    impl MessageMonitor for FailureMonitor {
        fn report_failure(&self, event: &TrackedEvent, _error: &HandlerError) {
            self.failures.lock().unwrap().push(event.event_id().to_string());
        }
    }

    struct RejectOneInvoker;

    impl EventHandlerInvoker for RejectOneInvoker {
        fn can_handle(&self, _event: &TrackedEvent, _segment: &Segment) -> bool {
            true
        }

        fn handle(&self, event: &TrackedEvent, _segment: &Segment) -> Result<(), HandlerError> {
            if event.event_id() == "e1" {
                return Err(HandlerError::new("permanently broken"));
            }
            Ok(())
        }
    }

    let source = InMemoryMessageSource::new();
    let store = Arc::new(RecordingTokenStore::new(InMemoryTokenStore::new("node-a")));
    let monitor = FailureMonitor::default();
    let processor = TrackingProcessor::builder("orders")
        .config(
            ProcessorConfig::default()
                .with_batch_size(2)
                .with_rollback_policy(RollbackPolicy::Never),
        )
        .with_message_source(Arc::new(source.clone()))
        .with_token_store(store.clone())
        .with_handler_invoker(Arc::new(RejectOneInvoker))
        .with_message_monitor(Arc::new(monitor.clone()))
        .build()
        .unwrap();

    source.publish("e0", b"order-1".as_slice(), b"payload".as_slice());
    source.publish("e1", b"order-1".as_slice(), b"payload".as_slice());

    processor.start();
    wait_for(Duration::from_secs(5), || !store.stored().is_empty());
    processor.shut_down();

    assert_eq!(store.stored(), vec![live(1)]);
    assert_eq!(monitor.failures.lock().unwrap().as_slice(), ["e1"]);
}

#[test]
fn swallowing_error_handler_commits_the_batch() {
    struct SwallowingErrorHandler;

    impl ErrorHandler for SwallowingErrorHandler {
        fn handle_error(&self, _context: ErrorContext<'_>) -> Result<(), ProcessingError> {
            Ok(())
        }
    }

    struct RejectOneInvoker;

    impl EventHandlerInvoker for RejectOneInvoker {
        fn can_handle(&self, _event: &TrackedEvent, _segment: &Segment) -> bool {
            true
        }

        fn handle(&self, event: &TrackedEvent, _segment: &Segment) -> Result<(), HandlerError> {
            if event.event_id() == "e0" {
                return Err(HandlerError::new("broken handler"));
            }
            Ok(())
        }
    }

    let source = InMemoryMessageSource::new();
    let store = Arc::new(RecordingTokenStore::new(InMemoryTokenStore::new("node-a")));
    let processor = TrackingProcessor::builder("orders")
        .config(ProcessorConfig::default().with_batch_size(2))
        .with_message_source(Arc::new(source.clone()))
        .with_token_store(store.clone())
        .with_handler_invoker(Arc::new(RejectOneInvoker))
        .with_error_handler(Arc::new(SwallowingErrorHandler))
        .build()
        .unwrap();

    source.publish("e0", b"order-1".as_slice(), b"payload".as_slice());
    source.publish("e1", b"order-1".as_slice(), b"payload".as_slice());

    processor.start();
    wait_for(Duration::from_secs(5), || store.stored() == vec![live(1)]);
    processor.shut_down();
}

#[test]
fn worker_panic_pauses_the_processor_and_releases_the_claim() {
    struct PanickingInvoker;

    impl EventHandlerInvoker for PanickingInvoker {
        fn can_handle(&self, _event: &TrackedEvent, _segment: &Segment) -> bool {
            true
        }

        fn handle(&self, _event: &TrackedEvent, _segment: &Segment) -> Result<(), HandlerError> {
            panic!("handler exploded");
        }
    }

    let inner = InMemoryTokenStore::new("node-a");
    let observer = inner.for_node("observer");
    let store = Arc::new(RecordingTokenStore::new(inner));
    let source = InMemoryMessageSource::new();
    let processor = TrackingProcessor::builder("orders")
        .with_message_source(Arc::new(source.clone()))
        .with_token_store(store.clone())
        .with_handler_invoker(Arc::new(PanickingInvoker))
        .build()
        .unwrap();

    source.publish("e0", b"order-1".as_slice(), b"payload".as_slice());
    processor.start();

    wait_for(Duration::from_secs(5), || processor.is_error());
    wait_for(Duration::from_secs(5), || processor.active_worker_count() == 0);
    assert!(store.stored().is_empty());

    // The claim was released on the way out, so another node can take over.
    wait_for(Duration::from_secs(5), || {
        observer.fetch_token("orders", 0).is_ok()
    });

    processor.shut_down();
}
