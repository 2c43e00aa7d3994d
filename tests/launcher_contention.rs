use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use retrace::{
    EventHandlerInvoker, HandlerError, InMemoryMessageSource, InMemoryTokenStore, ProcessorConfig,
    Segment, TrackedEvent, TrackingProcessor,
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

#[derive(Clone, Default)]
struct RecordingInvoker {
    handled: Arc<Mutex<Vec<String>>>,
}

impl EventHandlerInvoker for RecordingInvoker {
    fn can_handle(&self, event: &TrackedEvent, segment: &Segment) -> bool {
        segment.matches_event(event)
    }

    fn handle(&self, event: &TrackedEvent, _segment: &Segment) -> Result<(), HandlerError> {
        self.handled.lock().unwrap().push(event.event_id().to_string());
        Ok(())
    }
}

fn build_processor(
    source: &InMemoryMessageSource,
    store: InMemoryTokenStore,
    invoker: &RecordingInvoker,
) -> TrackingProcessor {
    TrackingProcessor::builder("orders")
        .config(ProcessorConfig::for_single_worker())
        .with_message_source(Arc::new(source.clone()))
        .with_token_store(Arc::new(store))
        .with_handler_invoker(Arc::new(invoker.clone()))
        .build()
        .unwrap()
}

#[test]
fn one_segment_is_owned_by_exactly_one_instance() {
    let source = InMemoryMessageSource::new();
    let store_a = InMemoryTokenStore::new("node-a");
    let store_b = store_a.for_node("node-b");
    let invoker_a = RecordingInvoker::default();
    let invoker_b = RecordingInvoker::default();

    let node_a = build_processor(&source, store_a, &invoker_a);
    let node_b = build_processor(&source, store_b, &invoker_b);

    node_a.start();
    wait_for(Duration::from_secs(5), || node_a.active_worker_count() == 1);

    node_b.start();
    thread::sleep(Duration::from_millis(400));

    // Only the claim holder processes events; the other instance keeps
    // retrying without ever dispatching a worker.
    source.publish("e0", b"order-1".as_slice(), b"payload".as_slice());
    wait_for(Duration::from_secs(5), || {
        invoker_a.handled.lock().unwrap().len() == 1
    });
    assert!(invoker_b.handled.lock().unwrap().is_empty());
    assert_eq!(node_a.active_segments(), vec![0]);

    // Releasing the claim on shut down hands the segment over.
    node_a.shut_down();
    wait_for(Duration::from_secs(10), || node_b.active_worker_count() == 1);

    source.publish("e1", b"order-1".as_slice(), b"payload".as_slice());
    wait_for(Duration::from_secs(5), || {
        invoker_b.handled.lock().unwrap().len() == 1
    });
    assert_eq!(invoker_b.handled.lock().unwrap().as_slice(), ["e1"]);

    node_b.shut_down();
}

#[test]
fn active_segment_sets_stay_disjoint_across_instances() {
    let source = InMemoryMessageSource::new();
    let store_a = InMemoryTokenStore::new("node-a");
    let store_b = store_a.for_node("node-b");
    let invoker = RecordingInvoker::default();

    let config = ProcessorConfig::for_parallel_processing(2).with_initial_segment_count(4);
    let node_a = TrackingProcessor::builder("orders")
        .config(config.clone())
        .with_message_source(Arc::new(source.clone()))
        .with_token_store(Arc::new(store_a))
        .with_handler_invoker(Arc::new(invoker.clone()))
        .build()
        .unwrap();
    let node_b = TrackingProcessor::builder("orders")
        .config(config)
        .with_message_source(Arc::new(source.clone()))
        .with_token_store(Arc::new(store_b))
        .with_handler_invoker(Arc::new(invoker.clone()))
        .build()
        .unwrap();

    node_a.start();
    wait_for(Duration::from_secs(5), || node_a.active_worker_count() == 2);
    node_b.start();
    wait_for(Duration::from_secs(5), || node_b.active_worker_count() == 2);

    let segments_a = node_a.active_segments();
    let segments_b = node_b.active_segments();
    for segment in &segments_a {
        assert!(
            !segments_b.contains(segment),
            "segment {segment} active on both instances"
        );
    }
    assert_eq!(segments_a.len() + segments_b.len(), 4);

    node_a.shut_down();
    node_b.shut_down();
}
