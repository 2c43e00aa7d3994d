use std::sync::Arc;

use retrace::{
    ConfigError, EventHandlerInvoker, HandlerError, InMemoryMessageSource, InMemoryTokenStore,
    ProcessorConfig, RollbackPolicy, Segment, TrackedEvent, TrackingProcessor,
};

struct NoopInvoker;

impl EventHandlerInvoker for NoopInvoker {
    fn can_handle(&self, _event: &TrackedEvent, _segment: &Segment) -> bool {
        true
    }

    fn handle(&self, _event: &TrackedEvent, _segment: &Segment) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[test]
fn default_config_is_single_worker() {
    let config = ProcessorConfig::default();
    assert_eq!(config, ProcessorConfig::for_single_worker());
    assert_eq!(config.batch_size, 1);
    assert_eq!(config.initial_segment_count, 1);
    assert_eq!(config.max_worker_count, 1);
    assert_eq!(config.rollback_policy, RollbackPolicy::AnyError);
    config.validate().unwrap();
}

#[test]
fn parallel_preset_scales_segments_with_workers() {
    let config = ProcessorConfig::for_parallel_processing(4);
    assert_eq!(config.max_worker_count, 4);
    assert_eq!(config.initial_segment_count, 4);
    config.validate().unwrap();
}

#[test]
fn zero_batch_size_is_rejected() {
    let error = ProcessorConfig::default().with_batch_size(0).validate();
    assert_eq!(error, Err(ConfigError::ZeroBatchSize));
}

#[test]
fn zero_worker_count_is_rejected() {
    let mut config = ProcessorConfig::default();
    config.max_worker_count = 0;
    assert_eq!(config.validate(), Err(ConfigError::ZeroWorkerCount));
}

#[test]
fn builder_rejects_invalid_configuration() {
    let result = TrackingProcessor::builder("orders")
        .config(ProcessorConfig::default().with_batch_size(0))
        .with_message_source(Arc::new(InMemoryMessageSource::new()))
        .with_token_store(Arc::new(InMemoryTokenStore::new("node-a")))
        .with_handler_invoker(Arc::new(NoopInvoker))
        .build();
    assert!(matches!(result, Err(ConfigError::ZeroBatchSize)));
}

#[test]
fn builder_requires_all_collaborators() {
    let missing_source = TrackingProcessor::builder("orders")
        .with_token_store(Arc::new(InMemoryTokenStore::new("node-a")))
        .with_handler_invoker(Arc::new(NoopInvoker))
        .build();
    assert!(matches!(missing_source, Err(ConfigError::MissingMessageSource)));

    let missing_store = TrackingProcessor::builder("orders")
        .with_message_source(Arc::new(InMemoryMessageSource::new()))
        .with_handler_invoker(Arc::new(NoopInvoker))
        .build();
    assert!(matches!(missing_store, Err(ConfigError::MissingTokenStore)));

    let missing_invoker = TrackingProcessor::builder("orders")
        .with_message_source(Arc::new(InMemoryMessageSource::new()))
        .with_token_store(Arc::new(InMemoryTokenStore::new("node-a")))
        .build();
    assert!(matches!(missing_invoker, Err(ConfigError::MissingHandlerInvoker)));
}

#[test]
fn config_round_trips_through_json_with_defaults() {
    let config: ProcessorConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, ProcessorConfig::default());

    let config: ProcessorConfig = serde_json::from_str(
        r#"{"batch_size": 8, "max_worker_count": 3, "rollback_policy": "never"}"#,
    )
    .unwrap();
    assert_eq!(config.batch_size, 8);
    assert_eq!(config.max_worker_count, 3);
    assert_eq!(config.initial_segment_count, 1);
    assert_eq!(config.rollback_policy, RollbackPolicy::Never);

    let serialized = serde_json::to_string(&config).unwrap();
    let restored: ProcessorConfig = serde_json::from_str(&serialized).unwrap();
    assert_eq!(restored, config);
}

#[test]
fn processor_exposes_its_name() {
    let processor = TrackingProcessor::builder("orders")
        .with_message_source(Arc::new(InMemoryMessageSource::new()))
        .with_token_store(Arc::new(InMemoryTokenStore::new("node-a")))
        .with_handler_invoker(Arc::new(NoopInvoker))
        .build()
        .unwrap();
    assert_eq!(processor.name(), "orders");
}
