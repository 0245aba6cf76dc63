use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use causeway::{
    Acknowledger, Adapter, AdapterError, BatchMode, CloudAdapter, Message, Metadata,
    NewMessage, Producer, PubSubConfig, SchemaSpec, Telemetry, TelemetryEvent,
    TransportMessage, PUBLISH_END, PUBLISH_FAILURE, PUBLISH_RETRY, PUBLISH_START,
};
use serde_json::{json, Value};

/// Adapter that fails its first `fail_first` publish calls, then delegates
/// to an in-process cloud adapter.
struct FlakyAdapter {
    inner: CloudAdapter,
    fail_first: usize,
    attempts: AtomicUsize,
}

impl FlakyAdapter {
    fn new(fail_first: usize) -> Arc<Self> {
        Arc::new(FlakyAdapter {
            inner: CloudAdapter::new(),
            fail_first,
            attempts: AtomicUsize::new(0),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Adapter for FlakyAdapter {
    fn publish(&self, topic: &str, messages: Vec<Message>) -> Result<Vec<Message>, AdapterError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(AdapterError::from("transport unavailable"));
        }
        self.inner.publish(topic, messages)
    }

    fn unpack(&self, transport: &TransportMessage) -> Result<Message, AdapterError> {
        self.inner.unpack(transport)
    }

    fn unpack_metadata(&self, transport: &TransportMessage) -> Result<Metadata, AdapterError> {
        self.inner.unpack_metadata(transport)
    }

    fn pack(
        &self,
        acknowledger: Option<Arc<dyn Acknowledger>>,
        batch_mode: BatchMode,
        message: &Message,
    ) -> Result<TransportMessage, AdapterError> {
        self.inner.pack(acknowledger, batch_mode, message)
    }

    fn pipeline_producer(
        &self,
        opts: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, AdapterError> {
        self.inner.pipeline_producer(opts)
    }
}

/// Captures every emitted event name (plus retry delays) for assertions.
struct Captured {
    names: Mutex<Vec<&'static str>>,
    retry_delays: Mutex<Vec<u64>>,
    end_events: Mutex<Vec<Vec<Message>>>,
}

fn capture(telemetry: &Telemetry) -> Arc<Captured> {
    let captured = Arc::new(Captured {
        names: Mutex::new(Vec::new()),
        retry_delays: Mutex::new(Vec::new()),
        end_events: Mutex::new(Vec::new()),
    });
    let sink = captured.clone();
    telemetry.attach_all(move |event| {
        sink.names.lock().unwrap().push(event.name());
        match event {
            TelemetryEvent::PublishRetry { total_delay_ms, .. } => {
                sink.retry_delays.lock().unwrap().push(*total_delay_ms);
            }
            TelemetryEvent::PublishEnd { messages, .. } => {
                sink.end_events.lock().unwrap().push(messages.clone());
            }
            _ => {}
        }
    });
    captured
}

fn count(captured: &Captured, name: &str) -> usize {
    captured
        .names
        .lock()
        .unwrap()
        .iter()
        .filter(|n| **n == name)
        .count()
}

fn producer_over(adapter: Arc<dyn Adapter>, max_retry_ms: u64) -> (Producer, Arc<Captured>) {
    let telemetry = Telemetry::new();
    let captured = capture(&telemetry);
    let config = PubSubConfig::new("billing", adapter).with_telemetry(telemetry);
    let producer = Producer::new(config, "accounts", "accounts-topic", SchemaSpec::json())
        .with_max_retry_duration(max_retry_ms);
    (producer, captured)
}

#[test]
fn retries_until_success_within_budget() {
    let adapter = FlakyAdapter::new(2);
    let (producer, captured) = producer_over(adapter.clone(), 300);

    let published = producer
        .publish(Message::new(NewMessage::new().data(json!({"account_id": "123"}))))
        .unwrap();

    // attempts at delays 0, 100, 200 — the third succeeds
    assert_eq!(adapter.attempts(), 3);
    assert!(published.is_published());

    assert_eq!(count(&captured, PUBLISH_START), 1);
    assert_eq!(count(&captured, PUBLISH_END), 1);
    assert_eq!(count(&captured, PUBLISH_RETRY), 2);
    assert_eq!(count(&captured, PUBLISH_FAILURE), 0);

    // only the second attempt failed at a real delay; the third succeeded
    let delays = captured.retry_delays.lock().unwrap();
    assert_eq!(*delays, vec![100]);
}

#[test]
fn budget_exhaustion_returns_last_error_untouched() {
    let adapter = FlakyAdapter::new(usize::MAX);
    let (producer, captured) = producer_over(adapter.clone(), 300);

    let err = producer
        .publish(Message::new(NewMessage::new()))
        .unwrap_err();

    // delays 0, 100, 200 all attempted; the next (400) would blow the budget
    assert_eq!(adapter.attempts(), 3);
    assert_eq!(err.to_string(), "transport unavailable");

    assert_eq!(count(&captured, PUBLISH_START), 1);
    assert_eq!(count(&captured, PUBLISH_END), 0);
    assert_eq!(count(&captured, PUBLISH_RETRY), 2);
    assert_eq!(count(&captured, PUBLISH_FAILURE), 1);

    // total slept delay accumulates across retries
    let delays = captured.retry_delays.lock().unwrap();
    assert_eq!(*delays, vec![100, 300]);
}

#[test]
fn zero_budget_fails_after_one_attempt_with_failure_event() {
    let adapter = FlakyAdapter::new(usize::MAX);
    let (producer, captured) = producer_over(adapter.clone(), 0);

    let _ = producer.publish(Message::new(NewMessage::new())).unwrap_err();

    assert_eq!(adapter.attempts(), 1);
    assert_eq!(count(&captured, PUBLISH_RETRY), 0);
    assert_eq!(count(&captured, PUBLISH_FAILURE), 1);
    assert_eq!(count(&captured, PUBLISH_END), 0);
}

#[test]
fn single_json_publish_ends_with_one_published_message() {
    // The reference scenario: JSON schema, echoing adapter with sequential
    // ids, one message in, one publish-end event out.
    let (producer, captured) = producer_over(Arc::new(CloudAdapter::new()), 0);

    let published = producer
        .publish(Message::new(NewMessage::new().data(json!({"account_id": "123"}))))
        .unwrap();

    assert!(published.metadata.event_id.is_some());
    assert!(published.metadata.adapter_event_id.is_some());
    assert!(published.metadata.published_at.is_some());

    let end_events = captured.end_events.lock().unwrap();
    assert_eq!(end_events.len(), 1);
    assert_eq!(end_events[0].len(), 1);
    assert!(end_events[0][0].metadata.event_id.is_some());
}

#[test]
fn batch_publish_returns_every_message_published() {
    let (producer, captured) = producer_over(Arc::new(CloudAdapter::new()), 0);

    let batch = vec![
        Message::new(NewMessage::new().data(json!({"n": 1}))),
        Message::new(NewMessage::new().data(json!({"n": 2}))),
        Message::new(NewMessage::new().data(json!({"n": 3}))),
    ];
    let published = producer.publish_batch(batch).unwrap();

    assert_eq!(published.len(), 3);
    assert!(published.iter().all(Message::is_published));
    // ids are distinct
    let ids: Vec<_> = published
        .iter()
        .map(|m| m.metadata.event_id.clone().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] != w[1]));

    assert_eq!(count(&captured, PUBLISH_START), 1);
    assert_eq!(count(&captured, PUBLISH_END), 1);
}

#[test]
fn producer_stamps_topic_service_and_schema() {
    let (producer, _captured) = producer_over(Arc::new(CloudAdapter::new()), 0);

    // caller-set topic is overwritten by the producer's own
    let message = Message::new(NewMessage::new()).put_meta(|m| {
        m.topic = Some("somewhere-else".to_string());
    });
    let published = producer.publish(message).unwrap();

    assert_eq!(published.metadata.topic.as_deref(), Some("accounts-topic"));
    assert_eq!(published.metadata.service.as_deref(), Some("billing"));
    assert_eq!(published.metadata.schema, Some(SchemaSpec::json()));
}
