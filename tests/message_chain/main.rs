use std::sync::{Arc, Mutex};

use causeway::{
    BatchMode, CloudAdapter, Consumer, FollowOptions, Message, Metadata, MetadataOverrides,
    NewMessage, Producer, PubSubConfig, SchemaSpec, UserContext,
};
use serde_json::json;

fn producer(adapter: Arc<CloudAdapter>) -> Producer {
    let config = PubSubConfig::new("billing", adapter);
    Producer::new(config, "accounts", "accounts-topic", SchemaSpec::json())
}

// --- Causal Chains ---

#[test]
fn new_messages_are_chain_roots_with_unique_correlation() {
    let a = Message::new(NewMessage::new());
    let b = Message::new(NewMessage::new());

    assert!(a.metadata.causation_id.is_none());
    assert!(b.metadata.causation_id.is_none());
    assert!(!a.metadata.correlation_id.is_empty());
    assert_ne!(a.metadata.correlation_id, b.metadata.correlation_id);
}

#[test]
fn follow_preserves_correlation_across_a_published_chain() {
    let adapter = Arc::new(CloudAdapter::new());
    let producer = producer(adapter);

    let opened = producer
        .publish(Message::new(NewMessage::new().data(json!({"account_id": "123"}))))
        .unwrap();

    let charged = producer
        .publish(Message::follow(&opened, FollowOptions::include(["account_id"])))
        .unwrap();

    let closed = producer
        .publish(Message::follow(&charged, FollowOptions::new()))
        .unwrap();

    // one correlation id across the whole chain
    assert_eq!(charged.metadata.correlation_id, opened.metadata.correlation_id);
    assert_eq!(closed.metadata.correlation_id, opened.metadata.correlation_id);

    // each causation id points at the immediate predecessor
    assert_eq!(charged.metadata.causation_id, opened.metadata.event_id);
    assert_eq!(closed.metadata.causation_id, charged.metadata.event_id);
}

#[test]
fn follow_of_unpublished_message_has_no_causation() {
    let root = Message::new(NewMessage::new());
    let next = Message::follow(&root, FollowOptions::new());
    assert!(next.metadata.causation_id.is_none());
    assert_eq!(next.metadata.correlation_id, root.metadata.correlation_id);
}

// --- Follow Data Copying ---

#[test]
fn include_copies_only_named_fields() {
    let root = Message::new(NewMessage::new().data(json!({"account_id": "123"})));
    let next = Message::follow(&root, FollowOptions::include(["account_id"]));
    assert_eq!(next.data, json!({"account_id": "123"}));
}

#[test]
fn exclude_copies_everything_else() {
    let root = Message::new(
        NewMessage::new().data(json!({"account_id": "123", "name": "Bob"})),
    );
    let next = Message::follow(&root, FollowOptions::exclude(["account_id"]));
    assert_eq!(next.data, json!({"name": "Bob"}));
}

#[test]
fn empty_include_and_empty_exclude_boundaries() {
    let root = Message::new(NewMessage::new().data(json!({"a": 1, "b": 2})));

    let none = Message::follow(&root, FollowOptions::include(Vec::<String>::new()));
    assert_eq!(none.data, json!({}));

    let all = Message::follow(&root, FollowOptions::exclude(Vec::<String>::new()));
    assert_eq!(all.data, json!({"a": 1, "b": 2}));
}

// --- Encodable Round Trip ---

#[test]
fn metadata_round_trips_through_its_encodable_projection() {
    let metadata = Metadata::new(
        MetadataOverrides::new()
            .topic("accounts-topic")
            .service("billing")
            .schema(SchemaSpec::bitcode())
            .causation_id("evt-0")
            .user(UserContext {
                id: Some("u-1".to_string()),
                email: Some("bob@example.com".to_string()),
            }),
    );

    let rebuilt = Metadata::from_encodable(&metadata.to_encodable()).unwrap();
    assert_eq!(rebuilt, metadata);
}

#[test]
fn published_metadata_round_trips_too() {
    let adapter = Arc::new(CloudAdapter::new());
    let published = producer(adapter)
        .publish(Message::new(NewMessage::new().data(json!({"a": 1}))))
        .unwrap();

    let rebuilt = Metadata::from_encodable(&published.metadata.to_encodable()).unwrap();
    assert_eq!(rebuilt, published.metadata);
}

// --- Consume Side ---

#[test]
fn published_chain_survives_the_consumer_path() {
    let adapter = Arc::new(CloudAdapter::new());
    let producer = producer(adapter.clone());

    let opened = producer
        .publish(Message::new(NewMessage::new().data(json!({"account_id": "123"}))))
        .unwrap();
    let charged = producer
        .publish(Message::follow(&opened, FollowOptions::include(["account_id"])))
        .unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let consumer = Consumer::builder(PubSubConfig::new("billing", adapter))
        .handler(move |message| {
            sink.lock().unwrap().push(message.clone());
            Ok(())
        })
        .build()
        .unwrap();

    let outcome = consumer
        .push_test_batch(None, BatchMode::Bulk, &[opened.clone(), charged.clone()])
        .unwrap();
    assert_eq!(outcome.handled, 2);
    assert_eq!(outcome.failed, 0);

    let received = received.lock().unwrap();
    assert_eq!(received[0], opened);
    assert_eq!(received[1], charged);
    assert_eq!(
        received[1].metadata.causation_id,
        received[0].metadata.event_id
    );
}
