//! Correlated pub/sub messaging toolkit.
//!
//! `causeway` standardizes how application code creates, correlates, and
//! exchanges event messages over a pub/sub transport. Messages carry a
//! correlation envelope linking them into causal chains; producers stamp,
//! publish with exponential-backoff retries, and emit telemetry; actual
//! network I/O lives behind the pluggable [`Adapter`] contract, and batch
//! consumption stays with the external pipeline framework.
//!
//! ```
//! use std::sync::Arc;
//! use causeway::{
//!     CloudAdapter, FollowOptions, Message, NewMessage, Producer, PubSubConfig, SchemaSpec,
//! };
//! use serde_json::json;
//!
//! let config = PubSubConfig::new("billing", Arc::new(CloudAdapter::new()));
//! let producer = Producer::new(config, "accounts", "accounts-topic", SchemaSpec::json());
//!
//! let opened = producer
//!     .publish(Message::new(NewMessage::new().data(json!({"account_id": "123"}))))
//!     .unwrap();
//!
//! // A follow-up shares the correlation id and points back at its cause.
//! let charged = Message::follow(&opened, FollowOptions::include(["account_id"]));
//! assert_eq!(charged.metadata.causation_id, opened.metadata.event_id);
//! ```

mod adapter;
mod config;
mod consumer;
mod message;
mod metadata;
mod producer;
mod schema;
mod telemetry;

pub use adapter::{
    Acknowledger, Adapter, AdapterError, BatchMode, CloudAdapter, CloudError,
    MissingOptionError, TransportMessage, WireRecord,
};
pub use config::{MetadataDefaultsHook, PubSubConfig};
pub use consumer::{
    BatchOutcome, Consumer, ConsumerBuildError, ConsumerBuilder, HandlerError, MessageHandler,
};
pub use message::{
    EncodedMessage, FollowOptions, Message, MessageEncodeError, NewMessage,
};
pub use metadata::{Metadata, MetadataError, MetadataOverrides, UserContext};
pub use producer::{Producer, INITIAL_RETRY_DELAY_MS};
pub use schema::{
    BinaryCodec, BitcodeCodec, DecodeError, EncodeError, SchemaSpec, SCHEMA_TYPE_BINARY,
    SCHEMA_TYPE_JSON,
};
pub use telemetry::{
    Telemetry, TelemetryEvent, PUBLISH_END, PUBLISH_EVENTS, PUBLISH_FAILURE, PUBLISH_RETRY,
    PUBLISH_START,
};
