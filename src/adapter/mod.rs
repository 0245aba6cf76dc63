//! The transport adapter contract.
//!
//! Adapters bind the core message types to a specific pub/sub transport.
//! The producer and consumer only ever see this trait; transport errors are
//! opaque boxed values the core never inspects beyond success/failure.

mod cloud;

pub use cloud::{CloudAdapter, CloudError, WireRecord};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::message::Message;
use crate::metadata::Metadata;

/// Opaque, adapter-defined error. The core treats any non-success adapter
/// return as retryable and hands the last one back to the caller untouched.
pub type AdapterError = Box<dyn std::error::Error + Send + Sync>;

/// Raised by [`Adapter::pipeline_producer`] when a required wiring option
/// is absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingOptionError {
    pub key: &'static str,
}

impl fmt::Display for MissingOptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing required pipeline option: {}", self.key)
    }
}

impl std::error::Error for MissingOptionError {}

/// How the batch pipeline delivers transport messages downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchMode {
    Bulk,
    Flush,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchMode::Bulk => "bulk",
            BatchMode::Flush => "flush",
        }
    }
}

/// Acknowledgement hook owned by the transport's pipeline stage.
pub trait Acknowledger: Send + Sync {
    fn ack(&self, message_id: &str);
    fn nack(&self, message_id: &str, reason: &str);
}

/// A transport-native inbound/outbound message.
#[derive(Clone)]
pub struct TransportMessage {
    /// Transport-assigned message id.
    pub id: String,
    /// Base64-encoded payload bytes.
    pub data: String,
    /// Flat string attributes; transports disallow nesting and nulls.
    pub attributes: HashMap<String, String>,
    /// Transport publish timestamp, RFC 3339.
    pub publish_time: Option<String>,
    pub batch_mode: BatchMode,
    pub acknowledger: Option<Arc<dyn Acknowledger>>,
}

impl fmt::Debug for TransportMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportMessage")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("attributes", &self.attributes)
            .field("publish_time", &self.publish_time)
            .field("batch_mode", &self.batch_mode)
            .field("acknowledger", &self.acknowledger.is_some())
            .finish()
    }
}

impl TransportMessage {
    /// Ack through the attached acknowledger, if any.
    pub fn ack(&self) {
        if let Some(acknowledger) = &self.acknowledger {
            acknowledger.ack(&self.id);
        }
    }

    /// Nack through the attached acknowledger, if any.
    pub fn nack(&self, reason: &str) {
        if let Some(acknowledger) = &self.acknowledger {
            acknowledger.nack(&self.id, reason);
        }
    }
}

/// Pluggable transport binding.
///
/// Implementations might include:
/// - `CloudAdapter` — the in-process reference binding in this crate
/// - a Google Cloud Pub/Sub REST adapter
/// - a NATS or Kafka adapter
pub trait Adapter: Send + Sync {
    /// Publish a batch of messages to `topic`.
    ///
    /// On success every returned message must carry the adapter-assigned
    /// `event_id`/`adapter_event_id` and a `published_at` timestamp.
    fn publish(&self, topic: &str, messages: Vec<Message>)
        -> Result<Vec<Message>, AdapterError>;

    /// Single-message form of [`Adapter::publish`].
    ///
    /// Default implementation delegates to the batch form.
    fn publish_one(&self, topic: &str, message: Message) -> Result<Message, AdapterError> {
        let mut published = self.publish(topic, vec![message])?;
        published
            .pop()
            .ok_or_else(|| AdapterError::from("adapter returned an empty batch"))
    }

    /// Convert a transport-native inbound message into a core message.
    fn unpack(&self, transport: &TransportMessage) -> Result<Message, AdapterError>;

    /// Metadata-only variant of [`Adapter::unpack`].
    fn unpack_metadata(&self, transport: &TransportMessage)
        -> Result<Metadata, AdapterError>;

    /// Inverse of [`Adapter::unpack`]: wrap a published message in the
    /// transport's native shape, for injecting into a consumption pipeline.
    fn pack(
        &self,
        acknowledger: Option<Arc<dyn Acknowledger>>,
        batch_mode: BatchMode,
        message: &Message,
    ) -> Result<TransportMessage, AdapterError>;

    /// Wiring configuration for the external batch pipeline's inbound
    /// producer stage. Required keys vary by transport; a missing one fails
    /// with [`MissingOptionError`].
    fn pipeline_producer(
        &self,
        opts: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, AdapterError>;
}
