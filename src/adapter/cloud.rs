//! Reference transport binding with a Google-Cloud-Pub/Sub-shaped wire
//! format.
//!
//! Payload bytes ride base64-encoded in `data`; metadata flattens into the
//! string-only `attributes` map with nil-valued fields dropped (the
//! transport disallows null attribute values). On the inbound path the
//! transport's own message id and publish timestamp are lifted into the
//! adapter-assigned metadata fields, with sub-second precision normalized
//! to microseconds.
//!
//! The transport itself is an in-process, thread-safe topic log with
//! sequential ids — the reference implementation of the [`Adapter`]
//! contract used by tests and local development. Real REST/auth I/O belongs
//! in an out-of-tree adapter.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::{
    Acknowledger, Adapter, AdapterError, BatchMode, MissingOptionError, TransportMessage,
};
use crate::message::Message;
use crate::metadata::{truncate_to_micros, Metadata};

/// Error from the reference cloud binding itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloudError {
    /// The in-memory topic log lock was poisoned.
    LogPoisoned,
    /// A transport message arrived without a usable publish timestamp.
    InvalidPublishTime(String),
}

impl fmt::Display for CloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudError::LogPoisoned => f.write_str("cloud topic log lock poisoned"),
            CloudError::InvalidPublishTime(value) => {
                write!(f, "invalid transport publish time: {}", value)
            }
        }
    }
}

impl std::error::Error for CloudError {}

/// A record as it sits on the wire: base64 data plus flat attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireRecord {
    pub id: String,
    pub data: String,
    pub attributes: HashMap<String, String>,
    pub publish_time: String,
}

/// Flatten encodable metadata into transport attributes.
///
/// Null-valued fields are dropped entirely; everything else becomes a
/// string.
fn to_attributes(metadata: &HashMap<String, Value>) -> HashMap<String, String> {
    metadata
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

fn from_attributes(attributes: &HashMap<String, String>) -> HashMap<String, Value> {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

fn parse_publish_time(transport: &TransportMessage) -> Result<DateTime<Utc>, CloudError> {
    let raw = transport
        .publish_time
        .as_deref()
        .ok_or_else(|| CloudError::InvalidPublishTime("<missing>".to_string()))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| truncate_to_micros(dt.with_timezone(&Utc)))
        .map_err(|_| CloudError::InvalidPublishTime(raw.to_string()))
}

/// In-process reference adapter over the cloud wire format.
pub struct CloudAdapter {
    topics: Arc<Mutex<HashMap<String, Vec<WireRecord>>>>,
    next_id: AtomicU64,
}

impl Default for CloudAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudAdapter {
    pub fn new() -> Self {
        CloudAdapter {
            topics: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    fn assign_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Wire records published to `topic`, in publish order.
    pub fn published(&self, topic: &str) -> Vec<WireRecord> {
        self.topics
            .lock()
            .map(|topics| topics.get(topic).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl Adapter for CloudAdapter {
    fn publish(
        &self,
        topic: &str,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, AdapterError> {
        let mut published = Vec::with_capacity(messages.len());
        let mut records = Vec::with_capacity(messages.len());

        for message in &messages {
            let encoded = message.encode()?;
            let id = self.assign_id();
            let publish_time = truncate_to_micros(Utc::now());

            records.push(WireRecord {
                id: id.clone(),
                data: STANDARD.encode(&encoded.data),
                attributes: to_attributes(&encoded.metadata),
                publish_time: publish_time.to_rfc3339_opts(SecondsFormat::Micros, true),
            });

            published.push(message.put_meta(|meta| {
                meta.event_id = Some(id.clone());
                meta.adapter_event_id = Some(id.clone());
                meta.published_at = Some(publish_time);
            }));
        }

        let mut topics = self.topics.lock().map_err(|_| CloudError::LogPoisoned)?;
        topics
            .entry(topic.to_string())
            .or_default()
            .extend(records);

        Ok(published)
    }

    fn unpack(&self, transport: &TransportMessage) -> Result<Message, AdapterError> {
        let metadata = self.unpack_metadata(transport)?;
        let bytes = STANDARD.decode(&transport.data)?;
        let schema = metadata
            .schema
            .as_ref()
            .ok_or(crate::message::MessageEncodeError::MissingSchema)?;
        let data = schema.decode(&bytes)?;
        Ok(Message { data, metadata })
    }

    fn unpack_metadata(
        &self,
        transport: &TransportMessage,
    ) -> Result<Metadata, AdapterError> {
        let mut metadata = Metadata::from_encodable(&from_attributes(&transport.attributes))?;
        // The transport owns the assigned id and publish time.
        metadata.event_id = Some(transport.id.clone());
        metadata.adapter_event_id = Some(transport.id.clone());
        metadata.published_at = Some(parse_publish_time(transport)?);
        Ok(metadata)
    }

    fn pack(
        &self,
        acknowledger: Option<Arc<dyn Acknowledger>>,
        batch_mode: BatchMode,
        message: &Message,
    ) -> Result<TransportMessage, AdapterError> {
        let encoded = message.encode()?;
        let mut attributes = to_attributes(&encoded.metadata);
        // Transport-level fields do not travel as attributes.
        attributes.remove("event_id");
        attributes.remove("adapter_event_id");
        attributes.remove("published_at");

        let id = message
            .metadata
            .event_id
            .clone()
            .unwrap_or_else(|| self.assign_id());
        let publish_time = message
            .metadata
            .published_at
            .unwrap_or_else(|| truncate_to_micros(Utc::now()));

        Ok(TransportMessage {
            id,
            data: STANDARD.encode(&encoded.data),
            attributes,
            publish_time: Some(publish_time.to_rfc3339_opts(SecondsFormat::Micros, true)),
            batch_mode,
            acknowledger,
        })
    }

    fn pipeline_producer(
        &self,
        opts: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, AdapterError> {
        let subscription = opts
            .get("subscription")
            .and_then(Value::as_str)
            .ok_or(MissingOptionError { key: "subscription" })?;

        let mut config = HashMap::new();
        config.insert("adapter".to_string(), Value::String("cloud".to_string()));
        config.insert(
            "subscription".to_string(),
            Value::String(subscription.to_string()),
        );
        if let Some(topic) = opts.get("topic").and_then(Value::as_str) {
            config.insert("topic".to_string(), Value::String(topic.to_string()));
        }
        Ok(config)
    }
}
