//! The correlation envelope attached to every message.
//!
//! Metadata links a message into its causal chain: the `correlation_id` is
//! shared by every message in one workflow, and the `causation_id` points at
//! the event id of the message that directly caused this one. A metadata
//! record is either unpublished (no event id, no publish time) or published
//! (both present) — never in between.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::SchemaSpec;

/// Error from metadata construction or wire decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataError {
    /// An encodable map carried a key that is not a metadata field.
    UnknownField(String),
    /// A required field was absent from an encodable map.
    MissingField(&'static str),
    /// A date field was neither an RFC 3339 string nor epoch milliseconds.
    InvalidTimestamp { field: &'static str, value: String },
    /// The flattened schema attributes could not be reconstructed.
    InvalidSchema(String),
    /// A field held a value of the wrong JSON type.
    InvalidValue { field: &'static str, value: String },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::UnknownField(key) => {
                write!(f, "unknown metadata field: {}", key)
            }
            MetadataError::MissingField(key) => {
                write!(f, "missing metadata field: {}", key)
            }
            MetadataError::InvalidTimestamp { field, value } => {
                write!(f, "invalid timestamp for {}: {}", field, value)
            }
            MetadataError::InvalidSchema(msg) => write!(f, "invalid schema: {}", msg),
            MetadataError::InvalidValue { field, value } => {
                write!(f, "invalid value for {}: {}", field, value)
            }
        }
    }
}

impl std::error::Error for MetadataError {}

/// Identity fields propagated across a causal chain for audit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub id: Option<String>,
    pub email: Option<String>,
}

impl UserContext {
    fn is_empty(&self) -> bool {
        self.id.is_none() && self.email.is_none()
    }
}

/// Caller-supplied field overrides for [`Metadata::new`].
///
/// Present fields overwrite lower-priority defaults; absent fields leave
/// them alone. Field typos are a compile error here, which is the point.
#[derive(Clone, Debug, Default)]
pub struct MetadataOverrides {
    pub event_id: Option<String>,
    pub adapter_event_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub topic: Option<String>,
    pub service: Option<String>,
    pub schema: Option<SchemaSpec>,
    pub user: Option<UserContext>,
}

impl MetadataOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn schema(mut self, schema: SchemaSpec) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }

    /// Layer `higher` on top of `self`: present fields in `higher` win.
    pub fn layered_under(self, higher: MetadataOverrides) -> Self {
        MetadataOverrides {
            event_id: higher.event_id.or(self.event_id),
            adapter_event_id: higher.adapter_event_id.or(self.adapter_event_id),
            created_at: higher.created_at.or(self.created_at),
            published_at: higher.published_at.or(self.published_at),
            correlation_id: higher.correlation_id.or(self.correlation_id),
            causation_id: higher.causation_id.or(self.causation_id),
            topic: higher.topic.or(self.topic),
            service: higher.service.or(self.service),
            schema: higher.schema.or(self.schema),
            user: higher.user.or(self.user),
        }
    }
}

/// The correlation envelope carried by every message.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    /// Transport-assigned unique id, present only after publish.
    pub event_id: Option<String>,
    /// Adapter-level id; may differ from `event_id` on transports with a
    /// secondary correlation id.
    pub adapter_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set only after a successful publish.
    pub published_at: Option<DateTime<Utc>>,
    /// Shared across every message in one causal chain.
    pub correlation_id: String,
    /// Event id of the message that caused this one; absent for chain roots.
    pub causation_id: Option<String>,
    pub topic: Option<String>,
    pub service: Option<String>,
    pub schema: Option<SchemaSpec>,
    pub user: Option<UserContext>,
}

/// Truncate a timestamp to microsecond resolution.
///
/// Locally generated and transport-assigned timestamps both normalize to
/// microseconds so chain members compare consistently.
pub(crate) fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = (ts.nanosecond() / 1_000) * 1_000;
    ts.with_nanosecond(micros).unwrap_or(ts)
}

fn now_micros() -> DateTime<Utc> {
    truncate_to_micros(Utc::now())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a date field that may arrive as an RFC 3339 string or as integer
/// epoch milliseconds.
fn parse_timestamp(field: &'static str, value: &Value) -> Result<DateTime<Utc>, MetadataError> {
    let invalid = || MetadataError::InvalidTimestamp {
        field,
        value: value.to_string(),
    };
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| truncate_to_micros(dt.with_timezone(&Utc)))
            .map_err(|_| invalid()),
        Value::Number(n) => {
            let millis = n.as_i64().ok_or_else(invalid)?;
            match Utc.timestamp_millis_opt(millis) {
                chrono::LocalResult::Single(dt) => Ok(dt),
                _ => Err(invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

fn string_field(field: &'static str, value: &Value) -> Result<String, MetadataError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or(MetadataError::InvalidValue {
            field,
            value: value.to_string(),
        })
}

impl Metadata {
    /// Build metadata from baseline defaults merged with `overrides`.
    ///
    /// Baseline: a fresh correlation id, the current time (microsecond
    /// resolution), and no causation. Every present override field wins.
    pub fn new(overrides: MetadataOverrides) -> Self {
        Metadata {
            event_id: overrides.event_id,
            adapter_event_id: overrides.adapter_event_id,
            created_at: overrides.created_at.unwrap_or_else(now_micros),
            published_at: overrides.published_at,
            correlation_id: overrides
                .correlation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            causation_id: overrides.causation_id,
            topic: overrides.topic,
            service: overrides.service,
            schema: overrides.schema,
            user: overrides.user,
        }
    }

    /// Derive metadata for a message caused by the one carrying `self`.
    ///
    /// The correlation id is copied verbatim; the causation id becomes the
    /// predecessor's event id (absent while the predecessor is unpublished).
    /// Topic, service, and schema are dropped — the next producer reassigns
    /// them. The audit user rides along with the chain.
    pub fn follow(&self) -> Metadata {
        Metadata {
            event_id: None,
            adapter_event_id: None,
            created_at: now_micros(),
            published_at: None,
            correlation_id: self.correlation_id.clone(),
            causation_id: self.event_id.clone(),
            topic: None,
            service: None,
            schema: None,
            user: self.user.clone(),
        }
    }

    /// Whether this metadata has been through a successful publish.
    pub fn is_published(&self) -> bool {
        self.event_id.is_some() && self.published_at.is_some()
    }

    /// Project to a strictly flat key-value map for wire transport.
    ///
    /// Absent fields are omitted; the schema flattens to `schema_type`
    /// (+ `schema_encoder`); dates become RFC 3339 strings.
    pub fn to_encodable(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert(
            "correlation_id".to_string(),
            Value::String(self.correlation_id.clone()),
        );
        map.insert(
            "created_at".to_string(),
            Value::String(format_timestamp(&self.created_at)),
        );
        if let Some(id) = &self.event_id {
            map.insert("event_id".to_string(), Value::String(id.clone()));
        }
        if let Some(id) = &self.adapter_event_id {
            map.insert("adapter_event_id".to_string(), Value::String(id.clone()));
        }
        if let Some(ts) = &self.published_at {
            map.insert(
                "published_at".to_string(),
                Value::String(format_timestamp(ts)),
            );
        }
        if let Some(id) = &self.causation_id {
            map.insert("causation_id".to_string(), Value::String(id.clone()));
        }
        if let Some(topic) = &self.topic {
            map.insert("topic".to_string(), Value::String(topic.clone()));
        }
        if let Some(service) = &self.service {
            map.insert("service".to_string(), Value::String(service.clone()));
        }
        if let Some(schema) = &self.schema {
            map.insert(
                "schema_type".to_string(),
                Value::String(schema.schema_type().to_string()),
            );
            if let Some(encoder) = schema.encoder_name() {
                map.insert(
                    "schema_encoder".to_string(),
                    Value::String(encoder.to_string()),
                );
            }
        }
        if let Some(user) = &self.user {
            if let Some(id) = &user.id {
                map.insert("user_id".to_string(), Value::String(id.clone()));
            }
            if let Some(email) = &user.email {
                map.insert("user_email".to_string(), Value::String(email.clone()));
            }
        }
        map
    }

    /// Reconstruct metadata from its flat wire projection.
    ///
    /// Unrecognized keys are rejected outright — the strict-schema guard
    /// that catches typos instead of silently dropping fields.
    pub fn from_encodable(map: &HashMap<String, Value>) -> Result<Metadata, MetadataError> {
        let mut event_id = None;
        let mut adapter_event_id = None;
        let mut created_at = None;
        let mut published_at = None;
        let mut correlation_id = None;
        let mut causation_id = None;
        let mut topic = None;
        let mut service = None;
        let mut schema_type = None;
        let mut schema_encoder = None;
        let mut user = UserContext::default();

        for (key, value) in map {
            match key.as_str() {
                "event_id" => event_id = Some(string_field("event_id", value)?),
                "adapter_event_id" => {
                    adapter_event_id = Some(string_field("adapter_event_id", value)?)
                }
                "created_at" => created_at = Some(parse_timestamp("created_at", value)?),
                "published_at" => published_at = Some(parse_timestamp("published_at", value)?),
                "correlation_id" => {
                    correlation_id = Some(string_field("correlation_id", value)?)
                }
                "causation_id" => causation_id = Some(string_field("causation_id", value)?),
                "topic" => topic = Some(string_field("topic", value)?),
                "service" => service = Some(string_field("service", value)?),
                "schema_type" => schema_type = Some(string_field("schema_type", value)?),
                "schema_encoder" => {
                    schema_encoder = Some(string_field("schema_encoder", value)?)
                }
                "user_id" => user.id = Some(string_field("user_id", value)?),
                "user_email" => user.email = Some(string_field("user_email", value)?),
                other => return Err(MetadataError::UnknownField(other.to_string())),
            }
        }

        let schema = match schema_type {
            Some(schema_type) => Some(
                SchemaSpec::from_wire(&schema_type, schema_encoder.as_deref())
                    .map_err(|e| MetadataError::InvalidSchema(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Metadata {
            event_id,
            adapter_event_id,
            created_at: created_at.ok_or(MetadataError::MissingField("created_at"))?,
            published_at,
            correlation_id: correlation_id
                .ok_or(MetadataError::MissingField("correlation_id"))?,
            causation_id,
            topic,
            service,
            schema,
            user: if user.is_empty() { None } else { Some(user) },
        })
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata::new(MetadataOverrides::default())
    }
}
