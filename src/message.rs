//! The message envelope: arbitrary payload data plus correlation metadata.
//!
//! Messages are values. Every update operation returns a new message rather
//! than mutating in place, and a published message is an immutable
//! historical record — republishing one produces an unrelated record unless
//! the caller re-derives via [`Message::follow`].

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::metadata::{Metadata, MetadataOverrides};
use crate::schema::EncodeError;

/// Error from [`Message::encode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageEncodeError {
    /// No schema spec is attached — a producer has not claimed the message.
    MissingSchema,
    /// The attached schema spec rejected the payload.
    Encode(EncodeError),
}

impl fmt::Display for MessageEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageEncodeError::MissingSchema => {
                f.write_str("message has no schema spec attached")
            }
            MessageEncodeError::Encode(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MessageEncodeError {}

impl From<EncodeError> for MessageEncodeError {
    fn from(e: EncodeError) -> Self {
        MessageEncodeError::Encode(e)
    }
}

/// A message encoded for transport: payload bytes plus the flat metadata map.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedMessage {
    pub data: Vec<u8>,
    pub metadata: HashMap<String, Value>,
}

/// Options for [`Message::new`].
#[derive(Clone, Debug, Default)]
pub struct NewMessage {
    /// Seed payload; defaults to an empty object.
    pub data: Option<Value>,
    /// Metadata field overrides layered over the baseline defaults.
    pub metadata: MetadataOverrides,
}

impl NewMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn metadata(mut self, overrides: MetadataOverrides) -> Self {
        self.metadata = overrides;
        self
    }
}

/// Data-copy options for [`Message::follow`].
///
/// `include` names the predecessor fields to copy (default: none);
/// `exclude` copies everything but the named fields. The two are mutually
/// exclusive; `exclude` wins when both are given.
#[derive(Clone, Debug, Default)]
pub struct FollowOptions {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

impl FollowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FollowOptions {
            include: Some(fields.into_iter().map(Into::into).collect()),
            exclude: None,
        }
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FollowOptions {
            include: None,
            exclude: Some(fields.into_iter().map(Into::into).collect()),
        }
    }
}

/// The envelope pairing payload data with correlation metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Schema-less payload; an opaque JSON value at this layer.
    pub data: Value,
    pub metadata: Metadata,
}

fn empty_data() -> Value {
    Value::Object(Map::new())
}

impl Message {
    /// Create a chain-root message with fresh metadata.
    pub fn new(opts: NewMessage) -> Self {
        Message {
            data: opts.data.unwrap_or_else(empty_data),
            metadata: Metadata::new(opts.metadata),
        }
    }

    /// Derive a message caused by `predecessor`.
    ///
    /// Metadata follows the chain (see [`Metadata::follow`]); data starts
    /// from the copy selection in `opts`.
    pub fn follow(predecessor: &Message, opts: FollowOptions) -> Self {
        let data = match (&opts.exclude, &opts.include) {
            // exclude takes precedence when both are given
            (Some(exclude), _) => match predecessor.data.as_object() {
                Some(fields) => Value::Object(
                    fields
                        .iter()
                        .filter(|(k, _)| !exclude.contains(k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                None => empty_data(),
            },
            (None, Some(include)) => match predecessor.data.as_object() {
                Some(fields) => Value::Object(
                    include
                        .iter()
                        .filter_map(|k| fields.get(k).map(|v| (k.clone(), v.clone())))
                        .collect(),
                ),
                None => empty_data(),
            },
            (None, None) => empty_data(),
        };
        Message {
            data,
            metadata: predecessor.metadata.follow(),
        }
    }

    /// Whether this message has been through a successful publish.
    pub fn is_published(&self) -> bool {
        self.metadata.is_published()
    }

    /// Return a new message with `key` set in the data payload.
    ///
    /// Non-object payloads are replaced by an object holding the one field.
    pub fn put_data(&self, key: impl Into<String>, value: Value) -> Message {
        let mut fields = match &self.data {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        fields.insert(key.into(), value);
        Message {
            data: Value::Object(fields),
            metadata: self.metadata.clone(),
        }
    }

    /// Return a new message with `incoming` merged into the data payload.
    /// Incoming fields win on key collisions.
    pub fn merge_data(&self, incoming: Map<String, Value>) -> Message {
        let mut fields = match &self.data {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        fields.extend(incoming);
        Message {
            data: Value::Object(fields),
            metadata: self.metadata.clone(),
        }
    }

    /// Return a new message with the data payload replaced wholesale.
    pub fn replace_data(&self, data: Value) -> Message {
        Message {
            data,
            metadata: self.metadata.clone(),
        }
    }

    /// Return a new message with a metadata field updated.
    pub fn put_meta(&self, update: impl FnOnce(&mut Metadata)) -> Message {
        let mut metadata = self.metadata.clone();
        update(&mut metadata);
        Message {
            data: self.data.clone(),
            metadata,
        }
    }

    /// Encode for transport: payload bytes per the attached schema spec and
    /// the flat metadata projection.
    ///
    /// Fails with [`MessageEncodeError::MissingSchema`] when no producer has
    /// claimed the message yet.
    pub fn encode(&self) -> Result<EncodedMessage, MessageEncodeError> {
        let schema = self
            .metadata
            .schema
            .as_ref()
            .ok_or(MessageEncodeError::MissingSchema)?;
        Ok(EncodedMessage {
            data: schema.encode(&self.data)?,
            metadata: self.metadata.to_encodable(),
        })
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::new(NewMessage::default())
    }
}
