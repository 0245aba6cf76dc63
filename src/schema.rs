//! Schema specs describe how a message payload crosses the wire.
//!
//! A [`SchemaSpec`] is attached to a message's metadata by the producer that
//! claims it, never by the transport adapter. The JSON variant delegates to
//! `serde_json`; the binary variant carries its own [`BinaryCodec`]
//! reference, so a spec and its encoder travel together.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire name of the JSON schema type.
pub const SCHEMA_TYPE_JSON: &str = "json";
/// Wire name of the structured-binary schema type.
pub const SCHEMA_TYPE_BINARY: &str = "binary";

/// Error when encoding a payload per its schema spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// The JSON codec rejected the payload.
    Json(String),
    /// The configured binary codec rejected the payload.
    Codec(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Json(msg) => write!(f, "json encode failed: {}", msg),
            EncodeError::Codec(msg) => write!(f, "binary encode failed: {}", msg),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Error when decoding payload bytes per a schema spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The bytes are not valid for the JSON codec.
    Json(String),
    /// The configured binary codec rejected the bytes.
    Codec(String),
    /// A wire schema referenced an encoder this process does not know.
    UnknownEncoder(String),
    /// A wire schema carried a type name outside `json` / `binary`.
    UnknownSchemaType(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Json(msg) => write!(f, "json decode failed: {}", msg),
            DecodeError::Codec(msg) => write!(f, "binary decode failed: {}", msg),
            DecodeError::UnknownEncoder(name) => {
                write!(f, "unknown binary encoder: {}", name)
            }
            DecodeError::UnknownSchemaType(name) => {
                write!(f, "unknown schema type: {}", name)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// A pluggable binary payload codec.
///
/// The codec's `name` is what travels on the wire (`schema_encoder`), so a
/// decoding process can reconstruct the same spec from flat attributes.
pub trait BinaryCodec: Send + Sync {
    /// Wire name of this codec.
    fn name(&self) -> &str;

    /// Encode a payload value to bytes.
    fn encode(&self, payload: &Value) -> Result<Vec<u8>, EncodeError>;

    /// Decode bytes back into a payload value.
    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError>;
}

/// Declares how a message payload is serialized.
#[derive(Clone)]
pub enum SchemaSpec {
    /// Payloads are serialized as JSON via `serde_json`.
    Json,
    /// Payloads are serialized by the referenced binary codec.
    Binary { codec: Arc<dyn BinaryCodec> },
}

impl fmt::Debug for SchemaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaSpec::Json => f.write_str("SchemaSpec::Json"),
            SchemaSpec::Binary { codec } => f
                .debug_struct("SchemaSpec::Binary")
                .field("codec", &codec.name())
                .finish(),
        }
    }
}

impl PartialEq for SchemaSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SchemaSpec::Json, SchemaSpec::Json) => true,
            (SchemaSpec::Binary { codec: a }, SchemaSpec::Binary { codec: b }) => {
                a.name() == b.name()
            }
            _ => false,
        }
    }
}

impl SchemaSpec {
    /// A JSON schema spec.
    pub fn json() -> Self {
        SchemaSpec::Json
    }

    /// A binary schema spec using the default bitcode codec.
    pub fn bitcode() -> Self {
        SchemaSpec::Binary {
            codec: Arc::new(BitcodeCodec),
        }
    }

    /// A binary schema spec with an explicit codec reference.
    pub fn binary(codec: Arc<dyn BinaryCodec>) -> Self {
        SchemaSpec::Binary { codec }
    }

    /// Wire name of this spec's type (`schema_type` attribute).
    pub fn schema_type(&self) -> &'static str {
        match self {
            SchemaSpec::Json => SCHEMA_TYPE_JSON,
            SchemaSpec::Binary { .. } => SCHEMA_TYPE_BINARY,
        }
    }

    /// Wire name of the encoder, present only for the binary variant
    /// (`schema_encoder` attribute).
    pub fn encoder_name(&self) -> Option<&str> {
        match self {
            SchemaSpec::Json => None,
            SchemaSpec::Binary { codec } => Some(codec.name()),
        }
    }

    /// Reconstruct a spec from its flattened wire attributes.
    pub fn from_wire(schema_type: &str, encoder: Option<&str>) -> Result<Self, DecodeError> {
        match schema_type {
            SCHEMA_TYPE_JSON => Ok(SchemaSpec::Json),
            SCHEMA_TYPE_BINARY => match encoder {
                Some("bitcode") | None => Ok(SchemaSpec::bitcode()),
                Some(other) => Err(DecodeError::UnknownEncoder(other.to_string())),
            },
            other => Err(DecodeError::UnknownSchemaType(other.to_string())),
        }
    }

    /// Encode a payload value per this spec.
    pub fn encode(&self, payload: &Value) -> Result<Vec<u8>, EncodeError> {
        match self {
            SchemaSpec::Json => {
                serde_json::to_vec(payload).map_err(|e| EncodeError::Json(e.to_string()))
            }
            SchemaSpec::Binary { codec } => codec.encode(payload),
        }
    }

    /// Decode payload bytes per this spec.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        match self {
            SchemaSpec::Json => {
                serde_json::from_slice(bytes).map_err(|e| DecodeError::Json(e.to_string()))
            }
            SchemaSpec::Binary { codec } => codec.decode(bytes),
        }
    }

    /// Encode a payload, panicking on failure.
    ///
    /// For call sites that treat an unencodable payload as fatal.
    pub fn must_encode(&self, payload: &Value) -> Vec<u8> {
        self.encode(payload)
            .unwrap_or_else(|e| panic!("payload encode failed: {}", e))
    }

    /// Decode payload bytes, panicking on failure.
    pub fn must_decode(&self, bytes: &[u8]) -> Value {
        self.decode(bytes)
            .unwrap_or_else(|e| panic!("payload decode failed: {}", e))
    }
}

/// Default binary codec backed by bitcode.
///
/// bitcode is not self-describing, so payload values are mirrored through
/// [`Packed`] (a closed enum of the JSON data model) before serialization.
pub struct BitcodeCodec;

#[derive(Serialize, Deserialize)]
enum Packed {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<Packed>),
    Map(Vec<(String, Packed)>),
}

fn pack(value: &Value) -> Packed {
    match value {
        Value::Null => Packed::Null,
        Value::Bool(b) => Packed::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Packed::Int(i)
            } else if let Some(u) = n.as_u64() {
                Packed::UInt(u)
            } else {
                Packed::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Packed::Str(s.clone()),
        Value::Array(items) => Packed::List(items.iter().map(pack).collect()),
        Value::Object(map) => {
            Packed::Map(map.iter().map(|(k, v)| (k.clone(), pack(v))).collect())
        }
    }
}

fn unpack(packed: Packed) -> Value {
    match packed {
        Packed::Null => Value::Null,
        Packed::Bool(b) => Value::Bool(b),
        Packed::Int(i) => Value::from(i),
        Packed::UInt(u) => Value::from(u),
        Packed::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        Packed::Str(s) => Value::String(s),
        Packed::List(items) => Value::Array(items.into_iter().map(unpack).collect()),
        Packed::Map(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, unpack(v)))
                .collect(),
        ),
    }
}

impl BinaryCodec for BitcodeCodec {
    fn name(&self) -> &str {
        "bitcode"
    }

    fn encode(&self, payload: &Value) -> Result<Vec<u8>, EncodeError> {
        bitcode::serialize(&pack(payload)).map_err(|e| EncodeError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        let packed: Packed =
            bitcode::deserialize(bytes).map_err(|e| DecodeError::Codec(e.to_string()))?;
        Ok(unpack(packed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip() {
        let spec = SchemaSpec::json();
        let payload = json!({"account_id": "123", "amount": 42});
        let bytes = spec.encode(&payload).unwrap();
        assert_eq!(spec.decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn bitcode_round_trip() {
        let spec = SchemaSpec::bitcode();
        let payload = json!({
            "name": "Bob",
            "count": 3,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "nested": {"ok": true, "gone": null}
        });
        let bytes = spec.encode(&payload).unwrap();
        assert_eq!(spec.decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn json_decode_error_is_typed() {
        let spec = SchemaSpec::json();
        let err = spec.decode(b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn wire_names_round_trip() {
        let spec = SchemaSpec::bitcode();
        assert_eq!(spec.schema_type(), "binary");
        assert_eq!(spec.encoder_name(), Some("bitcode"));

        let rebuilt = SchemaSpec::from_wire("binary", Some("bitcode")).unwrap();
        assert_eq!(rebuilt, spec);

        let json = SchemaSpec::from_wire("json", None).unwrap();
        assert_eq!(json, SchemaSpec::json());
    }

    #[test]
    fn unknown_encoder_rejected() {
        let err = SchemaSpec::from_wire("binary", Some("protobuf")).unwrap_err();
        assert_eq!(err, DecodeError::UnknownEncoder("protobuf".to_string()));
    }

    #[test]
    #[should_panic(expected = "payload decode failed")]
    fn must_decode_panics_on_garbage() {
        SchemaSpec::json().must_decode(b"\xff\xfe");
    }
}
