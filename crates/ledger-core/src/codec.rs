//! Wire codec — string-keyed binary maps over self-describing CBOR.
//!
//! Every request and response body on the client endpoint is one of these
//! maps: byte strings, signed integers, text, and nested maps, packed with
//! `ciborium`. The protocol never relies on key ordering, but the codec
//! preserves insertion order anyway so that packing is deterministic and
//! `pack(unpack(x)) == x` holds for anything this codec produced.

use ciborium::value::{Integer, Value};
use thiserror::Error;

/// A string-keyed map of wire values.
///
/// The accessors fail with [`CodecError::MissingOrWrongType`] when a key is
/// absent or holds a value of the wrong shape — callers turn that into a
/// protocol error record rather than unwinding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    entries: Vec<(String, Value)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace a raw value under `key`.
    pub fn set_value(&mut self, key: &str, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    pub fn set_bytes(&mut self, key: &str, value: impl Into<Vec<u8>>) {
        self.set_value(key, Value::Bytes(value.into()));
    }

    pub fn set_long(&mut self, key: &str, value: i64) {
        self.set_value(key, Value::Integer(Integer::from(value)));
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.set_value(key, Value::Text(value.to_string()));
    }

    pub fn set_map(&mut self, key: &str, value: Payload) {
        self.set_value(key, value.into_value());
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_bytes(&self, key: &str) -> Result<&[u8], CodecError> {
        self.get_value(key)
            .and_then(Value::as_bytes)
            .map(|b| b.as_slice())
            .ok_or_else(|| CodecError::missing(key, "bytes"))
    }

    pub fn get_long(&self, key: &str) -> Result<i64, CodecError> {
        self.get_value(key)
            .and_then(Value::as_integer)
            .and_then(|i| i64::try_from(i).ok())
            .ok_or_else(|| CodecError::missing(key, "integer"))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, CodecError> {
        self.get_value(key)
            .and_then(Value::as_text)
            .ok_or_else(|| CodecError::missing(key, "string"))
    }

    pub fn get_map(&self, key: &str) -> Result<Payload, CodecError> {
        let value = self
            .get_value(key)
            .ok_or_else(|| CodecError::missing(key, "map"))?;
        Payload::from_value(value.clone()).map_err(|_| CodecError::missing(key, "map"))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Encode into the on-wire byte representation.
    pub fn pack(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(&self.clone().into_value(), &mut out)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// Decode from the on-wire byte representation. The top-level value must
    /// be a map with string keys.
    pub fn unpack(bytes: &[u8]) -> Result<Payload, CodecError> {
        let value: Value =
            ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        Payload::from_value(value)
    }

    pub fn into_value(self) -> Value {
        Value::Map(
            self.entries
                .into_iter()
                .map(|(k, v)| (Value::Text(k), v))
                .collect(),
        )
    }

    pub fn from_value(value: Value) -> Result<Payload, CodecError> {
        let pairs = match value {
            Value::Map(pairs) => pairs,
            _ => return Err(CodecError::NotAMap),
        };
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match key {
                Value::Text(key) => entries.push((key, value)),
                _ => return Err(CodecError::Decode("map key is not a string".into())),
            }
        }
        Ok(Payload { entries })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),

    #[error("payload root is not a map")]
    NotAMap,

    #[error("{key}: missing or wrong type, expected {expected}")]
    MissingOrWrongType { key: String, expected: &'static str },
}

impl CodecError {
    fn missing(key: &str, expected: &'static str) -> Self {
        CodecError::MissingOrWrongType {
            key: key.to_string(),
            expected,
        }
    }
}
