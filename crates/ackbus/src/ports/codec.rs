//! Payload codec port.
//!
//! A codec maps between a structured value and the envelope's opaque
//! payload bytes. Typed encoding goes through [`encode_payload`] and
//! [`decode_payload`], which add the scalar/structured interop fallback:
//! a structured payload can be read as a `String` (its canonical text), and
//! a string payload holding a document can be read as that document.

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Byte-level payload codec.
pub trait PayloadCodec: Send + Sync {
    /// Short codec name for logs.
    fn name(&self) -> &'static str;

    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// Encode a typed payload.
pub fn encode_payload<T: Serialize + ?Sized>(
    codec: &dyn PayloadCodec,
    payload: &T,
) -> Result<Vec<u8>, CodecError> {
    let value = serde_json::to_value(payload).map_err(|e| CodecError::Encode(e.to_string()))?;
    codec.encode_value(&value)
}

/// Decode a typed payload, falling back across the scalar/structured divide.
pub fn decode_payload<T: DeserializeOwned>(
    codec: &dyn PayloadCodec,
    bytes: &[u8],
) -> Result<T, CodecError> {
    let value = codec.decode_value(bytes)?;
    let first = match T::deserialize(&value) {
        Ok(decoded) => return Ok(decoded),
        Err(e) => e,
    };

    let reshaped = match &value {
        Value::Object(_) | Value::Array(_) => Some(Value::String(value.to_string())),
        Value::String(text) => serde_json::from_str::<Value>(text)
            .ok()
            .filter(|inner| inner.is_object() || inner.is_array()),
        _ => None,
    };

    reshaped
        .and_then(|alt| T::deserialize(alt).ok())
        .ok_or_else(|| CodecError::TypeMismatch {
            target: std::any::type_name::<T>(),
            reason: first.to_string(),
        })
}
