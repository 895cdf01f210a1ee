//! Typed value conversion helpers.
//!
//! The engine's value interchange format is JSON text: script values cross
//! the boundary by stringifying on the engine side and parsing here. The
//! generic decode pass is stringify → parse → typed decode, failing with
//! [`ErrorKind::ConversionFailed`](crate::ErrorKind::ConversionFailed) when
//! the target type does not accept the parsed value.

use crate::error::BridgeError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Parses engine-produced JSON text into an untyped value.
pub fn parse_json_str(raw: &str) -> Result<JsonValue, BridgeError> {
    serde_json::from_str(raw)
        .map_err(|e| BridgeError::conversion_failed(format!("invalid JSON from engine: {}", e)))
}

/// Parses engine-produced JSON text directly into a typed native value.
///
/// # Examples
///
/// ```
/// use core_types::decode_json_str;
///
/// let n: i64 = decode_json_str("42").unwrap();
/// assert_eq!(n, 42);
/// ```
pub fn decode_json_str<T: DeserializeOwned>(raw: &str) -> Result<T, BridgeError> {
    decode_value(parse_json_str(raw)?)
}

/// Decodes an untyped JSON value into a typed native value.
pub fn decode_value<T: DeserializeOwned>(value: JsonValue) -> Result<T, BridgeError> {
    serde_json::from_value(value)
        .map_err(|e| BridgeError::conversion_failed(format!("typed decode failed: {}", e)))
}

/// Encodes a typed native value into the untyped interchange form.
pub fn encode_value<T: Serialize>(value: &T) -> Result<JsonValue, BridgeError> {
    serde_json::to_value(value)
        .map_err(|e| BridgeError::conversion_failed(format!("native encode failed: {}", e)))
}

/// Serializes a typed native value to the JSON text the engine consumes.
pub fn encode_json_str<T: Serialize>(value: &T) -> Result<String, BridgeError> {
    serde_json::to_string(value)
        .map_err(|e| BridgeError::conversion_failed(format!("native encode failed: {}", e)))
}
