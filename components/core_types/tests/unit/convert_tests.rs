//! Unit tests for typed conversion helpers

use core_types::{decode_json_str, decode_value, encode_json_str, encode_value, ErrorKind};
use serde_json::json;

#[test]
fn decode_typed_struct_from_engine_json() {
    #[derive(serde::Deserialize)]
    struct User {
        name: String,
        age: u8,
    }

    let user: User = decode_json_str(r#"{"name":"ada","age":36}"#).unwrap();
    assert_eq!(user.name, "ada");
    assert_eq!(user.age, 36);
}

#[test]
fn decode_value_mismatch_reports_conversion_failed() {
    let result: Result<bool, _> = decode_value(json!({"k": "v"}));
    let error = result.unwrap_err();
    assert_eq!(error.kind, ErrorKind::ConversionFailed);
    assert!(error.message.contains("typed decode failed"));
}

#[test]
fn encode_value_produces_interchange_json() {
    let encoded = encode_value(&vec![1u8, 2, 3]).unwrap();
    assert_eq!(encoded, json!([1, 2, 3]));
}

#[test]
fn encode_json_str_round_trips_through_decode() {
    let raw = encode_json_str(&json!({"nested": {"flag": true}})).unwrap();
    let back: serde_json::Value = decode_json_str(&raw).unwrap();
    assert_eq!(back["nested"]["flag"], json!(true));
}
