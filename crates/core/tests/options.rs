//! Tests for parameter formatting.

use std::collections::BTreeMap;
use tcore::format_params;

fn params(key: &str, values: &[&str]) -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert(
        key.to_string(),
        values.iter().map(|v| v.to_string()).collect(),
    );
    map
}

#[test]
fn float_parameter() {
    let out = format_params(&params("temperature", &["0.7"])).unwrap();
    assert_eq!(out["temperature"], serde_json::json!(0.7));
}

#[test]
fn int_parameter() {
    let out = format_params(&params("top_k", &["40"])).unwrap();
    assert_eq!(out["top_k"], serde_json::json!(40));
}

#[test]
fn stop_keeps_all_values() {
    let out = format_params(&params("stop", &["</s>", "<|end|>"])).unwrap();
    assert_eq!(out["stop"], serde_json::json!(["</s>", "<|end|>"]));
}

#[test]
fn unknown_parameter_rejected() {
    let err = format_params(&params("verbosity", &["3"])).unwrap_err();
    assert!(err.to_string().contains("unknown parameter"));
}

#[test]
fn bad_int_rejected() {
    assert!(format_params(&params("seed", &["many"])).is_err());
}

#[test]
fn empty_values_rejected() {
    assert!(format_params(&params("seed", &[])).is_err());
}
