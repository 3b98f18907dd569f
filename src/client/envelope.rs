//! Response envelope normalization
//!
//! The upstream wraps lists as `{ "<resource>": [...] }`, `{ "data": [...] }`
//! or a bare array depending on the endpoint.

use serde_json::Value;
use tracing::debug;

/// Unwrap a list response; unrecognized shapes become an empty list
pub fn normalize_list(value: Value, key: &str) -> Vec<Value> {
    normalize_list_any(value, &[key])
}

/// Like [`normalize_list`] for endpoints that answer under more than one key
///
/// Keys are tried in order, then `data`.
pub fn normalize_list_any(value: Value, keys: &[&str]) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for candidate in keys.iter().copied().chain(["data"]) {
                if let Some(Value::Array(items)) = map.remove(candidate) {
                    return items;
                }
            }
            debug!(?keys, "unexpected list envelope, returning empty list");
            Vec::new()
        }
        _ => {
            debug!(?keys, "non-object list response, returning empty list");
            Vec::new()
        }
    }
}

/// Unwrap a single-record response
///
/// `{ "data": {...} }` yields the inner object and a one-element array yields
/// its element. Anything else is returned unchanged.
pub fn normalize_record(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(inner) if !inner.is_null() => inner,
            Some(inner) => {
                map.insert("data".to_string(), inner);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn records() -> Value {
        json!([{"patientid": "1", "firstname": "Ann"}, {"patientid": "2", "firstname": "Bo"}])
    }

    #[rstest]
    #[case(json!({"patients": records(), "totalcount": 2}))]
    #[case(records())]
    #[case(json!({"data": records()}))]
    fn test_recognized_shapes_agree(#[case] body: Value) {
        let expected = records().as_array().cloned().unwrap();
        assert_eq!(normalize_list(body, "patients"), expected);
    }

    #[rstest]
    #[case(json!({"patients": {"patientid": "1"}}))]
    #[case(json!({"unexpected": []}))]
    #[case(json!("text"))]
    #[case(json!(42))]
    #[case(Value::Null)]
    fn test_unrecognized_shapes_are_empty(#[case] body: Value) {
        assert!(normalize_list(body, "patients").is_empty());
    }

    #[test]
    fn test_resource_key_wins_over_data() {
        let body = json!({"departments": [{"departmentid": "1"}], "data": [{"departmentid": "2"}]});
        assert_eq!(normalize_list(body, "departments"), vec![json!({"departmentid": "1"})]);
    }

    #[rstest]
    #[case(json!({"appointments": [{"appointmentid": "1"}]}))]
    #[case(json!({"openappointments": [{"appointmentid": "1"}], "totalcount": 1}))]
    #[case(json!({"data": [{"appointmentid": "1"}]}))]
    #[case(json!([{"appointmentid": "1"}]))]
    fn test_open_slot_envelopes(#[case] body: Value) {
        let slots = normalize_list_any(body, &["appointments", "openappointments"]);
        assert_eq!(slots, vec![json!({"appointmentid": "1"})]);
    }

    #[rstest]
    #[case(json!({"data": {"patientid": "1"}}), json!({"patientid": "1"}))]
    #[case(json!([{"patientid": "1"}]), json!({"patientid": "1"}))]
    #[case(json!({"patientid": "1"}), json!({"patientid": "1"}))]
    #[case(json!({"data": null, "patientid": "1"}), json!({"data": null, "patientid": "1"}))]
    #[case(json!([]), json!([]))]
    fn test_normalize_record(#[case] body: Value, #[case] expected: Value) {
        assert_eq!(normalize_record(body), expected);
    }
}
