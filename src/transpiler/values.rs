//! Parameter value preparation.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Datetime format the sessions are configured to accept.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Prepare a value for binding.
///
/// Arrays and objects are stored as JSON text; RFC 3339 datetimes are
/// rewritten as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn prepare_value(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        Value::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Value::String(dt.with_timezone(&Utc).format(DATETIME_FORMAT).to_string()),
            Err(_) => value.clone(),
        },
        other => other.clone(),
    }
}

/// Hex-encode a binary payload given as a string or a list of bytes.
pub fn hex_encode(value: &Value) -> Value {
    let bytes: Vec<u8> = match value {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            match bytes {
                Some(bytes) => bytes,
                None => return value.clone(),
            }
        }
        other => return other.clone(),
    };
    Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Key used to match parent and child rows.
///
/// Drivers disagree on whether keys come back as numbers or strings, so both
/// sides are compared by their text form. `None` for null keys, which never match.
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_values_become_json_text() {
        assert_eq!(prepare_value(&json!([1, 2])), json!("[1,2]"));
        assert_eq!(prepare_value(&json!({"a": 1})), json!("{\"a\":1}"));
        assert_eq!(prepare_value(&json!(7)), json!(7));
    }

    #[test]
    fn test_datetime_normalization() {
        assert_eq!(
            prepare_value(&json!("2024-03-01T10:20:30+02:00")),
            json!("2024-03-01 08:20:30")
        );
        assert_eq!(prepare_value(&json!("not a date")), json!("not a date"));
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex_encode(&json!("hi")), json!("6869"));
        assert_eq!(hex_encode(&json!([0, 255])), json!("00ff"));
        assert_eq!(hex_encode(&Value::Null), Value::Null);
    }

    #[test]
    fn test_key_string() {
        assert_eq!(key_string(&json!(5)), Some("5".to_string()));
        assert_eq!(key_string(&json!("5")), Some("5".to_string()));
        assert_eq!(key_string(&Value::Null), None);
    }
}
