//! Detail sanitization for audit logging.
//!
//! Redacts credential material and bounds string sizes before a detail
//! value is written to the audit log.

use serde_json::{Map, Value};

/// Keys whose values must never be logged.
const SENSITIVE_KEYS: &[&str] = &["token", "secret", "key", "credential", "signature", "password"];

/// Maximum length for logged string values.
const MAX_STRING_LENGTH: usize = 256;

/// Sanitize a detail value for audit logging.
///
/// Values under sensitive keys are redacted; long strings are replaced with
/// a length marker; nested objects and arrays are processed recursively.
pub fn sanitize_detail(detail: &Value) -> Value {
    match detail {
        Value::Object(map) => {
            let mut sanitized = Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();
                if SENSITIVE_KEYS.iter().any(|&s| key_lower.contains(s)) {
                    sanitized.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    sanitized.insert(key.clone(), sanitize_detail(val));
                }
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_detail).collect()),
        Value::String(s) if s.len() > MAX_STRING_LENGTH => {
            Value::String(format!("[TRUNCATED - {} bytes]", s.len()))
        }
        _ => detail.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_sensitive_keys() {
        let detail = json!({
            "name": "tui",
            "token": "eyJ...",
            "api_key": "k",
            "request_signature": "s"
        });
        let sanitized = sanitize_detail(&detail);
        assert_eq!(sanitized["name"], "tui");
        assert_eq!(sanitized["token"], "[REDACTED]");
        assert_eq!(sanitized["api_key"], "[REDACTED]");
        assert_eq!(sanitized["request_signature"], "[REDACTED]");
    }

    #[test]
    fn test_redacts_nested_values() {
        let detail = json!({"client": {"name": "tui", "token": "x"}});
        let sanitized = sanitize_detail(&detail);
        assert_eq!(sanitized["client"]["name"], "tui");
        assert_eq!(sanitized["client"]["token"], "[REDACTED]");
    }

    #[test]
    fn test_truncates_long_strings() {
        let detail = json!({"note": "x".repeat(1000)});
        let sanitized = sanitize_detail(&detail);
        assert_eq!(sanitized["note"], "[TRUNCATED - 1000 bytes]");
    }

    #[test]
    fn test_case_insensitive_keys() {
        let detail = json!({"TOKEN": "x", "Secret_Value": "y"});
        let sanitized = sanitize_detail(&detail);
        assert_eq!(sanitized["TOKEN"], "[REDACTED]");
        assert_eq!(sanitized["Secret_Value"], "[REDACTED]");
    }
}
