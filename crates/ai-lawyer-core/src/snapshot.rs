//! JSON snapshot codec.
//!
//! The autosave snapshot and the export file share one format: a JSON
//! array of messages, written whole and read whole.

use serde_json::Value;
use thiserror::Error;

use crate::Message;

/// Snapshot decoding or validation error.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON array of messages")]
    NotAnArray,
    #[error("message list is empty")]
    Empty,
    #[error("message {index} is invalid: {reason}")]
    InvalidMessage { index: usize, reason: &'static str },
}

/// Serialize messages for the key/value snapshot.
///
/// # Errors
/// Returns error if serialization fails.
pub fn encode(messages: &[Message]) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(messages)?)
}

/// Serialize messages for an export file (2-space indented).
///
/// # Errors
/// Returns error if serialization fails.
pub fn encode_pretty(messages: &[Message]) -> Result<Vec<u8>, SnapshotError> {
    Ok(serde_json::to_vec_pretty(messages)?)
}

/// Decode a previously written autosave snapshot.
///
/// An empty array is valid here; callers treat it as "no history".
///
/// # Errors
/// Returns error if the payload is not a message array.
pub fn decode(raw: &str) -> Result<Vec<Message>, SnapshotError> {
    Ok(serde_json::from_str(raw)?)
}

/// Parse and validate a user-supplied import file.
///
/// Every element must be an object with a non-empty string `id`, a known
/// `role` and a string `text`. Nothing is returned unless all elements pass.
///
/// # Errors
/// Returns the first validation failure found.
pub fn parse_import(bytes: &[u8]) -> Result<Vec<Message>, SnapshotError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Array(items) = value else {
        return Err(SnapshotError::NotAnArray);
    };
    if items.is_empty() {
        return Err(SnapshotError::Empty);
    }

    for (index, item) in items.iter().enumerate() {
        validate_item(item).map_err(|reason| SnapshotError::InvalidMessage { index, reason })?;
    }

    Ok(serde_json::from_value(Value::Array(items))?)
}

fn validate_item(item: &Value) -> Result<(), &'static str> {
    let Value::Object(fields) = item else {
        return Err("not an object");
    };
    match fields.get("id") {
        Some(Value::String(id)) if !id.is_empty() => {}
        Some(_) => return Err("id must be a non-empty string"),
        None => return Err("missing id"),
    }
    match fields.get("role").and_then(Value::as_str) {
        Some("user" | "model") => {}
        Some(_) => return Err("unknown role"),
        None => return Err("missing role"),
    }
    match fields.get("text") {
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err("text must be a string"),
        None => Err("missing text"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    #[test]
    fn test_missing_text_rejected() {
        let err = parse_import(br#"[{"id":"1","role":"user"}]"#).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::InvalidMessage {
                index: 0,
                reason: "missing text"
            }
        ));
    }

    #[test]
    fn test_rejects_whole_file_on_one_bad_item() {
        let raw = br#"[{"id":"1","role":"user","text":"a"},{"id":"","role":"model","text":"b"}]"#;
        let err = parse_import(raw).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidMessage { index: 1, .. }));
    }

    #[test]
    fn test_rejects_non_array_and_empty() {
        assert!(matches!(
            parse_import(br#"{"id":"1"}"#),
            Err(SnapshotError::NotAnArray)
        ));
        assert!(matches!(parse_import(b"[]"), Err(SnapshotError::Empty)));
        assert!(matches!(parse_import(b"not json"), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn test_accepts_empty_text_and_sources() {
        let raw = br#"[
            {"id":"1","role":"user","text":"","file":{"name":"a.png","type":"image/png"}},
            {"id":"2","role":"model","text":"answer","sources":[{"uri":"https://a","title":"A"}]}
        ]"#;
        let msgs = parse_import(raw).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].role, Role::Model);
        assert_eq!(msgs[1].sources.as_ref().unwrap()[0].title, "A");
    }

    #[test]
    fn test_decode_tolerates_empty_array() {
        assert!(decode("[]").unwrap().is_empty());
        assert!(decode("{oops").is_err());
    }
}
