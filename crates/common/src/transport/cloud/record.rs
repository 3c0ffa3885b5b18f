//! Plaintext records exchanged through the relay
//!
//! Outbound messages are user records; inbound `update` events carry
//! encrypted records of which only assistant replies are of interest.

use serde_json::{json, Value};

use crate::transport::PermissionMode;

/// Roles whose records can answer a query
pub const ACCEPTED_ROLES: [&str; 2] = ["assistant", "agent"];
/// Provenance tag written into outbound records
pub const SENT_FROM: &str = "meshwire";

/// The user record for `text`, before encryption
pub fn user_record(text: &str, sent_from: &str, mode: PermissionMode) -> Value {
    json!({
        "role": "user",
        "content": { "type": "text", "text": text },
        "meta": {
            "sentFrom": sent_from,
            "permissionMode": mode.as_str(),
        },
    })
}

/// Data of the outbound `message` event
pub fn message_event(
    session_id: &str,
    encrypted: &str,
    local_id: &str,
    sent_from: &str,
    mode: PermissionMode,
) -> Value {
    json!({
        "sid": session_id,
        "message": encrypted,
        "localId": local_id,
        "sentFrom": sent_from,
        "permissionMode": mode.as_str(),
    })
}

/// A `new-message` update with an encrypted body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub session_id: String,
    pub message_id: Option<String>,
    pub local_id: Option<String>,
    /// Standard base64 ciphertext
    pub ciphertext: String,
}

/// Pull the encrypted message out of an `update` event, if it is one
pub fn parse_update(data: &Value) -> Option<NewMessage> {
    let body = data.get("body")?;
    if body.get("t").and_then(Value::as_str) != Some("new-message") {
        return None;
    }
    let session_id = body.get("sid").and_then(Value::as_str)?;
    let message = body.get("message")?;
    let content = message.get("content")?;
    if content.get("t").and_then(Value::as_str) != Some("encrypted") {
        return None;
    }
    let text_of = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(String::from);

    Some(NewMessage {
        session_id: session_id.to_string(),
        message_id: text_of(message, "id"),
        local_id: text_of(message, "localId"),
        ciphertext: text_of(content, "c")?,
    })
}

/// Reply text from a decrypted record
///
/// `None` unless the role is accepted and the content yields non-empty
/// text. Understood content shapes:
///
/// - `{"type": "text", "text": ...}`
/// - `{"type": "output", "data": {"message": {"content": [parts]}}}`
/// - `[parts]` where text parts are joined with a space
/// - a bare string
pub fn extract_reply_text(record: &Value) -> Option<String> {
    let role = record.get("role").and_then(Value::as_str)?;
    if !ACCEPTED_ROLES.contains(&role) {
        return None;
    }
    let text = content_text(record.get("content")?)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => Some(join_parts(parts)),
        Value::Object(map) => match map.get("type").and_then(Value::as_str) {
            Some("output") => {
                let inner = map.get("data")?.get("message")?.get("content")?;
                content_text(inner)
            }
            _ => map.get("text").and_then(Value::as_str).map(String::from),
        },
        _ => None,
    }
}

fn join_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_user_record_shape() {
        let record = user_record("hello", SENT_FROM, PermissionMode::Plan);
        assert_eq!(
            record,
            json!({
                "role": "user",
                "content": {"type": "text", "text": "hello"},
                "meta": {"sentFrom": "meshwire", "permissionMode": "plan"}
            })
        );
        let event = message_event("s1", "CIPHER", "l1", SENT_FROM, PermissionMode::SafeYolo);
        assert_eq!(event["sid"], "s1");
        assert_eq!(event["message"], "CIPHER");
        assert_eq!(event["localId"], "l1");
        assert_eq!(event["permissionMode"], "safe-yolo");
    }

    #[test]
    fn test_parse_update() {
        let update = json!({
            "id": "u1",
            "seq": 9,
            "body": {
                "t": "new-message",
                "sid": "sess",
                "message": {
                    "id": "m1",
                    "localId": "l1",
                    "content": {"t": "encrypted", "c": "QUJD"}
                }
            }
        });
        let parsed = parse_update(&update).unwrap();
        assert_eq!(parsed.session_id, "sess");
        assert_eq!(parsed.message_id.as_deref(), Some("m1"));
        assert_eq!(parsed.ciphertext, "QUJD");

        let other = json!({"body": {"t": "update-session", "sid": "sess"}});
        assert!(parse_update(&other).is_none());
        let plain = json!({"body": {"t": "new-message", "sid": "s", "message": {"content": {"t": "plain"}}}});
        assert!(parse_update(&plain).is_none());
        assert!(parse_update(&json!(null)).is_none());
    }

    #[test]
    fn test_extract_flat_text() {
        let record = json!({"role": "assistant", "content": {"type": "text", "text": "done"}});
        assert_eq!(extract_reply_text(&record).as_deref(), Some("done"));
    }

    #[test]
    fn test_extract_output_wrapper() {
        let record = json!({
            "role": "agent",
            "content": {
                "type": "output",
                "data": {
                    "type": "assistant",
                    "message": {
                        "content": [
                            {"type": "text", "text": "part one"},
                            {"type": "tool_use", "name": "bash"},
                            {"type": "text", "text": "part two"}
                        ]
                    }
                }
            }
        });
        assert_eq!(
            extract_reply_text(&record).as_deref(),
            Some("part one part two")
        );
    }

    #[test]
    fn test_extract_rejects_other_roles_and_empty_text() {
        let user = json!({"role": "user", "content": {"type": "text", "text": "echo"}});
        assert!(extract_reply_text(&user).is_none());

        let empty = json!({"role": "assistant", "content": [{"type": "tool_use"}]});
        assert!(extract_reply_text(&empty).is_none());

        let missing = json!({"role": "assistant"});
        assert!(extract_reply_text(&missing).is_none());

        let bare = json!({"role": "assistant", "content": " plain "});
        assert_eq!(extract_reply_text(&bare).as_deref(), Some("plain"));
    }
}
