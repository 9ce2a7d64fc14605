//! Conversation data model.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

/// Id of the synthetic greeting message.
pub const GREETING_ID: &str = "init";

/// Id prefix of transport-error placeholder messages.
pub const ERROR_ID_PREFIX: &str = "error-";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the chat.
    User,
    /// The language model.
    Model,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// A citation surfaced by grounded search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

impl Source {
    #[must_use]
    pub fn new(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
        }
    }
}

/// Descriptive metadata of a file sent with a user turn.
///
/// The payload itself is never kept in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub name: String,
    #[serde(rename = "type", alias = "mimeType")]
    pub mime_type: String,
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(
        rename = "file",
        alias = "attachment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attachment: Option<AttachmentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

impl Message {
    /// Create a user message.
    #[must_use]
    pub fn user(
        id: impl Into<String>,
        text: impl Into<String>,
        attachment: Option<AttachmentInfo>,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            text: text.into(),
            attachment,
            sources: None,
        }
    }

    /// Create a model message with plain text.
    #[must_use]
    pub fn model(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Model,
            text: text.into(),
            attachment: None,
            sources: None,
        }
    }

    /// Empty model message that anchors a streamed reply.
    #[must_use]
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            sources: Some(Vec::new()),
            ..Self::model(id, String::new())
        }
    }

    /// The synthetic welcome message of a fresh conversation.
    #[must_use]
    pub fn greeting(text: impl Into<String>) -> Self {
        Self::model(GREETING_ID, text)
    }

    /// Terminal notice appended after a transport failure.
    #[must_use]
    pub fn error_notice(id_suffix: &str, text: impl Into<String>) -> Self {
        Self::model(format!("{ERROR_ID_PREFIX}{id_suffix}"), text)
    }

    #[must_use]
    pub fn is_greeting(&self) -> bool {
        self.id == GREETING_ID
    }

    /// Whether this message is a transport-error placeholder.
    #[must_use]
    pub fn is_error_notice(&self) -> bool {
        self.id.starts_with(ERROR_ID_PREFIX)
    }
}

/// Timestamp-derived message id generator.
///
/// Ids are epoch milliseconds, bumped past the previous id when the clock
/// has not advanced, so two ids from one generator never collide.
#[derive(Debug, Default)]
pub struct MessageIdGen {
    last: AtomicI64,
}

impl MessageIdGen {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Next id as a raw millisecond value.
    pub fn next_millis(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }

    /// Next id.
    pub fn next_id(&self) -> String {
        self.next_millis().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let ids = MessageIdGen::new();
        let mut prev = ids.next_millis();
        for _ in 0..1000 {
            let next = ids.next_millis();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_message_json_shape() {
        let msg = Message::user(
            "1",
            "hello",
            Some(AttachmentInfo {
                name: "scan.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
            }),
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["file"]["type"], "image/jpeg");
        assert!(json.get("sources").is_none());
    }

    #[test]
    fn test_attachment_alias_accepted() {
        let json = r#"{"id":"2","role":"user","text":"x","attachment":{"name":"a.png","mimeType":"image/png"}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.attachment.unwrap().mime_type, "image/png");
    }

    #[test]
    fn test_special_ids() {
        assert!(Message::greeting("hi").is_greeting());
        let notice = Message::error_notice("17", "sorry");
        assert!(notice.is_error_notice());
        assert_eq!(notice.role, Role::Model);
        assert!(!Message::model("17", "ok").is_error_notice());
    }
}
