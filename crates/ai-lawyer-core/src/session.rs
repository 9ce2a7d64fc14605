//! Session state: ordered message log plus transient status.

use serde::{Deserialize, Serialize};

use crate::Message;

/// Session status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Ready for a new turn.
    #[default]
    Idle,
    /// A turn is being sent or streamed.
    Sending,
    /// Initialization failed; the session is unusable until reset.
    Error,
}

/// In-memory conversation.
///
/// `status` and `last_error` are transient and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub messages: Vec<Message>,
    pub status: SessionStatus,
    pub last_error: Option<String>,
}

impl Session {
    /// Whether the log holds more than the initial greeting.
    #[must_use]
    pub fn has_conversation(&self) -> bool {
        self.messages.len() > 1
    }

    /// Messages written to the autosave snapshot.
    #[must_use]
    pub fn persistable(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !m.is_error_notice())
            .cloned()
            .collect()
    }

    /// Messages written to an export file.
    #[must_use]
    pub fn exportable(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !m.is_error_notice() && !m.is_greeting())
            .cloned()
            .collect()
    }
}
