//! Wire types exchanged with the model transport.

use ai_lawyer_core::{Message, Role, Source};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

/// One part of an outgoing turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    /// Plain prompt text.
    Text { text: String },
    /// Binary payload sent inline.
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an inline-data part from raw bytes.
    #[must_use]
    pub fn inline(data: &[u8], mime_type: impl Into<String>) -> Self {
        Self::InlineData {
            inline_data: InlineData::from_bytes(data, mime_type),
        }
    }

    /// Text content, if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::InlineData { .. } => None,
        }
    }
}

/// Inline binary payload (base64 encoded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineData {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl InlineData {
    #[must_use]
    pub fn from_bytes(data: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: BASE64.encode(data),
            mime_type: mime_type.into(),
        }
    }

    /// Decode the payload from base64.
    #[must_use]
    pub fn decode(&self) -> Option<Vec<u8>> {
        BASE64.decode(&self.data).ok()
    }
}

/// A prior turn replayed into a new transport session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl HistoryTurn {
    /// Text-only projection of a logged message.
    ///
    /// Attachments and sources are not replayed.
    #[must_use]
    pub fn from_message(msg: &Message) -> Self {
        Self {
            role: msg.role,
            parts: vec![Part::text(msg.text.clone())],
        }
    }

    /// Project a whole log.
    #[must_use]
    pub fn project(messages: &[Message]) -> Vec<Self> {
        messages.iter().map(Self::from_message).collect()
    }
}

/// Per-send options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Enable web-search grounding for this turn.
    pub grounding: bool,
}

/// A grounding citation as reported by the transport.
///
/// Either field may be missing; incomplete citations are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl Citation {
    #[must_use]
    pub fn new(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            title: Some(title.into()),
        }
    }

    /// Convert to a `Source` if both uri and title are present and non-empty.
    #[must_use]
    pub fn to_source(&self) -> Option<Source> {
        match (self.uri.as_deref(), self.title.as_deref()) {
            (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                Some(Source::new(uri, title))
            }
            _ => None,
        }
    }
}

/// One increment of a streamed reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub citations: Option<Vec<Citation>>,
}

impl StreamChunk {
    /// Text-only chunk.
    #[must_use]
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text: Some(delta.into()),
            citations: None,
        }
    }

    /// Attach citations to this chunk.
    #[must_use]
    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = Some(citations);
        self
    }
}
