//! Chat transport layer.
//!
//! Provides:
//! - Wire parts (text + base64 inline data) and stream chunks
//! - `ChatTransport` / `TransportSession` contract
//! - Attachment validation and encoding
//! - Scripted in-process transport (feature: scripted)

pub mod attachment;
pub mod protocol;
pub mod traits;

#[cfg(feature = "scripted")]
pub mod scripted;

pub use attachment::{Attachment, AttachmentError, AttachmentPayload};
pub use protocol::{Citation, HistoryTurn, InlineData, Part, SendOptions, StreamChunk};
pub use traits::{ChatTransport, ChunkStream, TransportError, TransportSession};

#[cfg(feature = "scripted")]
pub use scripted::ScriptedTransport;
