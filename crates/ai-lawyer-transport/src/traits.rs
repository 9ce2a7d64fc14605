//! Chat transport contract.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{HistoryTurn, Part, SendOptions, StreamChunk};

/// Lazy, finite, non-restartable sequence of reply chunks.
pub type ChunkStream = futures::stream::BoxStream<'static, Result<StreamChunk, TransportError>>;

/// Transport error.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to open chat session: {0}")]
    Open(String),
    #[error("request rejected: {0}")]
    Send(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("transport closed")]
    Closed,
}

/// Remote model client.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a conversation seeded with a system instruction and prior turns.
    async fn open(
        &self,
        system_instruction: &str,
        history: Vec<HistoryTurn>,
    ) -> Result<Arc<dyn TransportSession>, TransportError>;
}

/// Stateful handle to one remote conversation.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Send a turn and return its streamed reply.
    async fn send_streaming(
        &self,
        parts: Vec<Part>,
        options: SendOptions,
    ) -> Result<ChunkStream, TransportError>;
}
