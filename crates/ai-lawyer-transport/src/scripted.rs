//! Scripted in-process transport.
//!
//! Replays queued replies in order and records every call. With nothing
//! queued it echoes the prompt text back word by word, which keeps the
//! demo usable offline.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    protocol::{HistoryTurn, Part, SendOptions, StreamChunk},
    traits::{ChatTransport, ChunkStream, TransportError, TransportSession},
};

/// A queued reply.
#[derive(Debug)]
pub enum Reply {
    /// Stream these items, then end.
    Items(Vec<Result<StreamChunk, TransportError>>),
    /// Stream whatever is pushed through the paired sender.
    Channel(mpsc::UnboundedReceiver<Result<StreamChunk, TransportError>>),
    /// Refuse the send outright.
    Refuse(TransportError),
}

/// Recorded `open` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCall {
    pub system_instruction: String,
    pub history: Vec<HistoryTurn>,
}

/// Recorded `send_streaming` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCall {
    /// Index of the `open` call that produced the session.
    pub session: usize,
    pub parts: Vec<Part>,
    pub options: SendOptions,
}

impl SendCall {
    /// Concatenated text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }
}

#[derive(Default)]
struct Inner {
    replies: VecDeque<Reply>,
    open_failures: VecDeque<TransportError>,
    opened: Vec<OpenCall>,
    sent: Vec<SendCall>,
}

/// Transport that plays back a script.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a reply made of the given chunks.
    pub fn push_chunks(&self, chunks: impl IntoIterator<Item = StreamChunk>) {
        self.push_reply(Reply::Items(chunks.into_iter().map(Ok).collect()));
    }

    /// Queue a reply that fails after streaming the given chunks.
    pub fn push_failure(&self, chunks: impl IntoIterator<Item = StreamChunk>, error: TransportError) {
        let mut items: Vec<_> = chunks.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.push_reply(Reply::Items(items));
    }

    /// Queue a reply fed by hand; returns the feeding end.
    #[must_use]
    pub fn push_channel(&self) -> mpsc::UnboundedSender<Result<StreamChunk, TransportError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push_reply(Reply::Channel(rx));
        tx
    }

    pub fn push_reply(&self, reply: Reply) {
        self.lock().replies.push_back(reply);
    }

    /// Make the next `open` call fail.
    pub fn fail_next_open(&self, error: TransportError) {
        self.lock().open_failures.push_back(error);
    }

    /// Every `open` call so far.
    #[must_use]
    pub fn opened(&self) -> Vec<OpenCall> {
        self.lock().opened.clone()
    }

    /// Every `send_streaming` call so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SendCall> {
        self.lock().sent.clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(
        &self,
        system_instruction: &str,
        history: Vec<HistoryTurn>,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        let mut inner = self.lock();
        if let Some(err) = inner.open_failures.pop_front() {
            return Err(err);
        }
        inner.opened.push(OpenCall {
            system_instruction: system_instruction.to_string(),
            history,
        });
        let index = inner.opened.len() - 1;
        drop(inner);

        Ok(Arc::new(ScriptedSession {
            transport: self.clone(),
            index,
        }))
    }
}

struct ScriptedSession {
    transport: ScriptedTransport,
    index: usize,
}

#[async_trait]
impl TransportSession for ScriptedSession {
    async fn send_streaming(
        &self,
        parts: Vec<Part>,
        options: SendOptions,
    ) -> Result<ChunkStream, TransportError> {
        let call = SendCall {
            session: self.index,
            parts,
            options,
        };
        let echo = call.text();

        let reply = {
            let mut inner = self.transport.lock();
            inner.sent.push(call);
            inner.replies.pop_front()
        };

        match reply {
            Some(Reply::Items(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(Reply::Channel(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(Reply::Refuse(err)) => Err(err),
            None => {
                let chunks: Vec<_> = echo
                    .split_inclusive(' ')
                    .map(|w| Ok(StreamChunk::text(w)))
                    .collect();
                Ok(futures::stream::iter(chunks).boxed())
            }
        }
    }
}
