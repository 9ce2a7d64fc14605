//! Observable session store: snapshot for polling, broadcast for live updates.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{Message, Session, SessionStatus, Source};

const EVENT_CAPACITY: usize = 1024;

/// Change notification published after every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The whole log was replaced (restore, reset, import).
    MessagesReplaced { count: usize },
    /// A message was appended.
    MessageAppended(Message),
    /// A message changed in place (streamed text or sources).
    MessageUpdated(Message),
    /// Status or error text changed.
    StatusChanged {
        status: SessionStatus,
        last_error: Option<String>,
    },
}

/// Session state holder.
///
/// Only the controller mutates it; any number of observers may poll
/// `snapshot()` or follow `updates()`.
pub struct SessionStore {
    inner: RwLock<Session>,
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(Session::default()),
            sender,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event); // no listeners is fine
    }

    /// Clone of the current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.read().messages.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().messages.is_empty()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.read().status
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.read().last_error.clone()
    }

    /// Replace the whole message log.
    pub fn replace_messages(&self, messages: Vec<Message>) {
        let count = messages.len();
        self.write().messages = messages;
        self.publish(SessionEvent::MessagesReplaced { count });
    }

    /// Append a message at the end of the log.
    pub fn push_message(&self, msg: Message) {
        self.write().messages.push(msg.clone());
        self.publish(SessionEvent::MessageAppended(msg));
    }

    /// Republish a model message's accumulated text and sources.
    ///
    /// Returns false if no message has that id.
    pub fn set_model_content(&self, id: &str, text: &str, sources: &[Source]) -> bool {
        let updated = {
            let mut session = self.write();
            let Some(msg) = session.messages.iter_mut().find(|m| m.id == id) else {
                return false;
            };
            text.clone_into(&mut msg.text);
            msg.sources = Some(sources.to_vec());
            msg.clone()
        };
        self.publish(SessionEvent::MessageUpdated(updated));
        true
    }

    /// Set status and error text together.
    pub fn set_state(&self, status: SessionStatus, last_error: Option<String>) {
        {
            let mut session = self.write();
            session.status = status;
            session.last_error.clone_from(&last_error);
        }
        self.publish(SessionEvent::StatusChanged { status, last_error });
    }

    /// Change status, keeping the current error text.
    pub fn set_status(&self, status: SessionStatus) {
        let last_error = {
            let mut session = self.write();
            session.status = status;
            session.last_error.clone()
        };
        self.publish(SessionEvent::StatusChanged { status, last_error });
    }

    /// Record an error message, keeping the current status.
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        let status = {
            let mut session = self.write();
            session.last_error = Some(message.clone());
            session.status
        };
        self.publish(SessionEvent::StatusChanged {
            status,
            last_error: Some(message),
        });
    }

    /// Atomically move from `Idle` to `Sending`, clearing the error.
    ///
    /// Returns false if the session was not idle.
    pub fn try_begin_send(&self) -> bool {
        {
            let mut session = self.write();
            if session.status == SessionStatus::Sending {
                return false;
            }
            session.status = SessionStatus::Sending;
            session.last_error = None;
        }
        self.publish(SessionEvent::StatusChanged {
            status: SessionStatus::Sending,
            last_error: None,
        });
        true
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Stream of live updates; lagged events are skipped.
    #[must_use]
    pub fn updates(&self) -> futures::stream::BoxStream<'static, SessionEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move { res.ok() })
            .boxed()
    }
}
