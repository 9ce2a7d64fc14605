//! Session controller: the only writer of the session.

use std::sync::Arc;

use ai_lawyer_core::{
    ChatConfig, FileExchange, KeyValueStore, Message, MessageIdGen, SessionStatus, SessionStore,
    StorageError, snapshot,
};
use ai_lawyer_transport::{
    Attachment, AttachmentError, ChatTransport, HistoryTurn, Part, SendOptions, TransportError,
    TransportSession,
};
use futures::StreamExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    prompt::{GroundingUrls, build_prompt_text},
    reducer::StreamReducer,
};

/// Controller error.
///
/// Display strings are the notices shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Помилка ініціалізації: {0}. Перевірте API ключ.")]
    Initialization(String),
    #[error("Помилка зчитування файлу: {0}")]
    Attachment(#[from] AttachmentError),
    #[error("Помилка API: {0}")]
    Transport(#[from] TransportError),
    #[error("Чат не ініціалізовано.")]
    NotInitialized,
    #[error("Помилка завантаження чату: {0}")]
    Import(String),
    #[error("Помилка читання файлу: {0}")]
    ImportRead(StorageError),
    #[error("Немає чого зберігати. Почніть розмову.")]
    NothingToExport,
    #[error("Помилка збереження чату: {0}")]
    Export(String),
    #[error("Помилка сховища: {0}")]
    Storage(#[from] StorageError),
}

impl ControllerError {
    fn init(e: impl std::fmt::Display) -> Self {
        Self::Initialization(e.to_string())
    }

    fn import(e: impl std::fmt::Display) -> Self {
        Self::Import(e.to_string())
    }
}

/// A user turn to submit.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Literal user text, stored as typed.
    pub text: String,
    pub attachment: Option<Attachment>,
    /// Ask the transport for search grounding.
    pub use_grounding: bool,
    /// URLs listed in the wire prompt ahead of the text.
    pub grounding_urls: Vec<String>,
}

impl TurnRequest {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    #[must_use]
    pub const fn with_grounding(mut self, enabled: bool) -> Self {
        self.use_grounding = enabled;
        self
    }

    /// Use the listed URLs as sources; a non-empty list turns grounding on.
    #[must_use]
    pub fn with_sources(mut self, urls: &GroundingUrls) -> Self {
        self.grounding_urls = urls.as_slice().to_vec();
        self.use_grounding |= !urls.is_empty();
        self
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }
}

/// Result of `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input or a send already in progress; nothing changed.
    Ignored,
    /// The reply streamed to completion.
    Completed { message_id: String },
    /// The conversation was reset or replaced mid-stream; the rest was dropped.
    Abandoned,
}

/// Result of `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The user cancelled the file pick.
    Cancelled,
    Loaded { messages: usize },
}

/// The transport session currently receiving turns.
#[derive(Clone)]
struct Binding {
    id: Uuid,
    session: Arc<dyn TransportSession>,
}

fn bound_to(slot: &Option<Binding>, binding_id: Uuid) -> bool {
    slot.as_ref().is_some_and(|b| b.id == binding_id)
}

/// Session controller orchestrating turns, resets and file exchange.
pub struct SessionController<T, K, F>
where
    T: ChatTransport,
    K: KeyValueStore,
    F: FileExchange,
{
    config: ChatConfig,
    transport: T,
    storage: K,
    files: F,
    store: Arc<SessionStore>,
    binding: RwLock<Option<Binding>>,
    ids: MessageIdGen,
}

impl<T, K, F> SessionController<T, K, F>
where
    T: ChatTransport,
    K: KeyValueStore,
    F: FileExchange,
{
    /// Create a controller. Call `initialize` before submitting.
    #[must_use]
    pub fn new(config: ChatConfig, transport: T, storage: K, files: F) -> Self {
        Self {
            config,
            transport,
            storage,
            files,
            store: Arc::new(SessionStore::new()),
            binding: RwLock::new(None),
            ids: MessageIdGen::new(),
        }
    }

    /// Observable session state.
    #[must_use]
    pub fn store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub const fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn greeting(&self) -> Message {
        Message::greeting(self.config.greeting.clone())
    }

    async fn open(&self, history: Vec<HistoryTurn>) -> Result<Binding, TransportError> {
        let session = self
            .transport
            .open(&self.config.system_instruction, history)
            .await?;
        Ok(Binding {
            id: Uuid::new_v4(),
            session,
        })
    }

    /// Restore the autosaved conversation or start a fresh one.
    ///
    /// On failure the snapshot is discarded, the session is left empty with
    /// `SessionStatus::Error`, and `new_chat` can still recover.
    ///
    /// # Errors
    /// Returns error if the snapshot is unreadable or the transport cannot open.
    pub async fn initialize(&self) -> Result<(), ControllerError> {
        let mut binding = self.binding.write().await;
        match self.restore().await {
            Ok((restored, messages)) => {
                let count = messages.len();
                *binding = Some(restored);
                self.store.replace_messages(messages);
                self.store.set_state(SessionStatus::Idle, None);
                tracing::info!(messages = count, "Chat session initialized");
                Ok(())
            }
            Err(e) => {
                *binding = None;
                tracing::warn!("Chat initialization failed: {e}");
                if let Err(remove_err) = self.storage.remove(&self.config.storage_key).await {
                    tracing::warn!("Failed to discard saved history: {remove_err}");
                }
                self.store.replace_messages(Vec::new());
                self.store.set_state(SessionStatus::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn restore(&self) -> Result<(Binding, Vec<Message>), ControllerError> {
        let saved = self
            .storage
            .get(&self.config.storage_key)
            .await
            .map_err(ControllerError::init)?;

        if let Some(raw) = saved {
            let messages = snapshot::decode(&raw).map_err(ControllerError::init)?;
            if !messages.is_empty() {
                let binding = self
                    .open(HistoryTurn::project(&messages))
                    .await
                    .map_err(ControllerError::init)?;
                tracing::debug!(messages = messages.len(), "Restored saved history");
                return Ok((binding, messages));
            }
        }

        let binding = self.open(Vec::new()).await.map_err(ControllerError::init)?;
        Ok((binding, vec![self.greeting()]))
    }

    /// Persist the log if `binding_id` is still the current binding.
    ///
    /// The read guard is held across the write so a reset cannot slip in
    /// between the snapshot and the store.
    async fn autosave(&self, binding_id: Uuid) {
        let current = self.binding.read().await;
        if bound_to(&current, binding_id) {
            self.save_log().await;
        }
    }

    /// Write the current log to the key/value store once it holds a conversation.
    async fn save_log(&self) {
        let session = self.store.snapshot();
        if !session.has_conversation() {
            return;
        }
        let result = match snapshot::encode(&session.persistable()) {
            Ok(raw) => self.storage.set(&self.config.storage_key, &raw).await,
            Err(e) => Err(StorageError::Internal(e.to_string())),
        };
        if let Err(e) = result {
            tracing::warn!("Autosave failed: {e}");
            self.store.set_error(ControllerError::Storage(e).to_string());
        }
    }

    /// Record an error message and return to idle, unless the turn was abandoned.
    async fn fail_idle(
        &self,
        binding_id: Uuid,
        err: ControllerError,
    ) -> Result<SubmitOutcome, ControllerError> {
        let current = self.binding.read().await;
        if !bound_to(&current, binding_id) {
            tracing::debug!("Dropping error of an abandoned turn: {err}");
            return Ok(SubmitOutcome::Abandoned);
        }
        self.store.set_state(SessionStatus::Idle, Some(err.to_string()));
        Err(err)
    }

    /// Submit a user turn and stream the model's reply into the session.
    ///
    /// Blank input, or a call while another turn is sending, is a no-op.
    /// The user message is appended before any network activity and stays
    /// in the log whatever happens next.
    ///
    /// # Errors
    /// Returns error if the attachment cannot be encoded, no transport
    /// session is open, or the transport fails.
    pub async fn submit(&self, request: TurnRequest) -> Result<SubmitOutcome, ControllerError> {
        if request.is_blank() {
            tracing::debug!("Ignoring blank submission");
            return Ok(SubmitOutcome::Ignored);
        }

        // The turn belongs to whichever binding is current when it starts.
        let binding = {
            let current = self.binding.read().await;
            if !self.store.try_begin_send() {
                tracing::debug!("Ignoring submission while another turn is sending");
                return Ok(SubmitOutcome::Ignored);
            }
            self.store.push_message(Message::user(
                self.ids.next_id(),
                request.text.clone(),
                request.attachment.as_ref().map(Attachment::info),
            ));
            let Some(binding) = current.clone() else {
                self.save_log().await;
                let err = ControllerError::NotInitialized;
                self.store.set_state(SessionStatus::Idle, Some(err.to_string()));
                return Err(err);
            };
            binding
        };
        self.autosave(binding.id).await;

        let mut parts = vec![Part::text(build_prompt_text(
            &request.text,
            &request.grounding_urls,
        ))];
        if let Some(attachment) = &request.attachment {
            match attachment.encode(&self.config).await {
                Ok(part) => parts.push(part),
                Err(e) => {
                    tracing::warn!(name = %attachment.name, "Attachment rejected: {e}");
                    return self.fail_idle(binding.id, e.into()).await;
                }
            }
        }

        match self.stream_reply(&binding, parts, &request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.fail_transport(binding.id, e).await,
        }
    }

    async fn stream_reply(
        &self,
        binding: &Binding,
        parts: Vec<Part>,
        request: &TurnRequest,
    ) -> Result<SubmitOutcome, TransportError> {
        let options = SendOptions {
            grounding: request.use_grounding,
        };
        let mut stream = binding.session.send_streaming(parts, options).await?;

        let model_id = self.ids.next_id();
        {
            let current = self.binding.read().await;
            if !bound_to(&current, binding.id) {
                return Ok(SubmitOutcome::Abandoned);
            }
            self.store.push_message(Message::placeholder(model_id.clone()));
            self.save_log().await;
        }

        let mut reducer = StreamReducer::new();
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            reducer.apply(&chunk);
            chunks += 1;
            let current = self.binding.read().await;
            if !bound_to(&current, binding.id) {
                tracing::debug!(chunks, "Dropping chunks of an abandoned reply");
                return Ok(SubmitOutcome::Abandoned);
            }
            self.store.set_model_content(&model_id, reducer.text(), reducer.sources());
            self.save_log().await;
        }

        {
            let current = self.binding.read().await;
            if !bound_to(&current, binding.id) {
                tracing::debug!(chunks, "Reply finished after its chat was replaced");
                return Ok(SubmitOutcome::Abandoned);
            }
            self.store.set_status(SessionStatus::Idle);
        }
        tracing::info!(
            chunks,
            sources = reducer.sources().len(),
            "Model reply complete"
        );
        Ok(SubmitOutcome::Completed {
            message_id: model_id,
        })
    }

    async fn fail_transport(
        &self,
        binding_id: Uuid,
        err: TransportError,
    ) -> Result<SubmitOutcome, ControllerError> {
        tracing::error!("Transport failure: {err}");
        let err = ControllerError::Transport(err);
        {
            let current = self.binding.read().await;
            if !bound_to(&current, binding_id) {
                return Ok(SubmitOutcome::Abandoned);
            }
            self.store.set_state(SessionStatus::Error, Some(err.to_string()));
            self.store.push_message(Message::error_notice(
                &self.ids.next_id(),
                self.config.error_notice.clone(),
            ));
            self.store.set_status(SessionStatus::Idle);
            self.save_log().await;
        }
        Err(err)
    }

    /// Discard the conversation and start over with the greeting.
    ///
    /// Any reply still streaming for the old conversation is abandoned.
    ///
    /// # Errors
    /// Returns error if the new transport session cannot be opened; the old
    /// conversation is cleared regardless.
    pub async fn new_chat(&self) -> Result<(), ControllerError> {
        let mut binding = self.binding.write().await;
        *binding = None;

        let removed = self.storage.remove(&self.config.storage_key).await;

        match self.open(Vec::new()).await {
            Ok(fresh) => {
                *binding = Some(fresh);
                self.store.replace_messages(vec![self.greeting()]);
                self.store.set_state(SessionStatus::Idle, None);
                tracing::info!("Started new chat");
            }
            Err(e) => {
                let err = ControllerError::init(e);
                tracing::warn!("New chat failed: {err}");
                self.store.replace_messages(Vec::new());
                self.store.set_state(SessionStatus::Error, Some(err.to_string()));
                return Err(err);
            }
        }

        if let Err(e) = removed {
            tracing::warn!("Failed to clear saved history: {e}");
            let err = ControllerError::Storage(e);
            self.store.set_error(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    /// Save the conversation to a user file.
    ///
    /// The greeting and error notices are left out. Returns the file name.
    ///
    /// # Errors
    /// Returns error if there is nothing to export or the save fails.
    pub async fn export(&self) -> Result<String, ControllerError> {
        let session = self.store.snapshot();
        let messages = session.exportable();
        if !session.has_conversation() || messages.is_empty() {
            let err = ControllerError::NothingToExport;
            self.store.set_error(err.to_string());
            return Err(err);
        }

        let name = self.config.export_file_name(chrono::Utc::now());
        let result = match snapshot::encode_pretty(&messages) {
            Ok(bytes) => self
                .files
                .save_bytes_as_file(&bytes, &name)
                .await
                .map_err(|e| ControllerError::Export(e.to_string())),
            Err(e) => Err(ControllerError::Export(e.to_string())),
        };
        if let Err(e) = result {
            tracing::warn!("Export failed: {e}");
            self.store.set_error(e.to_string());
            return Err(e);
        }

        tracing::info!(file = %name, messages = messages.len(), "Exported chat");
        Ok(name)
    }

    /// Load a conversation from a user-chosen file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or fails validation.
    pub async fn import(&self) -> Result<ImportOutcome, ControllerError> {
        let picked = match self.files.pick_file_for_read().await {
            Ok(picked) => picked,
            Err(e) => {
                let err = ControllerError::ImportRead(e);
                self.store.set_error(err.to_string());
                return Err(err);
            }
        };
        let Some(bytes) = picked else {
            tracing::debug!("Import cancelled");
            return Ok(ImportOutcome::Cancelled);
        };
        self.import_bytes(&bytes).await
    }

    /// Replace the conversation with an exported message list.
    ///
    /// Either the whole file is loaded (persisted, shown, replayed into a
    /// new transport session) or nothing changes.
    ///
    /// # Errors
    /// Returns error if the payload is invalid, cannot be persisted, or the
    /// transport cannot open.
    pub async fn import_bytes(&self, bytes: &[u8]) -> Result<ImportOutcome, ControllerError> {
        match self.try_import(bytes).await {
            Ok(count) => {
                tracing::info!(messages = count, "Imported chat");
                Ok(ImportOutcome::Loaded { messages: count })
            }
            Err(e) => {
                tracing::warn!("Import rejected: {e}");
                self.store.set_error(e.to_string());
                Err(e)
            }
        }
    }

    async fn try_import(&self, bytes: &[u8]) -> Result<usize, ControllerError> {
        let messages = snapshot::parse_import(bytes).map_err(ControllerError::import)?;
        let raw = snapshot::encode(&messages).map_err(ControllerError::import)?;

        let mut binding = self.binding.write().await;
        let fresh = self
            .open(HistoryTurn::project(&messages))
            .await
            .map_err(ControllerError::import)?;
        self.storage
            .set(&self.config.storage_key, &raw)
            .await
            .map_err(ControllerError::import)?;

        *binding = Some(fresh);
        let count = messages.len();
        self.store.replace_messages(messages);
        self.store.set_state(SessionStatus::Idle, None);
        Ok(count)
    }
}
