//! Controller behaviour driven through the scripted transport and memory storage.

use std::{sync::Arc, time::Duration};

use ai_lawyer_core::{
    ChatConfig, GREETING_ID, KeyValueStore, Message, Role, SessionEvent, SessionStatus,
    StorageError, snapshot,
};
use ai_lawyer_session::{
    ControllerError, GroundingUrls, ImportOutcome, SessionController, SubmitOutcome, TurnRequest,
    storage::MemoryStorage,
};
use ai_lawyer_transport::{
    Attachment, Citation, HistoryTurn, Part, ScriptedTransport, StreamChunk, TransportError,
};
use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use tokio_test::{assert_err, assert_ok};

type Controller = SessionController<ScriptedTransport, MemoryStorage, MemoryStorage>;

fn build() -> (Arc<Controller>, ScriptedTransport, MemoryStorage) {
    let transport = ScriptedTransport::new();
    let storage = MemoryStorage::new();
    let controller = SessionController::new(
        ChatConfig::default(),
        transport.clone(),
        storage.clone(),
        storage.clone(),
    );
    (Arc::new(controller), transport, storage)
}

/// Memory storage whose writes take a while to land.
#[derive(Clone)]
struct SlowStorage {
    inner: MemoryStorage,
    delay: Duration,
}

#[async_trait]
impl KeyValueStore for SlowStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}

type SlowController = SessionController<ScriptedTransport, SlowStorage, MemoryStorage>;

async fn ready_slow() -> (Arc<SlowController>, ScriptedTransport, MemoryStorage) {
    let transport = ScriptedTransport::new();
    let storage = MemoryStorage::new();
    let slow = SlowStorage {
        inner: storage.clone(),
        delay: Duration::from_millis(100),
    };
    let controller = SessionController::new(
        ChatConfig::default(),
        transport.clone(),
        slow,
        storage.clone(),
    );
    assert_ok!(controller.initialize().await);
    (Arc::new(controller), transport, storage)
}

async fn ready() -> (Arc<Controller>, ScriptedTransport, MemoryStorage) {
    let (controller, transport, storage) = build();
    assert_ok!(controller.initialize().await);
    (controller, transport, storage)
}

async fn saved(storage: &MemoryStorage) -> Option<Vec<Message>> {
    let key = ChatConfig::default().storage_key;
    storage
        .get(&key)
        .await
        .unwrap()
        .map(|raw| snapshot::decode(&raw).unwrap())
}

async fn wait_for(
    updates: &mut BoxStream<'static, SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = updates.next().await.expect("update stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session update")
}

fn is_placeholder(event: &SessionEvent) -> bool {
    matches!(event, SessionEvent::MessageAppended(m) if m.role == Role::Model && m.text.is_empty())
}

fn updated_text(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::MessageUpdated(m) => Some(m.text.clone()),
        _ => None,
    }
}

#[tokio::test]
async fn test_fresh_start_shows_greeting() {
    let (controller, transport, storage) = ready().await;
    let session = controller.store().snapshot();

    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].id, GREETING_ID);
    assert_eq!(session.messages[0].text, ChatConfig::default().greeting);
    assert_eq!(session.status, SessionStatus::Idle);

    let opened = transport.opened();
    assert_eq!(opened.len(), 1);
    assert!(opened[0].history.is_empty());
    assert_eq!(opened[0].system_instruction, ChatConfig::default().system_instruction);
    assert_eq!(saved(&storage).await, None);
}

#[tokio::test]
async fn test_restore_replays_text_only_history() {
    let (controller, transport, storage) = build();
    let mut answer = Message::model("2", "Відповідь");
    answer.sources = Some(vec![ai_lawyer_core::Source::new("https://a", "A")]);
    let messages = vec![
        Message::greeting("hi"),
        Message::user(
            "1",
            "Питання",
            Some(ai_lawyer_core::AttachmentInfo {
                name: "scan.png".to_string(),
                mime_type: "image/png".to_string(),
            }),
        ),
        answer,
    ];
    assert_ok!(storage.set("chatHistory", &snapshot::encode(&messages).unwrap()).await);

    assert_ok!(controller.initialize().await);

    assert_eq!(controller.store().messages(), messages);
    let history = &transport.opened()[0].history;
    assert_eq!(history.len(), 3);
    assert_eq!(history[1], HistoryTurn {
        role: Role::User,
        parts: vec![Part::text("Питання")],
    });
}

#[tokio::test]
async fn test_corrupt_snapshot_is_discarded() {
    let (controller, transport, storage) = build();
    assert_ok!(storage.set("chatHistory", "{not json").await);

    let err = assert_err!(controller.initialize().await);
    assert!(matches!(err, ControllerError::Initialization(_)));

    let session = controller.store().snapshot();
    assert!(session.messages.is_empty());
    assert_eq!(session.status, SessionStatus::Error);
    assert!(session.last_error.unwrap().starts_with("Помилка ініціалізації"));
    assert_eq!(saved(&storage).await, None);
    assert!(transport.opened().is_empty());

    // still usable for starting fresh
    assert_ok!(controller.new_chat().await);
    assert_eq!(controller.store().len(), 1);
}

#[tokio::test]
async fn test_transport_open_failure_on_start() {
    let (controller, transport, _storage) = build();
    transport.fail_next_open(TransportError::Open("missing API key".to_string()));

    assert_err!(controller.initialize().await);
    let store = controller.store();
    assert_eq!(store.status(), SessionStatus::Error);
    assert!(store.last_error().unwrap().contains("missing API key"));

    // submitting without a transport session keeps the user message
    let err = assert_err!(controller.submit(TurnRequest::new("Привіт")).await);
    assert!(matches!(err, ControllerError::NotInitialized));
    assert_eq!(store.len(), 1);
    assert_eq!(store.status(), SessionStatus::Idle);
    assert_eq!(store.last_error().as_deref(), Some("Чат не ініціалізовано."));
}

#[tokio::test]
async fn test_streaming_publishes_every_prefix() {
    let (controller, transport, _storage) = ready().await;
    let store = controller.store();
    let mut updates = store.updates();
    let tx = transport.push_channel();

    let task = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit(TurnRequest::new("Як подати позов?")).await }
    });

    wait_for(&mut updates, is_placeholder).await;
    assert_eq!(store.status(), SessionStatus::Sending);

    let mut expected = String::new();
    for delta in ["Спочатку ", "підготуйте ", "позовну заяву."] {
        tx.send(Ok(StreamChunk::text(delta))).unwrap();
        expected.push_str(delta);
        let event = wait_for(&mut updates, |e| updated_text(e).is_some()).await;
        assert_eq!(updated_text(&event).unwrap(), expected);
        assert_eq!(store.messages().last().unwrap().text, expected);
    }
    drop(tx);

    let outcome = assert_ok!(task.await.unwrap());
    assert!(matches!(outcome, SubmitOutcome::Completed { .. }));
    assert_eq!(store.status(), SessionStatus::Idle);
    assert_eq!(store.last_error(), None);
}

#[tokio::test]
async fn test_sources_deduplicated_across_chunks() {
    let (controller, transport, storage) = ready().await;
    transport.push_chunks([
        StreamChunk::text("Згідно ").with_citations(vec![
            Citation::new("https://zakon.rada.gov.ua/1", "ЦК України"),
            Citation::new("https://court.gov.ua", "Суд"),
        ]),
        StreamChunk::text("закону.").with_citations(vec![
            Citation::new("https://zakon.rada.gov.ua/1", "Інша назва"),
            Citation {
                uri: Some("https://no-title".to_string()),
                title: None,
            },
            Citation::new("https://reyestr.court.gov.ua", "Реєстр"),
        ]),
    ]);

    let outcome = assert_ok!(
        controller
            .submit(TurnRequest::new("Питання").with_grounding(true))
            .await
    );
    let SubmitOutcome::Completed { message_id } = outcome else {
        panic!("Wrong outcome");
    };

    let reply = controller.store().messages().pop().unwrap();
    assert_eq!(reply.id, message_id);
    assert_eq!(reply.text, "Згідно закону.");
    let sources = reply.sources.unwrap();
    let uris: Vec<_> = sources.iter().map(|s| s.uri.as_str()).collect();
    assert_eq!(uris, [
        "https://zakon.rada.gov.ua/1",
        "https://court.gov.ua",
        "https://reyestr.court.gov.ua"
    ]);
    assert_eq!(sources[0].title, "ЦК України");

    assert!(transport.sent()[0].options.grounding);
    assert_eq!(saved(&storage).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_no_double_submit() {
    let (controller, transport, _storage) = ready().await;
    let store = controller.store();
    let mut updates = store.updates();
    let tx = transport.push_channel();

    let task = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit(TurnRequest::new("Перше")).await }
    });
    wait_for(&mut updates, is_placeholder).await;
    let len = store.len();

    let second = assert_ok!(controller.submit(TurnRequest::new("Друге")).await);
    assert_eq!(second, SubmitOutcome::Ignored);
    assert_eq!(store.len(), len);
    assert_eq!(transport.sent().len(), 1);

    tx.send(Ok(StreamChunk::text("ok"))).unwrap();
    drop(tx);
    assert_ok!(task.await.unwrap());
    assert_eq!(store.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn test_blank_submit_is_ignored() {
    let (controller, transport, _storage) = ready().await;
    let store = controller.store();
    let before = store.snapshot();

    for text in ["", "   \n\t"] {
        let outcome = assert_ok!(controller.submit(TurnRequest::new(text)).await);
        assert_eq!(outcome, SubmitOutcome::Ignored);
    }

    assert_eq!(store.snapshot(), before);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_attachment_and_grounding_only_touch_the_wire() {
    let (controller, transport, _storage) = ready().await;
    transport.push_chunks([StreamChunk::text("Бачу документ.")]);

    let mut urls = GroundingUrls::new();
    urls.add("https://zakon.rada.gov.ua/laws/show/435-15").unwrap();
    let image = vec![0xFFu8; 10 * 1024];
    let request = TurnRequest::new("Перевірка")
        .with_attachment(Attachment::from_bytes("scan.jpg", "image/jpeg", image.clone()))
        .with_sources(&urls);

    assert_ok!(controller.submit(request).await);

    let user = controller.store().messages()[1].clone();
    assert_eq!(user.role, Role::User);
    assert_eq!(user.text, "Перевірка");
    let info = user.attachment.unwrap();
    assert_eq!(info.name, "scan.jpg");
    assert_eq!(info.mime_type, "image/jpeg");

    let sent = &transport.sent()[0];
    assert!(sent.options.grounding);
    assert!(sent.text().contains("- https://zakon.rada.gov.ua/laws/show/435-15"));
    assert!(sent.text().ends_with("Запит користувача: Перевірка"));
    let Part::InlineData { inline_data } = &sent.parts[1] else {
        panic!("Wrong part type");
    };
    assert_eq!(inline_data.mime_type, "image/jpeg");
    assert_eq!(inline_data.decode().unwrap(), image);
}

#[tokio::test]
async fn test_attachment_failure_keeps_user_message() {
    let (controller, transport, _storage) = ready().await;
    let store = controller.store();

    let request = TurnRequest::new("Ось договір")
        .with_attachment(Attachment::from_bytes("contract.pdf", "application/pdf", vec![1u8; 16]));
    let err = assert_err!(controller.submit(request).await);
    assert!(matches!(err, ControllerError::Attachment(_)));

    let messages = store.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text, "Ось договір");
    assert_eq!(store.status(), SessionStatus::Idle);
    assert!(store.last_error().unwrap().starts_with("Помилка зчитування файлу"));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_stream_failure_appends_notice() {
    let (controller, transport, storage) = ready().await;
    let store = controller.store();
    transport.push_failure(
        [StreamChunk::text("Частина")],
        TransportError::Stream("connection reset".to_string()),
    );

    let err = assert_err!(controller.submit(TurnRequest::new("Питання")).await);
    assert!(matches!(err, ControllerError::Transport(_)));

    let messages = store.messages();
    let notice = messages.last().unwrap();
    assert!(notice.is_error_notice());
    assert_eq!(notice.text, ChatConfig::default().error_notice);
    assert_eq!(messages[messages.len() - 2].text, "Частина");
    assert_eq!(store.status(), SessionStatus::Idle);
    assert!(store.last_error().unwrap().contains("connection reset"));

    let persisted = saved(&storage).await.unwrap();
    assert_eq!(persisted.len(), messages.len() - 1);
    assert!(persisted.iter().all(|m| !m.is_error_notice()));
}

#[tokio::test]
async fn test_refused_send_appends_notice_without_placeholder() {
    let (controller, transport, _storage) = ready().await;
    transport.push_reply(ai_lawyer_transport::scripted::Reply::Refuse(TransportError::Send(
        "quota exceeded".to_string(),
    )));

    assert_err!(controller.submit(TurnRequest::new("Питання")).await);

    let messages = controller.store().messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::User);
    assert!(messages[2].is_error_notice());
}

#[tokio::test]
async fn test_new_chat_resets_to_greeting() {
    let (controller, _transport, storage) = ready().await;
    for text in ["Один", "Два"] {
        assert_ok!(controller.submit(TurnRequest::new(text)).await);
    }
    assert_eq!(controller.store().len(), 5);
    assert!(saved(&storage).await.is_some());

    assert_ok!(controller.new_chat().await);

    let session = controller.store().snapshot();
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].id, "init");
    assert_eq!(session.messages[0].text, ChatConfig::default().greeting);
    assert_eq!(session.last_error, None);
    assert_eq!(saved(&storage).await, None);
}

#[tokio::test]
async fn test_new_chat_failure_still_clears_old_conversation() {
    let (controller, transport, _storage) = ready().await;
    assert_ok!(controller.submit(TurnRequest::new("Один")).await);

    transport.fail_next_open(TransportError::Open("offline".to_string()));
    assert_err!(controller.new_chat().await);

    let session = controller.store().snapshot();
    assert!(session.messages.is_empty());
    assert_eq!(session.status, SessionStatus::Error);
}

#[tokio::test]
async fn test_late_chunks_after_new_chat_are_ignored() {
    let (controller, transport, storage) = ready().await;
    let store = controller.store();
    let mut updates = store.updates();
    let tx = transport.push_channel();

    let task = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit(TurnRequest::new("Довге питання")).await }
    });
    wait_for(&mut updates, is_placeholder).await;
    tx.send(Ok(StreamChunk::text("Початок"))).unwrap();
    wait_for(&mut updates, |e| updated_text(e).is_some()).await;

    assert_ok!(controller.new_chat().await);
    tx.send(Ok(StreamChunk::text(" запізнілий"))).unwrap();
    drop(tx);

    let outcome = assert_ok!(task.await.unwrap());
    assert_eq!(outcome, SubmitOutcome::Abandoned);
    let messages = store.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_greeting());
    assert_eq!(saved(&storage).await, None);
    assert_eq!(store.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn test_abandoned_reply_does_not_resave_old_chat() {
    let (controller, transport, storage) = ready_slow().await;
    let store = controller.store();
    let mut updates = store.updates();
    let tx = transport.push_channel();

    let task = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit(TurnRequest::new("Старе питання")).await }
    });
    wait_for(&mut updates, is_placeholder).await;
    tx.send(Ok(StreamChunk::text("Стара відповідь"))).unwrap();
    wait_for(&mut updates, |e| updated_text(e).is_some()).await;

    // the chunk's write is still in flight
    assert_ok!(controller.new_chat().await);
    drop(tx);

    let outcome = assert_ok!(task.await.unwrap());
    assert_eq!(outcome, SubmitOutcome::Abandoned);
    assert_eq!(store.len(), 1);
    assert_eq!(saved(&storage).await, None);
}

#[tokio::test]
async fn test_abandoned_turn_leaves_newer_turn_sending() {
    let (controller, transport, _storage) = ready_slow().await;
    let store = controller.store();
    let mut updates = store.updates();

    let stale = tokio::spawn({
        let controller = Arc::clone(&controller);
        let request = TurnRequest::new("Ось договір").with_attachment(Attachment::from_bytes(
            "contract.pdf",
            "application/pdf",
            vec![1u8; 16],
        ));
        async move { controller.submit(request).await }
    });
    wait_for(&mut updates, |e| {
        matches!(e, SessionEvent::MessageAppended(m) if m.text == "Ось договір")
    })
    .await;

    assert_ok!(controller.new_chat().await);

    let tx = transport.push_channel();
    let current = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit(TurnRequest::new("Нове питання")).await }
    });
    wait_for(&mut updates, is_placeholder).await;

    assert_eq!(assert_ok!(stale.await.unwrap()), SubmitOutcome::Abandoned);
    assert_eq!(store.status(), SessionStatus::Sending);
    assert_eq!(store.last_error(), None);

    let third = assert_ok!(controller.submit(TurnRequest::new("Третє")).await);
    assert_eq!(third, SubmitOutcome::Ignored);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text(), "Нове питання");

    tx.send(Ok(StreamChunk::text("Готово"))).unwrap();
    drop(tx);
    assert!(matches!(
        assert_ok!(current.await.unwrap()),
        SubmitOutcome::Completed { .. }
    ));
    assert_eq!(store.status(), SessionStatus::Idle);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_export_then_import_round_trip() {
    let (controller, transport, storage) = ready().await;
    transport.push_chunks([StreamChunk::text("Перша відповідь")
        .with_citations(vec![Citation::new("https://court.gov.ua", "Суд")])]);
    assert_ok!(controller.submit(TurnRequest::new("Перше питання")).await);
    transport.push_failure([], TransportError::Stream("reset".to_string()));
    assert_err!(controller.submit(TurnRequest::new("Друге питання")).await);

    // user, reply, user, empty reply of the failed turn
    let expected = controller.store().snapshot().exportable();
    assert_eq!(expected.len(), 4);

    let name = assert_ok!(controller.export().await);
    assert!(name.starts_with("ai-lawyer-chat-"));
    assert!(name.ends_with(".json"));
    assert!(!name.contains(':'));
    let file = storage.saved_files().unwrap().pop().unwrap();
    assert_eq!(file.name, name);

    assert_ok!(controller.new_chat().await);
    storage.stage_file(file.bytes).unwrap();
    let outcome = assert_ok!(controller.import().await);
    assert_eq!(outcome, ImportOutcome::Loaded { messages: 4 });

    assert_eq!(controller.store().messages(), expected);
    assert_eq!(saved(&storage).await.unwrap(), expected);
    let opened = transport.opened();
    assert_eq!(opened.last().unwrap().history, HistoryTurn::project(&expected));
}

#[tokio::test]
async fn test_invalid_import_leaves_session_untouched() {
    let (controller, transport, storage) = ready().await;
    assert_ok!(controller.submit(TurnRequest::new("Питання")).await);
    let before = controller.store().messages();
    let opens = transport.opened().len();

    storage
        .stage_file(br#"[{"id":"1","role":"user"}]"#.to_vec())
        .unwrap();
    let err = assert_err!(controller.import().await);
    assert!(matches!(err, ControllerError::Import(_)));

    let store = controller.store();
    assert_eq!(store.messages(), before);
    assert!(store.last_error().unwrap().starts_with("Помилка завантаження чату"));
    assert_eq!(saved(&storage).await.unwrap(), before);
    assert_eq!(transport.opened().len(), opens);
}

#[tokio::test]
async fn test_import_cancelled_is_noop() {
    let (controller, _transport, _storage) = ready().await;
    let before = controller.store().snapshot();
    assert_eq!(assert_ok!(controller.import().await), ImportOutcome::Cancelled);
    assert_eq!(controller.store().snapshot(), before);
}

#[tokio::test]
async fn test_export_requires_conversation() {
    let (controller, _transport, storage) = ready().await;

    let err = assert_err!(controller.export().await);
    assert!(matches!(err, ControllerError::NothingToExport));
    assert_eq!(
        controller.store().last_error().as_deref(),
        Some("Немає чого зберігати. Почніть розмову.")
    );
    assert!(storage.saved_files().unwrap().is_empty());
}

#[tokio::test]
async fn test_autosave_failure_is_surfaced() {
    let (controller, _transport, storage) = ready().await;
    storage.set_read_only(true);

    assert_ok!(controller.submit(TurnRequest::new("Питання")).await);

    let store = controller.store();
    assert_eq!(store.len(), 3);
    assert!(store.last_error().unwrap().starts_with("Помилка сховища"));
}
