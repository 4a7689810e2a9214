use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use confab_core::codec::{self, PLAYBACK_SAMPLE_RATE};
use confab_core::conversation::{ConversationState, HistoryStore, Role};
use confab_core::error::{ConfabError, Result};
use confab_core::live::rest::TextGenerator;
use confab_core::live::wire::{ServerMessage, SessionSetup};
use confab_core::live::{LiveConnection, LiveTransport, SessionEvent};
use confab_core::playback::Timeline;
use confab_core::session::dispatch::{self, DispatchContext, DispatchOutcome};
use confab_core::session::REPLY_ERROR_TEXT;
use confab_core::{Engine, SessionConfig, SessionStatus};

// ---------------------------------------------------------------------------
// Scripted fakes
// ---------------------------------------------------------------------------

/// Transport whose connect always fails (remote authorization refused).
struct RefusedTransport;

#[async_trait]
impl LiveTransport for RefusedTransport {
    async fn connect(&self, _setup: SessionSetup) -> Result<LiveConnection> {
        Err(ConfabError::Transport("401 unauthorized".into()))
    }
}

/// Generator that echoes, fails, or stalls, per script.
struct ScriptedGenerator {
    reply: Option<String>,
    delay: Duration,
}

impl ScriptedGenerator {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.into()),
            delay: Duration::ZERO,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            delay: Duration::ZERO,
        })
    }

    fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.into()),
            delay,
        })
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _user_text: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Some(text) => Ok(text.clone()),
            None => Err(ConfabError::Request("scripted failure".into())),
        }
    }
}

fn text_engine(
    generator: Arc<dyn TextGenerator>,
    store: Option<HistoryStore>,
) -> Engine {
    Engine::with_parts(
        SessionConfig::default(),
        Arc::new(RefusedTransport),
        generator,
        store,
    )
}

// ---------------------------------------------------------------------------
// Dispatch-loop plumbing
// ---------------------------------------------------------------------------

struct Harness {
    conversation: Arc<Mutex<ConversationState>>,
    timeline: Arc<Mutex<Timeline>>,
    events_tx: mpsc::Sender<SessionEvent>,
    loop_task: tokio::task::JoinHandle<DispatchOutcome>,
}

fn spawn_dispatch() -> Harness {
    let conversation = Arc::new(Mutex::new(ConversationState::new(None)));
    let timeline = Arc::new(Mutex::new(Timeline::new(PLAYBACK_SAMPLE_RATE)));
    let (transcript_tx, _) = broadcast::channel(64);
    let (turn_tx, _) = broadcast::channel(64);
    let (events_tx, events_rx) = mpsc::channel(64);

    let ctx = DispatchContext {
        conversation: Arc::clone(&conversation),
        timeline: Arc::clone(&timeline),
        playback_sample_rate: PLAYBACK_SAMPLE_RATE,
        transcript_tx,
        turn_tx,
    };
    let loop_task = tokio::spawn(dispatch::run(events_rx, ctx));

    Harness {
        conversation,
        timeline,
        events_tx,
        loop_task,
    }
}

fn message(raw: &str) -> SessionEvent {
    let msg: ServerMessage = serde_json::from_str(raw).expect("scripted message parses");
    SessionEvent::Message(msg)
}

fn audio_message(samples: &[f32]) -> SessionEvent {
    let data = codec::encode(&codec::f32_to_pcm16le(samples));
    message(&format!(
        r#"{{ "serverContent": {{ "modelTurn": {{ "parts": [
            {{ "inlineData": {{ "mimeType": "audio/pcm;rate=24000", "data": "{data}" }} }}
        ] }} }} }}"#
    ))
}

// ---------------------------------------------------------------------------
// Streaming session behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn voice_exchange_accumulates_schedules_and_finalizes() {
    let h = spawn_dispatch();

    h.events_tx.send(SessionEvent::Opened).await.unwrap();
    h.events_tx
        .send(message(
            r#"{ "serverContent": { "inputTranscription": { "text": "hel" } } }"#,
        ))
        .await
        .unwrap();
    h.events_tx
        .send(message(
            r#"{ "serverContent": { "inputTranscription": { "text": "lo" } } }"#,
        ))
        .await
        .unwrap();
    h.events_tx
        .send(message(
            r#"{ "serverContent": { "outputTranscription": { "text": "hi there" } } }"#,
        ))
        .await
        .unwrap();
    h.events_tx.send(audio_message(&[0.25; 2400])).await.unwrap();
    h.events_tx.send(audio_message(&[0.25; 1200])).await.unwrap();
    h.events_tx
        .send(message(r#"{ "serverContent": { "turnComplete": true } }"#))
        .await
        .unwrap();
    h.events_tx.send(SessionEvent::Closed).await.unwrap();

    let outcome = h.loop_task.await.unwrap();
    assert_eq!(outcome, DispatchOutcome::RemoteClosed);

    let conversation = h.conversation.lock();
    let history = conversation.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, "hello");
    assert_eq!(history[1].role, Role::Agent);
    assert_eq!(history[1].text, "hi there");
    assert_eq!(conversation.pending_input(), "");
    assert_eq!(conversation.pending_output(), "");

    // Two buffers scheduled back-to-back: cursor = total frames, no overlap.
    let timeline = h.timeline.lock();
    assert_eq!(timeline.cursor(), 3600);
    assert_eq!(timeline.active_sources(), 2);
}

#[tokio::test]
async fn interruption_stops_all_scheduled_playback() {
    let h = spawn_dispatch();

    h.events_tx.send(audio_message(&[0.5; 4800])).await.unwrap();
    h.events_tx.send(audio_message(&[0.5; 4800])).await.unwrap();
    h.events_tx
        .send(message(r#"{ "serverContent": { "interrupted": true } }"#))
        .await
        .unwrap();
    h.events_tx.send(SessionEvent::Closed).await.unwrap();
    h.loop_task.await.unwrap();

    let mut timeline = h.timeline.lock();
    assert_eq!(timeline.active_sources(), 0);
    assert_eq!(timeline.cursor(), 0);
    let mut out = vec![1.0f32; 256];
    timeline.render(&mut out);
    assert!(out.iter().all(|&s| s == 0.0), "no source may keep playing");
}

#[tokio::test]
async fn malformed_audio_is_dropped_without_killing_the_session() {
    let h = spawn_dispatch();

    h.events_tx
        .send(message(
            r#"{ "serverContent": { "modelTurn": { "parts": [
                { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "%%%not base64%%%" } }
            ] } } }"#,
        ))
        .await
        .unwrap();
    // The session keeps flowing after the bad fragment.
    h.events_tx
        .send(message(
            r#"{ "serverContent": { "outputTranscription": { "text": "still here" } } }"#,
        ))
        .await
        .unwrap();
    h.events_tx
        .send(message(r#"{ "serverContent": { "turnComplete": true } }"#))
        .await
        .unwrap();
    h.events_tx.send(SessionEvent::Closed).await.unwrap();

    assert_eq!(h.loop_task.await.unwrap(), DispatchOutcome::RemoteClosed);
    assert_eq!(h.timeline.lock().active_sources(), 0);
    let conversation = h.conversation.lock();
    assert_eq!(conversation.history().len(), 2);
    assert_eq!(conversation.history()[1].text, "still here");
}

#[tokio::test]
async fn transport_error_ends_the_loop_with_detail() {
    let h = spawn_dispatch();
    h.events_tx
        .send(SessionEvent::Errored("connection reset".into()))
        .await
        .unwrap();
    assert_eq!(
        h.loop_task.await.unwrap(),
        DispatchOutcome::RemoteError("connection reset".into())
    );
}

// ---------------------------------------------------------------------------
// Engine: session guard + one-shot path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_session_open_reports_access_denied_and_frees_the_slot() {
    let engine = text_engine(ScriptedGenerator::replying("unused"), None);

    assert!(engine.start_session().await.is_err());
    assert_eq!(engine.status(), SessionStatus::AccessDenied);

    // The slot is free again: a retry fails the same way instead of being
    // swallowed by a stuck busy flag.
    assert!(engine.start_session().await.is_err());
    assert_eq!(engine.status(), SessionStatus::AccessDenied);

    // Stopping with nothing open is a no-op, twice.
    engine.stop_session();
    engine.stop_session();
}

#[tokio::test]
async fn send_text_appends_optimistic_user_turn_then_reply() {
    let engine = text_engine(ScriptedGenerator::replying("four"), None);

    engine.send_text("what is two plus two?").await.unwrap();

    let history = engine.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, "what is two plus two?");
    assert_eq!(history[1].role, Role::Agent);
    assert_eq!(history[1].text, "four");
    assert!(!engine.is_typing());
}

#[tokio::test]
async fn failed_send_text_appends_error_sentinel() {
    let engine = text_engine(ScriptedGenerator::failing(), None);

    engine.send_text("hello?").await.unwrap();

    let history = engine.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::Agent);
    assert_eq!(history[1].text, REPLY_ERROR_TEXT);
    assert!(!engine.is_typing());
}

#[tokio::test]
async fn concurrent_send_text_is_rejected_while_in_flight() {
    let engine = Arc::new(text_engine(
        ScriptedGenerator::slow("late reply", Duration::from_millis(200)),
        None,
    ));

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.send_text("first").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.is_typing());
    assert!(matches!(
        engine.send_text("second").await,
        Err(ConfabError::RequestInFlight)
    ));

    first.await.unwrap().unwrap();
    let history = engine.history();
    assert_eq!(history.len(), 2, "the rejected call left no trace");
    assert_eq!(history[1].text, "late reply");
}

#[tokio::test]
async fn empty_messages_are_ignored() {
    let engine = text_engine(ScriptedGenerator::replying("unused"), None);
    engine.send_text("   ").await.unwrap();
    assert!(engine.history().is_empty());
}

// ---------------------------------------------------------------------------
// History persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_survives_engine_restart_and_clear_erases_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");

    let engine = text_engine(
        ScriptedGenerator::replying("pong"),
        Some(HistoryStore::new(&path)),
    );
    engine.send_text("ping").await.unwrap();
    assert!(path.exists(), "history written on mutation");
    drop(engine);

    let revived = text_engine(
        ScriptedGenerator::replying("unused"),
        Some(HistoryStore::new(&path)),
    );
    let history = revived.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text, "ping");
    assert_eq!(history[1].text, "pong");

    revived.clear_history();
    assert!(revived.history().is_empty());
    assert!(!path.exists(), "persisted copy erased");
}
