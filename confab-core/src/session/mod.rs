//! `Engine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Engine::new(config)
//!     └─► start_session()   → mic + socket open, status = Connecting → Active
//!         │                   (no-op if a session is already connecting/open;
//!         │                    any open failure → status = AccessDenied)
//!         └─► stop_session() → capture stopped, playback stopped, close sent
//!                              fire-and-forget, status = Offline
//! ```
//!
//! Remote error and remote close converge on the same teardown as
//! `stop_session()`; the routine is guarded so double invocation never
//! double-releases a resource or errors.
//!
//! ## Threading
//!
//! cpal streams are `!Send`, so the capture stream lives on the
//! `spawn_blocking` thread that runs the chunker loop, and the playback
//! stream on a parked `spawn_blocking` thread of its own — both created and
//! dropped on their owning thread. A oneshot channel propagates the
//! device-open result back to `start_session()`.

pub mod dispatch;
pub mod events;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::capture::{
    create_capture_ring, run_chunker, AudioCapture, CaptureControl, ChunkerContext,
};
use crate::codec::EncodedFrame;
use crate::config::SessionConfig;
use crate::conversation::{ConversationState, HistoryStore, Turn};
use crate::error::{ConfabError, Result};
use crate::live::{
    rest::{GenerateClient, TextGenerator},
    wire::{ClientMessage, SessionSetup},
    ws::WsTransport,
    LiveTransport,
};
use crate::playback::{PlaybackStream, Timeline};
use dispatch::{DispatchContext, DispatchOutcome};
use events::{ActivityEvent, SessionStatus, StatusEvent, TranscriptEvent, TurnEvent};

/// Broadcast channel capacity for slow subscribers.
const BROADCAST_CAP: usize = 256;

/// Encoded frames buffered between the chunker thread and the forwarder.
const FRAME_QUEUE_CAP: usize = 64;

/// Agent text appended when a one-shot request fails.
pub const REPLY_ERROR_TEXT: &str = "Error: the request could not be completed.";

/// Live resources of the one active session.
struct ActiveSession {
    capture: CaptureControl,
    playback_running: Arc<AtomicBool>,
    /// Held so the writer stays alive; dropped on teardown, which requests
    /// the remote close without waiting for it.
    _outbound: mpsc::Sender<ClientMessage>,
    torn_down: Arc<AtomicBool>,
}

/// The subset of engine state that teardown needs, cloneable into tasks.
#[derive(Clone)]
struct SharedState {
    session: Arc<Mutex<Option<ActiveSession>>>,
    /// True from `start_session()` acceptance until teardown.
    session_busy: Arc<AtomicBool>,
    timeline: Arc<Mutex<Timeline>>,
    status: Arc<Mutex<SessionStatus>>,
    status_tx: broadcast::Sender<StatusEvent>,
}

impl SharedState {
    fn set_status(&self, new_status: SessionStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(StatusEvent {
            status: new_status,
            detail,
        });
    }

    /// Claim the single session slot. Returns false when one is already
    /// connecting or open.
    fn begin_session(&self) -> bool {
        !self.session_busy.swap(true, Ordering::SeqCst)
    }

    /// Release the slot without a session ever having opened.
    fn abort_session(&self, detail: Option<String>) {
        self.set_status(SessionStatus::AccessDenied, detail);
        self.session_busy.store(false, Ordering::SeqCst);
    }

    /// The one teardown routine every close path funnels through.
    fn teardown(&self, detail: Option<String>) {
        let taken = self.session.lock().take();
        if let Some(session) = taken {
            if !session.torn_down.swap(true, Ordering::SeqCst) {
                session.capture.stop();
                session.playback_running.store(false, Ordering::Release);
                self.timeline.lock().interrupt();
                self.set_status(SessionStatus::Offline, detail);
                info!("session closed");
            }
        }
        self.session_busy.store(false, Ordering::SeqCst);
    }
}

/// The top-level engine handle.
///
/// `Engine` is `Send + Sync` — all fields use interior mutability. Wrap in
/// `Arc<Engine>` to share with event-forwarding tasks.
pub struct Engine {
    config: SessionConfig,
    transport: Arc<dyn LiveTransport>,
    generator: Arc<dyn TextGenerator>,
    conversation: Arc<Mutex<ConversationState>>,
    shared: SharedState,
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    turn_tx: broadcast::Sender<TurnEvent>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    /// One-shot serialization guard — true while a text request is out.
    text_inflight: Arc<AtomicBool>,
}

impl Engine {
    /// Create an engine wired to the real remote service and the default
    /// history location.
    pub fn new(config: SessionConfig) -> Self {
        let transport = Arc::new(WsTransport::new(
            config.ws_url.clone(),
            config.api_key.clone(),
        ));
        let generator = Arc::new(GenerateClient::new(&config));
        let store = HistoryStore::at_default_path();
        Self::with_parts(config, transport, generator, Some(store))
    }

    /// Create an engine with explicit transport/generator/store — the
    /// constructor tests and embedders use.
    pub fn with_parts(
        config: SessionConfig,
        transport: Arc<dyn LiveTransport>,
        generator: Arc<dyn TextGenerator>,
        store: Option<HistoryStore>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (transcript_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (turn_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        let timeline = Arc::new(Mutex::new(Timeline::new(config.playback_sample_rate)));

        Self {
            conversation: Arc::new(Mutex::new(ConversationState::new(store))),
            shared: SharedState {
                session: Arc::new(Mutex::new(None)),
                session_busy: Arc::new(AtomicBool::new(false)),
                timeline,
                status: Arc::new(Mutex::new(SessionStatus::Idle)),
                status_tx,
            },
            config,
            transport,
            generator,
            transcript_tx,
            turn_tx,
            activity_tx,
            text_inflight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the voice session: microphone, playback, streaming connection.
    ///
    /// No-op if a session is already connecting or open. On failure the
    /// status becomes `AccessDenied` and the error is returned; nothing
    /// leaks.
    pub async fn start_session(&self) -> Result<()> {
        if !self.shared.begin_session() {
            debug!("session already connecting or open — ignoring start");
            return Ok(());
        }
        self.shared.set_status(SessionStatus::Connecting, None);

        match self.open_session().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.abort_session(Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn open_session(&self) -> Result<()> {
        // ── 1. Microphone ────────────────────────────────────────────────
        let control = CaptureControl::new();
        let (frame_tx, frame_rx) = mpsc::channel::<EncodedFrame>(FRAME_QUEUE_CAP);
        let (open_tx, open_rx) = oneshot::channel::<Result<u32>>();

        let (producer, consumer) = create_capture_ring();
        let chunker_control = control.clone();
        let target_sample_rate = self.config.capture_sample_rate;
        let chunk_samples = self.config.capture_chunk_samples;
        let preferred = self.config.preferred_input_device.clone();
        let activity_tx = self.activity_tx.clone();

        tokio::task::spawn_blocking(move || {
            // Device open must happen on THIS thread — cpal::Stream is !Send.
            let capture =
                match AudioCapture::open(producer, &chunker_control, preferred.as_deref()) {
                    Ok(c) => {
                        let _ = open_tx.send(Ok(c.sample_rate));
                        c
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

            let device_sample_rate = capture.sample_rate;
            run_chunker(ChunkerContext {
                consumer,
                control: chunker_control,
                device_sample_rate,
                target_sample_rate,
                chunk_samples,
                frame_tx,
                activity_tx,
            });

            // Stream drops here, releasing the microphone on this thread.
            drop(capture);
        });

        match open_rx.await {
            Ok(Ok(rate)) => debug!(device_rate = rate, "microphone open"),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ConfabError::AudioStream(
                    "capture task died before opening".into(),
                ))
            }
        }

        // ── 2. Streaming connection ──────────────────────────────────────
        let setup = SessionSetup::from_config(&self.config);
        let connection = match self.transport.connect(setup).await {
            Ok(c) => c,
            Err(e) => {
                control.stop();
                return Err(e);
            }
        };

        // ── 3. Open: bind capture to the uplink, start playback ─────────
        *self.shared.timeline.lock() = Timeline::new(self.config.playback_sample_rate);

        let playback_running = Arc::new(AtomicBool::new(true));
        let playback_flag = Arc::clone(&playback_running);
        let playback_timeline = Arc::clone(&self.shared.timeline);
        let playback_rate = self.config.playback_sample_rate;
        tokio::task::spawn_blocking(move || {
            run_playback(playback_timeline, playback_rate, playback_flag)
        });

        let uplink = connection.outbound.clone();
        tokio::spawn(forward_frames(frame_rx, uplink));

        control.set_streaming(true);
        self.shared.set_status(SessionStatus::Active, None);
        info!("session active");

        *self.shared.session.lock() = Some(ActiveSession {
            capture: control,
            playback_running,
            _outbound: connection.outbound,
            torn_down: Arc::new(AtomicBool::new(false)),
        });

        // ── 4. Dispatch loop ─────────────────────────────────────────────
        let ctx = DispatchContext {
            conversation: Arc::clone(&self.conversation),
            timeline: Arc::clone(&self.shared.timeline),
            playback_sample_rate: self.config.playback_sample_rate,
            transcript_tx: self.transcript_tx.clone(),
            turn_tx: self.turn_tx.clone(),
        };
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let outcome = dispatch::run(connection.events, ctx).await;
            let detail = match outcome {
                DispatchOutcome::RemoteError(e) => Some(e),
                DispatchOutcome::RemoteClosed | DispatchOutcome::ChannelDropped => None,
            };
            shared.teardown(detail);
        });

        Ok(())
    }

    /// Close the voice session and release every local resource.
    ///
    /// Safe to call at any time, any number of times: with no session open
    /// (or one already closing) it does nothing.
    pub fn stop_session(&self) {
        self.shared.teardown(None);
    }

    /// Send one text message over the one-shot path.
    ///
    /// Appends the user turn immediately, then the agent turn when the reply
    /// resolves — or an error-sentinel agent turn if it fails. Returns
    /// `RequestInFlight` (with no side effects) while a previous call is
    /// still outstanding. Empty messages are ignored.
    pub async fn send_text(&self, message: &str) -> Result<()> {
        let msg = message.trim().to_string();
        if msg.is_empty() {
            return Ok(());
        }
        if self.text_inflight.swap(true, Ordering::SeqCst) {
            return Err(ConfabError::RequestInFlight);
        }

        let user = self.conversation.lock().push_user(&msg);
        let _ = self.turn_tx.send(TurnEvent { turn: user });

        let agent = match self.generator.generate(&msg).await {
            Ok(text) => self.conversation.lock().push_agent(text),
            Err(e) => {
                warn!("one-shot request failed: {e}");
                self.conversation.lock().push_agent(REPLY_ERROR_TEXT)
            }
        };
        let _ = self.turn_tx.send(TurnEvent { turn: agent });

        self.text_inflight.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// True while a one-shot request is outstanding (the typing indicator).
    pub fn is_typing(&self) -> bool {
        self.text_inflight.load(Ordering::SeqCst)
    }

    /// Current session status (snapshot).
    pub fn status(&self) -> SessionStatus {
        *self.shared.status.lock()
    }

    /// Finalized turn history, oldest first (snapshot).
    pub fn history(&self) -> Vec<Turn> {
        self.conversation.lock().history().to_vec()
    }

    /// Drop all history and its persisted copy. Irreversible.
    pub fn clear_history(&self) {
        self.conversation.lock().clear();
    }

    /// Subscribe to session status changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.shared.status_tx.subscribe()
    }

    /// Subscribe to live transcript accumulator updates.
    pub fn subscribe_transcripts(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.transcript_tx.subscribe()
    }

    /// Subscribe to finalized turns.
    pub fn subscribe_turns(&self) -> broadcast::Receiver<TurnEvent> {
        self.turn_tx.subscribe()
    }

    /// Subscribe to capture input-level events.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }
}

/// Keep the playback stream alive on its owning thread until told to stop.
fn run_playback(timeline: Arc<Mutex<Timeline>>, sample_rate: u32, running: Arc<AtomicBool>) {
    let stream = match PlaybackStream::open(timeline, sample_rate) {
        Ok(s) => s,
        Err(e) => {
            // Transcripts still work without audible output.
            warn!("playback unavailable: {e}");
            return;
        }
    };
    while running.load(Ordering::Acquire) {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    drop(stream);
}

/// Forward encoded capture frames to the session uplink.
///
/// Ends when capture stops (frame channel closes) or the session closes
/// (uplink channel closes). A full uplink drops the frame — stale audio is
/// worse than missing audio.
async fn forward_frames(
    mut frame_rx: mpsc::Receiver<EncodedFrame>,
    uplink: mpsc::Sender<ClientMessage>,
) {
    while let Some(frame) = frame_rx.recv().await {
        match uplink.try_send(ClientMessage::realtime_input(frame)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("uplink congested: dropped capture frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
    debug!("uplink forwarder finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_shared() -> SharedState {
        let (status_tx, _) = broadcast::channel(8);
        SharedState {
            session: Arc::new(Mutex::new(None)),
            session_busy: Arc::new(AtomicBool::new(false)),
            timeline: Arc::new(Mutex::new(Timeline::new(24_000))),
            status: Arc::new(Mutex::new(SessionStatus::Idle)),
            status_tx,
        }
    }

    fn test_session(capture: CaptureControl) -> ActiveSession {
        let (outbound, _rx) = mpsc::channel(1);
        ActiveSession {
            capture,
            playback_running: Arc::new(AtomicBool::new(true)),
            _outbound: outbound,
            torn_down: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn session_slot_admits_exactly_one() {
        let shared = test_shared();
        assert!(shared.begin_session());
        assert!(!shared.begin_session(), "second start must be refused");
        shared.teardown(None);
        assert!(shared.begin_session(), "slot reopens after teardown");
    }

    #[test]
    fn teardown_is_idempotent_and_releases_everything() {
        let shared = test_shared();
        assert!(shared.begin_session());

        let capture = CaptureControl::new();
        *shared.session.lock() = Some(test_session(capture.clone()));
        shared.timeline.lock().schedule(&crate::codec::PlaybackBuffer {
            samples: vec![0.1; 100],
            sample_rate: 24_000,
            channels: 1,
        });

        let mut status_rx = shared.status_tx.subscribe();
        shared.teardown(None);

        assert!(!capture.is_running(), "capture stopped");
        assert_eq!(shared.timeline.lock().active_sources(), 0, "no dangling sources");
        assert_eq!(*shared.status.lock(), SessionStatus::Offline);
        assert!(!shared.session_busy.load(Ordering::SeqCst));

        // Second teardown: no panic, no second status event.
        shared.teardown(None);
        let first = status_rx.try_recv().expect("one offline event");
        assert_eq!(first.status, SessionStatus::Offline);
        assert!(status_rx.try_recv().is_err(), "teardown must not emit twice");
    }

    #[test]
    fn abort_marks_access_denied_and_frees_slot() {
        let shared = test_shared();
        assert!(shared.begin_session());
        shared.abort_session(Some("mic refused".into()));
        assert_eq!(*shared.status.lock(), SessionStatus::AccessDenied);
        assert!(shared.begin_session());
    }
}
