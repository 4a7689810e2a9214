//! The inbound consumer loop.
//!
//! Exactly one task runs [`run`] per session, consuming the transport's
//! ordered event channel. Message handling order matches the service's
//! contract: transcript deltas first, then turn completion, then inline
//! audio, then the interruption flag.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::codec::{self, PlaybackBuffer};
use crate::conversation::ConversationState;
use crate::live::{wire::ServerMessage, SessionEvent};
use crate::playback::Timeline;
use crate::session::events::{TranscriptChannel, TranscriptEvent, TurnEvent};

/// State the dispatch loop reads and mutates.
pub struct DispatchContext {
    pub conversation: Arc<Mutex<ConversationState>>,
    pub timeline: Arc<Mutex<Timeline>>,
    /// Rate assumed for inline audio whose MIME tag carries none.
    pub playback_sample_rate: u32,
    pub transcript_tx: broadcast::Sender<TranscriptEvent>,
    pub turn_tx: broadcast::Sender<TurnEvent>,
}

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The remote side closed the session.
    RemoteClosed,
    /// The transport reported a failure.
    RemoteError(String),
    /// Every event sender was dropped (local teardown).
    ChannelDropped,
}

/// Consume events until the session ends, then report why.
pub async fn run(
    mut events: mpsc::Receiver<SessionEvent>,
    ctx: DispatchContext,
) -> DispatchOutcome {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Opened => debug!("session opened"),
            SessionEvent::Message(msg) => handle_message(&ctx, &msg),
            SessionEvent::Errored(e) => {
                warn!("session transport error: {e}");
                return DispatchOutcome::RemoteError(e);
            }
            SessionEvent::Closed => return DispatchOutcome::RemoteClosed,
        }
    }
    DispatchOutcome::ChannelDropped
}

/// Apply one inbound message to conversation and playback state.
pub fn handle_message(ctx: &DispatchContext, msg: &ServerMessage) {
    let Some(content) = &msg.server_content else {
        return;
    };

    if let Some(t) = &content.input_transcription {
        let mut conversation = ctx.conversation.lock();
        let accumulated = conversation.on_partial_input(&t.text).to_string();
        let _ = ctx.transcript_tx.send(TranscriptEvent {
            channel: TranscriptChannel::Input,
            text: accumulated,
        });
    }

    if let Some(t) = &content.output_transcription {
        let mut conversation = ctx.conversation.lock();
        let accumulated = conversation.on_partial_output(&t.text).to_string();
        let _ = ctx.transcript_tx.send(TranscriptEvent {
            channel: TranscriptChannel::Output,
            text: accumulated,
        });
    }

    if content.turn_complete {
        let (user, agent) = ctx.conversation.lock().on_turn_complete();
        let _ = ctx.turn_tx.send(TurnEvent { turn: user });
        let _ = ctx.turn_tx.send(TurnEvent { turn: agent });
        // Accumulators are empty again; tell renderers to clear.
        let _ = ctx.transcript_tx.send(TranscriptEvent {
            channel: TranscriptChannel::Input,
            text: String::new(),
        });
        let _ = ctx.transcript_tx.send(TranscriptEvent {
            channel: TranscriptChannel::Output,
            text: String::new(),
        });
    }

    if let Some(blob) = msg.inline_audio() {
        let rate = rate_from_mime(&blob.mime_type).unwrap_or(ctx.playback_sample_rate);
        match codec::decode(&blob.data)
            .and_then(|bytes| PlaybackBuffer::from_pcm16le(&bytes, rate, 1))
        {
            Ok(buffer) => {
                ctx.timeline.lock().schedule(&buffer);
            }
            // Malformed fragments are dropped; the session continues.
            Err(e) => warn!("dropping undecodable audio fragment: {e}"),
        }
    }

    if content.interrupted {
        debug!("remote interruption — stopping all scheduled playback");
        ctx.timeline.lock().interrupt();
    }
}

/// Parse the rate out of a tag like `audio/pcm;rate=24000`.
fn rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_parses_from_mime_tag() {
        assert_eq!(rate_from_mime("audio/pcm;rate=24000"), Some(24_000));
        assert_eq!(rate_from_mime("audio/pcm; rate=16000"), Some(16_000));
        assert_eq!(rate_from_mime("audio/pcm"), None);
        assert_eq!(rate_from_mime("audio/pcm;rate=abc"), None);
    }
}
