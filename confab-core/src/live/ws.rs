//! WebSocket implementation of [`LiveTransport`].
//!
//! A reader task turns socket frames into ordered [`SessionEvent`]s; a
//! writer task drains the outbound channel into the socket and sends a close
//! frame when the channel is dropped (fire-and-forget — nobody waits for the
//! close acknowledgement).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::error::{ConfabError, Result};
use crate::live::{
    wire::{ClientMessage, ServerMessage, SessionSetup},
    LiveConnection, LiveTransport, SessionEvent,
};

/// Queue depths. Outbound is sized for roughly ten seconds of capture
/// frames; inbound for a burst of transcript deltas plus audio.
const OUTBOUND_CAP: usize = 64;
const EVENTS_CAP: usize = 256;

pub struct WsTransport {
    url: String,
    api_key: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LiveTransport for WsTransport {
    async fn connect(&self, setup: SessionSetup) -> Result<LiveConnection> {
        let url = format!("{}?key={}", self.url, self.api_key);
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ConfabError::Transport(format!("websocket connect: {e}")))?;
        let (mut sink, mut stream) = socket.split();

        // The setup message must be first on the wire, before any media.
        let setup_json = serde_json::to_string(&ClientMessage::setup(setup))
            .map_err(|e| ConfabError::Transport(format!("encode setup: {e}")))?;
        sink.send(Message::Text(setup_json))
            .await
            .map_err(|e| ConfabError::Transport(format!("send setup: {e}")))?;

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(OUTBOUND_CAP);
        let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(EVENTS_CAP);

        let _ = events_tx.send(SessionEvent::Opened).await;

        // Writer: outbound channel → socket.
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("failed to encode outbound message: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    warn!("websocket send failed: {e}");
                    break;
                }
            }
            // Channel closed: request a close, don't wait for the reply.
            let _ = sink.send(Message::Close(None)).await;
            debug!("websocket writer finished");
        });

        // Reader: socket → ordered events.
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        forward_payload(&events_tx, text.as_bytes()).await;
                    }
                    Ok(Message::Binary(bytes)) => {
                        forward_payload(&events_tx, &bytes).await;
                    }
                    Ok(Message::Close(_)) => {
                        let _ = events_tx.send(SessionEvent::Closed).await;
                        return;
                    }
                    Ok(_) => {} // ping/pong handled by tungstenite
                    Err(e) => {
                        let _ = events_tx.send(SessionEvent::Errored(e.to_string())).await;
                        return;
                    }
                }
            }
            let _ = events_tx.send(SessionEvent::Closed).await;
        });

        Ok(LiveConnection {
            outbound: outbound_tx,
            events: events_rx,
        })
    }
}

async fn forward_payload(events_tx: &mpsc::Sender<SessionEvent>, payload: &[u8]) {
    match serde_json::from_slice::<ServerMessage>(payload) {
        Ok(msg) => {
            let _ = events_tx.send(SessionEvent::Message(msg)).await;
        }
        Err(e) => warn!("unparseable inbound message dropped: {e}"),
    }
}
