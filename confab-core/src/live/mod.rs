//! Remote-service connectivity.
//!
//! Two call paths, each behind a trait so the engine can be driven by
//! scripted fakes in tests:
//!
//! - [`LiveTransport`] — one bidirectional streaming session. `connect`
//!   yields a [`LiveConnection`]: an outbound message sender and a single
//!   ordered channel of [`SessionEvent`]s consumed by the engine's dispatch
//!   loop.
//! - [`TextGenerator`] (in [`rest`]) — one-shot request/response text
//!   exchange, no persistent session.

pub mod rest;
pub mod wire;
pub mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use wire::{ClientMessage, ServerMessage, SessionSetup};

/// Everything a session can observe from the remote side, in delivery order.
#[derive(Debug)]
pub enum SessionEvent {
    /// The session is established; streaming may begin.
    Opened,
    /// One inbound message.
    Message(ServerMessage),
    /// The transport failed; the session is dead.
    Errored(String),
    /// The remote side closed the session.
    Closed,
}

/// One open streaming session.
pub struct LiveConnection {
    /// Outbound messages. Dropping every sender requests a close; the
    /// transport does not wait for an acknowledgement.
    pub outbound: mpsc::Sender<ClientMessage>,
    /// Ordered inbound events for exactly one consumer loop.
    pub events: mpsc::Receiver<SessionEvent>,
}

/// The streaming-session seam.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a session with the given setup. The first event delivered is
    /// [`SessionEvent::Opened`].
    async fn connect(&self, setup: SessionSetup) -> Result<LiveConnection>;
}
