//! Event types broadcast to presentation-layer subscribers.
//!
//! Everything here is a read-only projection of engine state: the engine is
//! the only writer, subscribers render. Serialized forms use camelCase so a
//! JSON-speaking front-end can consume them directly.

use serde::{Deserialize, Serialize};

use crate::conversation::Turn;

/// Connection status of the voice session, as displayed by a front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Engine created, no session ever started.
    Idle,
    /// `start_session()` accepted; waiting on device + remote acknowledgement.
    Connecting,
    /// Session open — streaming audio both ways.
    Active,
    /// Session ended (explicit stop, remote close, or remote error).
    Offline,
    /// Microphone or remote authorization was denied; no session opened.
    AccessDenied,
}

/// Emitted whenever the session status changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: SessionStatus,
    /// Optional human-readable detail (e.g. the error that closed the session).
    pub detail: Option<String>,
}

/// Which transcript accumulator a live-transcript event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptChannel {
    /// What the service heard the user say so far this turn.
    Input,
    /// What the agent has said so far this turn.
    Output,
}

/// Emitted on every streamed transcript delta.
///
/// `text` carries the full accumulated text for the channel, not the delta,
/// so a renderer can replace rather than append.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub channel: TranscriptChannel,
    pub text: String,
}

/// Emitted when a turn is finalized and appended to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnEvent {
    pub turn: Turn,
}

/// Emitted per processed capture chunk — input level for meter UIs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the chunk in [0.0, 1.0].
    pub rms: f32,
}
