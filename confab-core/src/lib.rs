//! # confab-core
//!
//! Reusable voice/chat client engine for a hosted conversational AI service.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → chunker(spawn_blocking)
//!                                                    │ 16 kHz i16 → base64
//!                                              realtimeInput frames
//!                                                    │
//!                                            WebSocket session ◄──► remote service
//!                                                    │
//!                                       ordered SessionEvent channel
//!                                                    │
//!                                      dispatch loop (one tokio task)
//!                                       │                        │
//!                              ConversationState        decode → Timeline → speaker
//!                                       │
//!                         broadcast::Sender<…Event> → presentation layer
//! ```
//!
//! The audio callbacks are zero-alloc; all heap work happens on the chunker
//! thread or the dispatch task. Text-only exchanges bypass the session
//! entirely through a one-shot request path.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod capture;
pub mod codec;
pub mod config;
pub mod conversation;
pub mod error;
pub mod live;
pub mod playback;
pub mod session;

// Convenience re-exports for downstream crates
pub use codec::{EncodedFrame, PlaybackBuffer};
pub use config::SessionConfig;
pub use conversation::{HistoryStore, Role, Turn};
pub use error::ConfabError;
pub use session::events::{
    ActivityEvent, SessionStatus, StatusEvent, TranscriptEvent, TurnEvent,
};
pub use session::Engine;
