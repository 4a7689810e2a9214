//! Conversation state: live transcript accumulators and finalized turn
//! history.
//!
//! Streamed transcript deltas land in two pending buffers (user input, agent
//! output). A turn-complete signal folds both buffers into finalized [`Turn`]s
//! appended to history; the buffers are cleared at exactly that moment.
//! History is append-only from the outside — it only ever grows, or is
//! bulk-cleared.

pub mod store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use store::HistoryStore;

/// Placeholder text for a voice turn whose input transcription never arrived.
pub const VOICE_PLACEHOLDER: &str = "(Voice)";

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// One complete utterance/message, attributed and timestamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// RFC 3339 completion timestamp.
    pub time: String,
}

impl Turn {
    /// Build a turn stamped with the current time.
    pub fn now(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            time: Utc::now().to_rfc3339(),
        }
    }
}

/// Accumulators plus persisted turn history.
///
/// Mutated only through the explicit methods below; the engine holds it
/// behind a mutex and subscribers only ever see cloned projections.
pub struct ConversationState {
    pending_input: String,
    pending_output: String,
    turns: Vec<Turn>,
    store: Option<HistoryStore>,
}

impl ConversationState {
    /// Create the state, loading any persisted history once.
    ///
    /// A `None` store keeps the conversation purely in memory.
    pub fn new(store: Option<HistoryStore>) -> Self {
        let turns = match &store {
            Some(s) => s.load().unwrap_or_else(|e| {
                warn!("failed to load history: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Self {
            pending_input: String::new(),
            pending_output: String::new(),
            turns,
            store,
        }
    }

    /// Append a streamed delta of the user's transcribed speech.
    /// Returns the accumulated input text.
    pub fn on_partial_input(&mut self, delta: &str) -> &str {
        self.pending_input.push_str(delta);
        &self.pending_input
    }

    /// Append a streamed delta of the agent's transcribed speech.
    /// Returns the accumulated output text.
    pub fn on_partial_output(&mut self, delta: &str) -> &str {
        self.pending_output.push_str(delta);
        &self.pending_output
    }

    /// Finalize the current exchange: one user turn, one agent turn, both
    /// accumulators cleared. An empty input accumulator becomes the literal
    /// voice placeholder, never an empty string.
    pub fn on_turn_complete(&mut self) -> (Turn, Turn) {
        let input = std::mem::take(&mut self.pending_input);
        let output = std::mem::take(&mut self.pending_output);
        let user = Turn::now(
            Role::User,
            if input.is_empty() {
                VOICE_PLACEHOLDER.to_string()
            } else {
                input
            },
        );
        let agent = Turn::now(Role::Agent, output);
        self.turns.push(user.clone());
        self.turns.push(agent.clone());
        self.persist();
        (user, agent)
    }

    /// Append a user turn directly (the optimistic half of a text exchange).
    pub fn push_user(&mut self, text: impl Into<String>) -> Turn {
        let turn = Turn::now(Role::User, text);
        self.turns.push(turn.clone());
        self.persist();
        turn
    }

    /// Append an agent turn directly (a resolved or error-sentinel reply).
    pub fn push_agent(&mut self, text: impl Into<String>) -> Turn {
        let turn = Turn::now(Role::Agent, text);
        self.turns.push(turn.clone());
        self.persist();
        turn
    }

    /// Finalized turn history, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    /// Accumulated-but-unfinalized input text.
    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    /// Accumulated-but-unfinalized output text.
    pub fn pending_output(&self) -> &str {
        &self.pending_output
    }

    /// Drop all history and erase the persisted copy. Irreversible.
    pub fn clear(&mut self) {
        self.turns.clear();
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!("failed to erase persisted history: {e}");
            }
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.turns) {
                warn!("failed to persist history: {e}");
            }
        }
    }
}
