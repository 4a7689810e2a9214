use thiserror::Error;

/// All errors produced by confab-core.
#[derive(Debug, Error)]
pub enum ConfabError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("microphone or remote authorization denied: {0}")]
    PermissionDenied(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("audio payload decode error: {0}")]
    Decode(String),

    #[error("one-shot request failed: {0}")]
    Request(String),

    #[error("a text request is already in flight")]
    RequestInFlight,

    #[error("history storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ConfabError>;
