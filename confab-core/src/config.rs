//! Session configuration.

use crate::codec::{CAPTURE_CHUNK_SAMPLES, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};

/// Configuration for a Confab engine instance.
///
/// The audio parameters are part of the wire contract and rarely need
/// changing; the identity fields (model, voice, system instruction, API key)
/// always come from the caller.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote model identifier used for both streaming and one-shot calls.
    pub model: String,
    /// Prebuilt voice name for audio responses.
    pub voice: String,
    /// System instruction sent with every session and one-shot call.
    pub system_instruction: String,
    /// API key for the remote service.
    pub api_key: String,
    /// Base URL of the one-shot REST API.
    pub rest_base_url: String,
    /// WebSocket URL of the streaming session API.
    pub ws_url: String,
    /// Uplink sample rate (Hz). Default: 16000.
    pub capture_sample_rate: u32,
    /// Downlink sample rate (Hz). Default: 24000.
    pub playback_sample_rate: u32,
    /// Samples per outbound capture block. Default: 4096.
    pub capture_chunk_samples: usize,
    /// Preferred input device name; `None` selects the system default.
    pub preferred_input_device: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".into(),
            voice: "Zephyr".into(),
            system_instruction: String::new(),
            api_key: String::new(),
            rest_base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            ws_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".into(),
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            capture_chunk_samples: CAPTURE_CHUNK_SAMPLES,
            preferred_input_device: None,
        }
    }
}
