//! Wire types for the remote service.
//!
//! Two surfaces share these shapes: the streaming session (WebSocket, §ws)
//! and the one-shot text call (REST, §rest). Field names are camelCase on
//! the wire; serde does the renaming so the Rust side stays idiomatic.

use serde::{Deserialize, Serialize};

use crate::codec::EncodedFrame;
use crate::config::SessionConfig;

// ---------------------------------------------------------------------------
// Shared content shapes
// ---------------------------------------------------------------------------

/// A role-attributed list of parts (text and/or inline binary payloads).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
            role: Some("user".into()),
        }
    }

    pub fn system_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
            role: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

/// A MIME-tagged base64 payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

// ---------------------------------------------------------------------------
// Outbound (client → service)
// ---------------------------------------------------------------------------

/// One outbound streaming message. Exactly one field is populated per send.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup: Option<SessionSetup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_input: Option<RealtimeInput>,
}

impl ClientMessage {
    pub fn setup(setup: SessionSetup) -> Self {
        Self {
            setup: Some(setup),
            ..Self::default()
        }
    }

    pub fn realtime_input(frame: EncodedFrame) -> Self {
        Self {
            realtime_input: Some(RealtimeInput {
                media: Blob {
                    mime_type: frame.mime_type,
                    data: frame.data,
                },
            }),
            ..Self::default()
        }
    }
}

/// Session configuration sent as the first streaming message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Presence enables transcription of what the service hears.
    pub input_audio_transcription: TranscriptionSetting,
    /// Presence enables transcription of what the agent says.
    pub output_audio_transcription: TranscriptionSetting,
}

impl SessionSetup {
    pub fn from_config(config: &SessionConfig) -> Self {
        let system_instruction = if config.system_instruction.is_empty() {
            None
        } else {
            Some(Content::system_text(config.system_instruction.clone()))
        };
        Self {
            model: format!("models/{}", config.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".into()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice.clone(),
                        },
                    },
                },
            },
            system_instruction,
            input_audio_transcription: TranscriptionSetting {},
            output_audio_transcription: TranscriptionSetting {},
        }
    }
}

/// Empty on purpose — the field's presence is the switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionSetting {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// A frame of live media.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media: Blob,
}

// ---------------------------------------------------------------------------
// Inbound (service → client)
// ---------------------------------------------------------------------------

/// One inbound streaming message. Any combination of fields may be present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    /// Delta of the transcription of the user's speech.
    pub input_transcription: Option<Transcription>,
    /// Delta of the transcription of the agent's speech.
    pub output_transcription: Option<Transcription>,
    /// The current exchange is complete; accumulators should be finalized.
    pub turn_complete: bool,
    /// The user barged in — all scheduled playback must stop now.
    pub interrupted: bool,
    /// Agent output parts, including inline audio payloads.
    pub model_turn: Option<Content>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transcription {
    pub text: String,
}

impl ServerMessage {
    /// First inline audio payload of the model turn, if any.
    pub fn inline_audio(&self) -> Option<&Blob> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
    }
}
