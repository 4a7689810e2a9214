//! PCM codec: conversions between raw audio bytes, the transport-safe text
//! encoding, and playable float buffers.
//!
//! The wire contract is fixed: outbound audio is 16 kHz mono little-endian
//! 16-bit PCM, base64-encoded; inbound audio is the same PCM layout at
//! 24 kHz. Everything in this module is a pure function.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{ConfabError, Result};

/// Sample rate the remote service expects on the uplink (Hz).
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio returned by the remote service (Hz).
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Samples per outbound capture block.
pub const CAPTURE_CHUNK_SAMPLES: usize = 4096;

/// MIME descriptor attached to every outbound frame.
pub const PCM_MIME_16K: &str = "audio/pcm;rate=16000";

/// One capture block, encoded and ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Base64 text of the little-endian i16 PCM bytes.
    pub data: String,
    /// MIME descriptor identifying sample rate and encoding.
    pub mime_type: String,
}

impl EncodedFrame {
    /// Encode a block of mono f32 samples into a 16 kHz PCM frame.
    pub fn from_samples(samples: &[f32]) -> Self {
        Self {
            data: encode(&f32_to_pcm16le(samples)),
            mime_type: PCM_MIME_16K.to_string(),
        }
    }
}

/// Transport-safe text encoding of a raw byte buffer. Total for any length.
pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Exact inverse of [`encode`].
pub fn decode(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| ConfabError::Decode(format!("base64: {e}")))
}

/// Pack f32 samples in [-1, 1] into little-endian i16 bytes.
///
/// Values are scaled by 32768 and clamped to the i16 range, so overshoot at
/// exactly full scale saturates instead of wrapping around.
pub fn f32_to_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s * 32768.0).clamp(-32768.0, 32767.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Unpack little-endian i16 bytes into normalized f32 samples in [-1, 1].
///
/// Fails when the byte length is not a multiple of two.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(ConfabError::Decode(format!(
            "odd PCM byte length: {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect())
}

/// A decoded audio buffer ready for scheduling.
///
/// Samples are interleaved when `channels > 1`; this system only ever
/// produces mono buffers, but the layout is explicit so the duration math
/// stays honest.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    /// Normalized float samples in [-1.0, 1.0], interleaved.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (1 for this system).
    pub channels: u16,
}

impl PlaybackBuffer {
    /// Interpret raw bytes as little-endian i16 PCM at the given rate and
    /// channel count.
    ///
    /// Fails when `channels` is zero or the byte length is not a multiple of
    /// 2 bytes per sample per channel.
    pub fn from_pcm16le(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(ConfabError::Decode("zero channel count".into()));
        }
        let frame_bytes = 2 * channels as usize;
        if bytes.len() % frame_bytes != 0 {
            return Err(ConfabError::Decode(format!(
                "{} bytes is not a whole number of {}-byte frames",
                bytes.len(),
                frame_bytes
            )));
        }
        Ok(Self {
            samples: pcm16le_to_f32(bytes)?,
            sample_rate,
            channels,
        })
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
