//! Audio output: a cpal stream driven by the shared [`Timeline`].
//!
//! The output callback renders the timeline into the device buffer. The
//! timeline mutex is taken with `try_lock` — if the dispatch task holds it
//! (scheduling or interrupting), the callback writes one buffer of silence
//! instead of blocking the audio thread. Contention windows are a few
//! microseconds, so an audible dropout would need pathological load.
//!
//! Like capture, `cpal::Stream` is `!Send`; the session opens and drops
//! `PlaybackStream` on a dedicated blocking thread.

pub mod timeline;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

pub use timeline::{SourceId, Timeline};

/// Handle to an active output stream.
///
/// **Not `Send`** — bound to its creation thread.
pub struct PlaybackStream {
    #[cfg(feature = "audio-cpal")]
    _stream: cpal::Stream,
}

#[cfg(feature = "audio-cpal")]
impl PlaybackStream {
    /// Open the default output device at `sample_rate` and start rendering
    /// from `timeline`.
    ///
    /// The stream runs at exactly the downlink rate (24 kHz mono content,
    /// replicated across the device's channels). Devices that refuse that
    /// rate fail to open; supporting other rates is outside this system's
    /// contract.
    pub fn open(timeline: Arc<Mutex<Timeline>>, sample_rate: u32) -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use cpal::{SampleRate, StreamConfig};

        use crate::error::ConfabError;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| ConfabError::AudioDevice("no default output device".into()))?;

        tracing::info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate,
            "opening output device"
        );

        let channels = device
            .default_output_config()
            .map_err(|e| ConfabError::AudioDevice(e.to_string()))?
            .channels();

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels as usize;
        let mut mono_buf: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info| {
                    let frames = data.len() / ch;
                    mono_buf.resize(frames, 0.0);
                    match timeline.try_lock() {
                        Some(mut tl) => tl.render(&mut mono_buf),
                        None => mono_buf.fill(0.0),
                    }
                    for f in 0..frames {
                        let base = f * ch;
                        for c in 0..ch {
                            data[base + c] = mono_buf[f];
                        }
                    }
                },
                |err| tracing::error!("playback stream error: {err}"),
                None,
            )
            .map_err(|e| ConfabError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ConfabError::AudioStream(e.to_string()))?;

        Ok(Self { _stream: stream })
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl PlaybackStream {
    pub fn open(_timeline: Arc<Mutex<Timeline>>, _sample_rate: u32) -> Result<Self> {
        use crate::error::ConfabError;
        Err(ConfabError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}
