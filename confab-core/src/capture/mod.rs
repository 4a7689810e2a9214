//! Microphone capture and the uplink chunker.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** allocate, block on a lock, or perform I/O. The callback
//! therefore only downmixes into a reused scratch buffer and pushes into a
//! lock-free SPSC ring; all heap work (resampling, block cutting, encoding)
//! happens on the chunker thread.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread; the
//! session accomplishes this by opening it inside `spawn_blocking` and
//! running [`run_chunker`] on that thread until stopped.

pub mod chunker;
pub mod device;
pub mod resample;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ringbuf::{traits::Split, HeapRb};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::codec::EncodedFrame;
use crate::error::{ConfabError, Result};
use crate::session::events::ActivityEvent;
use chunker::{compute_rms, FrameChunker};
use resample::RateConverter;

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half of the capture ring — held by the audio callback.
pub type CaptureProducer = ringbuf::HeapProd<f32>;

/// Consumer half of the capture ring — held by the chunker thread.
pub type CaptureConsumer = ringbuf::HeapCons<f32>;

/// Ring capacity: 2^20 = 1 048 576 f32 samples ≈ 21.8 s at 48 kHz.
/// Far more headroom than one network hiccup needs.
pub const RING_CAPACITY: usize = 1 << 20;

/// Samples drained from the ring per chunker iteration (20 ms at 48 kHz).
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY_MS: u64 = 5;

/// Create a matched producer/consumer pair for the capture ring.
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

/// `Send` control half of an open capture: flags shared with the callback
/// and the chunker loop.
#[derive(Clone)]
pub struct CaptureControl {
    running: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
}

impl CaptureControl {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            streaming: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Allow frames to flow to the sink (flipped once the session opens).
    pub fn set_streaming(&self, on: bool) {
        self.streaming.store(on, Ordering::Release);
    }

    /// Stop capture: the callback no-ops, the chunker loop exits and the
    /// stream is dropped on its owning thread. Idempotent — double-stop or
    /// stop after natural closure is a no-op.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }
}

impl Default for CaptureControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an active input stream.
///
/// **Not `Send`** — bound to its creation thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: cpal::Stream,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

#[cfg(feature = "audio-cpal")]
impl AudioCapture {
    /// Open an input device (preferred name, else system default) and push
    /// mono f32 frames into `producer` while `control` is running.
    ///
    /// Open failures are reported as [`ConfabError::PermissionDenied`]: on
    /// every supported backend a refused or absent microphone surfaces here,
    /// and the session maps it to the access-denied status rather than
    /// crashing.
    pub fn open(
        producer: CaptureProducer,
        control: &CaptureControl,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use cpal::{SampleFormat, SampleRate, StreamConfig};

        let host = cpal::default_host();
        let mut selected = None;

        if let Some(preferred) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected = devices
                        .find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred input device '{preferred}' not found, falling back");
                    }
                }
                Err(e) => warn!("failed to list input devices: {e}"),
            }
        }

        let device = match selected.or_else(|| host.default_input_device()) {
            Some(d) => d,
            None => {
                return Err(ConfabError::PermissionDenied(
                    ConfabError::NoDefaultInputDevice.to_string(),
                ))
            }
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| ConfabError::PermissionDenied(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = Arc::clone(&control.running);
        let ch = channels as usize;

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let mut producer = producer;
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        push_mono(&mut producer, &mut mix_buf, data, ch, |s| s);
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }
            SampleFormat::I16 => {
                let mut producer = producer;
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        push_mono(&mut producer, &mut mix_buf, data, ch, |s| {
                            s as f32 / 32768.0
                        });
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }
            fmt => {
                return Err(ConfabError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| ConfabError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ConfabError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open(
        _producer: CaptureProducer,
        _control: &CaptureControl,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(ConfabError::PermissionDenied(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

/// Downmix an interleaved callback buffer to mono and push it into the ring.
/// Reuses `mix_buf`; the only allocation is its first-use growth.
#[cfg(feature = "audio-cpal")]
fn push_mono<T: Copy>(
    producer: &mut CaptureProducer,
    mix_buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    to_f32: impl Fn(T) -> f32,
) {
    let frames = data.len() / channels;
    mix_buf.resize(frames, 0.0);
    for f in 0..frames {
        let base = f * channels;
        let mut sum = 0f32;
        for c in 0..channels {
            sum += to_f32(data[base + c]);
        }
        mix_buf[f] = sum / channels as f32;
    }
    let written = producer.push_slice(mix_buf);
    if written < mix_buf.len() {
        warn!("capture ring full: dropped {} frames", mix_buf.len() - written);
    }
}

/// Everything the chunker loop needs, passed as one struct.
pub struct ChunkerContext {
    pub consumer: CaptureConsumer,
    pub control: CaptureControl,
    /// Device rate, as reported by [`AudioCapture::open`].
    pub device_sample_rate: u32,
    /// Wire rate (16 kHz).
    pub target_sample_rate: u32,
    /// Samples per outbound frame (4096).
    pub chunk_samples: usize,
    /// Where completed frames go. `try_send`; a full queue drops the frame
    /// with a warning rather than stalling capture.
    pub frame_tx: mpsc::Sender<EncodedFrame>,
    /// Input-level events for meter UIs.
    pub activity_tx: broadcast::Sender<ActivityEvent>,
}

/// Run the blocking chunker loop until the control says stop.
///
/// Per iteration: drain the ring, resample to the wire rate, emit an RMS
/// activity event, and (once streaming) cut fixed-size blocks into encoded
/// frames.
pub fn run_chunker(mut ctx: ChunkerContext) {
    info!("capture chunker started");

    let mut converter = match RateConverter::new(
        ctx.device_sample_rate,
        ctx.target_sample_rate,
        DRAIN_CHUNK,
    ) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to create rate converter: {e}");
            return;
        }
    };

    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut chunker = FrameChunker::new(ctx.chunk_samples);
    let mut activity_seq = 0u64;
    let mut frames_sent = 0usize;
    let mut frames_dropped = 0usize;

    while ctx.control.is_running() {
        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(std::time::Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }

        let resampled = converter.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial block — waiting for more input to fill rubato's buffer
            continue;
        }

        let rms = compute_rms(&resampled);
        let _ = ctx.activity_tx.send(ActivityEvent {
            seq: activity_seq,
            rms,
        });
        activity_seq = activity_seq.saturating_add(1);

        if !ctx.control.is_streaming() {
            continue;
        }

        chunker.push(&resampled, |frame| {
            match ctx.frame_tx.try_send(frame) {
                Ok(()) => frames_sent += 1,
                Err(_) => {
                    frames_dropped += 1;
                    warn!("uplink queue full: dropped capture frame");
                }
            }
        });
    }

    debug!(
        frames_sent,
        frames_dropped,
        pending = chunker.pending(),
        "capture chunker stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_stop_is_idempotent() {
        let control = CaptureControl::new();
        assert!(control.is_running());
        control.stop();
        assert!(!control.is_running());
        control.stop();
        assert!(!control.is_running());
    }

    #[test]
    fn chunker_loop_emits_frames_once_streaming() {
        let (mut producer, consumer) = create_capture_ring();
        let control = CaptureControl::new();
        control.set_streaming(true);
        let (frame_tx, mut frame_rx) = mpsc::channel(16);
        let (activity_tx, mut activity_rx) = broadcast::channel(16);

        // Two full blocks at the wire rate (passthrough — no resampling).
        producer.push_slice(&vec![0.25f32; 4096 * 2]);

        let loop_control = control.clone();
        let handle = std::thread::spawn(move || {
            run_chunker(ChunkerContext {
                consumer,
                control: loop_control,
                device_sample_rate: 16_000,
                target_sample_rate: 16_000,
                chunk_samples: 4096,
                frame_tx,
                activity_tx,
            })
        });

        let mut frames = Vec::new();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while frames.len() < 2 && std::time::Instant::now() < deadline {
            match frame_rx.try_recv() {
                Ok(f) => frames.push(f),
                Err(_) => std::thread::sleep(std::time::Duration::from_millis(5)),
            }
        }

        control.stop();
        handle.join().expect("chunker thread panicked");

        assert_eq!(frames.len(), 2);
        let activity = activity_rx.try_recv().expect("expected activity event");
        assert!(activity.rms > 0.2 && activity.rms < 0.3);
    }

    #[test]
    fn chunker_loop_gates_frames_until_streaming() {
        let (mut producer, consumer) = create_capture_ring();
        let control = CaptureControl::new();
        let (frame_tx, mut frame_rx) = mpsc::channel(16);
        let (activity_tx, _) = broadcast::channel(16);

        producer.push_slice(&vec![0.25f32; 4096]);

        let loop_control = control.clone();
        let handle = std::thread::spawn(move || {
            run_chunker(ChunkerContext {
                consumer,
                control: loop_control,
                device_sample_rate: 16_000,
                target_sample_rate: 16_000,
                chunk_samples: 4096,
                frame_tx,
                activity_tx,
            })
        });

        std::thread::sleep(std::time::Duration::from_millis(100));
        control.stop();
        handle.join().expect("chunker thread panicked");

        assert!(frame_rx.try_recv().is_err(), "no frames before streaming");
    }
}
