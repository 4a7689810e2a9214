//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! cpal captures at the device's native rate (commonly 44.1 or 48 kHz); the
//! wire contract is 16 kHz mono. `RateConverter` bridges that gap on the
//! chunker thread, where allocation is allowed. When the device already runs
//! at the target rate it is a zero-copy passthrough and no rubato session is
//! created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{ConfabError, Result};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when device rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Accumulation buffer — holds partial input chunks between calls.
    input_buf: Vec<f32>,
    /// How many input samples rubato expects per process call.
    block_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter from `device_rate` to `target_rate`, fed
    /// `block_size` input frames per rubato call.
    ///
    /// # Errors
    /// `ConfabError::AudioDevice` if rubato fails to initialise.
    pub fn new(device_rate: u32, target_rate: u32, block_size: usize) -> Result<Self> {
        if device_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                block_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / device_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio — no dynamic adjustment
            PolynomialDegree::Cubic,
            block_size,
            1, // mono
        )
        .map_err(|e| ConfabError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        tracing::info!(device_rate, target_rate, block_size, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            block_size,
            output_buf,
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples accumulate internally until a full `block_size` block is
    /// available for rubato; any remainder is kept for the next call. In
    /// passthrough mode the input is returned directly.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();

        while self.input_buf.len() >= self.block_size {
            let input_slice = &self.input_buf[..self.block_size];

            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }

            self.input_buf.drain(..self.block_size);
        }

        result
    }

    /// Returns `true` when device rate == target rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
