//! Fixed-size block cutter for the uplink.
//!
//! Accumulates 16 kHz mono samples and emits one [`EncodedFrame`] per full
//! block, synchronously within the processing tick. A trailing partial block
//! is held until enough samples arrive; whatever remains when capture stops
//! is discarded (the service only accepts whole frames).

use crate::codec::EncodedFrame;

pub struct FrameChunker {
    buf: Vec<f32>,
    chunk_samples: usize,
}

impl FrameChunker {
    pub fn new(chunk_samples: usize) -> Self {
        Self {
            buf: Vec::with_capacity(chunk_samples * 2),
            chunk_samples,
        }
    }

    /// Feed samples; invokes `emit` once per completed block.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(EncodedFrame)) {
        self.buf.extend_from_slice(samples);
        while self.buf.len() >= self.chunk_samples {
            let block: Vec<f32> = self.buf.drain(..self.chunk_samples).collect();
            emit(EncodedFrame::from_samples(&block));
        }
    }

    /// Samples currently buffered below one block.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Root-mean-square level of a sample block.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq = samples.iter().map(|s| s * s).sum::<f32>();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, PCM_MIME_16K};
    use approx::assert_abs_diff_eq;

    #[test]
    fn emits_one_frame_per_full_block() {
        let mut chunker = FrameChunker::new(4096);
        let mut frames = Vec::new();
        chunker.push(&vec![0.1f32; 4096 * 2 + 100], |f| frames.push(f));
        assert_eq!(frames.len(), 2);
        assert_eq!(chunker.pending(), 100);
        for frame in &frames {
            assert_eq!(frame.mime_type, PCM_MIME_16K);
            assert_eq!(decode(&frame.data).unwrap().len(), 4096 * 2);
        }
    }

    #[test]
    fn partial_input_accumulates_across_pushes() {
        let mut chunker = FrameChunker::new(4096);
        let mut frames = Vec::new();
        chunker.push(&vec![0.0f32; 3000], |f| frames.push(f));
        assert!(frames.is_empty());
        chunker.push(&vec![0.0f32; 1100], |f| frames.push(f));
        assert_eq!(frames.len(), 1);
        assert_eq!(chunker.pending(), 4);
    }

    #[test]
    fn rms_of_constant_signal() {
        assert_abs_diff_eq!(compute_rms(&[0.5f32; 256]), 0.5, epsilon = 1e-6);
        assert_eq!(compute_rms(&[]), 0.0);
    }
}
