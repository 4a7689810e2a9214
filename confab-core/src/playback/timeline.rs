//! Gapless scheduling core for downlink audio.
//!
//! The timeline keeps a sample-granular clock (advanced by the output
//! callback), a monotonically non-decreasing next-start cursor, and the set
//! of currently scheduled sources. Each new buffer starts at
//! `max(cursor, clock)` — never in the past — and advances the cursor by its
//! own length, so back-to-back buffers play with no gap or overlap.
//! Interruption drops every active source at once and resets the cursor;
//! the max rule makes the next schedule start from the current time.

use crate::codec::PlaybackBuffer;

/// Identity of one scheduled source, stable until it completes or is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

struct ActiveSource {
    /// Absolute start position on the timeline, in samples.
    start: u64,
    /// Mono samples to play.
    samples: Vec<f32>,
}

impl ActiveSource {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

pub struct Timeline {
    sample_rate: u32,
    /// Current playback position in samples; advanced only by `render`.
    clock: u64,
    /// Where the next buffer starts, in samples.
    next_start: u64,
    next_id: u64,
    sources: Vec<ActiveSource>,
}

impl Timeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            clock: 0,
            next_start: 0,
            next_id: 0,
            sources: Vec::new(),
        }
    }

    /// Schedule a decoded buffer for gapless playback.
    ///
    /// Buffers with more than one channel are averaged down to mono; this
    /// system only ever decodes mono.
    pub fn schedule(&mut self, buffer: &PlaybackBuffer) -> SourceId {
        let samples = if buffer.channels == 1 {
            buffer.samples.clone()
        } else {
            let ch = buffer.channels as usize;
            buffer
                .samples
                .chunks_exact(ch)
                .map(|frame| frame.iter().sum::<f32>() / ch as f32)
                .collect()
        };

        let start = self.next_start.max(self.clock);
        let id = self.next_id;
        self.next_id += 1;
        self.next_start = start + samples.len() as u64;
        self.sources.push(ActiveSource { start, samples });
        SourceId(id)
    }

    /// Stop every scheduled source immediately and reset the cursor.
    pub fn interrupt(&mut self) {
        self.sources.clear();
        self.next_start = 0;
    }

    /// Mix all sources overlapping the next `out.len()` samples into `out`,
    /// advance the clock, and retire sources that have finished.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let window_start = self.clock;
        let window_end = self.clock + out.len() as u64;

        for source in &self.sources {
            let begin = source.start.max(window_start);
            let end = source.end().min(window_end);
            if begin >= end {
                continue;
            }
            let src_off = (begin - source.start) as usize;
            let dst_off = (begin - window_start) as usize;
            let len = (end - begin) as usize;
            for i in 0..len {
                out[dst_off + i] += source.samples[src_off + i];
            }
        }

        self.clock = window_end;
        self.sources.retain(|s| s.end() > window_end);
    }

    /// Number of sources currently playing or queued.
    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }

    /// Current playback position in samples.
    pub fn position(&self) -> u64 {
        self.clock
    }

    /// Next-start cursor in samples.
    pub fn cursor(&self) -> u64 {
        self.next_start
    }

    /// Seconds of scheduled audio not yet played.
    pub fn queued_secs(&self) -> f64 {
        (self.next_start.saturating_sub(self.clock)) as f64 / self.sample_rate as f64
    }
}
