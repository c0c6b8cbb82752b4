//! Audio feed adapters.
//!
//! The controller consumes mono `f32` samples in [-1, 1] at a fixed sample
//! rate through [`AudioFeed::pull_block`]. Decoding stops at uncompressed
//! WAV: the [`wav`] reader parses RIFF directly and [`playlist`] chains
//! several of them. [`prefetch`] keeps blocking reads off the control loop.

pub mod playlist;
pub mod prefetch;
pub mod wav;

use crate::error::FeedError;

/// One pull from a feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmBlock {
    /// Normalized mono samples. May be empty without ending the stream
    /// (a live source with nothing buffered).
    pub samples: Vec<f32>,
    /// No samples will follow this block.
    pub end_of_stream: bool,
}

impl PcmBlock {
    /// Final block carrying `samples`.
    pub fn last(samples: Vec<f32>) -> Self {
        Self {
            samples,
            end_of_stream: true,
        }
    }
}

/// Pull interface for normalized PCM.
pub trait AudioFeed {
    /// Sample rate of every block this feed returns.
    fn sample_rate_hz(&self) -> u32;

    /// Return up to `max_samples` samples.
    ///
    /// Blocks for a bounded time at most. After a block with
    /// `end_of_stream` set, further calls return empty final blocks.
    ///
    /// # Errors
    ///
    /// [`FeedError`] when the underlying stream fails or is malformed.
    fn pull_block(&mut self, max_samples: usize) -> Result<PcmBlock, FeedError>;
}

impl<F: AudioFeed + ?Sized> AudioFeed for Box<F> {
    fn sample_rate_hz(&self) -> u32 {
        (**self).sample_rate_hz()
    }

    fn pull_block(&mut self, max_samples: usize) -> Result<PcmBlock, FeedError> {
        (**self).pull_block(max_samples)
    }
}

/// Feed over samples already in memory.
#[derive(Debug, Clone)]
pub struct MemoryFeed {
    samples: Vec<f32>,
    position: usize,
    sample_rate_hz: u32,
}

impl MemoryFeed {
    /// Feed that plays `samples` once.
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate_hz,
        }
    }
}

impl AudioFeed for MemoryFeed {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn pull_block(&mut self, max_samples: usize) -> Result<PcmBlock, FeedError> {
        let end = self.position.saturating_add(max_samples).min(self.samples.len());
        let samples = self.samples.get(self.position..end).unwrap_or_default().to_vec();
        self.position = end;
        Ok(PcmBlock {
            samples,
            end_of_stream: end == self.samples.len(),
        })
    }
}
