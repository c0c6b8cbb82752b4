//! Read-ahead on a dedicated thread.
//!
//! File and pipe reads block for as long as the source likes. The control
//! loop must keep polling the DMA cursor and the stop flag regardless, so
//! [`PrefetchFeed`] moves the wrapped feed onto a reader thread that pushes
//! decoded blocks through a bounded channel. A pull waits at most
//! `read_wait` and otherwise returns an empty, non-final block, which the
//! controller treats like any other shortfall.

use std::io;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::{AudioFeed, PcmBlock};
use crate::error::FeedError;

/// Samples requested from the wrapped feed per read.
pub const PREFETCH_BLOCK: usize = 1024;

/// Blocks buffered between the reader thread and the control loop.
pub const PREFETCH_DEPTH: usize = 8;

type Block = Result<PcmBlock, FeedError>;

/// [`AudioFeed`] served from a reader thread.
///
/// Dropping the feed disconnects the channel; the reader thread exits after
/// its current read returns.
#[derive(Debug)]
pub struct PrefetchFeed {
    name: String,
    sample_rate_hz: u32,
    blocks: Receiver<Block>,
    read_wait: Duration,
    pending: Vec<f32>,
    offset: usize,
    pending_end: bool,
}

impl PrefetchFeed {
    /// Start reading `feed` on a thread named after `name`.
    ///
    /// # Errors
    ///
    /// [`FeedError::Io`] when the thread cannot be spawned.
    pub fn spawn<F>(feed: F, name: String, read_wait: Duration) -> Result<Self, FeedError>
    where
        F: AudioFeed + Send + 'static,
    {
        let sample_rate_hz = feed.sample_rate_hz();
        let (tx, rx) = bounded(PREFETCH_DEPTH);
        thread::Builder::new()
            .name(format!("read {name}"))
            .spawn(move || read_ahead(feed, &tx))
            .map_err(|source| FeedError::Io {
                source_name: name.clone(),
                source,
            })?;
        tracing::debug!(
            source = %name,
            sample_rate_hz,
            read_wait_ms = u64::try_from(read_wait.as_millis()).unwrap_or(u64::MAX),
            depth = PREFETCH_DEPTH,
            "reader thread started"
        );
        Ok(Self {
            name,
            sample_rate_hz,
            blocks: rx,
            read_wait,
            pending: Vec::new(),
            offset: 0,
            pending_end: false,
        })
    }

    fn take(&mut self, max_samples: usize) -> PcmBlock {
        let end = self.offset.saturating_add(max_samples).min(self.pending.len());
        let samples = self.pending.get(self.offset..end).unwrap_or_default().to_vec();
        self.offset = end;
        PcmBlock {
            samples,
            end_of_stream: self.pending_end && end == self.pending.len(),
        }
    }
}

/// Reader thread body: pull until the stream ends, fails, or nobody listens.
fn read_ahead<F: AudioFeed>(mut feed: F, tx: &Sender<Block>) {
    loop {
        let block = feed.pull_block(PREFETCH_BLOCK);
        let last = match &block {
            Ok(b) => b.end_of_stream,
            Err(err) => {
                tracing::debug!(error = %err, "reader thread stopping on error");
                true
            }
        };
        // An empty non-final block carries nothing worth a channel slot.
        if matches!(&block, Ok(b) if b.samples.is_empty() && !last) {
            continue;
        }
        if tx.send(block).is_err() || last {
            return;
        }
    }
}

impl AudioFeed for PrefetchFeed {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn pull_block(&mut self, max_samples: usize) -> Result<PcmBlock, FeedError> {
        if self.offset < self.pending.len() || self.pending_end {
            return Ok(self.take(max_samples));
        }
        match self.blocks.recv_timeout(self.read_wait) {
            Ok(Ok(block)) => {
                self.pending = block.samples;
                self.offset = 0;
                self.pending_end = block.end_of_stream;
                Ok(self.take(max_samples))
            }
            Ok(Err(err)) => {
                self.pending.clear();
                self.offset = 0;
                self.pending_end = true;
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => Ok(PcmBlock::default()),
            Err(RecvTimeoutError::Disconnected) => Err(FeedError::Io {
                source_name: self.name.clone(),
                source: io::Error::new(io::ErrorKind::BrokenPipe, "reader thread exited"),
            }),
        }
    }
}
