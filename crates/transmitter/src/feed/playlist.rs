//! Back-to-back playback of several WAV sources.
//!
//! All entries must share the sample rate of the first one, since the DMA
//! pacing is fixed for the session. Entries are opened lazily, so a
//! mismatch surfaces as a [`FeedError::SampleRateMismatch`] when playback
//! reaches it.

use std::fmt;
use std::path::PathBuf;

use super::wav::WavFeed;
use super::{AudioFeed, PcmBlock};
use crate::error::FeedError;

/// Where one playlist entry comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// A WAV file.
    File(PathBuf),
    /// A WAV stream on standard input.
    Stdin,
}

impl FeedSource {
    /// `-` is standard input, anything else a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else {
            Self::File(PathBuf::from(arg))
        }
    }

    fn open(&self) -> Result<Box<dyn AudioFeed + Send>, FeedError> {
        Ok(match self {
            Self::File(path) => Box::new(WavFeed::open(path)?),
            Self::Stdin => Box::new(WavFeed::stdin()?),
        })
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Stdin => f.write_str("<stdin>"),
        }
    }
}

/// Sequential feed over several sources, optionally looping.
pub struct Playlist {
    sources: Vec<FeedSource>,
    repeat: bool,
    index: usize,
    current: Option<Box<dyn AudioFeed + Send>>,
    sample_rate_hz: u32,
    samples_this_pass: u64,
    finished: bool,
}

impl fmt::Debug for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playlist")
            .field("sources", &self.sources)
            .field("repeat", &self.repeat)
            .field("index", &self.index)
            .field("sample_rate_hz", &self.sample_rate_hz)
            .finish_non_exhaustive()
    }
}

impl Playlist {
    /// Open the first entry to fix the session sample rate.
    ///
    /// # Errors
    ///
    /// - [`FeedError::EmptyPlaylist`] for no sources
    /// - [`FeedError::Format`] when standard input appears twice or with
    ///   `repeat` (it cannot be rewound), or the first entry is not a
    ///   supported WAV
    /// - [`FeedError::Io`] when the first entry cannot be read
    pub fn new(sources: Vec<FeedSource>, repeat: bool) -> Result<Self, FeedError> {
        let stdin_entries = sources.iter().filter(|s| **s == FeedSource::Stdin).count();
        if stdin_entries > 1 || (repeat && stdin_entries > 0) {
            return Err(FeedError::Format {
                source_name: FeedSource::Stdin.to_string(),
                reason: "standard input can only be played once".into(),
            });
        }
        let first = sources.first().ok_or(FeedError::EmptyPlaylist)?.open()?;
        let sample_rate_hz = first.sample_rate_hz();
        tracing::info!(entries = sources.len(), sample_rate_hz, repeat, "playlist opened");
        Ok(Self {
            sources,
            repeat,
            index: 0,
            current: Some(first),
            sample_rate_hz,
            samples_this_pass: 0,
            finished: false,
        })
    }

    /// Move to the next entry; `false` when the playlist is over.
    fn advance(&mut self) -> Result<bool, FeedError> {
        self.current = None;
        let mut next = self.index + 1;
        if next >= self.sources.len() {
            if !self.repeat || self.samples_this_pass == 0 {
                return Ok(false);
            }
            next = 0;
            self.samples_this_pass = 0;
        }
        self.index = next;
        let Some(source) = self.sources.get(next) else {
            return Ok(false);
        };
        let feed = source.open()?;
        if feed.sample_rate_hz() != self.sample_rate_hz {
            return Err(FeedError::SampleRateMismatch {
                source_name: source.to_string(),
                expected: self.sample_rate_hz,
                found: feed.sample_rate_hz(),
            });
        }
        tracing::info!(source = %source, "next playlist entry");
        self.current = Some(feed);
        Ok(true)
    }
}

impl AudioFeed for Playlist {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn pull_block(&mut self, max_samples: usize) -> Result<PcmBlock, FeedError> {
        loop {
            if self.finished {
                return Ok(PcmBlock::last(Vec::new()));
            }
            let Some(current) = self.current.as_mut() else {
                self.finished = true;
                continue;
            };
            let block = current.pull_block(max_samples)?;
            self.samples_this_pass += block.samples.len() as u64;
            if !block.end_of_stream {
                return Ok(block);
            }
            if !self.advance()? {
                self.finished = true;
                return Ok(PcmBlock::last(block.samples));
            }
            if !block.samples.is_empty() {
                return Ok(PcmBlock {
                    samples: block.samples,
                    end_of_stream: false,
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav(rate: u32, samples: &[i16]) -> tempfile::NamedTempFile {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut f = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        f.write_all(b"RIFF").unwrap();
        f.write_all(&(36 + data.len() as u32).to_le_bytes()).unwrap();
        f.write_all(b"WAVEfmt ").unwrap();
        f.write_all(&16u32.to_le_bytes()).unwrap();
        f.write_all(&1u16.to_le_bytes()).unwrap();
        f.write_all(&1u16.to_le_bytes()).unwrap();
        f.write_all(&rate.to_le_bytes()).unwrap();
        f.write_all(&(rate * 2).to_le_bytes()).unwrap();
        f.write_all(&2u16.to_le_bytes()).unwrap();
        f.write_all(&16u16.to_le_bytes()).unwrap();
        f.write_all(b"data").unwrap();
        f.write_all(&(data.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&data).unwrap();
        f.flush().unwrap();
        f
    }

    fn drain(feed: &mut Playlist, max: usize, limit: usize) -> Vec<f32> {
        let mut out = Vec::new();
        for _ in 0..limit {
            let block = feed.pull_block(max).unwrap();
            out.extend(block.samples);
            if block.end_of_stream {
                break;
            }
        }
        out
    }

    #[test]
    fn test_entries_play_back_to_back() {
        let a = write_wav(8_000, &[16_384, 16_384, 16_384]);
        let b = write_wav(8_000, &[-16_384, -16_384]);
        let mut p = Playlist::new(
            vec![FeedSource::File(a.path().into()), FeedSource::File(b.path().into())],
            false,
        )
        .unwrap();
        assert_eq!(p.sample_rate_hz(), 8_000);
        assert_eq!(drain(&mut p, 2, 16), vec![0.5, 0.5, 0.5, -0.5, -0.5]);
        assert!(p.pull_block(2).unwrap().end_of_stream);
    }

    #[test]
    fn test_repeat_loops() {
        let a = write_wav(8_000, &[16_384]);
        let mut p = Playlist::new(vec![FeedSource::File(a.path().into())], true).unwrap();
        let mut got = Vec::new();
        for _ in 0..5 {
            got.extend(p.pull_block(4).unwrap().samples);
        }
        assert_eq!(got, vec![0.5; 5]);
    }

    #[test]
    fn test_repeat_of_silent_playlist_terminates() {
        let a = write_wav(8_000, &[]);
        let mut p = Playlist::new(vec![FeedSource::File(a.path().into())], true).unwrap();
        assert!(drain(&mut p, 4, 8).is_empty());
    }

    #[test]
    fn test_sample_rate_mismatch() {
        let a = write_wav(8_000, &[0]);
        let b = write_wav(44_100, &[0]);
        let mut p = Playlist::new(
            vec![FeedSource::File(a.path().into()), FeedSource::File(b.path().into())],
            false,
        )
        .unwrap();
        let err = p.pull_block(4).unwrap_err();
        assert!(matches!(
            err,
            FeedError::SampleRateMismatch { expected: 8_000, found: 44_100, .. }
        ));
    }

    #[test]
    fn test_empty_playlist() {
        assert!(matches!(Playlist::new(Vec::new(), false), Err(FeedError::EmptyPlaylist)));
    }

    #[test]
    fn test_stdin_cannot_repeat() {
        assert!(matches!(
            Playlist::new(vec![FeedSource::Stdin], true),
            Err(FeedError::Format { .. })
        ));
    }

    #[test]
    fn test_source_from_arg() {
        assert_eq!(FeedSource::from_arg("-"), FeedSource::Stdin);
        assert_eq!(
            FeedSource::from_arg("song.wav"),
            FeedSource::File(PathBuf::from("song.wav"))
        );
    }
}
