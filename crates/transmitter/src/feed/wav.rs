//! WAV (RIFF) reader.
//!
//! Handles the payloads a transmitter is realistically fed:
//!
//! | Format tag | Bits | Decoding |
//! |------------|------|----------|
//! | 1 (PCM)    | 8    | unsigned, `(b - 128) / 128` |
//! | 1 (PCM)    | 16   | `i16 / 2^15` |
//! | 1 (PCM)    | 24   | sign-extended, `/ 2^23` |
//! | 1 (PCM)    | 32   | `i32 / 2^31` |
//! | 3 (float)  | 32   | as is |
//!
//! `WAVE_FORMAT_EXTENSIBLE` (0xFFFE) is accepted when its sub-format is one
//! of the above. Multi-channel audio is downmixed to mono by averaging.
//!
//! A `data` chunk size of `0xFFFF_FFFF` marks a stream of unknown length
//! (what encoders write when piping to stdout); the feed then plays until
//! end of file.
//!
//! A pull returns as soon as one whole frame is buffered, so a trickling
//! pipe yields short blocks rather than holding samples back. It still
//! blocks while the source has nothing at all; the control loop reads
//! through a [`PrefetchFeed`](super::prefetch::PrefetchFeed) for that.

use std::fs::File;
use std::io::{self, BufReader, Read, Stdin};
use std::path::Path;

use super::{AudioFeed, PcmBlock};
use crate::error::FeedError;

/// `data` chunk size written by streaming encoders.
pub const UNKNOWN_DATA_SIZE: u32 = 0xFFFF_FFFF;

/// Largest `fmt ` chunk accepted (the extensible form is 40 bytes).
const MAX_FMT_SIZE: u32 = 1024;

const TAG_PCM: u16 = 1;
const TAG_FLOAT: u16 = 3;
const TAG_EXTENSIBLE: u16 = 0xFFFE;

/// Sample encoding of the `data` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// 8-bit unsigned.
    U8,
    /// 16-bit little-endian signed.
    I16,
    /// 24-bit little-endian signed.
    I24,
    /// 32-bit little-endian signed.
    I32,
    /// 32-bit little-endian IEEE float.
    F32,
}

impl SampleEncoding {
    fn from_tag(tag: u16, bits: u16) -> Option<Self> {
        match (tag, bits) {
            (TAG_PCM, 8) => Some(Self::U8),
            (TAG_PCM, 16) => Some(Self::I16),
            (TAG_PCM, 24) => Some(Self::I24),
            (TAG_PCM, 32) => Some(Self::I32),
            (TAG_FLOAT, 32) => Some(Self::F32),
            _ => None,
        }
    }

    /// Short name, as `sox` spells it.
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I16 => "s16",
            Self::I24 => "s24",
            Self::I32 => "s32",
            Self::F32 => "f32",
        }
    }

    /// Bytes per sample.
    pub const fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I24 => 3,
            Self::I32 | Self::F32 => 4,
        }
    }

    #[allow(clippy::cast_precision_loss)] // Safety: 24/32-bit PCM loses only sub-LSB precision in f32
    fn decode(self, bytes: &[u8]) -> f32 {
        let mut word = [0u8; 4];
        for (dst, src) in word.iter_mut().zip(bytes) {
            *dst = *src;
        }
        match self {
            Self::U8 => (f32::from(word[0]) - 128.0) / 128.0,
            Self::I16 => f32::from(i16::from_le_bytes([word[0], word[1]])) / 32_768.0,
            Self::I24 => (i32::from_le_bytes([0, word[0], word[1], word[2]]) >> 8) as f32 / 8_388_608.0,
            Self::I32 => i32::from_le_bytes(word) as f32 / 2_147_483_648.0,
            Self::F32 => f32::from_le_bytes(word),
        }
    }
}

/// Parsed `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    /// Sample encoding.
    pub encoding: SampleEncoding,
    /// Interleaved channel count.
    pub channels: u16,
    /// Frames per second.
    pub sample_rate_hz: u32,
    /// Bytes per interleaved frame.
    pub block_align: usize,
}

/// Streaming WAV decoder.
pub struct WavFeed<R: Read> {
    reader: R,
    name: String,
    format: WavFormat,
    remaining: Option<u64>,
    finished: bool,
    scratch: Vec<u8>,
    carry: usize,
}

impl WavFeed<BufReader<File>> {
    /// Open a WAV file.
    ///
    /// # Errors
    ///
    /// [`FeedError::Io`] when the file cannot be opened, [`FeedError::Format`]
    /// when it is not a supported WAV.
    pub fn open(path: &Path) -> Result<Self, FeedError> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|source| FeedError::Io {
            source_name: name.clone(),
            source,
        })?;
        Self::new(BufReader::new(file), name)
    }
}

impl WavFeed<BufReader<Stdin>> {
    /// Read a WAV stream from standard input.
    ///
    /// # Errors
    ///
    /// As [`WavFeed::new`].
    pub fn stdin() -> Result<Self, FeedError> {
        Self::new(BufReader::new(io::stdin()), "<stdin>".to_owned())
    }
}

impl<R: Read> WavFeed<R> {
    /// Parse the RIFF header from `reader`, leaving it at the first sample.
    ///
    /// # Errors
    ///
    /// [`FeedError::Format`] for anything that is not a supported WAV,
    /// [`FeedError::Io`] for read failures.
    pub fn new(mut reader: R, name: String) -> Result<Self, FeedError> {
        let format_error = |reason: &str| FeedError::Format {
            source_name: name.clone(),
            reason: reason.to_owned(),
        };
        let io_error = |source: io::Error| {
            if source.kind() == io::ErrorKind::UnexpectedEof {
                format_error("truncated header")
            } else {
                FeedError::Io {
                    source_name: name.clone(),
                    source,
                }
            }
        };

        let mut riff = [0u8; 12];
        reader.read_exact(&mut riff).map_err(io_error)?;
        if riff.get(0..4) != Some(b"RIFF".as_slice()) || riff.get(8..12) != Some(b"WAVE".as_slice()) {
            return Err(format_error("not a RIFF/WAVE file"));
        }

        let mut format = None;
        loop {
            let mut header = [0u8; 8];
            reader.read_exact(&mut header).map_err(io_error)?;
            let [a, b, c, d, s0, s1, s2, s3] = header;
            let id = [a, b, c, d];
            let size = u32::from_le_bytes([s0, s1, s2, s3]);
            match &id {
                b"fmt " => {
                    if size > MAX_FMT_SIZE {
                        return Err(format_error("oversized fmt chunk"));
                    }
                    let mut body = vec![0u8; size as usize];
                    reader.read_exact(&mut body).map_err(io_error)?;
                    skip(&mut reader, u64::from(size % 2)).map_err(io_error)?;
                    format = Some(parse_fmt(&body).map_err(&format_error)?);
                }
                b"data" => {
                    let format = format.ok_or_else(|| format_error("data chunk before fmt chunk"))?;
                    let remaining = (size != UNKNOWN_DATA_SIZE).then_some(u64::from(size));
                    tracing::debug!(
                        source = %name,
                        sample_rate_hz = format.sample_rate_hz,
                        channels = format.channels,
                        encoding = format.encoding.name(),
                        data_bytes = remaining.unwrap_or(0),
                        unknown_length = remaining.is_none(),
                        "WAV stream opened"
                    );
                    return Ok(Self {
                        reader,
                        name,
                        format,
                        remaining,
                        finished: false,
                        scratch: Vec::new(),
                        carry: 0,
                    });
                }
                _ => skip(&mut reader, u64::from(size) + u64::from(size % 2)).map_err(io_error)?,
            }
        }
    }

    /// Stream format.
    pub fn format(&self) -> WavFormat {
        self.format
    }

    /// Source name used in errors (path or `<stdin>`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer up to `want` bytes after the carried partial frame, returning
    /// once a whole frame is in, at end of data, or when `want` is reached.
    /// Returns the bytes buffered, carry included.
    fn fill(&mut self, want: usize) -> Result<usize, FeedError> {
        let align = self.format.block_align;
        let mut got = self.carry;
        self.scratch.resize(want.max(got), 0);
        while got < want {
            let Some(buf) = self.scratch.get_mut(got..want) else {
                break;
            };
            match self.reader.read(buf) {
                Ok(0) => {
                    self.finished = true;
                    break;
                }
                Ok(n) => {
                    got += n;
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining = remaining.saturating_sub(n as u64);
                        if *remaining == 0 {
                            self.finished = true;
                            break;
                        }
                    }
                    if got >= align {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => {
                    return Err(FeedError::Io {
                        source_name: self.name.clone(),
                        source,
                    })
                }
            }
        }
        Ok(got)
    }
}

impl<R: Read> AudioFeed for WavFeed<R> {
    fn sample_rate_hz(&self) -> u32 {
        self.format.sample_rate_hz
    }

    fn pull_block(&mut self, max_samples: usize) -> Result<PcmBlock, FeedError> {
        if self.finished {
            return Ok(PcmBlock::last(Vec::new()));
        }
        let align = self.format.block_align;
        let mut want = max_samples.saturating_mul(align);
        if let Some(remaining) = self.remaining {
            let left = usize::try_from(remaining).unwrap_or(usize::MAX);
            want = want.min(self.carry.saturating_add(left));
        }
        let got = self.fill(want)?;
        let whole = got - got % align;

        let width = self.format.encoding.width();
        let channels = f32::from(self.format.channels);
        let samples = self
            .scratch
            .get(..whole)
            .unwrap_or_default()
            .chunks_exact(align)
            .map(|frame| {
                frame
                    .chunks_exact(width)
                    .map(|bytes| self.format.encoding.decode(bytes))
                    .sum::<f32>()
                    / channels
            })
            .collect();
        // A partial frame left at end of data is dropped.
        self.carry = if self.finished { 0 } else { got - whole };
        self.scratch.copy_within(whole..whole + self.carry, 0);
        Ok(PcmBlock {
            samples,
            end_of_stream: self.finished,
        })
    }
}

fn parse_fmt(body: &[u8]) -> Result<WavFormat, &'static str> {
    let u16_at = |at: usize| {
        body.get(at..at + 2)
            .and_then(|b| b.try_into().ok())
            .map(u16::from_le_bytes)
    };
    let u32_at = |at: usize| {
        body.get(at..at + 4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
    };

    let (Some(mut tag), Some(channels), Some(sample_rate_hz), Some(block_align), Some(bits)) =
        (u16_at(0), u16_at(2), u32_at(4), u16_at(12), u16_at(14))
    else {
        return Err("fmt chunk too short");
    };
    if tag == TAG_EXTENSIBLE {
        tag = u16_at(24).ok_or("extensible fmt chunk too short")?;
    }
    let encoding = SampleEncoding::from_tag(tag, bits).ok_or("unsupported sample format")?;
    if channels == 0 {
        return Err("zero channels");
    }
    if sample_rate_hz == 0 {
        return Err("zero sample rate");
    }
    let block_align = usize::from(block_align);
    if block_align != usize::from(channels) * encoding.width() {
        return Err("block alignment does not match channels and sample width");
    }
    Ok(WavFormat {
        encoding,
        channels,
        sample_rate_hz,
        block_align,
    })
}

fn skip<R: Read>(reader: &mut R, bytes: u64) -> io::Result<()> {
    let copied = io::copy(&mut reader.by_ref().take(bytes), &mut io::sink())?;
    if copied < bytes {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
    }
    Ok(())
}
