//! # Decoder and Output Sink Contracts
//!
//! The engine does not decode audio or talk to audio hardware itself. Both
//! ends of the pipeline are host-supplied collaborators driven through the
//! narrow async traits below.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ open(url) ┌───────────────┐ read_chunk ┌──────────────┐
//! │ StreamOpener ├──────────>│ StreamDecoder ├───────────>│ StreamReader │
//! └──────────────┘           └───────────────┘            └──────┬───────┘
//!                                                                │ write
//!                                                                ▼
//! ┌──────────────┐   read    ┌───────────────┐            ┌──────────────┐
//! │  OutputSink  │<──────────┤ PlaybackFeed  │<───────────┤  RingBuffer  │
//! └──────────────┘           └───────────────┘            └──────────────┘
//! ```
//!
//! - **StreamOpener** connects to a URL and returns a decoder that has already
//!   negotiated the PCM format.
//! - **StreamDecoder** yields raw interleaved PCM bytes in chunks. A live
//!   stream never ends, so an empty chunk means "no data yet" rather than EOF.
//! - **OutputSink** is handed a [`PlaybackFeed`] once per session and pulls
//!   from it at its own hardware-paced cadence.
//!
//! ## Threading Model
//!
//! Openers and sinks are shared behind `Arc` and must be `Send + Sync`. A
//! decoder is owned by exactly one session and only needs `Send`.

use crate::error::Result;
use crate::feed::PlaybackFeed;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Audio Format
// ============================================================================

/// Negotiated PCM format of a decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per sample (16 for the common PCM case)
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Create a new audio format.
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// 16-bit PCM at the given rate and channel count.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, 16)
    }

    /// Bytes per single-channel sample.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Bytes per interleaved frame (one sample for every channel).
    pub fn block_align(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Bytes consumed per second of playback.
    pub fn bytes_per_second(&self) -> usize {
        self.block_align() * self.sample_rate as usize
    }

    /// Byte length of `duration` of audio, rounded down to whole frames.
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let frames = (self.sample_rate as u128 * duration.as_micros()) / 1_000_000;
        frames as usize * self.block_align()
    }

    /// Returns `true` if the format describes signed 16-bit PCM.
    pub fn is_pcm16(&self) -> bool {
        self.bits_per_sample == 16
    }

    /// Returns `true` if every field is non-zero.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0 && self.bits_per_sample > 0
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

// ============================================================================
// Decoder Contract
// ============================================================================

/// Opens a network stream and negotiates its PCM format.
#[async_trait]
pub trait StreamOpener: Send + Sync {
    /// Connect to `url` and return a decoder positioned at the live edge.
    ///
    /// # Errors
    ///
    /// Implementations should report structured decoder failures as
    /// [`PlaybackError::DecoderFault`](crate::PlaybackError::DecoderFault) so
    /// the engine can classify them, and connection failures as
    /// [`PlaybackError::Io`](crate::PlaybackError::Io).
    async fn open(&self, url: &str) -> Result<Box<dyn StreamDecoder>>;
}

/// Chunked reader over a decoded live stream.
///
/// Dropping the decoder releases its network and codec resources.
#[async_trait]
pub trait StreamDecoder: Send {
    /// Negotiated PCM format, or `None` if negotiation failed.
    fn format(&self) -> Option<AudioFormat>;

    /// Read up to `max_bytes` of interleaved PCM.
    ///
    /// An empty `Bytes` means no data is available yet. Returning
    /// [`PlaybackError::TransientReadStall`](crate::PlaybackError::TransientReadStall)
    /// is likewise treated as recoverable; any other error ends the session's
    /// reading.
    ///
    /// The future may be dropped at any await point when the session is
    /// cancelled.
    async fn read_chunk(&mut self, max_bytes: usize) -> Result<Bytes>;
}

// ============================================================================
// Output Sink Contract
// ============================================================================

/// Hardware audio output.
///
/// The controller calls `init` once per session before `play`, and `stop`
/// exactly once when the session ends. Volume may be set at any time.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Attach the buffer provider for a new session.
    async fn init(&self, feed: PlaybackFeed, format: &AudioFormat) -> Result<()>;

    /// Start pulling audio from the feed.
    async fn play(&self) -> Result<()>;

    /// Stop pulling and release the feed.
    async fn stop(&self) -> Result<()>;

    /// Set output volume in [0.0, 1.0].
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Current output volume.
    fn volume(&self) -> f32;
}
