//! # Playback Feed
//!
//! The buffer provider handed to the [`OutputSink`](crate::traits::OutputSink).
//!
//! The sink drains the session ring buffer through the feed, and every byte
//! it receives is also copied into a small meter tap. The volume meter drains
//! the tap, never the session buffer, so metering never steals audio from
//! playback.
//!
//! ```text
//!  StreamReader ──write──> RingBuffer ──read──> PlaybackFeed ──> OutputSink
//!                                                    │
//!                                                    └─copy──> tap ──> VolumeMeter
//! ```

use crate::ring_buffer::{OverflowPolicy, RingBuffer};
use crate::traits::AudioFormat;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sink-side reader over a session's ring buffer.
///
/// Cloning is cheap; every clone reads from the same buffer.
#[derive(Clone, Debug)]
pub struct PlaybackFeed {
    source: RingBuffer,
    tap: Option<RingBuffer>,
    format: AudioFormat,
    latency_hint: Duration,
    underruns: Arc<AtomicU64>,
}

impl PlaybackFeed {
    /// Feed over `source` without a meter tap.
    pub fn new(source: RingBuffer, format: AudioFormat) -> Self {
        Self {
            source,
            tap: None,
            format,
            latency_hint: Duration::from_millis(200),
            underruns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Feed that mirrors everything it delivers into `tap`.
    pub fn with_tap(source: RingBuffer, tap: RingBuffer, format: AudioFormat) -> Self {
        Self {
            tap: Some(tap),
            ..Self::new(source, format)
        }
    }

    /// Output latency the sink should aim for.
    pub fn with_latency_hint(mut self, latency: Duration) -> Self {
        self.latency_hint = latency;
        self
    }

    /// Tap sized to hold `window_bytes` for the meter, overwriting stale audio.
    pub fn meter_tap(window_bytes: usize) -> RingBuffer {
        RingBuffer::with_policy(window_bytes * 2, OverflowPolicy::OverwriteOldest)
    }

    /// Fill `output` for the device.
    ///
    /// Real audio is copied first and the remainder is zero-filled, so the
    /// sink always receives a full buffer. Returns the number of real bytes.
    pub fn read(&self, output: &mut [u8]) -> usize {
        let read = self.source.read(output);
        if let Some(tap) = &self.tap {
            tap.write(&output[..read]);
        }
        if read < output.len() {
            output[read..].fill(0);
            if !output.is_empty() {
                self.underruns.fetch_add(1, Ordering::Relaxed);
            }
        }
        read
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn latency_hint(&self) -> Duration {
        self.latency_hint
    }

    /// Bytes the sink should request per pull to honour the latency hint.
    pub fn bytes_per_pull(&self) -> usize {
        self.format
            .bytes_for(self.latency_hint)
            .max(self.format.block_align())
    }

    /// Bytes waiting in the session buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.source.buffered_bytes()
    }

    /// Number of reads that had to be padded with silence.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}
