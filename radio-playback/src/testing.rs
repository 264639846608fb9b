//! # Synthetic Collaborators
//!
//! A tone-generating decoder and a device-less sink, for demos and for
//! exercising the engine end to end without network or audio hardware.
//!
//! Available with the `test-support` feature.

use crate::error::{PlaybackError, Result};
use crate::feed::PlaybackFeed;
use crate::traits::{AudioFormat, OutputSink, StreamDecoder, StreamOpener};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

// ============================================================================
// Sine Decoder
// ============================================================================

/// Opens every URL as an endless sine tone.
#[derive(Debug, Clone)]
pub struct SineOpener {
    format: AudioFormat,
    frequency_hz: f64,
    amplitude: f64,
    pacing: Duration,
    fail_code: Option<u32>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl Default for SineOpener {
    fn default() -> Self {
        Self {
            format: AudioFormat::pcm16(44100, 2),
            frequency_hz: 440.0,
            amplitude: 0.5,
            pacing: Duration::from_millis(5),
            fail_code: None,
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl SineOpener {
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_frequency(mut self, hz: f64) -> Self {
        self.frequency_hz = hz;
        self
    }

    /// Peak amplitude in [0, 1].
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Delay before each chunk is returned.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Make every `open` fail with a decoder fault carrying `code`.
    pub fn failing_with(mut self, code: u32) -> Self {
        self.fail_code = Some(code);
        self
    }

    /// Decoders handed out so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Decoders dropped so far.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamOpener for SineOpener {
    async fn open(&self, url: &str) -> Result<Box<dyn StreamDecoder>> {
        if let Some(code) = self.fail_code {
            return Err(PlaybackError::DecoderFault {
                code,
                message: format!("cannot open {}", url),
            });
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!(%url, format = %self.format, "Opening synthetic stream");
        Ok(Box::new(SineDecoder {
            format: self.format,
            frequency_hz: self.frequency_hz,
            amplitude: self.amplitude,
            pacing: self.pacing,
            frame: 0,
            released: Arc::clone(&self.released),
        }))
    }
}

pub struct SineDecoder {
    format: AudioFormat,
    frequency_hz: f64,
    amplitude: f64,
    pacing: Duration,
    frame: u64,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl StreamDecoder for SineDecoder {
    fn format(&self) -> Option<AudioFormat> {
        Some(self.format)
    }

    async fn read_chunk(&mut self, max_bytes: usize) -> Result<Bytes> {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }

        let block = self.format.block_align();
        let frames = max_bytes / block;
        let mut out = BytesMut::with_capacity(frames * block);
        let rate = f64::from(self.format.sample_rate);

        for _ in 0..frames {
            let t = self.frame as f64 / rate;
            let value = (TAU * self.frequency_hz * t).sin() * self.amplitude;
            let sample = (value * f64::from(i16::MAX)) as i16;
            for _ in 0..self.format.channels {
                out.put_i16_le(sample);
            }
            self.frame += 1;
        }

        Ok(out.freeze())
    }
}

impl Drop for SineDecoder {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Null Sink
// ============================================================================

/// Output sink that pulls from the feed on a timer and discards the audio.
#[derive(Debug, Default)]
pub struct NullSink {
    feed: Mutex<Option<PlaybackFeed>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    volume: Mutex<f32>,
    fail_play: bool,
    inits: AtomicUsize,
    plays: AtomicUsize,
    stops: AtomicUsize,
    pulled: Arc<AtomicU64>,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            volume: Mutex::new(1.0),
            ..Default::default()
        }
    }

    /// Sink whose `play` always fails.
    pub fn failing_play() -> Self {
        Self {
            fail_play: true,
            ..Self::new()
        }
    }

    pub fn init_calls(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn play_calls(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Real (non-silence) bytes pulled from the feed.
    pub fn bytes_pulled(&self) -> u64 {
        self.pulled.load(Ordering::SeqCst)
    }

    pub fn is_pumping(&self) -> bool {
        self.pump
            .lock()
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }
}

#[async_trait]
impl OutputSink for NullSink {
    async fn init(&self, feed: PlaybackFeed, format: &AudioFormat) -> Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        debug!(%format, "Null sink initialised");
        *self.feed.lock() = Some(feed);
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.fail_play {
            return Err(PlaybackError::Sink("null sink refused to start".to_string()));
        }

        let feed = self
            .feed
            .lock()
            .clone()
            .ok_or_else(|| PlaybackError::Sink("play called before init".to_string()))?;
        let pulled = Arc::clone(&self.pulled);

        let task = tokio::spawn(async move {
            let mut scratch = vec![0u8; feed.bytes_per_pull()];
            loop {
                tokio::time::sleep(feed.latency_hint()).await;
                let read = feed.read(&mut scratch);
                pulled.fetch_add(read as u64, Ordering::SeqCst);
            }
        });

        if let Some(previous) = self.pump.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.pump.lock().take() {
            task.abort();
        }
        self.feed.lock().take();
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        *self.volume.lock() = volume;
        Ok(())
    }

    fn volume(&self) -> f32 {
        *self.volume.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::RingBuffer;
    use crate::volume_meter::rms_i16_le;

    #[tokio::test]
    async fn test_sine_rms_matches_amplitude() {
        let opener = SineOpener::default()
            .with_format(AudioFormat::pcm16(8000, 1))
            .with_amplitude(0.5)
            .with_pacing(Duration::ZERO);
        let mut decoder = opener.open("http://example/tone").await.unwrap();

        let chunk = decoder.read_chunk(16_000).await.unwrap();
        assert_eq!(chunk.len(), 16_000);
        // Sine RMS is peak / sqrt(2)
        let rms = rms_i16_le(&chunk, 2);
        assert!((rms - 0.5 / 2f64.sqrt()).abs() < 0.01, "rms was {rms}");

        assert_eq!(opener.opened(), 1);
        drop(decoder);
        assert_eq!(opener.released(), 1);
    }

    #[tokio::test]
    async fn test_chunks_are_frame_aligned() {
        let opener = SineOpener::default().with_pacing(Duration::ZERO);
        let mut decoder = opener.open("http://example/tone").await.unwrap();
        assert_eq!(decoder.read_chunk(4099).await.unwrap().len(), 4096);
        assert!(decoder.read_chunk(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_opener_reports_code() {
        let opener = SineOpener::default().failing_with(0xC00D_36B4);
        match opener.open("http://example/tone").await {
            Err(PlaybackError::DecoderFault { code, .. }) => assert_eq!(code, 0xC00D_36B4),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("open should fail"),
        }
        assert_eq!(opener.opened(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_null_sink_pulls_until_stopped() {
        let buffer = RingBuffer::new(64_000);
        buffer.write(&[1u8; 8_000]);
        let format = AudioFormat::pcm16(8000, 1);
        let feed = PlaybackFeed::new(buffer.clone(), format)
            .with_latency_hint(Duration::from_millis(10));

        let sink = NullSink::new();
        sink.init(feed, &format).await.unwrap();
        sink.play().await.unwrap();
        assert!(sink.is_pumping());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sink.bytes_pulled() > 0);
        assert!(buffer.buffered_bytes() < 8_000);

        sink.stop().await.unwrap();
        assert!(!sink.is_pumping());
        assert_eq!((sink.init_calls(), sink.play_calls(), sink.stop_calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_null_sink_play_before_init_fails() {
        let sink = NullSink::new();
        assert!(matches!(sink.play().await, Err(PlaybackError::Sink(_))));
        assert!(matches!(
            NullSink::failing_play().play().await,
            Err(PlaybackError::Sink(_))
        ));
    }
}
