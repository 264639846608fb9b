//! # Volume Meter
//!
//! Periodic RMS loudness estimate over the audio most recently handed to the
//! output sink.
//!
//! Each tick drains up to one window (about 100 ms of audio) from the meter
//! tap, computes the RMS of the signed 16-bit samples, scales it by the
//! configured sensitivity and clamps to [0, 1]. Channels are not
//! deinterleaved: the same value is reported for left and right.
//!
//! An empty tap, a non-16-bit format, or a short read all produce a zero
//! level instead of an error.

use crate::config::EngineConfig;
use crate::ring_buffer::RingBuffer;
use crate::traits::AudioFormat;
use parking_lot::Mutex;
use radio_runtime::{EventBus, PlayerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// One meter reading, both levels in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VolumeSample {
    pub left: f64,
    pub right: f64,
}

impl VolumeSample {
    pub const SILENT: VolumeSample = VolumeSample {
        left: 0.0,
        right: 0.0,
    };

    /// Same level on both channels.
    pub fn mono(level: f64) -> Self {
        Self {
            left: level,
            right: level,
        }
    }

    pub fn average(&self) -> f64 {
        (self.left + self.right) / 2.0
    }
}

/// RMS of little-endian signed 16-bit samples, normalized to [-1, 1] first.
///
/// `stride` is the distance in bytes between samples. Trailing bytes that do
/// not form a whole sample are ignored. Returns 0.0 for empty input.
pub fn rms_i16_le(bytes: &[u8], stride: usize) -> f64 {
    let stride = stride.max(2);
    let mut sum = 0.0f64;
    let mut count = 0usize;

    for chunk in bytes.chunks_exact(stride) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]) as f64 / 32768.0;
        sum += sample * sample;
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).sqrt()
}

// ============================================================================
// Meter
// ============================================================================

pub struct VolumeMeter {
    source: RingBuffer,
    format: AudioFormat,
    window_bytes: usize,
    sensitivity: f64,
    scratch: Vec<u8>,
    last: Arc<Mutex<VolumeSample>>,
}

impl VolumeMeter {
    /// Meter over `source` with window and sensitivity taken from `config`.
    pub fn new(source: RingBuffer, format: AudioFormat, config: &EngineConfig) -> Self {
        let window_bytes = config.meter_window_bytes(&format);
        Self {
            source,
            format,
            window_bytes,
            sensitivity: config.meter_sensitivity,
            scratch: vec![0u8; window_bytes],
            last: Arc::new(Mutex::new(VolumeSample::SILENT)),
        }
    }

    pub fn window_bytes(&self) -> usize {
        self.window_bytes
    }

    /// Most recent reading.
    pub fn last_sample(&self) -> VolumeSample {
        *self.last.lock()
    }

    /// Take one reading and remember it.
    pub fn sample_once(&mut self) -> VolumeSample {
        let sample = self.measure();
        *self.last.lock() = sample;
        sample
    }

    fn measure(&mut self) -> VolumeSample {
        let buffered = self.source.buffered_bytes();
        if buffered == 0 {
            return VolumeSample::SILENT;
        }

        if !self.format.is_pcm16() {
            debug!(
                bits = self.format.bits_per_sample,
                "Volume meter only understands 16-bit PCM"
            );
            return VolumeSample::SILENT;
        }

        let to_read = self.window_bytes.min(buffered);
        let read = self.source.read(&mut self.scratch[..to_read]);
        if read == 0 {
            trace!("Volume meter window was drained concurrently");
            return VolumeSample::SILENT;
        }

        let rms = rms_i16_le(&self.scratch[..read], self.format.bytes_per_sample());
        VolumeSample::mono((rms * self.sensitivity).clamp(0.0, 1.0))
    }

    /// Run the meter on its own task, publishing a level every `interval`.
    pub fn spawn(
        mut self,
        interval: Duration,
        events: EventBus,
        cancel: CancellationToken,
    ) -> MeterHandle {
        let last = Arc::clone(&self.last);
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let sample = self.sample_once();
                        events
                            .emit(PlayerEvent::VolumeLevelChanged {
                                left: sample.left,
                                right: sample.right,
                            })
                            .ok();
                    }
                }
            }
            *self.last.lock() = VolumeSample::SILENT;
            debug!("Volume meter stopped");
        });

        MeterHandle { cancel, task, last }
    }
}

impl std::fmt::Debug for VolumeMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeMeter")
            .field("format", &self.format)
            .field("window_bytes", &self.window_bytes)
            .field("sensitivity", &self.sensitivity)
            .finish()
    }
}

/// Control handle for a running meter task.
#[derive(Debug)]
pub struct MeterHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    last: Arc<Mutex<VolumeSample>>,
}

impl MeterHandle {
    /// Stop the meter. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }

    pub fn last_sample(&self) -> VolumeSample {
        *self.last.lock()
    }
}

impl Drop for MeterHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
