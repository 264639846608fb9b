//! # Stream Reader
//!
//! Producer loop that pumps decoded PCM from a [`StreamDecoder`] into the
//! session [`RingBuffer`].
//!
//! ## Loop
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ while !cancelled && session is current                   │
//! │   fill > throttle ratio ──> idle throttle_delay, recheck │
//! │   read_chunk (bounded by read_timeout, cancellable)      │
//! │     bytes    ──> write, report level every interval      │
//! │     empty    ──> idle stall_delay                        │
//! │     timeout  ──> debug message, idle retry delay         │
//! │     stall    ──> debug message, idle retry delay         │
//! │     error    ──> error event, return Err                 │
//! │   idle read_pacing                                       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancellation is never an error: the loop simply returns its statistics.
//! Every idle period races the cancellation token, so stop latency is bounded
//! by the time it takes the decoder future to be dropped.

use crate::config::EngineConfig;
use crate::error::{PlaybackError, Result};
use crate::ring_buffer::RingBuffer;
use crate::session::{SessionId, SessionTracker};
use crate::traits::StreamDecoder;
use radio_runtime::{EventBus, PlayerEvent};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace};

/// Counters from one reader run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Reads that returned data.
    pub reads: u64,
    /// Bytes stored in the ring buffer.
    pub bytes_written: u64,
    /// Bytes the ring buffer refused.
    pub bytes_discarded: u64,
    /// Reads that returned no data.
    pub empty_reads: u64,
    /// Reads that timed out or reported a transient stall.
    pub stalls: u64,
    /// Iterations skipped because the buffer was above the throttle ratio.
    pub throttled: u64,
}

pub struct StreamReader {
    decoder: Box<dyn StreamDecoder>,
    ctx: ReaderContext,
}

/// Everything the loop needs besides the decoder. Shared by reference across
/// awaits, so it must stay `Sync`.
struct ReaderContext {
    session: SessionId,
    tracker: SessionTracker,
    buffer: RingBuffer,
    config: EngineConfig,
    events: EventBus,
    cancel: CancellationToken,
}

impl ReaderContext {
    fn should_run(&self) -> bool {
        !self.cancel.is_cancelled() && self.tracker.is_current(self.session)
    }

    fn debug_event(&self, message: impl Into<String>) {
        self.events.emit(PlayerEvent::debug(message)).ok();
    }

    fn buffer_percent(&self) -> f64 {
        self.buffer.fill_ratio() * 100.0
    }

    /// Sleeps for `duration`; returns `false` if cancelled first.
    async fn idle(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

impl StreamReader {
    pub fn new(
        session: SessionId,
        tracker: SessionTracker,
        decoder: Box<dyn StreamDecoder>,
        buffer: RingBuffer,
        config: EngineConfig,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            decoder,
            ctx: ReaderContext {
                session,
                tracker,
                buffer,
                config,
                events,
                cancel,
            },
        }
    }

    pub fn session(&self) -> SessionId {
        self.ctx.session
    }

    /// Run until cancelled, superseded, or the decoder fails.
    ///
    /// The decoder is dropped when this returns.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error for any failure other than a timeout or
    /// [`PlaybackError::TransientReadStall`]. The failure has already been
    /// published as an error event with context `"stream reader"`.
    #[instrument(skip(self), fields(session = %self.ctx.session))]
    pub async fn run(self) -> Result<ReaderStats> {
        let Self { mut decoder, ctx } = self;
        let mut stats = ReaderStats::default();
        let chunk_bytes = ctx.config.read_chunk_bytes;
        let read_timeout = ctx.config.read_timeout();
        let report_every = ctx.config.debug_report_every_reads;
        let mut last_report = Instant::now();

        debug!(capacity = ctx.buffer.capacity_bytes(), "Stream reader started");
        ctx.debug_event("Stream reader started");

        while ctx.should_run() {
            if ctx.buffer.fill_ratio() > ctx.config.throttle_fill_ratio {
                stats.throttled += 1;
                trace!(fill = ctx.buffer_percent(), "Buffer above throttle ratio");
                if !ctx.idle(ctx.config.throttle_delay()).await {
                    break;
                }
                continue;
            }

            let outcome = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break,
                outcome = tokio::time::timeout(read_timeout, decoder.read_chunk(chunk_bytes)) => outcome,
            };

            match outcome {
                Ok(Ok(chunk)) if !chunk.is_empty() => {
                    let written = ctx.buffer.write(&chunk);
                    stats.reads += 1;
                    stats.bytes_written += written as u64;
                    stats.bytes_discarded += (chunk.len() - written) as u64;

                    if last_report.elapsed() >= ctx.config.buffer_report_interval() {
                        ctx.events
                            .emit(PlayerEvent::BufferLevelChanged {
                                percent: ctx.buffer_percent(),
                            })
                            .ok();
                        last_report = Instant::now();
                    }

                    if report_every > 0 && stats.reads % report_every == 0 {
                        ctx.debug_event(format!(
                            "Reads: {}, Buffer: {:.1}%",
                            stats.reads,
                            ctx.buffer_percent()
                        ));
                    }
                }
                Ok(Ok(_)) => {
                    stats.empty_reads += 1;
                    if !ctx.idle(ctx.config.stall_delay()).await {
                        break;
                    }
                }
                Ok(Err(PlaybackError::TransientReadStall)) => {
                    stats.stalls += 1;
                    debug!("Decoder reported a stall, retrying");
                    ctx.debug_event("Read stalled, retrying...");
                    if !ctx.idle(ctx.config.timeout_retry_delay()).await {
                        break;
                    }
                }
                Err(_elapsed) => {
                    stats.stalls += 1;
                    debug!(timeout_ms = ctx.config.read_timeout_ms, "Read timed out, retrying");
                    ctx.debug_event("Read timeout, retrying...");
                    if !ctx.idle(ctx.config.timeout_retry_delay()).await {
                        break;
                    }
                }
                Ok(Err(err)) => {
                    error!(error = %err, reads = stats.reads, "Stream read failed");
                    ctx.events
                        .emit(PlayerEvent::error(
                            err.category(),
                            err.to_string(),
                            "stream reader",
                        ))
                        .ok();
                    return Err(err);
                }
            }

            if !ctx.idle(ctx.config.read_pacing()).await {
                break;
            }
        }

        if ctx.cancel.is_cancelled() {
            debug!("Stream reader cancelled");
            ctx.debug_event("Stream reader cancelled");
        }
        debug!(reads = stats.reads, bytes = stats.bytes_written, "Stream reader finished");
        ctx.debug_event(format!("Stream reader finished. Total reads: {}", stats.reads));

        Ok(stats)
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("session", &self.ctx.session)
            .field("buffer", &self.ctx.buffer)
            .finish()
    }
}
