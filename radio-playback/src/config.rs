//! # Engine Configuration
//!
//! Buffer sizing, reader pacing, and meter cadence for the playback engine.
//! Every field has a serde default, so a host can override just the values it
//! cares about:
//!
//! ```rust
//! use radio_playback::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{ "buffer_duration_ms": 8000 }"#).unwrap();
//! assert_eq!(config.buffer_duration_ms, 8000);
//! assert_eq!(config.read_chunk_bytes, 4096);
//! ```

use crate::error::{PlaybackError, Result};
use crate::traits::AudioFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback engine configuration.
///
/// Durations are stored in milliseconds so the struct round-trips through
/// JSON settings files unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ring buffer capacity expressed as audio duration.
    ///
    /// Default: 5000 ms.
    #[serde(default = "default_buffer_duration_ms")]
    pub buffer_duration_ms: u64,

    /// Bytes requested from the decoder per read.
    ///
    /// Default: 4096.
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,

    /// Fill ratio above which the reader stops requesting data.
    ///
    /// Default: 0.70.
    #[serde(default = "default_throttle_fill_ratio")]
    pub throttle_fill_ratio: f64,

    /// Idle time between fill checks while throttled.
    ///
    /// Default: 30 ms.
    #[serde(default = "default_throttle_delay_ms")]
    pub throttle_delay_ms: u64,

    /// Idle time after a read returned no data.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_stall_delay_ms")]
    pub stall_delay_ms: u64,

    /// Idle time after every read attempt.
    ///
    /// Default: 10 ms.
    #[serde(default = "default_read_pacing_ms")]
    pub read_pacing_ms: u64,

    /// Upper bound on opening a stream and starting the sink.
    ///
    /// Default: 10000 ms.
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Upper bound on a single decoder read.
    ///
    /// Default: 2000 ms.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Idle time after a read timed out.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_timeout_retry_delay_ms")]
    pub timeout_retry_delay_ms: u64,

    /// Minimum spacing of buffer-level notifications.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_buffer_report_interval_ms")]
    pub buffer_report_interval_ms: u64,

    /// Emit a read summary debug message every N successful reads (0 disables).
    ///
    /// Default: 10.
    #[serde(default = "default_debug_report_every_reads")]
    pub debug_report_every_reads: u64,

    /// How long `stop` waits for the reader to observe cancellation.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Volume meter tick interval.
    ///
    /// Default: 50 ms (20 Hz).
    #[serde(default = "default_meter_interval_ms")]
    pub meter_interval_ms: u64,

    /// Audio window sampled per meter tick.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_meter_window_ms")]
    pub meter_window_ms: u64,

    /// Gain applied to the RMS value before clamping to [0, 1].
    ///
    /// Default: 2.0.
    #[serde(default = "default_meter_sensitivity")]
    pub meter_sensitivity: f64,

    /// Output latency hint passed along to sinks that support one.
    ///
    /// Default: 200 ms.
    #[serde(default = "default_desired_latency_ms")]
    pub desired_latency_ms: u64,

    /// Volume applied before the first `set_volume` call.
    ///
    /// Default: 0.5.
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    /// Event bus capacity when the engine creates its own bus.
    ///
    /// Default: 256.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Strip credentials and query strings from stream URLs in logs and
    /// debug notifications.
    ///
    /// Default: true.
    #[serde(default = "default_redact_urls")]
    pub redact_urls: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: default_buffer_duration_ms(),
            read_chunk_bytes: default_read_chunk_bytes(),
            throttle_fill_ratio: default_throttle_fill_ratio(),
            throttle_delay_ms: default_throttle_delay_ms(),
            stall_delay_ms: default_stall_delay_ms(),
            read_pacing_ms: default_read_pacing_ms(),
            open_timeout_ms: default_open_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            timeout_retry_delay_ms: default_timeout_retry_delay_ms(),
            buffer_report_interval_ms: default_buffer_report_interval_ms(),
            debug_report_every_reads: default_debug_report_every_reads(),
            stop_grace_ms: default_stop_grace_ms(),
            meter_interval_ms: default_meter_interval_ms(),
            meter_window_ms: default_meter_window_ms(),
            meter_sensitivity: default_meter_sensitivity(),
            desired_latency_ms: default_desired_latency_ms(),
            initial_volume: default_initial_volume(),
            event_capacity: default_event_capacity(),
            redact_urls: default_redact_urls(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Smaller buffer (2s)
    /// - Smaller reads, shorter idle periods
    pub fn low_latency() -> Self {
        Self {
            buffer_duration_ms: 2000,
            read_chunk_bytes: 2048,
            throttle_delay_ms: 15,
            stall_delay_ms: 50,
            desired_latency_ms: 100,
            ..Default::default()
        }
    }

    /// Create a configuration for unreliable networks.
    ///
    /// - Larger buffer (10s)
    /// - Larger reads and a more patient read timeout
    pub fn stable() -> Self {
        Self {
            buffer_duration_ms: 10_000,
            read_chunk_bytes: 8192,
            read_timeout_ms: 5000,
            desired_latency_ms: 300,
            ..Default::default()
        }
    }

    /// Parse a (possibly partial) JSON document, filling defaults and validating.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PlaybackError::Config(format!("Invalid engine config JSON: {}", e)))?;
        config.validate().map_err(PlaybackError::Config)?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let non_zero = [
            ("buffer_duration_ms", self.buffer_duration_ms),
            ("read_chunk_bytes", self.read_chunk_bytes as u64),
            ("throttle_delay_ms", self.throttle_delay_ms),
            ("stall_delay_ms", self.stall_delay_ms),
            ("open_timeout_ms", self.open_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("timeout_retry_delay_ms", self.timeout_retry_delay_ms),
            ("buffer_report_interval_ms", self.buffer_report_interval_ms),
            ("stop_grace_ms", self.stop_grace_ms),
            ("meter_interval_ms", self.meter_interval_ms),
            ("meter_window_ms", self.meter_window_ms),
            ("event_capacity", self.event_capacity as u64),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(format!("{} must be > 0", name));
        }

        if !(self.throttle_fill_ratio > 0.0 && self.throttle_fill_ratio <= 1.0) {
            return Err("throttle_fill_ratio must be in (0.0, 1.0]".to_string());
        }

        if !(self.meter_sensitivity > 0.0 && self.meter_sensitivity.is_finite()) {
            return Err("meter_sensitivity must be a positive number".to_string());
        }

        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err("initial_volume must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }

    /// Ring buffer capacity for `format`, at least one read chunk.
    pub fn buffer_capacity_bytes(&self, format: &AudioFormat) -> usize {
        format
            .bytes_for(Duration::from_millis(self.buffer_duration_ms))
            .max(self.read_chunk_bytes)
    }

    /// Bytes sampled per meter tick for `format`, at least one frame.
    pub fn meter_window_bytes(&self, format: &AudioFormat) -> usize {
        format
            .bytes_for(Duration::from_millis(self.meter_window_ms))
            .max(format.block_align())
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    pub fn stall_delay(&self) -> Duration {
        Duration::from_millis(self.stall_delay_ms)
    }

    pub fn read_pacing(&self) -> Duration {
        Duration::from_millis(self.read_pacing_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn timeout_retry_delay(&self) -> Duration {
        Duration::from_millis(self.timeout_retry_delay_ms)
    }

    pub fn buffer_report_interval(&self) -> Duration {
        Duration::from_millis(self.buffer_report_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn meter_interval(&self) -> Duration {
        Duration::from_millis(self.meter_interval_ms)
    }

    pub fn desired_latency(&self) -> Duration {
        Duration::from_millis(self.desired_latency_ms)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_buffer_duration_ms() -> u64 {
    5000
}

fn default_read_chunk_bytes() -> usize {
    4096
}

fn default_throttle_fill_ratio() -> f64 {
    0.70
}

fn default_throttle_delay_ms() -> u64 {
    30
}

fn default_stall_delay_ms() -> u64 {
    100
}

fn default_read_pacing_ms() -> u64 {
    10
}

fn default_open_timeout_ms() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    2000
}

fn default_timeout_retry_delay_ms() -> u64 {
    100
}

fn default_buffer_report_interval_ms() -> u64 {
    500
}

fn default_debug_report_every_reads() -> u64 {
    10
}

fn default_stop_grace_ms() -> u64 {
    100
}

fn default_meter_interval_ms() -> u64 {
    50
}

fn default_meter_window_ms() -> u64 {
    100
}

fn default_meter_sensitivity() -> f64 {
    2.0
}

fn default_desired_latency_ms() -> u64 {
    200
}

fn default_initial_volume() -> f32 {
    0.5
}

fn default_event_capacity() -> usize {
    radio_runtime::events::DEFAULT_EVENT_BUFFER_SIZE
}

fn default_redact_urls() -> bool {
    true
}
