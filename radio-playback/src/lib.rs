//! # Radio Playback Module
//!
//! Live internet-radio playback engine.
//!
//! ## Overview
//!
//! This module handles:
//! - Session lifecycle for one station at a time (play, stop, replace)
//! - A bounded byte ring buffer between the network decoder and the device
//! - A background reader that keeps the buffer topped up without overfilling
//! - A periodic RMS volume meter over the audio actually being played
//! - Status, buffer, level and error notifications on an event bus
//!
//! Decoding and audio output are host collaborators behind the
//! [`StreamOpener`], [`StreamDecoder`] and [`OutputSink`] traits.
//!
//! ## Example
//!
//! ```ignore
//! use radio_playback::{PlayerBuilder, Station};
//! use std::sync::Arc;
//!
//! let player = PlayerBuilder::new()
//!     .opener(Arc::new(MyOpener))
//!     .sink(Arc::new(MySink))
//!     .build()?;
//!
//! let mut events = player.subscribe();
//! player.play(Station::new("Jazz FM", "https://example.com/jazz.mp3")).await?;
//! ```

pub mod builder;
pub mod config;
pub mod controller;
pub mod error;
pub mod feed;
pub mod reader;
pub mod ring_buffer;
pub mod session;
pub mod station;
pub mod traits;
pub mod volume_meter;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use builder::PlayerBuilder;
pub use config::EngineConfig;
pub use controller::{BufferSnapshot, PlayOutcome, PlaybackController};
pub use error::{OpenFailureCause, PlaybackError, Result};
pub use feed::PlaybackFeed;
pub use reader::{ReaderStats, StreamReader};
pub use ring_buffer::{OverflowPolicy, RingBuffer};
pub use session::{SessionId, SessionTracker};
pub use station::{validate_stream_url, Station};
pub use traits::{AudioFormat, OutputSink, StreamDecoder, StreamOpener};
pub use volume_meter::{MeterHandle, VolumeMeter, VolumeSample};

pub use radio_runtime::{ErrorCategory, EventBus, EventStream, PlaybackState, PlayerEvent};
