//! # Radio Runtime Module
//!
//! Provides the ambient runtime infrastructure for the radio playback engine:
//! - Logging and tracing infrastructure
//! - Event bus carrying player notifications
//! - Shared runtime error type
//!
//! ## Overview
//!
//! The playback engine never calls back into its observers directly. Every
//! status change, buffer report, meter level and error is published on the
//! [`events::EventBus`] and consumed by whoever subscribed, on whatever task
//! they choose.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{ErrorCategory, EventBus, EventStream, PlaybackState, PlayerEvent};
