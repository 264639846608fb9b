//! # Player Event Bus
//!
//! Push notifications from the playback engine to its observers, carried over
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`PlayerEvent`] covers status text, lifecycle state
//!   transitions, buffer fill reports, meter levels, volume changes, errors
//!   and free-form debug messages.
//! - **EventBus**: one broadcast channel per engine.
//! - **EventStream**: a receiver wrapper with optional filtering.
//!
//! ```text
//! ┌──────────────┐  emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ Controller   ├────────>│          ├────────────>│ UI         │
//! ├──────────────┤         │ EventBus │             ├────────────┤
//! │ StreamReader ├────────>│          ├────────────>│ Telemetry  │
//! ├──────────────┤         │          │             └────────────┘
//! │ VolumeMeter  ├────────>│          │
//! └──────────────┘         └──────────┘
//! ```
//!
//! ## Delivery
//!
//! Events are delivered on an unspecified worker context. Subscribers that
//! care about thread affinity (a UI thread, for instance) must hand events
//! off to their own execution context. Delivery is best effort: a subscriber
//! that falls behind receives `RecvError::Lagged(n)` and continues with newer
//! events, and events published while a session is being torn down may never
//! arrive.
//!
//! ```rust
//! use radio_runtime::events::{EventBus, PlayerEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(PlayerEvent::status("Playback started")).ok();
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Status changed");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// The volume meter alone publishes about twenty events per second, so this
/// leaves a subscriber several seconds of slack before it starts lagging.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Payload Types
// ============================================================================

/// Lifecycle state of the playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No session. The initial and final state.
    #[default]
    Stopped,
    /// Connecting to the stream and filling the buffer.
    Buffering,
    /// Audio is flowing to the output sink.
    Playing,
    /// Reserved for an external pause control; never entered internally.
    Paused,
    /// A failure is being cleaned up; always resolves to `Stopped`.
    Error,
}

impl PlaybackState {
    /// Returns `true` while a session owns resources.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Buffering | Self::Playing | Self::Paused)
    }

    /// Short lowercase label, suitable for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Buffering => "buffering",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse error classification carried by [`PlayerEvent::ErrorOccurred`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or missing stream URL.
    InvalidArgument,
    /// The decoder could not establish format or connection.
    StreamOpenFailure,
    /// A single read stalled or timed out.
    ReadStall,
    /// The decoder reported a hard failure mid-stream.
    ReadFailure,
    /// The output sink rejected an operation.
    Sink,
    /// The engine was used after shutdown.
    Disposed,
    /// Invalid engine configuration.
    Config,
    /// Anything else.
    Internal,
}

// ============================================================================
// Player Events
// ============================================================================

/// Notification published by the playback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PlayerEvent {
    /// Human-readable phase description ("Connecting to stream...").
    StatusChanged {
        /// Status text.
        message: String,
    },
    /// The session moved between lifecycle states.
    StateChanged {
        /// Previous state.
        from: PlaybackState,
        /// New state.
        to: PlaybackState,
    },
    /// Buffer fill level, emitted by the stream reader.
    BufferLevelChanged {
        /// Fill level in percent (0-100).
        percent: f64,
    },
    /// Instantaneous loudness from the volume meter.
    VolumeLevelChanged {
        /// Left channel level in [0, 1].
        left: f64,
        /// Right channel level in [0, 1].
        right: f64,
    },
    /// Output volume was changed.
    VolumeChanged {
        /// New volume in [0, 1].
        volume: f32,
    },
    /// An error was observed.
    ErrorOccurred {
        /// Classification of the failure.
        category: ErrorCategory,
        /// Error message.
        message: String,
        /// Short tag naming where it happened ("start playback", "stream reader").
        context: String,
    },
    /// Free-form diagnostic text.
    DebugMessage {
        /// Diagnostic text.
        message: String,
    },
}

impl PlayerEvent {
    /// Convenience constructor for [`PlayerEvent::StatusChanged`].
    pub fn status(message: impl Into<String>) -> Self {
        Self::StatusChanged {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`PlayerEvent::DebugMessage`].
    pub fn debug(message: impl Into<String>) -> Self {
        Self::DebugMessage {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`PlayerEvent::ErrorOccurred`].
    pub fn error(
        category: ErrorCategory,
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::ErrorOccurred {
            category,
            message: message.into(),
            context: context.into(),
        }
    }

    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            PlayerEvent::StatusChanged { .. } => "Status changed",
            PlayerEvent::StateChanged { .. } => "Playback state changed",
            PlayerEvent::BufferLevelChanged { .. } => "Buffer level changed",
            PlayerEvent::VolumeLevelChanged { .. } => "Volume level changed",
            PlayerEvent::VolumeChanged { .. } => "Volume changed",
            PlayerEvent::ErrorOccurred { .. } => "Playback error",
            PlayerEvent::DebugMessage { .. } => "Debug message",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            PlayerEvent::ErrorOccurred { .. } => EventSeverity::Error,
            PlayerEvent::StateChanged {
                to: PlaybackState::Error,
                ..
            } => EventSeverity::Warning,
            PlayerEvent::StatusChanged { .. }
            | PlayerEvent::StateChanged { .. }
            | PlayerEvent::VolumeChanged { .. } => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`PlayerEvent`]s.
///
/// Cloning the bus yields another handle on the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers. Publishers in this workspace treat
    /// the error as "nobody is listening" and drop it.
    pub fn emit(&self, event: PlayerEvent) -> Result<usize, SendError<PlayerEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    /// Creates a new [`EventStream`] subscriber.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&PlayerEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use radio_runtime::events::{EventBus, PlayerEvent};
///
/// let bus = EventBus::new(16);
/// let errors_only = bus
///     .stream()
///     .filter(|event| matches!(event, PlayerEvent::ErrorOccurred { .. }));
/// # drop(errors_only);
/// ```
pub struct EventStream {
    receiver: Receiver<PlayerEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<PlayerEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`/`try_recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PlayerEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &PlayerEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<PlayerEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<PlayerEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drains every event currently queued that passes the filter.
    ///
    /// Lag notifications are skipped; the stream resumes at the oldest event
    /// still retained by the channel.
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
