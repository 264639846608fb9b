//! # Player Builder
//!
//! Assembles a [`PlaybackController`] from its collaborators.
//!
//! The decoder opener and the output sink are host-provided and required;
//! [`build`](PlayerBuilder::build) fails fast with an actionable message when
//! either is missing. The configuration and event bus have defaults.
//!
//! ## Usage
//!
//! ```ignore
//! use radio_playback::{EngineConfig, PlayerBuilder};
//! use std::sync::Arc;
//!
//! let player = PlayerBuilder::new()
//!     .opener(Arc::new(MyOpener))
//!     .sink(Arc::new(MySink))
//!     .config(EngineConfig::low_latency())
//!     .build()?;
//! ```

use crate::config::EngineConfig;
use crate::controller::PlaybackController;
use crate::error::{PlaybackError, Result};
use crate::traits::{OutputSink, StreamOpener};
use radio_runtime::logging::LoggingConfig;
use radio_runtime::EventBus;
use std::sync::Arc;

#[derive(Default)]
pub struct PlayerBuilder {
    opener: Option<Arc<dyn StreamOpener>>,
    sink: Option<Arc<dyn OutputSink>>,
    config: Option<EngineConfig>,
    events: Option<EventBus>,
    redact_urls: Option<bool>,
}

impl PlayerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the decoder factory used to open station URLs.
    pub fn opener(mut self, opener: Arc<dyn StreamOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Sets the audio output device.
    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Overrides [`EngineConfig::default`].
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Takes URL redaction from the host's logging settings, overriding
    /// `EngineConfig::redact_urls`.
    pub fn logging(mut self, logging: &LoggingConfig) -> Self {
        self.redact_urls = Some(logging.redact_urls);
        self
    }

    /// Publishes on an existing bus instead of creating one sized by
    /// `event_capacity`.
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the controller.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::Config`] if the opener or sink is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<PlaybackController> {
        let opener = self.opener.ok_or_else(|| {
            PlaybackError::Config(
                "Stream opener is required. Use .opener() to provide a decoder factory."
                    .to_string(),
            )
        })?;

        let sink = self.sink.ok_or_else(|| {
            PlaybackError::Config(
                "Output sink is required. Use .sink() to provide an audio output.".to_string(),
            )
        })?;

        let mut config = self.config.unwrap_or_default();
        if let Some(redact) = self.redact_urls {
            config.redact_urls = redact;
        }
        config.validate().map_err(PlaybackError::Config)?;

        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(config.event_capacity));

        PlaybackController::new(opener, sink, config, events)
    }
}

impl std::fmt::Debug for PlayerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerBuilder")
            .field("opener", &self.opener.is_some())
            .field("sink", &self.sink.is_some())
            .field("config", &self.config)
            .field("redact_urls", &self.redact_urls)
            .finish()
    }
}
