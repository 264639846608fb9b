//! # Playback Controller
//!
//! Owns the single playback session and its lifecycle state machine.
//!
//! ## State Machine
//!
//! ```text
//!            play()              format + sink ok
//! Stopped ───────────> Buffering ─────────────────> Playing
//!    ▲                     │                           │
//!    │                     │ open/sink failure         │ stop() / reader failure
//!    │                     ▼                           │
//!    └──────────────────  Error  <─────────────────────┘ (failure only)
//!          cleanup                                      stop() goes straight
//!                                                       to Stopped
//! ```
//!
//! `Paused` exists in [`PlaybackState`] for hosts with an external pause
//! control; the controller never enters it.
//!
//! ## Concurrency
//!
//! `play`, `stop`, `set_volume` and `shutdown` serialize on one async mutex,
//! so a stop and a start can never interleave and at most one reader ever
//! writes into a session buffer. Queries read lock-free snapshots and never
//! wait on that mutex.
//!
//! A start in progress holds that mutex while it opens the stream, so `stop`
//! and `shutdown` first cancel the pending start and then take the lock. The
//! open and the sink start are each bounded by `open_timeout_ms` as well.
//! If a `play` future is dropped mid-start, a cleanup task finishes the
//! teardown so the sink is still stopped exactly once.
//!
//! Each session gets a fresh child of the controller's root cancellation
//! token plus a [`SessionId`]. A reader that fails reports its error once
//! and asks the controller to tear the session down; the request is dropped
//! if the session has already been replaced.

use crate::config::EngineConfig;
use crate::error::{OpenFailureCause, PlaybackError, Result};
use crate::feed::PlaybackFeed;
use crate::reader::StreamReader;
use crate::ring_buffer::RingBuffer;
use crate::session::{SessionId, SessionTracker};
use crate::station::Station;
use crate::traits::{AudioFormat, OutputSink, StreamOpener};
use crate::volume_meter::{MeterHandle, VolumeMeter, VolumeSample};
use parking_lot::{Mutex, RwLock};
use radio_runtime::logging::redact_stream_url;
use radio_runtime::{EventBus, EventStream, PlaybackState, PlayerEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const STATUS_READY: &str = "System ready";
pub const STATUS_CONNECTING: &str = "Connecting to stream...";
pub const STATUS_STARTED: &str = "Playback started";
pub const STATUS_STOPPED: &str = "Playback stopped";

// ============================================================================
// Public Types
// ============================================================================

/// Result of a successful [`PlaybackController::play`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// A new session was started.
    Started(SessionId),
    /// The same station was already playing; nothing changed.
    AlreadyPlaying,
}

/// Point-in-time view of the session buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSnapshot {
    pub buffered_bytes: usize,
    pub capacity_bytes: usize,
    /// Fill level in percent (0-100).
    pub percent: f64,
}

// ============================================================================
// Internal State
// ============================================================================

/// What `stop` needs to tear a session down. Guarded by the lifecycle mutex.
struct ActiveSession {
    id: SessionId,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Lifecycle {
    session: Option<ActiveSession>,
    /// Set before `sink.init` and cleared once `sink.stop` has been called.
    sink_active: bool,
}

/// What queries need. Replaced wholesale on start and stop.
#[derive(Clone)]
struct SessionView {
    id: SessionId,
    station: Station,
    format: AudioFormat,
    buffer: RingBuffer,
}

struct ControllerInner {
    opener: Arc<dyn StreamOpener>,
    sink: Arc<dyn OutputSink>,
    config: EngineConfig,
    events: EventBus,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    state: RwLock<PlaybackState>,
    view: RwLock<Option<SessionView>>,
    meter: Mutex<Option<MeterHandle>>,
    volume: Mutex<f32>,
    tracker: SessionTracker,
    disposed: AtomicBool,
    root: CancellationToken,
    /// Cancels the `play` currently holding the lifecycle lock, if any.
    pending_start: Mutex<Option<CancellationToken>>,
    /// Bumped by every `stop`/`shutdown` so a `play` queued behind one can
    /// tell it was overtaken.
    interrupts: AtomicU64,
}

// ============================================================================
// Controller
// ============================================================================

/// Single-session playback engine.
///
/// Cloning yields another handle on the same engine. Dropping the last
/// handle cancels every task the engine started.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<ControllerInner>,
}

impl PlaybackController {
    /// Create a controller. Prefer [`PlayerBuilder`](crate::PlayerBuilder).
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::Config`] if `config` fails validation.
    pub fn new(
        opener: Arc<dyn StreamOpener>,
        sink: Arc<dyn OutputSink>,
        config: EngineConfig,
        events: EventBus,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::Config)?;

        let inner = Arc::new(ControllerInner {
            opener,
            sink,
            volume: Mutex::new(config.initial_volume),
            config,
            events,
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            state: RwLock::new(PlaybackState::Stopped),
            view: RwLock::new(None),
            meter: Mutex::new(None),
            tracker: SessionTracker::new(),
            disposed: AtomicBool::new(false),
            root: CancellationToken::new(),
            pending_start: Mutex::new(None),
            interrupts: AtomicU64::new(0),
        });

        info!("Playback controller ready");
        inner.emit(PlayerEvent::status(STATUS_READY));
        Ok(Self { inner })
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Start playing `station`, replacing any current session.
    ///
    /// Returns [`PlayOutcome::AlreadyPlaying`] without touching the session
    /// if the same station is already playing.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::InvalidArgument`] for a missing or non-http(s) URL,
    ///   before anything is opened or stopped
    /// - [`PlaybackError::StreamOpenFailure`] if the decoder cannot open the
    ///   stream; the state passes through `Error` and ends at `Stopped`
    /// - [`PlaybackError::Sink`] if the output sink refuses to start
    /// - [`PlaybackError::Cancelled`] if `stop` or `shutdown` was called
    ///   before the session finished starting; the state ends at `Stopped`
    /// - [`PlaybackError::Disposed`] after [`shutdown`](Self::shutdown)
    ///
    /// Dropping the returned future part-way through is safe: whatever was
    /// acquired is released by a background cleanup task.
    #[instrument(skip(self, station), fields(station = %station.display_name()))]
    pub async fn play(&self, station: Station) -> Result<PlayOutcome> {
        self.inner.ensure_alive()?;
        station.validate()?;

        let interrupts = self.inner.interrupts.load(Ordering::SeqCst);
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.inner.ensure_alive()?;

        if self.inner.is_playing_station(&station) {
            debug!("Station already playing");
            self.inner
                .emit(PlayerEvent::debug(format!("Already playing {}", station.display_name())));
            return Ok(PlayOutcome::AlreadyPlaying);
        }

        let cancel_start = self.inner.begin_start(interrupts);
        let guard = StartGuard::arm(&self.inner);

        self.inner.stop_locked(&mut lifecycle).await;

        let started = tokio::select! {
            biased;
            _ = cancel_start.cancelled() => Err(PlaybackError::Cancelled),
            result = self.inner.start_locked(&mut lifecycle, station) => result,
        };

        let outcome = match started {
            Ok(id) => Ok(PlayOutcome::Started(id)),
            Err(PlaybackError::Cancelled) => {
                info!("Start interrupted before the session was up");
                self.inner.stop_locked(&mut lifecycle).await;
                Err(PlaybackError::Cancelled)
            }
            Err(err) => {
                self.inner.abandon_start(&err);
                Err(err)
            }
        };
        guard.disarm();
        outcome
    }

    /// Stop the current session. Safe to call when already stopped.
    ///
    /// Returns once resources are released. The reader task is given a short
    /// grace period to exit on its own and is aborted otherwise.
    ///
    /// # Errors
    ///
    /// Only [`PlaybackError::Disposed`].
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        self.inner.ensure_alive()?;
        self.inner.interrupt_start();
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.inner.stop_locked(&mut lifecycle).await;
        Ok(())
    }

    /// Set output volume. Values outside [0.0, 1.0] are ignored.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::Disposed`], or the sink's error if it rejects the
    /// level (the stored volume is left unchanged in that case).
    #[instrument(skip(self))]
    pub async fn set_volume(&self, level: f32) -> Result<()> {
        self.inner.ensure_alive()?;
        if !(0.0..=1.0).contains(&level) {
            debug!(level, "Ignoring out-of-range volume");
            return Ok(());
        }

        let lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.session.is_some() {
            self.inner.sink.set_volume(level).await?;
        }
        *self.inner.volume.lock() = level;
        drop(lifecycle);

        debug!(level, "Volume changed");
        self.inner.emit(PlayerEvent::VolumeChanged { volume: level });
        Ok(())
    }

    /// Stop metering for the current session.
    ///
    /// Returns `Ok(false)`, and emits nothing, if no meter was running.
    ///
    /// # Errors
    ///
    /// Only [`PlaybackError::Disposed`].
    pub fn stop_volume_meter(&self) -> Result<bool> {
        self.inner.ensure_alive()?;
        let Some(meter) = self.inner.meter.lock().take() else {
            return Ok(false);
        };
        meter.stop();
        self.inner.emit(PlayerEvent::debug("Volume meter stopped"));
        Ok(true)
    }

    /// Stop any session, stop the sink and refuse all further commands.
    ///
    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.inner.interrupt_start();
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let had_session = self.inner.stop_locked(&mut lifecycle).await;
        if !had_session {
            if let Err(err) = self.inner.sink.stop().await {
                warn!(error = %err, "Output sink failed to stop during shutdown");
            }
        }
        drop(lifecycle);
        self.inner.root.cancel();
        info!("Playback controller shut down");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        *self.inner.state.read()
    }

    /// `true` while buffering or playing.
    pub fn is_playing(&self) -> bool {
        matches!(
            self.state(),
            PlaybackState::Playing | PlaybackState::Buffering
        )
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.inner.view.read().as_ref().map(|view| view.id)
    }

    pub fn current_station(&self) -> Option<Station> {
        self.inner.view.read().as_ref().map(|view| view.station.clone())
    }

    pub fn current_format(&self) -> Option<AudioFormat> {
        self.inner.view.read().as_ref().map(|view| view.format)
    }

    /// Buffer occupancy of the active session, `None` when stopped.
    pub fn buffer_snapshot(&self) -> Option<BufferSnapshot> {
        self.inner.view.read().as_ref().map(|view| BufferSnapshot {
            buffered_bytes: view.buffer.buffered_bytes(),
            capacity_bytes: view.buffer.capacity_bytes(),
            percent: view.buffer.fill_ratio() * 100.0,
        })
    }

    /// Last applied volume.
    pub fn volume(&self) -> f32 {
        *self.inner.volume.lock()
    }

    pub fn is_volume_meter_enabled(&self) -> bool {
        self.inner
            .meter
            .lock()
            .as_ref()
            .map_or(false, MeterHandle::is_running)
    }

    /// Last meter reading, silent when no meter is running.
    pub fn current_volume_level(&self) -> VolumeSample {
        self.inner
            .meter
            .lock()
            .as_ref()
            .map_or(VolumeSample::SILENT, MeterHandle::last_sample)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Handle on the notification bus.
    pub fn events(&self) -> EventBus {
        self.inner.events.clone()
    }

    /// Subscribe to notifications. Delivered on an unspecified task.
    pub fn subscribe(&self) -> EventStream {
        self.inner.events.stream()
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state())
            .field("session", &self.current_session())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ============================================================================
// Session Management
// ============================================================================

impl ControllerInner {
    fn emit(&self, event: PlayerEvent) {
        self.events.emit(event).ok();
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(PlaybackError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Registers the cancellation token for a start. `interrupts` is the
    /// counter value seen before waiting for the lifecycle lock.
    fn begin_start(&self, interrupts: u64) -> CancellationToken {
        let token = self.root.child_token();
        *self.pending_start.lock() = Some(token.clone());
        // A stop that arrived while we queued for the lock wins.
        if self.interrupts.load(Ordering::SeqCst) != interrupts {
            token.cancel();
        }
        token
    }

    fn interrupt_start(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = self.pending_start.lock().take() {
            debug!("Cancelling pending start");
            token.cancel();
        }
    }

    fn shown_url(&self, url: &str) -> String {
        if self.config.redact_urls {
            redact_stream_url(url)
        } else {
            url.to_string()
        }
    }

    fn set_state(&self, to: PlaybackState) {
        let from = std::mem::replace(&mut *self.state.write(), to);
        if from != to {
            debug!(%from, %to, "Playback state changed");
            self.emit(PlayerEvent::StateChanged { from, to });
        }
    }

    fn is_playing_station(&self, station: &Station) -> bool {
        *self.state.read() == PlaybackState::Playing
            && self
                .view
                .read()
                .as_ref()
                .map_or(false, |view| view.station.same_stream(station))
    }

    /// Opens the stream and brings a new session up. Caller holds the lifecycle lock.
    ///
    /// Everything acquired here is owned by locals until the final commit, so
    /// an early return (or the future being dropped) releases it. The one
    /// exception is the sink, tracked by `lifecycle.sink_active`.
    async fn start_locked(
        self: &Arc<Self>,
        lifecycle: &mut Lifecycle,
        station: Station,
    ) -> Result<SessionId> {
        self.emit(PlayerEvent::status(STATUS_CONNECTING));
        self.set_state(PlaybackState::Buffering);

        let shown_url = self.shown_url(&station.url);
        info!(url = %shown_url, "Opening stream");
        self.emit(PlayerEvent::debug(format!("Connecting to {}", shown_url)));

        let open_timeout = self.config.open_timeout();
        let decoder = tokio::time::timeout(open_timeout, self.opener.open(station.url.trim()))
            .await
            .map_err(|_| PlaybackError::StreamOpenFailure {
                cause: OpenFailureCause::Connection,
                message: format!("no response within {} ms", self.config.open_timeout_ms),
            })?
            .map_err(PlaybackError::into_open_failure)?;

        let format = decoder
            .format()
            .filter(AudioFormat::is_valid)
            .ok_or_else(|| PlaybackError::open_failure(OpenFailureCause::MissingFormat))?;
        info!(%format, "Stream format negotiated");
        self.emit(PlayerEvent::debug(format!("Format: {}", format)));

        let capacity = self.config.buffer_capacity_bytes(&format);
        let window = self.config.meter_window_bytes(&format);
        let buffer = RingBuffer::new(capacity);
        let tap = PlaybackFeed::meter_tap(window);
        let feed = PlaybackFeed::with_tap(buffer.clone(), tap.clone(), format)
            .with_latency_hint(self.config.desired_latency());
        self.emit(PlayerEvent::debug(format!(
            "Buffer: {} bytes ({} ms), meter window: {} bytes",
            capacity, self.config.buffer_duration_ms, window
        )));

        let volume = *self.volume.lock();
        lifecycle.sink_active = true;
        let started = tokio::time::timeout(open_timeout, async {
            self.sink.init(feed, &format).await?;
            self.sink.set_volume(volume).await?;
            self.sink.play().await
        })
        .await
        .unwrap_or_else(|_| {
            Err(PlaybackError::Sink(format!(
                "output did not start within {} ms",
                self.config.open_timeout_ms
            )))
        });
        if let Err(err) = started {
            if let Err(stop_err) = self.release_sink(lifecycle).await {
                warn!(error = %stop_err, "Output sink failed to stop after a failed start");
            }
            return Err(err);
        }

        let id = self.tracker.begin();
        let cancel = self.root.child_token();

        let meter = VolumeMeter::new(tap, format, &self.config).spawn(
            self.config.meter_interval(),
            self.events.clone(),
            cancel.child_token(),
        );

        let reader = StreamReader::new(
            id,
            self.tracker.clone(),
            decoder,
            buffer.clone(),
            self.config.clone(),
            self.events.clone(),
            cancel.clone(),
        );
        let reader = tokio::spawn(supervise_reader(Arc::downgrade(self), id, reader));

        lifecycle.session = Some(ActiveSession {
            id,
            cancel,
            reader: Some(reader),
        });
        *self.view.write() = Some(SessionView {
            id,
            station,
            format,
            buffer,
        });
        *self.meter.lock() = Some(meter);

        self.set_state(PlaybackState::Playing);
        info!(session = %id, "Playback started");
        self.emit(PlayerEvent::status(STATUS_STARTED));
        Ok(id)
    }

    /// Reports a failed start and settles back to `Stopped`.
    fn abandon_start(&self, err: &PlaybackError) {
        error!(error = %err, "Failed to start playback");
        self.set_state(PlaybackState::Error);
        self.emit(PlayerEvent::error(
            err.category(),
            err.to_string(),
            "start playback",
        ));
        self.set_state(PlaybackState::Stopped);
    }

    /// Stops the sink if it was initialised and not yet stopped.
    async fn release_sink(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        if std::mem::take(&mut lifecycle.sink_active) {
            self.sink.stop().await?;
        }
        Ok(())
    }

    /// Tears down the current session. Caller holds the lifecycle lock.
    ///
    /// Also finishes off a start that never committed a session. Returns
    /// `false` (and emits nothing) if there was nothing to stop.
    async fn stop_locked(&self, lifecycle: &mut Lifecycle) -> bool {
        let session = lifecycle.session.take();
        if session.is_none()
            && !lifecycle.sink_active
            && *self.state.read() == PlaybackState::Stopped
        {
            return false;
        }

        self.tracker.end();
        let meter = self.meter.lock().take();

        if let Some(mut session) = session {
            debug!(session = %session.id, "Stopping session");
            session.cancel.cancel();
            if let Some(reader) = session.reader.take() {
                self.join_reader(reader).await;
            }
        }

        if let Err(err) = self.release_sink(lifecycle).await {
            warn!(error = %err, "Output sink failed to stop");
            self.emit(PlayerEvent::error(
                err.category(),
                err.to_string(),
                "stop playback",
            ));
        }

        if let Some(meter) = meter {
            meter.stop();
        }
        *self.view.write() = None;

        self.set_state(PlaybackState::Stopped);
        info!("Playback stopped");
        self.emit(PlayerEvent::status(STATUS_STOPPED));
        true
    }

    /// Best-effort join: wait out the grace period, then abort.
    async fn join_reader(&self, mut reader: JoinHandle<()>) {
        let grace = self.config.stop_grace();
        if tokio::time::timeout(grace, &mut reader).await.is_ok() {
            return;
        }

        debug!(grace_ms = self.config.stop_grace_ms, "Reader still running after grace period, aborting");
        reader.abort();
        if tokio::time::timeout(grace, reader).await.is_err() {
            warn!("Reader task did not unwind after abort");
        }
    }

    /// Ends session `id` after its reader failed. No-op if `id` is stale.
    async fn fail_session(self: Arc<Self>, id: SessionId, err: PlaybackError) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.session.as_ref().map(|session| session.id) != Some(id) {
            debug!(session = %id, "Ignoring failure from a replaced session");
            return;
        }

        warn!(session = %id, error = %err, "Stream reader failed, stopping session");
        self.set_state(PlaybackState::Error);
        self.stop_locked(&mut lifecycle).await;
    }

    /// Finishes the teardown of a `play` whose future was dropped mid-start.
    async fn recover_abandoned_start(self: Arc<Self>) {
        let mut lifecycle = self.lifecycle.lock().await;
        // A later play already replaced or cleaned up after it.
        if lifecycle.session.is_some() {
            return;
        }
        if self.stop_locked(&mut lifecycle).await {
            debug!("Released resources of an abandoned start");
        }
    }
}

/// Armed while `play` is between taking the lifecycle lock and returning.
///
/// If the future is dropped in that window, spawns
/// [`ControllerInner::recover_abandoned_start`].
struct StartGuard {
    inner: Option<Arc<ControllerInner>>,
}

impl StartGuard {
    fn arm(inner: &Arc<ControllerInner>) -> Self {
        Self {
            inner: Some(Arc::clone(inner)),
        }
    }

    fn disarm(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.pending_start.lock().take();
        }
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        inner.pending_start.lock().take();
        warn!("Start abandoned mid-way, scheduling cleanup");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(inner.recover_abandoned_start());
            }
            Err(_) => warn!("No runtime available to clean up an abandoned start"),
        }
    }
}

/// Runs the reader and hands hard failures back to the controller.
///
/// The teardown runs on its own task because it joins this one.
async fn supervise_reader(inner: Weak<ControllerInner>, id: SessionId, reader: StreamReader) {
    match reader.run().await {
        Ok(stats) => debug!(session = %id, ?stats, "Reader exited"),
        Err(err) => {
            if let Some(inner) = inner.upgrade() {
                tokio::spawn(inner.fail_session(id, err));
            }
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
