//! Supervision of one live log-stream connection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pipewatch_core::{
    BackoffPolicy, BuildId, BuildStatus, LogBuffer, LogSource, MergeOutcome, NormalizedLogEvent,
    RawLogEvent, SourceResult, StreamEvent, StreamHandle,
};

use crate::backfill;

/// Lifecycle of the live connection, published through a watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out a backoff delay; `attempt` counts consecutive
    /// failures since the last successful receipt (0-indexed).
    Reconnecting { attempt: u32, delay: Duration },
    Stopped,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    StatusChanged(BuildStatus),
    /// New events landed in the buffer. When auto-scroll is enabled this
    /// is the advance-to-bottom cue; acting on it stays the presentation
    /// layer's decision.
    Appended { count: usize },
}

/// Supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Silence threshold before a one-shot status poll (milliseconds).
    pub idle_timeout_ms: u64,
    /// Recent-history window fetched after each drop.
    pub backfill_limit: usize,
    pub backoff: BackoffPolicy,
    /// Capacity of the session event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 20_000,
            backfill_limit: 200,
            backoff: BackoffPolicy::default(),
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_idle_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    #[must_use]
    pub const fn with_backfill_limit(mut self, limit: usize) -> Self {
        self.backfill_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// # Errors
    ///
    /// Returns a message per invalid field.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.idle_timeout_ms == 0 {
            errors.push("idle_timeout_ms must be > 0".to_owned());
        }
        if self.backfill_limit == 0 {
            errors.push("backfill_limit must be > 0".to_owned());
        }
        if self.event_capacity == 0 {
            errors.push("event_capacity must be > 0".to_owned());
        }
        if let Err(backoff_errors) = self.backoff.validate() {
            errors.extend(backoff_errors);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// State shared between the controller, its run loop, and views.
pub(crate) struct Shared<S> {
    pub(crate) source: S,
    pub(crate) build: BuildId,
    pub(crate) config: SessionConfig,
    pub(crate) buffer: RwLock<LogBuffer>,
    last_message_at: std::sync::Mutex<Option<Instant>>,
    last_error: std::sync::Mutex<Option<String>>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl<S: LogSource> Shared<S> {
    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
        if changed {
            let state = self.state_tx.borrow().clone();
            let _ = self.events_tx.send(SessionEvent::StateChanged(state));
        }
    }

    fn record_error(&self, message: impl Into<String>) {
        *self.last_error.lock().expect("last_error lock") = Some(message.into());
    }

    fn note_message(&self) {
        *self.last_message_at.lock().expect("last_message_at lock") = Some(Instant::now());
    }

    pub(crate) async fn current_status(&self) -> BuildStatus {
        self.buffer.read().await.status()
    }

    async fn merge_raw(&self, raw: Vec<RawLogEvent>) -> MergeOutcome {
        let events = raw.into_iter().map(NormalizedLogEvent::from);
        self.buffer.write().await.merge(events)
    }

    pub(crate) fn publish_merge(&self, outcome: MergeOutcome) {
        if outcome.appended > 0 {
            let _ = self.events_tx.send(SessionEvent::Appended {
                count: outcome.appended,
            });
        }
        if let Some(status) = outcome.status_change {
            let _ = self.events_tx.send(SessionEvent::StatusChanged(status));
        }
    }

    /// One-shot liveness probe after prolonged silence. Refreshes the
    /// displayed status only; connection state is never touched and
    /// failures leave the status stale until the next signal.
    async fn idle_poll(&self) {
        debug!(build_id = %self.build, "idle timeout, polling collection status");
        match self.source.status(&self.build).await {
            Ok(status) => {
                if status.is_active {
                    let change = self.buffer.write().await.set_status(BuildStatus::InProgress);
                    if let Some(status) = change {
                        let _ = self.events_tx.send(SessionEvent::StatusChanged(status));
                    }
                }
            }
            Err(e) => {
                debug!(build_id = %self.build, error = %e, "idle status poll failed");
            }
        }
    }
}

/// Supervises exactly one logical live connection for one build.
///
/// Owns the buffer and the stream handle outright; neither is ever
/// shared across build identifiers or exposed to other controllers.
pub struct SessionController<S> {
    shared: Arc<Shared<S>>,
    run: Mutex<Option<RunGuard>>,
}

struct RunGuard {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<S: LogSource + 'static> SessionController<S> {
    #[must_use]
    pub fn new(source: S, build: BuildId, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(config.event_capacity);
        Self {
            shared: Arc::new(Shared {
                source,
                build,
                config,
                buffer: RwLock::new(LogBuffer::new()),
                last_message_at: std::sync::Mutex::new(None),
                last_error: std::sync::Mutex::new(None),
                state_tx,
                events_tx,
            }),
            run: Mutex::new(None),
        }
    }

    /// Begin collection and open the live stream.
    ///
    /// A connection already running for this controller is closed first;
    /// there is never more than one live handle per build.
    ///
    /// # Errors
    ///
    /// Surfaces the backend's start-collection failure. The initial
    /// cache snapshot and everything after it are supervised and only
    /// reported through state.
    pub async fn start(&self) -> SourceResult<()> {
        self.halt_run_loop().await;

        self.shared.source.start_collection(&self.shared.build).await?;
        info!(build_id = %self.shared.build, "log collection started");

        // Initial snapshot; a miss only delays content until the stream
        // or a backfill delivers it.
        match self.shared.source.cached_logs(&self.shared.build).await {
            Ok(raw) => {
                let outcome = self.shared.merge_raw(raw).await;
                self.shared.publish_merge(outcome);
            }
            Err(e) => {
                warn!(build_id = %self.shared.build, error = %e, "initial cache load failed");
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(Arc::clone(&self.shared), shutdown_rx));
        *self.run.lock().await = Some(RunGuard { shutdown_tx, task });
        Ok(())
    }

    /// Stop supervision from any state. Idempotent: cancels a pending
    /// reconnect, closes the handle mid-connect, and is a no-op when
    /// already stopped. The backend stop call is best-effort; stopping
    /// never fails locally.
    pub async fn stop(&self) {
        self.halt_run_loop().await;

        if let Err(e) = self.shared.source.stop_collection(&self.shared.build).await {
            warn!(build_id = %self.shared.build, error = %e, "stop collection failed, ignoring");
        }
        self.shared.set_state(ConnectionState::Stopped);
    }

    /// The manual Retry action: a full stop followed by a fresh start.
    ///
    /// # Errors
    ///
    /// Same conditions as [`SessionController::start`].
    pub async fn restart(&self) -> SourceResult<()> {
        self.stop().await;
        self.start().await
    }

    async fn halt_run_loop(&self) {
        let guard = self.run.lock().await.take();
        if let Some(RunGuard { shutdown_tx, task }) = guard {
            let _ = shutdown_tx.send(true);
            let _ = task.await;
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Watch connection-state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to session notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    #[must_use]
    pub fn build_id(&self) -> &BuildId {
        &self.shared.build
    }

    /// Current build status (merged events and idle polls combined).
    pub async fn build_status(&self) -> BuildStatus {
        self.shared.current_status().await
    }

    /// Snapshot of the buffer in display order.
    pub async fn snapshot(&self) -> Vec<NormalizedLogEvent> {
        self.shared.buffer.read().await.events().to_vec()
    }

    pub async fn buffer_len(&self) -> usize {
        self.shared.buffer.read().await.len()
    }

    #[must_use]
    pub fn last_message_at(&self) -> Option<Instant> {
        *self.shared.last_message_at.lock().expect("last_message_at lock")
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().expect("last_error lock").clone()
    }

    /// Unified read interface over this controller's build.
    #[must_use]
    pub fn view(&self) -> crate::LogView<S> {
        crate::selector::view_of(Arc::clone(&self.shared))
    }
}

/// Why one connection attempt ended.
enum StreamEnd {
    Shutdown,
    Dropped,
}

async fn run_loop<S: LogSource>(shared: Arc<Shared<S>>, mut shutdown: watch::Receiver<bool>) {
    let mut attempt: u32 = 0;

    loop {
        shared.set_state(ConnectionState::Connecting);

        let opened = tokio::select! {
            _ = shutdown.changed() => {
                shared.set_state(ConnectionState::Stopped);
                return;
            }
            result = shared.source.open_stream(&shared.build) => result,
        };

        match opened {
            Ok(handle) => {
                if let StreamEnd::Shutdown =
                    consume_stream(&shared, handle, &mut shutdown, &mut attempt).await
                {
                    shared.set_state(ConnectionState::Stopped);
                    return;
                }
            }
            Err(e) => {
                warn!(build_id = %shared.build, error = %e, "stream open failed");
                shared.record_error(e.to_string());
            }
        }

        // A terminal build is done producing logs; the connection ending
        // is final and the selector serves the archive from here on.
        if shared.current_status().await.is_terminal() {
            info!(build_id = %shared.build, "build reached terminal status, leaving live mode");
            shared.set_state(ConnectionState::Disconnected);
            return;
        }

        if *shutdown.borrow() {
            shared.set_state(ConnectionState::Stopped);
            return;
        }

        let delay = shared.config.backoff.delay_for(attempt);
        debug!(
            build_id = %shared.build,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        shared.set_state(ConnectionState::Reconnecting { attempt, delay });

        tokio::select! {
            _ = shutdown.changed() => {
                shared.set_state(ConnectionState::Stopped);
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }
        attempt = attempt.saturating_add(1);

        // Close the gap the dropped connection left before reopening.
        let outcome = backfill::close_gap(
            &shared.source,
            &shared.build,
            shared.config.backfill_limit,
            &shared.buffer,
        )
        .await;
        shared.publish_merge(outcome);
    }
}

/// Consume one connection until it drops, the consumer stops us, or the
/// transport goes away. The idle timer re-arms on every event.
async fn consume_stream<S: LogSource>(
    shared: &Shared<S>,
    mut handle: StreamHandle,
    shutdown: &mut watch::Receiver<bool>,
    attempt: &mut u32,
) -> StreamEnd {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                handle.close();
                return StreamEnd::Shutdown;
            }
            () = tokio::time::sleep(shared.config.idle_timeout()) => {
                shared.idle_poll().await;
            }
            event = handle.next_event() => match event {
                Some(StreamEvent::Opened) => {
                    info!(build_id = %shared.build, "log stream connected");
                    *attempt = 0;
                    shared.set_state(ConnectionState::Connected);
                }
                Some(StreamEvent::Batch(payload)) => {
                    *attempt = 0;
                    shared.note_message();
                    let outcome = shared.merge_raw(payload.events).await;
                    shared.publish_merge(outcome);
                }
                Some(StreamEvent::Errored(reason)) => {
                    warn!(build_id = %shared.build, error = %reason, "log stream errored");
                    shared.record_error(reason);
                    return StreamEnd::Dropped;
                }
                Some(StreamEvent::Closed) => {
                    debug!(build_id = %shared.build, "log stream closed");
                    return StreamEnd::Dropped;
                }
                None => {
                    debug!(build_id = %shared.build, "log stream transport ended");
                    return StreamEnd::Dropped;
                }
            }
        }
    }
}
