//! The seam between the session supervisor and whatever produces log
//! data: a tagged event channel for the push stream, plus the operation
//! surface of the backend log API.
//!
//! The supervisor's state machine consumes [`StreamEvent`]s, so it can be
//! exercised in tests against an in-memory fake without a live network.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::SourceResult;
use crate::types::{BuildId, CollectionStatus, LogPage, LogQuery, RawLogEvent, StreamPayload};

/// One event from a push-stream connection.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The connection is established.
    Opened,
    /// A frame of log events arrived.
    Batch(StreamPayload),
    /// The connection failed; the transport will produce no more events.
    Errored(String),
    /// The connection ended cleanly.
    Closed,
}

/// Handle for one push-stream connection.
///
/// Exactly one handle may be open per build per controller. Closing is
/// idempotent; dropping the handle also detaches the transport.
#[derive(Debug)]
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    stop: Option<watch::Sender<bool>>,
}

impl StreamHandle {
    /// Pair a receiver of stream events with the transport's stop signal.
    #[must_use]
    pub fn new(events: mpsc::Receiver<StreamEvent>, stop: watch::Sender<bool>) -> Self {
        Self {
            events,
            stop: Some(stop),
        }
    }

    /// Next event, or `None` once the transport task is gone.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Tear down the underlying connection.
    pub fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Stateless operations against a backend log API.
///
/// Implementations never retry; the session layer owns retry policy.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Signal the backend to begin capturing logs for a build.
    /// Idempotent on the backend side.
    async fn start_collection(&self, build: &BuildId) -> SourceResult<()>;

    /// Signal the backend to stop capturing. Callers treat this as
    /// best-effort and swallow failures.
    async fn stop_collection(&self, build: &BuildId) -> SourceResult<()>;

    async fn status(&self, build: &BuildId) -> SourceResult<CollectionStatus>;

    /// Up to `limit` most recent raw events, for gap backfill.
    async fn recent_logs(&self, build: &BuildId, limit: usize) -> SourceResult<Vec<RawLogEvent>>;

    /// The full current cache snapshot, for initial load.
    async fn cached_logs(&self, build: &BuildId) -> SourceResult<Vec<RawLogEvent>>;

    /// Paginated read from archive storage with server-side filtering.
    async fn archived_logs(&self, build: &BuildId, query: &LogQuery) -> SourceResult<LogPage>;

    /// Open one push-stream connection.
    async fn open_stream(&self, build: &BuildId) -> SourceResult<StreamHandle>;
}
