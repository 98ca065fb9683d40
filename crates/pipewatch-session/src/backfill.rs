//! Gap backfill: after an unplanned disconnect, fetch a bounded
//! recent-history window and merge whatever the buffer has not seen.

use tokio::sync::RwLock;
use tracing::{debug, warn};

use pipewatch_core::{BuildId, LogBuffer, LogSource, MergeOutcome, NormalizedLogEvent};

/// Fetch up to `limit` recent events and merge only those newer than the
/// buffer's watermark.
///
/// Best-effort: a failed fetch is logged and swallowed, never blocking
/// the reconnect it precedes. A gap it leaves can still be closed by the
/// next attempt, since the recent window covers the live tail. Events at
/// or before the watermark are dropped here; an overlapping event that
/// slips through is still caught by the buffer's dedup, so a backfill
/// racing a fresh live batch cannot duplicate or reorder anything.
pub async fn close_gap<S: LogSource>(
    source: &S,
    build: &BuildId,
    limit: usize,
    buffer: &RwLock<LogBuffer>,
) -> MergeOutcome {
    let raw = match source.recent_logs(build, limit).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(build_id = %build, error = %e, "gap backfill failed, reconnecting anyway");
            return MergeOutcome::default();
        }
    };

    let watermark = buffer.read().await.last_timestamp();
    let fresh: Vec<NormalizedLogEvent> = raw
        .into_iter()
        .map(NormalizedLogEvent::from)
        .filter(|event| watermark.is_none_or(|w| event.timestamp > w))
        .collect();

    if fresh.is_empty() {
        debug!(build_id = %build, "backfill window held nothing new");
        return MergeOutcome::default();
    }

    let outcome = buffer.write().await.merge(fresh);
    debug!(
        build_id = %build,
        appended = outcome.appended,
        duplicates = outcome.duplicates,
        "gap backfill merged"
    );
    outcome
}
