//! Ordered, duplicate-free accumulation of normalized log events.

use std::collections::HashSet;

use crate::types::{BuildStatus, NormalizedLogEvent};

/// What one [`LogBuffer::merge`] call did to the buffer.
///
/// `appended > 0` is the signal the owner uses to raise an
/// advance-to-bottom notification toward the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub appended: usize,
    pub duplicates: usize,
    /// New current build status, when a merged event changed it.
    pub status_change: Option<BuildStatus>,
}

/// The single consistent log view for one build.
///
/// Invariants:
/// - events are sorted ascending by timestamp; ties keep arrival order
///   (stable sort) and are never re-ordered retroactively;
/// - no two entries share a dedup key (exact timestamp + message pair;
///   collisions between genuinely distinct identical lines are an
///   accepted trade-off, the backend assigns no per-event id);
/// - events are only removed by [`LogBuffer::reset`].
#[derive(Debug, Default)]
pub struct LogBuffer {
    events: Vec<NormalizedLogEvent>,
    seen: HashSet<(i64, String)>,
    last_timestamp: Option<i64>,
    status: BuildStatus,
}

impl LogBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one batch into the buffer.
    ///
    /// Duplicates are silently dropped, so a backfill batch overlapping
    /// already-merged live events is harmless and cannot displace the
    /// arrival order of existing timestamp ties.
    pub fn merge<I>(&mut self, batch: I) -> MergeOutcome
    where
        I: IntoIterator<Item = NormalizedLogEvent>,
    {
        let mut outcome = MergeOutcome::default();

        for event in batch {
            let (timestamp, message) = event.dedup_key();
            if self.seen.contains(&(timestamp, message.to_owned())) {
                outcome.duplicates += 1;
                continue;
            }

            self.seen.insert((timestamp, event.message.clone()));
            self.last_timestamp = Some(self.last_timestamp.map_or(timestamp, |t| t.max(timestamp)));

            if let Some(change) = self.apply_status(event.build_status) {
                outcome.status_change = Some(change);
            }

            self.events.push(event);
            outcome.appended += 1;
        }

        if outcome.appended > 0 {
            // Stable: timestamp ties keep their insertion order.
            self.events.sort_by_key(|e| e.timestamp);
        }

        outcome
    }

    /// Propagate a piggy-backed status. IN_PROGRESS markers and
    /// unparseable statuses are not propagated, and a terminal status is
    /// never downgraded.
    fn apply_status(&mut self, status: Option<BuildStatus>) -> Option<BuildStatus> {
        let status = status?;
        if matches!(status, BuildStatus::InProgress | BuildStatus::Unknown) {
            return None;
        }
        if self.status.is_terminal() && !status.is_terminal() {
            return None;
        }
        if status == self.status {
            return None;
        }
        self.status = status;
        Some(status)
    }

    /// Events in display order.
    #[must_use]
    pub fn events(&self) -> &[NormalizedLogEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Highest timestamp merged so far; the gap-backfill watermark.
    #[must_use]
    pub const fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }

    /// Current build status as derived from merged events.
    #[must_use]
    pub const fn status(&self) -> BuildStatus {
        self.status
    }

    /// Overwrite the tracked status from an out-of-band source (the idle
    /// status poll). Terminal statuses are still never downgraded.
    pub fn set_status(&mut self, status: BuildStatus) -> Option<BuildStatus> {
        if self.status.is_terminal() && !status.is_terminal() {
            return None;
        }
        if status == self.status {
            return None;
        }
        self.status = status;
        Some(status)
    }

    /// Drop everything. Only valid when the caller switches to a new
    /// build identifier.
    pub fn reset(&mut self) {
        self.events.clear();
        self.seen.clear();
        self.last_timestamp = None;
        self.status = BuildStatus::Unknown;
    }
}
