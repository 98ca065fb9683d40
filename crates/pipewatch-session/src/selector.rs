//! Unified source selection: one paginated read API over a build,
//! regardless of whether it is still live or already archived.

use std::sync::Arc;

use tracing::debug;

use pipewatch_core::{
    LogFilter, LogLevel, LogMetadata, LogPage, LogQuery, LogSource, LogSourceKind, Pagination,
    SourceError, SourceResult,
};

use crate::controller::Shared;

/// Read interface bound to one controller's build.
///
/// While the build runs, reads filter the in-memory buffer; once its
/// status is terminal, reads go to archive storage with server-side
/// filtering. Both paths are built from the same [`LogFilter`], so
/// matching semantics cannot differ across the transition.
pub struct LogView<S> {
    shared: Arc<Shared<S>>,
}

pub(crate) fn view_of<S>(shared: Arc<Shared<S>>) -> LogView<S> {
    LogView { shared }
}

impl<S: LogSource> LogView<S> {
    /// One paginated read.
    ///
    /// # Errors
    ///
    /// Invalid filter parameters and archive-read failures surface as
    /// typed errors; a missing archive for a just-finished build falls
    /// back to the live buffer instead of failing.
    pub async fn get_logs(&self, query: &LogQuery) -> SourceResult<LogPage> {
        // Constructing the filter first keeps validation identical for
        // both paths: a bad regex fails archive reads too.
        let filter = LogFilter::from_query(query)?;

        if self.shared.current_status().await.is_terminal() {
            match self.shared.source.archived_logs(&self.shared.build, query).await {
                Ok(page) => return Ok(page),
                Err(SourceError::Api { status: 404, .. }) => {
                    debug!(build_id = %self.shared.build, "no archive yet, serving live buffer");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(self.live_page(query, &filter).await)
    }

    /// Serve from the in-memory accumulation. Live data arrives by push,
    /// not by paging backward, so `has_more` is always false.
    async fn live_page(&self, query: &LogQuery, filter: &LogFilter) -> LogPage {
        let buffer = self.shared.buffer.read().await;

        let mut error_count = 0_u64;
        let mut warning_count = 0_u64;
        for event in buffer.events() {
            match event.level {
                LogLevel::Error => error_count += 1,
                LogLevel::Warn => warning_count += 1,
                _ => {}
            }
        }

        let matched: Vec<_> = buffer.events().iter().filter(|e| filter.matches(e)).collect();
        let total = matched.len() as u64;
        let logs: Vec<_> = matched
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        LogPage {
            logs,
            source: LogSourceKind::Live,
            pagination: Pagination {
                offset: query.offset,
                limit: query.limit,
                total,
                has_more: false,
            },
            metadata: Some(LogMetadata {
                total_lines: buffer.len() as u64,
                error_count,
                warning_count,
                build_status: buffer.status(),
                duration: None,
            }),
        }
    }
}
