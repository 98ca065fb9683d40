//! Shared vocabulary for the log engine: wire shapes as the backend sends
//! them and the normalized event every source is converted into before
//! merging.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one logical build, assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BuildId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BuildId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Normalized severity of a log line.
///
/// Raw events carry free-form level strings; anything unrecognized maps
/// to [`LogLevel::Unknown`] rather than failing the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    #[default]
    #[serde(other)]
    Unknown,
}

impl LogLevel {
    /// Lenient parse of a wire-level string (case-insensitive, common
    /// aliases accepted).
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ERROR" | "ERR" | "FATAL" => Self::Error,
            "WARN" | "WARNING" => Self::Warn,
            "INFO" => Self::Info,
            "DEBUG" | "TRACE" => Self::Debug,
            _ => Self::Unknown,
        }
    }

    /// Wire label for request parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a build.
///
/// UNKNOWN → PENDING → IN_PROGRESS → {SUCCESS | FAILED | STOPPED};
/// terminal once past IN_PROGRESS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Stopped,
    #[default]
    #[serde(other)]
    Unknown,
}

impl BuildStatus {
    /// Terminal statuses admit no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Stopped)
    }

    /// Lenient parse of a wire status string.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" => Self::Pending,
            "IN_PROGRESS" | "RUNNING" => Self::InProgress,
            "SUCCESS" | "SUCCEEDED" | "PASSED" => Self::Success,
            "FAILED" | "FAILURE" | "ERROR" => Self::Failed,
            "STOPPED" | "CANCELLED" | "CANCELED" | "ABORTED" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log event exactly as the backend emits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogEvent {
    /// Milliseconds since epoch; the source-of-truth ordering key.
    pub timestamp: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Pipeline phase that emitted the line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Sequence position assigned by the backend for archived batches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
    /// Piggy-backed build status update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_status: Option<String>,
}

/// The canonical event shape all sources are converted into before merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedLogEvent {
    pub timestamp: i64,
    pub message: String,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_status: Option<BuildStatus>,
}

impl From<RawLogEvent> for NormalizedLogEvent {
    fn from(raw: RawLogEvent) -> Self {
        Self {
            timestamp: raw.timestamp,
            message: raw.message,
            level: raw.level.as_deref().map_or(LogLevel::Unknown, LogLevel::from_wire),
            source: raw.source,
            line_number: raw.line_number,
            build_status: raw.build_status.as_deref().map(BuildStatus::from_wire),
        }
    }
}

impl NormalizedLogEvent {
    /// Dedup identity: exact (timestamp, message) pair. Collisions between
    /// genuinely distinct lines sharing both are accepted; the backend
    /// guarantees no per-event unique id.
    #[must_use]
    pub fn dedup_key(&self) -> (i64, &str) {
        (self.timestamp, self.message.as_str())
    }
}

/// One frame pushed over the live stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPayload {
    pub build_id: BuildId,
    pub events: Vec<RawLogEvent>,
    pub timestamp: i64,
}

/// Collection state reported by the backend for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStatus {
    pub build_id: BuildId,
    pub is_active: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_count: Option<u64>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Request/response bookkeeping for paginated archive reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
    pub has_more: bool,
}

/// Which path served a unified read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSourceKind {
    /// In-memory accumulation of a still-running build. The backend's
    /// unified endpoint labels this path `realtime`.
    #[serde(alias = "realtime")]
    Live,
    Archive,
}

/// Aggregate counters attached to unified reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMetadata {
    pub total_lines: u64,
    pub error_count: u64,
    pub warning_count: u64,
    #[serde(default)]
    pub build_status: BuildStatus,
    /// Wall-clock duration of the build in milliseconds, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// Result of one unified read, from either source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub logs: Vec<NormalizedLogEvent>,
    pub source: LogSourceKind,
    pub pagination: Pagination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<LogMetadata>,
}

/// Parameters of one unified read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub limit: u64,
    pub offset: u64,
    /// Empty means all levels.
    pub levels: Vec<LogLevel>,
    pub search: Option<String>,
    /// Interpret `search` as a regular expression.
    pub regex: bool,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            levels: Vec::new(),
            search: None,
            regex: false,
        }
    }
}

impl LogQuery {
    /// Comma-joined level labels for request parameters, deduplicated and
    /// in severity order; `None` when no level filter applies.
    #[must_use]
    pub fn levels_param(&self) -> Option<String> {
        if self.levels.is_empty() {
            return None;
        }
        let labels: BTreeSet<&str> = self.levels.iter().map(|l| l.as_str()).collect();
        Some(labels.into_iter().collect::<Vec<_>>().join(","))
    }
}

/// Generic `{success, message?}` acknowledgement envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `{success, data}` envelope wrapping raw event batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<RawLogEvent>,
}

/// Server-side search request. Search is implemented entirely by the
/// backend; these types exist only so results can be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<LogLevel>,
    #[serde(default)]
    pub include_context: bool,
    #[serde(default)]
    pub context_lines: u32,
}

/// Byte span of one match within a hit's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub line_number: u64,
    #[serde(default)]
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub matches: Vec<SearchMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total_matches: u64,
    /// Server-side search latency in milliseconds.
    pub search_time: u64,
}
