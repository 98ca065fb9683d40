//! Core building blocks for the pipewatch build-log streaming engine.
//!
//! Everything in this crate is transport-free: the normalized log model,
//! the ordered dedup buffer, the shared filter predicate, the reconnect
//! backoff policy, and the source seam the session layer supervises
//! against. HTTP lives in `pipewatch-client`; supervision lives in
//! `pipewatch-session`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backoff;
pub mod buffer;
pub mod error;
pub mod filter;
pub mod source;
pub mod types;

pub use backoff::BackoffPolicy;
pub use buffer::{LogBuffer, MergeOutcome};
pub use error::{SourceError, SourceResult};
pub use filter::LogFilter;
pub use source::{LogSource, StreamEvent, StreamHandle};
pub use types::{
    BuildId, BuildStatus, CollectionStatus, LogLevel, LogMetadata, LogPage, LogQuery,
    LogSourceKind, NormalizedLogEvent, Pagination, RawLogEvent, StreamPayload,
};
