//! HTTP client for the backend log API.
//!
//! Two surfaces, both stateless:
//! - REST operations: collection start/stop, status, recent/cached
//!   batches, the unified paginated read, and server-side search;
//! - the push stream: one long-lived connection per build delivering
//!   newline-delimited JSON frames.
//!
//! The client never retries and never owns reconnect policy; it
//! translates every failure into a typed [`pipewatch_core::SourceError`]
//! and lets the session layer decide.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod stream;

pub use client::LogApiClient;
pub use config::ClientConfig;
