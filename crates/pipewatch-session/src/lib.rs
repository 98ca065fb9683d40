//! Session layer of the pipewatch log engine.
//!
//! One [`SessionController`] per build supervises one live push-stream
//! connection: connect, receive, reconnect with capped exponential
//! backoff, close the gap each drop leaves via a bounded recent-history
//! backfill, and probe collection status during prolonged silence. The
//! [`LogView`] built from a controller answers paginated reads from the
//! live buffer while the build runs and from archive storage once it
//! reaches a terminal status.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backfill;
mod controller;
mod selector;

pub use controller::{ConnectionState, SessionConfig, SessionController, SessionEvent};
pub use selector::LogView;
