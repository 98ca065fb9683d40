//! Reconnect delay policy.
//!
//! One canonical policy for every reconnect path: exponential from a
//! floor, doubling per consecutive failure, capped at a ceiling, with an
//! unbounded attempt count. A live build may sit behind a multi-minute
//! network blip, so the supervisor keeps retrying until the build reaches
//! a terminal status or the caller stops it; the ceiling bounds the retry
//! cadence, not the retry count. Delays are deterministic (no jitter).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff with a floor and a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay for the first retry (milliseconds).
    pub floor_ms: u64,
    /// Delay cap (milliseconds).
    pub ceiling_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            floor_ms: 1_000,
            ceiling_ms: 30_000,
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the floor delay.
    #[must_use]
    pub const fn with_floor_ms(mut self, ms: u64) -> Self {
        self.floor_ms = ms;
        self
    }

    /// Builder: set the ceiling delay.
    #[must_use]
    pub const fn with_ceiling_ms(mut self, ms: u64) -> Self {
        self.ceiling_ms = ms;
        self
    }

    /// Delay before retry number `attempt` (0-indexed consecutive
    /// failures; the counter resets to zero on any successful receipt).
    #[must_use]
    pub const fn delay_for(&self, attempt: u32) -> Duration {
        // Shift capped to keep the multiply from overflowing.
        let exp = if attempt > 30 { 30 } else { attempt };
        let ms = self.floor_ms.saturating_mul(1_u64 << exp);
        let ms = if ms > self.ceiling_ms { self.ceiling_ms } else { ms };
        Duration::from_millis(ms)
    }

    /// # Errors
    ///
    /// Returns a message per invalid field.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.floor_ms == 0 {
            errors.push("floor_ms must be > 0".to_owned());
        }
        if self.ceiling_ms < self.floor_ms {
            errors.push("ceiling_ms must be >= floor_ms".to_owned());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
