//! The one filter predicate shared by live and archive reads.
//!
//! Live reads filter the in-memory buffer with this predicate; archive
//! reads send the same parameters to the backend, which applies the same
//! semantics (case-sensitive substring, standard regex syntax, level set
//! membership). Keeping a single construction path is what prevents the
//! two from drifting apart when a build flips from live to archived
//! mid-session.

use std::collections::HashSet;

use regex::Regex;

use crate::error::{SourceError, SourceResult};
use crate::types::{LogLevel, LogQuery, NormalizedLogEvent};

#[derive(Debug, Clone)]
enum TextMatcher {
    /// Case-sensitive substring match.
    Plain(String),
    Pattern(Regex),
}

impl TextMatcher {
    fn matches(&self, message: &str) -> bool {
        match self {
            Self::Plain(needle) => message.contains(needle.as_str()),
            Self::Pattern(pattern) => pattern.is_match(message),
        }
    }
}

/// Compiled filter over normalized events.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    levels: Option<HashSet<LogLevel>>,
    text: Option<TextMatcher>,
}

impl LogFilter {
    /// Build a filter from read parameters.
    ///
    /// # Errors
    ///
    /// An invalid regular expression is a [`SourceError::Config`] at
    /// construction time, never a silent fallback to substring matching.
    pub fn new(levels: &[LogLevel], search: Option<&str>, regex: bool) -> SourceResult<Self> {
        let levels = if levels.is_empty() {
            None
        } else {
            Some(levels.iter().copied().collect())
        };

        let text = match search {
            None | Some("") => None,
            Some(needle) if regex => Some(TextMatcher::Pattern(
                Regex::new(needle)
                    .map_err(|e| SourceError::Config(format!("invalid search regex: {e}")))?,
            )),
            Some(needle) => Some(TextMatcher::Plain(needle.to_owned())),
        };

        Ok(Self { levels, text })
    }

    /// Build the filter for one unified read.
    pub fn from_query(query: &LogQuery) -> SourceResult<Self> {
        Self::new(&query.levels, query.search.as_deref(), query.regex)
    }

    /// Whether `event` passes the filter.
    #[must_use]
    pub fn matches(&self, event: &NormalizedLogEvent) -> bool {
        if let Some(levels) = &self.levels {
            if !levels.contains(&event.level) {
                return false;
            }
        }
        self.text.as_ref().is_none_or(|t| t.matches(&event.message))
    }

    /// True when every event passes.
    #[must_use]
    pub const fn accepts_all(&self) -> bool {
        self.levels.is_none() && self.text.is_none()
    }
}
