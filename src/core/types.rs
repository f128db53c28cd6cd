//! Core data structures shared across strategies, the pool feedback loop, and
//! the orchestrator.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use url::Url;

/// A target identifier resolved to the concrete page it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub id: String,
    pub url: Url,
}

impl FetchTarget {
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self { id: id.into(), url }
    }
}

/// Page body as returned by a transport or renderer, before classification.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: Bytes,
    pub url: Url,
}

impl FetchedPage {
    pub fn new(body: impl Into<Bytes>, url: Url) -> Self {
        Self {
            body: body.into(),
            url,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Raw payload handed to the extraction layer once a strategy succeeds.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub body: Bytes,
    pub url: Url,
    pub strategy: &'static str,
    /// Set when the page carried challenge hints that were not severe enough
    /// to reject it.
    pub challenge_detected: bool,
}

impl RawContent {
    pub fn new(body: impl Into<Bytes>, url: Url, strategy: &'static str) -> Self {
        Self {
            body: body.into(),
            url,
            strategy,
            challenge_detected: false,
        }
    }

    pub fn with_challenge_detected(mut self, detected: bool) -> Self {
        self.challenge_detected = detected;
        self
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Classified result of a single acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
    Success,
    TransportError,
    Blocked,
    Timeout,
}

impl AttemptOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::TransportError => "transport-error",
            AttemptOutcome::Blocked => "blocked",
            AttemptOutcome::Timeout => "timeout",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one attempt, surfaced through events and terminal failures.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub target: String,
    pub strategy: &'static str,
    /// Zero-based index within the strategy's attempt budget.
    pub attempt: u32,
    pub endpoint: Option<String>,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}
