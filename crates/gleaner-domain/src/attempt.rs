//! Attempt history - what was tried, where, and how it ended

use crate::extraction::ProviderErrorKind;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Identifier of an extraction provider (e.g. a model name)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a provider id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// How one provider attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
    /// The provider returned output
    Success,
    /// The provider failed in a way another provider or round may fix
    RetryableError,
    /// The item itself cannot be processed
    FatalError,
}

impl AttemptOutcome {
    /// Get the outcome name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::RetryableError => "retryable_error",
            AttemptOutcome::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider tried for one item in one round
///
/// Immutable once appended to a [`WorkItem`](crate::WorkItem).
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// Provider that was called
    pub provider: ProviderId,

    /// Scheduler round (1-based)
    pub round: u32,

    /// Wall-clock time of the first call
    pub started_at: SystemTime,

    /// Time spent on this provider, backoff included
    pub elapsed: Duration,

    /// Calls made against the provider before moving on
    pub tries: u32,

    /// Final outcome for this provider
    pub outcome: AttemptOutcome,

    /// Tag of the last error, if any
    pub error_kind: Option<ProviderErrorKind>,

    /// Message of the last error, if any
    pub error_detail: Option<String>,
}

impl AttemptRecord {
    /// Whether this attempt produced output
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}
