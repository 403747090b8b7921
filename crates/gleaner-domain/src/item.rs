//! Work item module - one unit of work and its lifecycle

use crate::attempt::AttemptRecord;
use crate::extraction::ItemOutput;
use crate::natural::natural_cmp;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identifier of a work item, derived from its source asset
///
/// Ordering is natural (numeric-aware): `item2 < item10`. Ids that are
/// naturally equal but textually different (`q01`, `q1`) fall back to
/// plain string order so that `Ord` stays consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemId(String);

impl ItemId {
    /// Create an id from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from a file path (the file stem)
    ///
    /// # Examples
    ///
    /// ```
    /// use gleaner_domain::ItemId;
    ///
    /// let id = ItemId::from_path("images/q12.jpeg").unwrap();
    /// assert_eq!(id.as_str(), "q12");
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .file_stem()
            .map(|stem| Self(stem.to_string_lossy().into_owned()))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque handle to the input asset of a work item
///
/// Owned by the caller; the dispatcher only hands it to providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef(PathBuf);

impl SourceRef {
    /// Create a source reference from a path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Path of the underlying asset
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// File name of the asset, for display
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Lifecycle state of a work item
///
/// ```text
/// Pending -> InFlight -> Succeeded
/// Pending -> InFlight -> Failed -> Pending      (rounds remain)
/// Pending -> InFlight -> Failed -> Exhausted    (rounds spent)
/// Pending -> InFlight -> Exhausted              (fatal error)
/// Pending -> Exhausted                          (cancelled / final sweep)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// Waiting for the next round
    Pending,

    /// A dispatch is running for this item
    InFlight,

    /// Output produced (terminal)
    Succeeded,

    /// Last round failed with a retryable error; eligible for the next round
    Failed,

    /// Given up on after fatal error, spent rounds or cancellation (terminal)
    Exhausted,
}

impl ItemState {
    /// Get the state name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::InFlight => "in_flight",
            ItemState::Succeeded => "succeeded",
            ItemState::Failed => "failed",
            ItemState::Exhausted => "exhausted",
        }
    }

    /// Whether this state ends the item's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Succeeded | ItemState::Exhausted)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, next),
            (Pending, InFlight)
                | (Pending, Exhausted)
                | (InFlight, Succeeded)
                | (InFlight, Failed)
                | (InFlight, Exhausted)
                | (Failed, Pending)
                | (Failed, Exhausted)
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item ended up `Exhausted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExhaustReason {
    /// Every configured round was spent on retryable failures
    RoundsSpent {
        /// Rounds in which the item was attempted
        rounds: u32,
    },

    /// A fatal item error short-circuited the remaining rounds
    Fatal {
        /// Error detail reported by the provider adapter
        detail: String,
    },

    /// The run was cancelled before the item could finish
    Cancelled,
}

impl ExhaustReason {
    /// Short machine-readable tag
    pub fn tag(&self) -> &'static str {
        match self {
            ExhaustReason::RoundsSpent { .. } => "rounds_spent",
            ExhaustReason::Fatal { .. } => "fatal",
            ExhaustReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExhaustReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustReason::RoundsSpent { rounds } => {
                write!(f, "retries exhausted after {} round(s)", rounds)
            }
            ExhaustReason::Fatal { detail } => write!(f, "fatal: {}", detail),
            ExhaustReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Rejected state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    /// Item the transition was attempted on
    pub id: ItemId,
    /// Current state
    pub from: ItemState,
    /// Requested state
    pub to: ItemState,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item '{}': {} -> {} is not allowed", self.id, self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// One unit of work and its full history within a run
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// Stable identifier
    pub id: ItemId,

    /// Input asset
    pub source: SourceRef,

    /// Current lifecycle state
    pub state: ItemState,

    /// One record per provider tried, in order
    pub attempts: Vec<AttemptRecord>,

    /// Output, present iff `state == Succeeded`
    pub result: Option<ItemOutput>,

    /// Present iff `state == Exhausted`
    pub exhaust_reason: Option<ExhaustReason>,

    /// Number of rounds that ended in a retryable failure
    pub failed_rounds: u32,
}

impl WorkItem {
    /// Create a new pending item
    pub fn new(id: ItemId, source: SourceRef) -> Self {
        Self {
            id,
            source,
            state: ItemState::Pending,
            attempts: Vec::new(),
            result: None,
            exhaust_reason: None,
            failed_rounds: 0,
        }
    }

    /// Move to `next`, enforcing the state machine
    pub fn transition(&mut self, next: ItemState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        if next == ItemState::Failed {
            self.failed_rounds += 1;
        }
        self.state = next;
        Ok(())
    }

    /// Record a successful output
    pub fn succeed(&mut self, output: ItemOutput) -> Result<(), TransitionError> {
        self.transition(ItemState::Succeeded)?;
        self.result = Some(output);
        Ok(())
    }

    /// Give up on the item
    pub fn exhaust(&mut self, reason: ExhaustReason) -> Result<(), TransitionError> {
        self.transition(ItemState::Exhausted)?;
        self.exhaust_reason = Some(reason);
        Ok(())
    }

    /// Number of provider calls made across all attempts
    pub fn total_tries(&self) -> u32 {
        self.attempts.iter().map(|a| a.tries).sum()
    }

    /// Rounds in which this item was dispatched at least once
    pub fn rounds_attempted(&self) -> u32 {
        let mut rounds: Vec<u32> = self.attempts.iter().map(|a| a.round).collect();
        rounds.dedup();
        rounds.len() as u32
    }
}
