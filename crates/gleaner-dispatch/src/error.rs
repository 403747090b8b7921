//! Error types for dispatcher operations

use gleaner_domain::traits::SinkError;
use gleaner_domain::{ItemId, TransitionError};
use thiserror::Error;

/// Errors that abort a dispatcher operation
///
/// Individual item failures are never reported here; they end up in the
/// registry as `Exhausted` items instead.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Item id not present in the registry
    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    /// Item id registered twice
    #[error("Duplicate item: {0}")]
    DuplicateItem(ItemId),

    /// State machine violation
    #[error("Invalid transition: {0}")]
    Transition(#[from] TransitionError),

    /// Output sink could not be queried
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Worker error (tokio runtime issues)
    #[error("Worker error: {0}")]
    Worker(String),
}
