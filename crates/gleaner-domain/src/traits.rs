//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the dispatcher core and its
//! collaborators. Implementations live in other crates.

use crate::{Extraction, ItemId, ItemOutput, PromptConfig, ProviderError, ProviderId, SourceRef};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Everything a provider needs for one call
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// Which provider (model) to call
    pub provider: &'a ProviderId,

    /// Item being processed
    pub item: &'a ItemId,

    /// Input asset
    pub source: &'a SourceRef,

    /// Prompt settings
    pub prompt: &'a PromptConfig,

    /// Upper bound the caller will wait for this call
    pub timeout: Duration,
}

/// Trait for extraction provider operations
///
/// Implemented by the infrastructure layer (gleaner-provider). One
/// implementation may serve several provider ids (e.g. several models
/// behind one HTTP gateway).
pub trait ExtractionProvider: Send + Sync {
    /// Extract text from the request's source asset
    ///
    /// Errors must already be classified into a [`ProviderErrorKind`](crate::ProviderErrorKind).
    fn call(
        &self,
        request: ProviderRequest<'_>,
    ) -> impl Future<Output = Result<Extraction, ProviderError>> + Send;
}

/// Trait for listing the work items of a batch
///
/// Implemented by the outer layer (e.g. a folder scanner in gleaner-cli)
pub trait SourceEnumerator {
    /// Error type for enumeration
    type Error;

    /// Ordered `(id, source)` pairs to seed a registry with
    fn enumerate(&self) -> Result<Vec<(ItemId, SourceRef)>, Self::Error>;
}

/// Error reported by a [`Sink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    /// Human-readable detail
    pub message: String,
}

impl SinkError {
    /// Create a sink error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink error: {}", self.message)
    }
}

impl std::error::Error for SinkError {}

/// Trait for persisting successful outputs
///
/// `write` is called at most once per id per run.
pub trait Sink: Send + Sync {
    /// Persist the output of one item
    fn write(&self, id: &ItemId, output: &ItemOutput) -> Result<(), SinkError>;

    /// Ids for which output currently exists
    fn produced(&self) -> Result<Vec<ItemId>, SinkError>;
}
