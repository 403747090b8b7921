//! Gleaner Domain Layer
//!
//! This crate contains the domain model shared by every Gleaner crate.
//! It performs no I/O and depends on nothing but `uuid`; it defines the
//! value objects, the per-item state machine and the trait interfaces that
//! the dispatcher core uses to talk to its external collaborators.
//!
//! ## Key Concepts
//!
//! - **Work item**: one unit of work, backed by a source asset, that ends in
//!   exactly one terminal state (`Succeeded` or `Exhausted`)
//! - **Item id**: a stable identifier with numeric-aware ("natural") ordering
//! - **Attempt record**: one entry per provider tried, kept for diagnosis
//! - **Provider error**: a closed tag enumeration, classified once at the
//!   adapter boundary
//!
//! ## Architecture
//!
//! - Infrastructure (HTTP providers, filesystem sinks) lives in other crates
//! - Trait definitions cover every external interaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attempt;
pub mod extraction;
pub mod item;
pub mod natural;
pub mod run;
pub mod traits;

// Re-exports for convenience
pub use attempt::{AttemptOutcome, AttemptRecord, ProviderId};
pub use extraction::{Extraction, ItemOutput, PromptConfig, ProviderError, ProviderErrorKind};
pub use item::{ExhaustReason, ItemId, ItemState, SourceRef, TransitionError, WorkItem};
pub use natural::natural_cmp;
pub use run::RunId;
