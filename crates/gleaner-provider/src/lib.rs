//! Gleaner Provider Layer
//!
//! Extraction provider implementations for the `ExtractionProvider` trait
//! from `gleaner-domain`.
//!
//! # Providers
//!
//! - `MockProvider`: Deterministic, scriptable mock for testing and dry runs
//! - `OpenRouterProvider`: Vision chat-completions over the OpenRouter API
//!
//! Every provider classifies its failures into a
//! [`ProviderErrorKind`](gleaner_domain::ProviderErrorKind) before returning,
//! so the dispatcher never has to look at error text.
//!
//! # Examples
//!
//! ```
//! use gleaner_domain::traits::{ExtractionProvider, ProviderRequest};
//! use gleaner_domain::{ItemId, PromptConfig, ProviderId, SourceRef};
//! use gleaner_provider::MockProvider;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let provider = MockProvider::new("Question 1: ...");
//! let request = ProviderRequest {
//!     provider: &ProviderId::new("model-a"),
//!     item: &ItemId::new("q1"),
//!     source: &SourceRef::new("images/q1.jpeg"),
//!     prompt: &PromptConfig::default(),
//!     timeout: Duration::from_secs(30),
//! };
//! let extraction = provider.call(request).await.unwrap();
//! assert_eq!(extraction.text, "Question 1: ...");
//! # }
//! ```

#![warn(missing_docs)]

pub mod mock;
pub mod openrouter;

use thiserror::Error;

pub use mock::{MockCall, MockProvider};
pub use openrouter::OpenRouterProvider;

/// Errors that can occur while constructing a provider
#[derive(Error, Debug)]
pub enum ProviderSetupError {
    /// Missing or malformed credentials
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),
}
