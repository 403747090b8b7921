//! Extraction payloads, prompt settings and the provider error taxonomy

use crate::attempt::ProviderId;
use std::fmt;
use std::time::Duration;

/// Default instruction sent alongside each asset
pub const DEFAULT_PROMPT: &str = "Extract all text from this image.";

/// Text returned by a provider for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Extracted text
    pub text: String,

    /// Model that actually answered, when the provider reports it
    pub model: Option<String>,

    /// Tokens billed for the call, when the provider reports it
    pub total_tokens: Option<u64>,
}

impl Extraction {
    /// Extraction with text only
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            total_tokens: None,
        }
    }
}

/// Successful result stored on a work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutput {
    /// Provider payload
    pub extraction: Extraction,

    /// Provider that produced it
    pub provider: ProviderId,

    /// Round in which it was produced
    pub round: u32,
}

/// Prompt settings passed to every provider call
#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    /// Instruction text
    pub prompt: String,

    /// Sampling temperature (0.0 - 1.0)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            temperature: 0.3,
            max_tokens: 4000,
        }
    }
}

/// Closed set of provider failure tags
///
/// Adapters map transport and protocol failures onto these once; nothing
/// downstream inspects error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// The provider throttled the request
    RateLimited,

    /// No answer within the request timeout
    Timeout,

    /// The provider rejected the request format or model
    BadRequest,

    /// Transient provider-side failure
    ServerError,

    /// Connection or transport failure
    Network,

    /// The item itself is unprocessable (e.g. unreadable asset)
    Fatal,
}

impl ProviderErrorKind {
    /// Get the tag name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::BadRequest => "bad_request",
            ProviderErrorKind::ServerError => "server_error",
            ProviderErrorKind::Network => "network",
            ProviderErrorKind::Fatal => "fatal",
        }
    }

    /// Whether a later attempt can possibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderErrorKind::Fatal)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by an extraction provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Classified tag
    pub kind: ProviderErrorKind,

    /// Human-readable detail
    pub message: String,

    /// Server-suggested wait before the next call
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// Create an error of the given kind
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Rate limit error
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message)
    }

    /// Timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    /// Bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::BadRequest, message)
    }

    /// Server error
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ServerError, message)
    }

    /// Network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    /// Fatal item error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Fatal, message)
    }

    /// Attach a server-suggested retry delay
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ProviderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_fatal_is_not_retryable() {
        assert!(ProviderErrorKind::RateLimited.is_retryable());
        assert!(ProviderErrorKind::Timeout.is_retryable());
        assert!(ProviderErrorKind::BadRequest.is_retryable());
        assert!(ProviderErrorKind::ServerError.is_retryable());
        assert!(ProviderErrorKind::Network.is_retryable());
        assert!(!ProviderErrorKind::Fatal.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ProviderError::rate_limited("HTTP 429")
            .with_retry_after(Duration::from_secs(3));
        assert_eq!(err.to_string(), "rate_limited: HTTP 429");
        assert_eq!(err.retry_after, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_default_prompt() {
        let prompt = PromptConfig::default();
        assert_eq!(prompt.prompt, DEFAULT_PROMPT);
        assert_eq!(prompt.max_tokens, 4000);
    }
}
