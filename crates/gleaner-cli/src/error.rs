//! Error types for the CLI application.

use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dispatcher error
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] gleaner_dispatch::DispatchError),

    /// Provider could not be constructed
    #[error("Provider error: {0}")]
    Provider(#[from] gleaner_provider::ProviderSetupError),

    /// Output folder could not be read or written
    #[error("Output error: {0}")]
    Sink(#[from] gleaner_domain::traits::SinkError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No API key supplied for a real run
    #[error("No API key. Pass --api-key or set OPENROUTER_API_KEY.")]
    MissingApiKey,
}
