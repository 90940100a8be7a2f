//! Error types for Mente Sã
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Mente Sã operations
///
/// Validation failures are returned synchronously by the orchestrator and
/// never change state. Storage and provider failures are logged and surfaced
/// to the user as text; nothing here is fatal to the process.
#[derive(Error, Debug)]
pub enum MenteSaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The message to send was empty or whitespace-only
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// The new conversation title was empty or whitespace-only
    #[error("Conversation title cannot be empty")]
    EmptyTitle,

    /// The target conversation id is not valid for the operation
    #[error("Invalid conversation: {0}")]
    InvalidConversation(i64),

    /// A reply is still being generated
    #[error("{0}")]
    Busy(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Provider-related errors (API calls, streaming, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// The remote model did not answer in time
    #[error("Provider timed out after {0} seconds")]
    Timeout(u64),

    /// Authentication errors (sign-in, registration, password reset)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Missing credentials for provider
    #[error("Missing credentials for provider: {0}")]
    MissingCredentials(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl MenteSaError {
    /// Returns true for errors caused by caller input rather than I/O
    ///
    /// # Examples
    ///
    /// ```
    /// use mentesa::error::MenteSaError;
    ///
    /// assert!(MenteSaError::EmptyMessage.is_validation());
    /// assert!(!MenteSaError::Storage("disk full".into()).is_validation());
    /// ```
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyMessage | Self::EmptyTitle | Self::InvalidConversation(_) | Self::Busy(_)
        )
    }
}

/// Result type alias for Mente Sã operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
