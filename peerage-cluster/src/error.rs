//! Error types for cluster module

use thiserror::Error;

/// Cluster error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The registry could not be reached (connect failure, timeout, reset)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The registry answered with a non-success status
    #[error("Registry error {status}: {reason}")]
    Registry { status: u16, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Address resolution failed: {0}")]
    AddressResolution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the registry itself failed while handling the request
    ///
    /// Only 5xx responses count; network failures and client errors do not.
    #[must_use]
    pub fn is_registry_fault(&self) -> bool {
        matches!(self, Self::Registry { status, .. } if (500..=599).contains(status))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, Error>;
