//! Error types for settings persistence.

use thiserror::Error;

/// Result type alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors that can occur while loading or persisting settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure.
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}
