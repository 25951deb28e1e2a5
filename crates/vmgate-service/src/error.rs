//! Error types for service wrappers.

use thiserror::Error;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors that can occur while driving host services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required vendor executable is missing or untrusted.
    #[error("{0}")]
    InvalidExecutable(String),

    /// A vendor tool invocation failed.
    #[error("{0}")]
    Vendor(String),

    /// Port forward service failure.
    #[error("port forwarding error: {0}")]
    PortForward(String),

    /// Settings persistence failure.
    #[error(transparent)]
    Settings(#[from] vmgate_settings::SettingsError),
}
