//! Error types for the utility layer.

use thiserror::Error;

/// Result type alias for utility operations.
pub type Result<T> = std::result::Result<T, UtilityError>;

/// Errors that can occur while working with the VMware installation.
#[derive(Debug, Error)]
pub enum UtilityError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// VMware installation could not be located.
    #[error("failed to locate VMware installation directory")]
    InstallNotFound,

    /// Configuration file parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Requested item does not exist.
    #[error("{0}")]
    NotFound(String),

    /// External command failure.
    #[error("command failed: {0}")]
    Command(String),
}
