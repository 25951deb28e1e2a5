//! Error types for driver operations.

use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Utility layer failure.
    #[error(transparent)]
    Utility(#[from] vmgate_utility::UtilityError),

    /// Service wrapper failure.
    #[error(transparent)]
    Service(#[from] vmgate_service::ServiceError),

    /// Settings persistence failure.
    #[error(transparent)]
    Settings(#[from] vmgate_settings::SettingsError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Vendor tooling or vendor REST failure.
    #[error("{0}")]
    Vendor(String),

    /// Operation unavailable on this platform or product version.
    #[error("{0}")]
    Unsupported(String),

    /// Requested item does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Port forward description failed validation.
    #[error("{0}")]
    InvalidDescription(String),
}
