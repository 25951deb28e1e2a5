//! The vmgate HTTP API.
//!
//! A loopback-only HTTPS server requiring mutual TLS against the
//! utility's self-signed root, plus origin pinning on every request.
//! Routes multiplex the driver operations under a stable URL surface;
//! all mutating routes serialize on a single network write lock.

pub mod api;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod tls;

pub use api::{create_router, AppState};
pub use error::{ApiError, Result};
pub use server::ApiServer;

/// Content type stamped on every API response.
pub const API_CONTENT_TYPE: &str = "application/vnd.hashicorp.vagrant.vmware.rest-v1+json";
