//! Shared plumbing for the vmgate utility daemon.
//!
//! This crate holds everything that touches the VMware installation
//! directly but carries no policy: path resolution for the installed
//! product, parsers and emitters for the vendor configuration files
//! (`networking`, `nat.conf`, DHCP lease databases), subprocess execution
//! helpers, installation ownership checks, and the process-wide shutdown
//! registry.

pub mod certificate;
pub mod dhcp_lease;
pub mod error;
pub mod networking_file;
pub mod nat_file;
#[cfg(unix)]
pub mod ownership;
pub mod paths;
pub mod process;
pub mod shutdown;
pub mod vmware_paths;

pub use error::{Result, UtilityError};
pub use networking_file::{Device, DhcpReservation, NetworkingFile, PortFwd};
pub use vmware_paths::VmwarePaths;

use std::path::Path;

/// Returns true when `path` exists and is a regular file.
#[must_use]
pub fn file_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}
