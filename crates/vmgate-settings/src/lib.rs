//! Persistent daemon settings.
//!
//! Two JSON documents live under the state directory: `nat.json` (the
//! NAT port-forward set mirrored from the vendor configuration) and
//! `portforwarding.json` (the internal user-space forward set). Both
//! stores rewrite atomically and quarantine unparsable content instead
//! of failing startup.

pub mod error;
pub mod nat;
pub mod port_forwarding;

pub use error::{Result, SettingsError};
pub use nat::NatSettings;
pub use port_forwarding::{Address, Forward, PortForwardingSettings};

use std::path::Path;
use std::sync::Arc;

/// All persistent settings stores.
#[derive(Debug, Clone)]
pub struct Settings {
    pub nat: Arc<NatSettings>,
    pub port_forwarding: Arc<PortForwardingSettings>,
}

impl Settings {
    /// Builds the stores under the default settings directory.
    ///
    /// # Errors
    ///
    /// Returns an error when a store file exists but cannot be read.
    pub fn build() -> Result<Self> {
        Self::build_in(vmgate_utility::paths::directory_for("settings"))
    }

    /// Builds the stores under an explicit directory.
    ///
    /// # Errors
    ///
    /// Returns an error when a store file exists but cannot be read.
    pub fn build_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            nat: Arc::new(NatSettings::load(dir.join("nat.json"))?),
            port_forwarding: Arc::new(PortForwardingSettings::load(
                dir.join("portforwarding.json"),
            )?),
        })
    }

    /// Persists every store.
    ///
    /// # Errors
    ///
    /// Returns the first persistence failure.
    pub fn save(&self) -> Result<()> {
        self.port_forwarding.save()?;
        self.nat.save()
    }
}
