//! Drivers for VMware host networking.
//!
//! A driver performs the logical operations of the control plane
//! (device management, port forwards, DHCP reservations) through one of
//! three mechanisms: direct rewrites of the vendor `networking` file
//! (simple), targeted `vnetlib` edits (advanced), or the vendor's
//! supervised `vmrest` REST subprocess (remote). The factory picks a
//! variant from the platform, product edition and version at startup.

pub mod advanced;
pub mod base;
pub mod error;
pub mod factory;
pub mod simple;
pub mod types;
pub mod vmrest;

pub use base::BaseDriver;
pub use error::{DriverError, Result};
pub use factory::{create_driver, DriverOptions};
pub use types::{
    PortForward, PortForwardGuest, PortForwards, Vmnet, Vmnets, VmwareInfo,
};

use async_trait::async_trait;
use vmgate_utility::VmwarePaths;

/// Unified operational interface over the host networking mechanisms.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Lists the configured host virtual networks.
    async fn vmnets(&self) -> Result<Vmnets>;

    /// Creates a device. The assigned name is written back into
    /// `vmnet`.
    async fn add_vmnet(&self, vmnet: &mut Vmnet) -> Result<()>;

    /// Reconfigures an existing device.
    async fn update_vmnet(&self, vmnet: &mut Vmnet) -> Result<()>;

    /// Removes a device.
    async fn delete_vmnet(&self, vmnet: &Vmnet) -> Result<()>;

    /// Lists port forwards, optionally restricted to a device slot.
    async fn port_fwds(&self, slot: Option<u32>) -> Result<PortForwards>;

    /// Adds port forwards.
    async fn add_port_fwds(&self, fwds: Vec<PortForward>) -> Result<()>;

    /// Removes port forwards.
    async fn delete_port_fwds(&self, fwds: Vec<PortForward>) -> Result<()>;

    /// Drops orchestrator-managed forwards whose VM is gone.
    async fn prune_port_fwds(&self) -> Result<()>;

    /// Resolves the address leased or reserved for a MAC on a device.
    async fn lookup_dhcp_address(&self, device: &str, mac: &str) -> Result<String>;

    /// Adds a static MAC to IP reservation on a device slot.
    async fn reserve_dhcp_address(&self, slot: u32, mac: &str, ip: &str) -> Result<()>;

    /// Returns the detected product information.
    async fn vmware_info(&self) -> Result<VmwareInfo>;

    /// Returns the resolved product paths.
    fn vmware_paths(&self) -> &VmwarePaths;

    /// Ensures the vmnet services are alive, restarting or
    /// reconfiguring as required.
    async fn verify_vmnet(&self) -> Result<()>;

    /// Runs the installation pre-flight checks, recording the outcome.
    async fn validate(&self) -> bool;

    /// Returns the recorded validation outcome.
    fn validated(&self) -> bool;

    /// Returns the recorded validation failure reason.
    fn validation_reason(&self) -> String;

    /// Returns true when the internal forwarding engine is active.
    async fn internal_port_forwarding(&self) -> bool;

    /// Switches port forwarding over to the internal user-space engine.
    async fn enable_internal_port_forwarding(&self) -> Result<()>;
}
