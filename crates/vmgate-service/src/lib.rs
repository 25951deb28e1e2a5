//! Host-side service wrappers.
//!
//! Typed interfaces over the vendor command line tools (`vmnet-cli`,
//! `vnetlib`, `vmrun`), the platform service managers that must be
//! nudged around configuration changes, and the internal user-space
//! port-forwarding engine that replaces vendor NAT forwarding where it
//! is unavailable.

pub mod error;
pub mod port_forwarding;
pub mod vmnet_cli;
pub mod vmrun;
pub mod vmware_services;
pub mod vnetlib;

pub use error::{Result, ServiceError};
pub use port_forwarding::PortForwarding;
pub use vmnet_cli::VmnetCli;
pub use vmrun::Vmrun;
pub use vmware_services::{new_vmware_services, VmwareServices};
pub use vnetlib::Vnetlib;
