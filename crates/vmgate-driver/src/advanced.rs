//! The advanced driver: targeted vnetlib edits.
//!
//! Used where the vnetlib CLI is public (Workstation on Windows,
//! modern Fusion). Operations touch only the affected device and
//! restart only the NAT or DHCP service that changed.

use std::sync::Arc;

use async_trait::async_trait;
use vmgate_service::Vnetlib;
use vmgate_utility::VmwarePaths;

use crate::base::{wire_to_settings_fwd, BaseDriver};
use crate::error::Result;
use crate::types::{PortForward, PortForwards, Vmnet, Vmnets, VmwareInfo};
use crate::Driver;

/// Driver performing targeted CLI (or, on Windows, registry) edits.
pub struct AdvancedDriver {
    base: Arc<BaseDriver>,
    vnetlib: Arc<dyn Vnetlib>,
}

impl AdvancedDriver {
    #[must_use]
    pub fn new(base: Arc<BaseDriver>, vnetlib: Arc<dyn Vnetlib>) -> Self {
        Self { base, vnetlib }
    }

    /// Shared driver state, used when wrapping in the remote driver.
    #[must_use]
    pub fn base(&self) -> Arc<BaseDriver> {
        Arc::clone(&self.base)
    }

    /// Cycles the NAT service of a device so a config change is picked
    /// up.
    async fn restart_nat(&self, device: &str) -> Result<()> {
        self.vnetlib.stop_nat(device).await?;
        self.vnetlib.update_device_nat(device).await?;
        self.vnetlib.start_nat(device).await?;
        Ok(())
    }

    /// Persists settings and the networking file, then restarts NAT on
    /// `device`.
    async fn save_and_restart_nat(
        &self,
        device: &str,
        file: &vmgate_utility::networking_file::NetworkingFile,
    ) -> Result<()> {
        self.base.settings().nat.save()?;
        file.save()?;
        self.restart_nat(device).await
    }
}

#[async_trait]
impl Driver for AdvancedDriver {
    async fn vmnets(&self) -> Result<Vmnets> {
        self.base.vmnets_from_networking_file()
    }

    async fn add_vmnet(&self, vmnet: &mut Vmnet) -> Result<()> {
        let name = if vmnet.name.is_empty() {
            None
        } else {
            Some(vmnet.name.as_str())
        };
        let device = self.vnetlib.create_device(name).await?;
        if !vmnet.mask.is_empty() {
            self.vnetlib.set_subnet_mask(&device, &vmnet.mask).await?;
        }
        if !vmnet.subnet.is_empty() {
            self.vnetlib
                .set_subnet_address(&device, &vmnet.subnet)
                .await?;
        }
        self.vnetlib.enable_device(&device).await?;
        if vmnet.dhcp == "yes" {
            self.vnetlib.set_dhcp(&device, true).await?;
            self.vnetlib.start_dhcp(&device).await?;
        }
        if vmnet.kind == "nat" {
            self.vnetlib.set_nat(&device, true).await?;
            self.vnetlib.start_nat(&device).await?;
        }
        tracing::debug!(name = %device, dhcp = %vmnet.dhcp, kind = %vmnet.kind,
            subnet = %vmnet.subnet, mask = %vmnet.mask, "vmnet create");
        vmnet.name = device;
        Ok(())
    }

    async fn update_vmnet(&self, vmnet: &mut Vmnet) -> Result<()> {
        let device = vmnet.name.clone();
        if !vmnet.mask.is_empty() {
            self.vnetlib.set_subnet_mask(&device, &vmnet.mask).await?;
        }
        if !vmnet.subnet.is_empty() {
            self.vnetlib
                .set_subnet_address(&device, &vmnet.subnet)
                .await?;
        }
        self.vnetlib.update_device(&device).await?;

        // Reconcile DHCP and NAT service state with the request.
        if self.vnetlib.status_dhcp(&device).await {
            if vmnet.dhcp == "no" {
                self.vnetlib.set_dhcp(&device, false).await?;
                self.vnetlib.stop_dhcp(&device).await?;
            }
        } else if vmnet.dhcp == "yes" {
            self.vnetlib.set_dhcp(&device, true).await?;
            self.vnetlib.start_dhcp(&device).await?;
        }
        if self.vnetlib.status_nat(&device).await {
            if vmnet.kind != "nat" {
                self.vnetlib.set_nat(&device, false).await?;
                self.vnetlib.stop_nat(&device).await?;
            }
        } else if vmnet.kind == "nat" {
            self.vnetlib.set_nat(&device, true).await?;
            self.vnetlib.start_nat(&device).await?;
        }
        tracing::debug!(name = %device, dhcp = %vmnet.dhcp, kind = %vmnet.kind,
            subnet = %vmnet.subnet, mask = %vmnet.mask, "vmnet update");
        Ok(())
    }

    async fn delete_vmnet(&self, vmnet: &Vmnet) -> Result<()> {
        self.vnetlib.disable_device(&vmnet.name).await?;
        self.vnetlib.delete_device(&vmnet.name).await?;
        Ok(())
    }

    async fn port_fwds(&self, slot: Option<u32>) -> Result<PortForwards> {
        self.base.port_fwds(slot).await
    }

    /// Forwards are written straight into the networking file: the
    /// vnetlib CLI cannot carry the descriptions used to track
    /// orchestrator ownership.
    async fn add_port_fwds(&self, fwds: Vec<PortForward>) -> Result<()> {
        if self.base.internal_port_forwarding().await {
            for fwd in &fwds {
                self.base.add_internal_port_forward(fwd).await?;
            }
            return Ok(());
        }
        let mut file = self.base.load_networking_file()?;
        let mut touched_devices: Vec<String> = Vec::new();
        for fwd in &fwds {
            let description = self
                .base
                .validate_port_fwd_description(&fwd.description)?;
            let mut entry = wire_to_settings_fwd(fwd);
            entry.description = description;
            file.add_port_fwd(entry.clone());
            self.base.settings().nat.add(entry);

            let device = format!("vmnet{}", fwd.slot);
            if !touched_devices.contains(&device) {
                touched_devices.push(device);
            }
        }
        for device in touched_devices {
            self.save_and_restart_nat(&device, &file).await?;
        }
        Ok(())
    }

    /// Deletion goes through vnetlib directly; descriptions no longer
    /// matter at that point.
    async fn delete_port_fwds(&self, fwds: Vec<PortForward>) -> Result<()> {
        if self.base.internal_port_forwarding().await {
            for fwd in &fwds {
                self.base.delete_internal_port_forward(fwd).await?;
            }
            return Ok(());
        }
        let mut touched_devices: Vec<String> = Vec::new();
        for fwd in &fwds {
            let device = format!("vmnet{}", fwd.slot);
            self.vnetlib
                .delete_port_fwd(&device, &fwd.protocol, fwd.port)
                .await?;
            self.base.settings().nat.remove(&wire_to_settings_fwd(fwd));
            self.base.settings().nat.save()?;
            if !touched_devices.contains(&device) {
                touched_devices.push(device);
            }
        }
        for device in touched_devices {
            self.restart_nat(&device).await?;
        }
        Ok(())
    }

    async fn prune_port_fwds(&self) -> Result<()> {
        self.base.prune_port_fwds(self).await
    }

    async fn lookup_dhcp_address(&self, device: &str, mac: &str) -> Result<String> {
        let lease_path = self.base.vmware_paths().dhcp_lease_file(device);
        if let Ok(leases) = vmgate_utility::dhcp_lease::DhcpLeaseFile::load(&lease_path) {
            if let Ok(address) = leases.ip_for_mac(mac) {
                return Ok(address);
            }
        } else {
            tracing::debug!(path = %lease_path, "dhcp leases file load failure");
        }
        Ok(self.vnetlib.lookup_reserved_address(device, mac).await?)
    }

    async fn reserve_dhcp_address(&self, slot: u32, mac: &str, ip: &str) -> Result<()> {
        let device = format!("vmnet{slot}");
        self.vnetlib.reserve_address(&device, mac, ip).await?;
        // The reservation only takes effect once the DHCP service
        // rereads its configuration.
        tracing::trace!(device = %device, "restarting DHCP service to apply update");
        let _ = self.vnetlib.stop_dhcp(&device).await;
        self.vnetlib.start_dhcp(&device).await?;
        Ok(())
    }

    async fn vmware_info(&self) -> Result<VmwareInfo> {
        Ok(self.base.info().clone())
    }

    fn vmware_paths(&self) -> &VmwarePaths {
        self.base.vmware_paths()
    }

    async fn verify_vmnet(&self) -> Result<()> {
        self.base.verify_vmnet().await
    }

    async fn validate(&self) -> bool {
        self.base.validate().await
    }

    fn validated(&self) -> bool {
        self.base.validated()
    }

    fn validation_reason(&self) -> String {
        self.base.validation_reason()
    }

    async fn internal_port_forwarding(&self) -> bool {
        self.base.internal_port_forwarding().await
    }

    async fn enable_internal_port_forwarding(&self) -> Result<()> {
        self.base.enable_internal_port_forwarding().await
    }
}
