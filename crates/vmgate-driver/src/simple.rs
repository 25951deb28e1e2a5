//! The simple driver: full networking-file rewrites.
//!
//! Used where the vnetlib CLI is not public enough for targeted edits
//! (Workstation on Linux, older Fusion). Every mutation rewrites the
//! `networking` file and cycles the vmnet services through
//! `vmnet-cli`. The vendor restart can truncate active DHCP lease
//! databases, so leases are backed up before the stop and restored
//! before the start.

use std::sync::Arc;

use async_trait::async_trait;
use vmgate_utility::networking_file::NetworkingFile;
use vmgate_utility::VmwarePaths;

use crate::base::{wire_to_settings_fwd, BaseDriver};
use crate::error::{DriverError, Result};
use crate::types::{PortForward, PortForwards, Vmnet, Vmnets, VmwareInfo};
use crate::Driver;

/// Driver performing full configuration rewrites.
pub struct SimpleDriver {
    base: Arc<BaseDriver>,
}

struct LeaseBackup {
    lease_path: String,
    backup: tempfile::NamedTempFile,
}

impl SimpleDriver {
    #[must_use]
    pub fn new(base: Arc<BaseDriver>) -> Self {
        Self { base }
    }

    /// Persists the networking file, mirrors the forward set into the
    /// NAT settings, and cycles the vmnet services with lease
    /// protection.
    async fn save_and_restart(&self, file: &NetworkingFile) -> Result<()> {
        let path = file.save()?;
        self.base.settings().nat.clear();
        self.base
            .settings()
            .nat
            .multi_add(file.port_fwds().to_vec());
        self.base.settings().save()?;

        let backups = match self.backup_dhcp_leases(file) {
            Ok(backups) => backups,
            Err(err) => {
                tracing::warn!(error = %err, "failed to backup DHCP leases");
                Vec::new()
            }
        };
        self.base
            .vmnet_cli()
            .configure(Some(&path.to_string_lossy()))
            .await?;
        if let Err(err) = self.base.vmnet_cli().stop().await {
            tracing::debug!(error = %err, "vmnet service stop failed (non-fatal)");
        }
        if let Err(err) = restore_dhcp_leases(&backups) {
            tracing::warn!(error = %err, "failed to restore DHCP leases");
        }
        self.base.vmnet_cli().start().await?;
        Ok(())
    }

    /// Copies the lease database of each DHCP-enabled device aside.
    fn backup_dhcp_leases(&self, file: &NetworkingFile) -> Result<Vec<LeaseBackup>> {
        let mut backups = Vec::new();
        for device in file.devices() {
            if !device.dhcp {
                continue;
            }
            let lease_path = self.base.vmware_paths().dhcp_lease_file(&device.name);
            if !vmgate_utility::file_exists(&lease_path) {
                continue;
            }
            tracing::trace!(device = %device.name, path = %lease_path,
                "creating dhcp lease file backup");
            let backup = tempfile::NamedTempFile::new()?;
            std::fs::copy(&lease_path, backup.path())?;
            backups.push(LeaseBackup { lease_path, backup });
        }
        Ok(backups)
    }

    /// Removes forwards that the vendor wrote straight into the device
    /// `nat.conf`.
    fn clear_nat_conf_port_fwd(
        &self,
        device: &str,
        protocol: &str,
        host_port: u16,
    ) -> Result<()> {
        let mut nat = self.base.load_nat_file(device)?;
        let section_name = format!("incoming{}", protocol.to_lowercase());
        let Some(section) = nat.section_mut(&section_name) else {
            tracing::debug!(section = %section_name,
                "failed to locate section in nat.conf file");
            return Err(DriverError::Vendor(format!(
                "invalid NAT section name: {section_name}"
            )));
        };
        let key = host_port.to_string();
        if let Some(idx) = section.entries.iter().position(|e| e.matches(&key)) {
            tracing::debug!(section = %section_name, port = %key,
                "removing forward from nat.conf");
            section.delete_entry_at(idx)?;
            nat.save()?;
        }
        Ok(())
    }
}

fn restore_dhcp_leases(backups: &[LeaseBackup]) -> Result<()> {
    for backup in backups {
        std::fs::copy(backup.backup.path(), &backup.lease_path)?;
    }
    Ok(())
}

#[async_trait]
impl Driver for SimpleDriver {
    async fn vmnets(&self) -> Result<Vmnets> {
        self.base.vmnets_from_networking_file()
    }

    async fn add_vmnet(&self, vmnet: &mut Vmnet) -> Result<()> {
        let mut file = self.base.load_networking_file()?;
        let device = if vmnet.mask.is_empty() {
            file.create_device(None, None)
        } else {
            file.create_device(Some(&vmnet.mask), Some(&vmnet.subnet))
        };
        let name = device.name.clone();
        let slot = device.slot;
        let device = file
            .device_by_name_mut(&name)
            .expect("device just created");
        device.dhcp = vmnet.dhcp == "yes";
        device.nat = vmnet.kind == "nat";
        tracing::debug!(name = %name, slot, dhcp = device.dhcp, nat = device.nat,
            "vmnet create");
        vmnet.name = name;
        self.save_and_restart(&file).await
    }

    async fn update_vmnet(&self, vmnet: &mut Vmnet) -> Result<()> {
        let mut file = self.base.load_networking_file()?;
        let Some(device) = file.device_by_name_mut(&vmnet.name) else {
            return Err(DriverError::NotFound(format!(
                "device does not exist {}",
                vmnet.name
            )));
        };
        device.dhcp = vmnet.dhcp == "yes";
        device.nat = vmnet.kind == "nat";
        device.hostonly_netmask = vmnet.mask.clone();
        device.hostonly_subnet = vmnet.subnet.clone();
        tracing::debug!(name = %vmnet.name, dhcp = device.dhcp, nat = device.nat,
            subnet = %device.hostonly_subnet, mask = %device.hostonly_netmask,
            "vmnet update");
        self.save_and_restart(&file).await
    }

    async fn delete_vmnet(&self, vmnet: &Vmnet) -> Result<()> {
        let mut file = self.base.load_networking_file()?;
        file.remove_device_by_name(&vmnet.name)?;
        self.save_and_restart(&file).await
    }

    async fn port_fwds(&self, slot: Option<u32>) -> Result<PortForwards> {
        self.base.port_fwds(slot).await
    }

    async fn add_port_fwds(&self, fwds: Vec<PortForward>) -> Result<()> {
        if self.base.internal_port_forwarding().await {
            for fwd in &fwds {
                self.base.add_internal_port_forward(fwd).await?;
            }
            return Ok(());
        }
        let mut file = self.base.load_networking_file()?;
        for fwd in &fwds {
            let description = self
                .base
                .validate_port_fwd_description(&fwd.description)?;
            let mut entry = wire_to_settings_fwd(fwd);
            entry.description = description;
            file.add_port_fwd(entry);
        }
        self.save_and_restart(&file).await
    }

    async fn delete_port_fwds(&self, fwds: Vec<PortForward>) -> Result<()> {
        if self.base.internal_port_forwarding().await {
            for fwd in &fwds {
                self.base.delete_internal_port_forward(fwd).await?;
            }
            return Ok(());
        }
        let mut file = self.base.load_networking_file()?;
        for fwd in &fwds {
            self.clear_nat_conf_port_fwd(
                &format!("vmnet{}", fwd.slot),
                &fwd.protocol,
                fwd.port,
            )?;
            file.remove_port_fwd(wire_to_settings_fwd(fwd));
        }
        self.save_and_restart(&file).await
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
        let file = self.base.load_networking_file()?;
        let slot = device
            .strip_prefix("vmnet")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Ok(file.lookup_dhcp_reservation(slot, mac)?)
    }

    async fn reserve_dhcp_address(&self, slot: u32, mac: &str, ip: &str) -> Result<()> {
        let mut file = self.base.load_networking_file()?;
        file.add_dhcp_reservation(slot, mac, ip);
        self.save_and_restart(&file).await
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

impl SimpleDriver {
    /// Shared driver state, used when wrapping in the remote driver.
    #[must_use]
    pub fn base(&self) -> Arc<BaseDriver> {
        Arc::clone(&self.base)
    }
}
