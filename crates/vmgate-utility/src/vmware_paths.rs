//! Resolution of VMware product file and executable paths.
//!
//! Paths vary by platform and, on macOS, by product version. Lease and
//! NAT configuration paths are per-device templates carrying a
//! `{{device}}` placeholder.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UtilityError};

const DEVICE_PLACEHOLDER: &str = "{{device}}";

/// File and executable paths of the installed VMware product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmwarePaths {
    pub bridge_pid: String,
    pub dhcp_lease: String,
    pub install_dir: String,
    pub nat_conf: String,
    pub networking: String,
    pub services: String,
    pub vmnet_cli: String,
    pub vnetlib: String,
    pub vmx: String,
    pub vmrun: String,
    pub vmrest: String,
    pub vdiskmanager: String,
}

impl VmwarePaths {
    /// Resolves paths for the current platform.
    ///
    /// # Errors
    ///
    /// Returns [`UtilityError::InstallNotFound`] when the product
    /// installation directory does not exist.
    pub fn load() -> Result<Self> {
        Self::platform_load()
    }

    /// Returns the DHCP lease file path for `device`.
    #[must_use]
    pub fn dhcp_lease_file(&self, device: &str) -> String {
        self.dhcp_lease.replace(DEVICE_PLACEHOLDER, device)
    }

    /// Returns the `nat.conf` path for `device`.
    #[must_use]
    pub fn nat_conf_file(&self, device: &str) -> String {
        self.nat_conf.replace(DEVICE_PLACEHOLDER, device)
    }

    #[cfg(target_os = "linux")]
    fn platform_load() -> Result<Self> {
        let install_dir = "/usr/lib/vmware";
        if !Path::new(install_dir).exists() {
            tracing::debug!(path = install_dir, "install path does not exist");
            return Err(UtilityError::InstallNotFound);
        }
        let mut paths = Self {
            install_dir: install_dir.to_string(),
            bridge_pid: "/var/run/vmnet-bridge-0.pid".to_string(),
            dhcp_lease: "/etc/vmware/{{device}}/dhcpd/dhcpd.leases".to_string(),
            networking: "/etc/vmware/networking".to_string(),
            nat_conf: "/etc/vmware/{{device}}/nat/nat.conf".to_string(),
            vmnet_cli: "/usr/bin/vmware-networks".to_string(),
            services: "/etc/init.d/vmware".to_string(),
            vmx: "/usr/lib/vmware/bin/vmware-vmx".to_string(),
            vmrun: "/usr/bin/vmrun".to_string(),
            vdiskmanager: "/usr/bin/vmware-vdiskmanager".to_string(),
            ..Self::default()
        };
        // Workstation has shipped vmrest in a few different places.
        paths.vmrest = ["/bin/vmrest", "/usr/bin/vmrest", "/usr/lib/vmware/bin/vmrest"]
            .iter()
            .find(|p| Path::new(p).exists())
            .map_or_else(|| "/bin/false".to_string(), |p| (*p).to_string());
        Ok(paths)
    }

    #[cfg(target_os = "macos")]
    fn platform_load() -> Result<Self> {
        let install_dir = Path::new("/Applications/VMware Fusion.app");
        if !install_dir.exists() {
            tracing::debug!(path = %install_dir.display(), "install path does not exist");
            return Err(UtilityError::InstallNotFound);
        }
        let lib = |part: &str| install_dir.join("Contents/Library").join(part);
        Ok(Self {
            install_dir: install_dir.to_string_lossy().into_owned(),
            bridge_pid: "/var/run/vmnet-bridge.pid".to_string(),
            networking: "/Library/Preferences/VMware Fusion/networking".to_string(),
            nat_conf: "/Library/Preferences/VMware Fusion/{{device}}/nat.conf".to_string(),
            vmnet_cli: lib("vmnet-cli").to_string_lossy().into_owned(),
            vnetlib: lib("vmnet-cfgcli").to_string_lossy().into_owned(),
            services: lib("services/Open VMware Fusion Services")
                .to_string_lossy()
                .into_owned(),
            vmrun: lib("vmrun").to_string_lossy().into_owned(),
            vmx: lib("vmware-vmx").to_string_lossy().into_owned(),
            vmrest: lib("vmrest").to_string_lossy().into_owned(),
            vdiskmanager: lib("vmware-vdiskmanager").to_string_lossy().into_owned(),
            ..Self::default()
        })
    }

    #[cfg(windows)]
    fn platform_load() -> Result<Self> {
        let program_files = std::env::var("ProgramFiles(x86)")
            .or_else(|_| std::env::var("ProgramFiles"))
            .unwrap_or_else(|_| r"C:\Program Files (x86)".to_string());
        let install_dir = Path::new(&program_files).join(r"VMware\VMware Workstation");
        if !install_dir.exists() {
            tracing::debug!(path = %install_dir.display(), "install path does not exist");
            return Err(UtilityError::InstallNotFound);
        }
        let program_data =
            std::env::var("ProgramData").unwrap_or_else(|_| r"C:\ProgramData".to_string());
        let data = Path::new(&program_data).join("VMware");
        let exe = |name: &str| install_dir.join(name).to_string_lossy().into_owned();
        Ok(Self {
            install_dir: install_dir.to_string_lossy().into_owned(),
            dhcp_lease: data
                .join(r"{{device}}.leases")
                .to_string_lossy()
                .into_owned(),
            networking: data.join("netmap.conf").to_string_lossy().into_owned(),
            nat_conf: data.join(r"{{device}}nat.conf").to_string_lossy().into_owned(),
            services: exe("vmnetcfg.exe"),
            vnetlib: exe("vnetlib64.exe"),
            vmx: exe("vmware-vmx.exe"),
            vmrun: exe("vmrun.exe"),
            vmrest: exe("vmrest.exe"),
            vdiskmanager: exe("vmware-vdiskmanager.exe"),
            ..Self::default()
        })
    }

    /// Adjusts the DHCP lease path for the installed product version.
    ///
    /// Fusion 12.0/12.1 on Big Sur handed DHCP off to the platform's
    /// native dhcpd, which keeps its lease database at
    /// `/var/db/dhcpd_leases`; every other combination uses the vendor
    /// dhcpd lease files.
    ///
    /// # Errors
    ///
    /// Returns a parse error when `version` is not a dotted version
    /// string.
    pub fn update_dhcp_lease_path(&mut self, version: &str) -> Result<()> {
        #[cfg(target_os = "macos")]
        {
            self.dhcp_lease = "/var/db/vmware/vmnet-dhcpd-{{device}}.leases".to_string();

            // Experimental pre-releases use the vendor DHCP.
            if version == "e.x.p" {
                return Ok(());
            }
            if crate::ownership::darwin_major().unwrap_or(0) != 20 {
                return Ok(());
            }
            let mut parts = version.split('.');
            let major: u32 = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| UtilityError::Parse(format!("invalid version: {version}")))?;
            let minor: u32 = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| UtilityError::Parse(format!("invalid version: {version}")))?;
            if major == 12 && (minor == 0 || minor == 1) {
                self.dhcp_lease = "/var/db/dhcpd_leases".to_string();
            }
        }
        #[cfg(not(target_os = "macos"))]
        {
            let _ = version;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_placeholder_substitution() {
        let paths = VmwarePaths {
            dhcp_lease: "/etc/vmware/{{device}}/dhcpd/dhcpd.leases".to_string(),
            nat_conf: "/etc/vmware/{{device}}/nat/nat.conf".to_string(),
            ..VmwarePaths::default()
        };
        assert_eq!(
            paths.dhcp_lease_file("vmnet8"),
            "/etc/vmware/vmnet8/dhcpd/dhcpd.leases"
        );
        assert_eq!(paths.nat_conf_file("vmnet1"), "/etc/vmware/vmnet1/nat/nat.conf");
    }
}
