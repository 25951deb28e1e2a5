//! Wrapper over the vendor `vnetlib` configuration CLI.
//!
//! Where `vmnet-cli` rewrites the whole networking stack, `vnetlib`
//! performs targeted device and service edits. The tool has an
//! inverted exit-code convention: zero signals failure and nonzero
//! signals success, which every helper here accounts for.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use vmgate_utility::process::execute_with_output;

use crate::error::{Result, ServiceError};
use crate::vmware_services::VmwareServices;

/// Targeted vendor network configuration operations.
#[async_trait]
pub trait Vnetlib: Send + Sync {
    /// Creates a device, generating a name when none is given. Returns
    /// the device name.
    async fn create_device(&self, name: Option<&str>) -> Result<String>;
    async fn delete_device(&self, name: &str) -> Result<()>;
    async fn set_subnet_address(&self, name: &str, address: &str) -> Result<()>;
    async fn set_subnet_mask(&self, name: &str, mask: &str) -> Result<()>;
    async fn set_nat(&self, name: &str, enable: bool) -> Result<()>;
    async fn update_device_nat(&self, name: &str) -> Result<()>;
    async fn status_nat(&self, name: &str) -> bool;
    async fn start_nat(&self, name: &str) -> Result<()>;
    async fn stop_nat(&self, name: &str) -> Result<()>;
    async fn set_dhcp(&self, name: &str, enable: bool) -> Result<()>;
    async fn status_dhcp(&self, name: &str) -> bool;
    async fn start_dhcp(&self, name: &str) -> Result<()>;
    async fn stop_dhcp(&self, name: &str) -> Result<()>;
    async fn lookup_reserved_address(&self, device: &str, mac: &str) -> Result<String>;
    async fn reserve_address(&self, device: &str, mac: &str, ip: &str) -> Result<()>;
    async fn enable_device(&self, name: &str) -> Result<()>;
    async fn disable_device(&self, name: &str) -> Result<()>;
    async fn update_device(&self, name: &str) -> Result<()>;
    async fn delete_port_fwd(&self, device: &str, protocol: &str, host_port: u16) -> Result<()>;
    async fn unused_device(&self) -> Result<String>;
}

/// CLI-backed implementation of [`Vnetlib`].
pub struct VnetlibCli {
    exe_path: String,
    services: Arc<dyn VmwareServices>,
}

impl VnetlibCli {
    /// Builds the wrapper, validating the executable.
    ///
    /// # Errors
    ///
    /// Returns an error when the executable is missing or not
    /// root-owned.
    pub fn new(exe_path: &str, services: Arc<dyn VmwareServices>) -> Result<Arc<dyn Vnetlib>> {
        #[cfg(unix)]
        if !vmgate_utility::ownership::root_owned(exe_path, true) {
            return Err(ServiceError::InvalidExecutable(
                "failed to locate valid vnetlib executable".to_string(),
            ));
        }
        Ok(Arc::new(Self {
            exe_path: exe_path.to_string(),
            services,
        }))
    }

    /// Runs a vnetlib subcommand inside the services bracket, mapping
    /// the inverted exit convention (0 = failure) to an error.
    async fn wrapped(&self, op: &str, args: &[&str]) -> Result<()> {
        self.services.open().await;
        let out = execute_with_output(Command::new(&self.exe_path).args(args)).await;
        self.services.close().await;
        if out.exit_code == 0 {
            tracing::debug!(op, exit_code = out.exit_code, output = %out.output,
                "vnetlib operation failed");
            return Err(ServiceError::Vendor(format!("failed to {op}")));
        }
        Ok(())
    }

    async fn runcmd(&self, args: &[&str]) -> (i32, String) {
        let out = execute_with_output(Command::new(&self.exe_path).args(args)).await;
        (out.exit_code, out.output)
    }
}

#[async_trait]
impl Vnetlib for VnetlibCli {
    async fn create_device(&self, name: Option<&str>) -> Result<String> {
        let device = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.unused_device().await?,
        };
        tracing::debug!(device = %device, "create new device");
        self.wrapped("create new device", &platform::add_device(&device))
            .await?;
        Ok(device)
    }

    async fn delete_device(&self, name: &str) -> Result<()> {
        tracing::debug!(device = name, "delete device");
        self.wrapped("delete device", &platform::remove_device(name)).await
    }

    async fn set_subnet_address(&self, name: &str, address: &str) -> Result<()> {
        tracing::debug!(device = name, address, "set subnet address");
        self.wrapped("set subnet address", &platform::set_subnet_addr(name, address))
            .await
    }

    async fn set_subnet_mask(&self, name: &str, mask: &str) -> Result<()> {
        tracing::debug!(device = name, mask, "set subnet mask");
        self.wrapped("set subnet mask", &platform::set_subnet_mask(name, mask))
            .await
    }

    async fn set_nat(&self, name: &str, enable: bool) -> Result<()> {
        tracing::debug!(device = name, enable, "set NAT");
        self.wrapped("set NAT", &platform::set_nat(name, enable)).await
    }

    async fn update_device_nat(&self, name: &str) -> Result<()> {
        tracing::debug!(device = name, "update device NAT");
        self.wrapped("update device NAT", &platform::update_nat(name)).await
    }

    async fn status_nat(&self, name: &str) -> bool {
        let (code, _) = self.runcmd(&platform::status_nat(name)).await;
        tracing::trace!(device = name, exit_code = code, "service NAT status");
        code == 1
    }

    async fn start_nat(&self, name: &str) -> Result<()> {
        self.wrapped("start NAT service", &platform::service_nat(name, "servicestart"))
            .await
    }

    async fn stop_nat(&self, name: &str) -> Result<()> {
        self.wrapped("stop NAT service", &platform::service_nat(name, "servicestop"))
            .await
    }

    async fn set_dhcp(&self, name: &str, enable: bool) -> Result<()> {
        tracing::debug!(device = name, enable, "set DHCP");
        self.wrapped("set DHCP", &platform::set_dhcp(name, enable)).await
    }

    async fn status_dhcp(&self, name: &str) -> bool {
        let (code, _) = self.runcmd(&platform::status_dhcp(name)).await;
        tracing::trace!(device = name, exit_code = code, "service DHCP status");
        code == 1
    }

    async fn start_dhcp(&self, name: &str) -> Result<()> {
        self.wrapped("start DHCP service", &platform::service_dhcp(name, "servicestart"))
            .await
    }

    async fn stop_dhcp(&self, name: &str) -> Result<()> {
        self.wrapped("stop DHCP service", &platform::service_dhcp(name, "servicestop"))
            .await
    }

    async fn lookup_reserved_address(&self, device: &str, mac: &str) -> Result<String> {
        tracing::debug!(device, mac, "looking up dhcp reserved address");
        platform::lookup_reserved_address(self, device, mac).await
    }

    async fn reserve_address(&self, device: &str, mac: &str, ip: &str) -> Result<()> {
        tracing::debug!(device, mac, address = ip, "reserve dhcp address");
        self.services.open().await;
        let result = platform::reserve_address(self, device, mac, ip).await;
        self.services.close().await;
        result
    }

    async fn enable_device(&self, name: &str) -> Result<()> {
        tracing::debug!(device = name, "enable device");
        self.wrapped("enable device", &platform::enable_device(name)).await
    }

    async fn disable_device(&self, name: &str) -> Result<()> {
        tracing::debug!(device = name, "disable device");
        self.wrapped("disable device", &platform::disable_device(name)).await
    }

    async fn update_device(&self, name: &str) -> Result<()> {
        tracing::debug!(device = name, "update device");
        self.wrapped("update device", &platform::update_device(name)).await
    }

    async fn delete_port_fwd(&self, device: &str, protocol: &str, host_port: u16) -> Result<()> {
        tracing::debug!(device, protocol, host_port, "delete port forward");
        self.services.open().await;
        let result = platform::delete_port_fwd(self, device, protocol, host_port).await;
        self.services.close().await;
        result
    }

    async fn unused_device(&self) -> Result<String> {
        tracing::debug!("request unused device name");
        platform::unused_device(self).await
    }
}

#[cfg(unix)]
mod platform {
    use super::{ServiceError, VnetlibCli};
    use crate::error::Result;

    pub fn add_device(name: &str) -> [&str; 2] {
        ["addadapter", name]
    }

    pub fn remove_device(name: &str) -> [&str; 2] {
        ["removeadapter", name]
    }

    pub fn set_subnet_addr<'a>(name: &'a str, addr: &'a str) -> [&'a str; 3] {
        ["setsubnetaddr", name, addr]
    }

    pub fn set_subnet_mask<'a>(name: &'a str, mask: &'a str) -> [&'a str; 3] {
        ["setsubnetmask", name, mask]
    }

    pub fn set_nat(name: &str, enable: bool) -> [&str; 3] {
        ["setnatusage", name, if enable { "yes" } else { "no" }]
    }

    pub fn set_dhcp(name: &str, enable: bool) -> [&str; 3] {
        ["setdhcpusage", name, if enable { "yes" } else { "no" }]
    }

    pub fn enable_device(name: &str) -> [&str; 2] {
        ["enablehostonlyadap", name]
    }

    pub fn disable_device(name: &str) -> [&str; 2] {
        ["disablehostonlyadap", name]
    }

    // The vendor CLI really does spell it this way.
    pub fn update_device(name: &str) -> [&str; 2] {
        ["udpateadapterfromconfig", name]
    }

    pub fn update_nat(name: &str) -> [&str; 2] {
        ["updatenatfromconfig", name]
    }

    pub fn status_nat(name: &str) -> [&str; 3] {
        ["servicestatus", name, "nat"]
    }

    pub fn status_dhcp(name: &str) -> [&str; 3] {
        ["servicestatus", name, "dhcp"]
    }

    pub fn service_nat<'a>(name: &'a str, action: &'a str) -> [&'a str; 3] {
        [action, name, "nat"]
    }

    pub fn service_dhcp<'a>(name: &'a str, action: &'a str) -> [&'a str; 3] {
        [action, name, "dhcp"]
    }

    pub async fn reserve_address(
        cli: &VnetlibCli,
        device: &str,
        mac: &str,
        ip: &str,
    ) -> Result<()> {
        let (code, out) = cli.runcmd(&["setdhcpmac2ip", device, mac, ip]).await;
        if code == 0 {
            tracing::debug!(device, mac, address = ip, output = %out,
                "reserve dhcp address failed");
            return Err(ServiceError::Vendor(
                "failed to reserve DHCP IP address".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn lookup_reserved_address(
        cli: &VnetlibCli,
        device: &str,
        mac: &str,
    ) -> Result<String> {
        let (code, out) = cli.runcmd(&["getdhcpmac2ip", device, mac]).await;
        if code == 0 {
            tracing::debug!(device, mac, error = %out, "dhcp address lookup failed");
            return Err(ServiceError::Vendor(format!("No entry found for MAC {mac}")));
        }
        // Output carries `IP: <address>`.
        parse_labeled(&out, "IP:").ok_or_else(|| {
            ServiceError::Vendor(format!("No entry found for MAC {mac}"))
        })
    }

    pub async fn delete_port_fwd(
        cli: &VnetlibCli,
        device: &str,
        protocol: &str,
        host_port: u16,
    ) -> Result<()> {
        let port = host_port.to_string();
        let (code, out) = cli
            .runcmd(&["setnatportfwd", device, protocol, &port])
            .await;
        if code == 0 {
            tracing::debug!(device, host_port, output = %out, "delete port forward failed");
            return Err(ServiceError::Vendor("failed to delete port forward".to_string()));
        }
        Ok(())
    }

    pub async fn unused_device(cli: &VnetlibCli) -> Result<String> {
        let (code, out) = cli.runcmd(&["getunusedvnet"]).await;
        if code != 1 {
            tracing::debug!(exit_code = code, output = %out,
                "unused device name request failed");
            return Err(ServiceError::Vendor(
                "failed to generate new device name".to_string(),
            ));
        }
        // Output carries `vmnet: <name>`.
        parse_labeled(&out, "vmnet:").ok_or_else(|| {
            ServiceError::Vendor("failed to generate new device name".to_string())
        })
    }

    /// Finds the token following `label` in tool output.
    fn parse_labeled(output: &str, label: &str) -> Option<String> {
        let mut tokens = output.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == label {
                return tokens.next().map(str::to_string);
            }
        }
        None
    }

    #[cfg(test)]
    mod tests {
        use super::parse_labeled;

        #[test]
        fn labeled_token_extraction() {
            assert_eq!(
                parse_labeled("lookup result\nIP: 192.168.57.20 \n", "IP:").as_deref(),
                Some("192.168.57.20")
            );
            assert_eq!(
                parse_labeled("vmnet: vmnet5 free", "vmnet:").as_deref(),
                Some("vmnet5")
            );
            assert!(parse_labeled("no match here", "IP:").is_none());
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::{ServiceError, VnetlibCli};
    use crate::error::Result;
    use tokio::process::Command;
    use vmgate_utility::process::execute_with_output;

    /// Registry path to the VMnet configurations.
    const VMNETCONFIG_REGISTRY_PATH: &str = r"SOFTWARE\VMware, Inc.\VMnetLib\VMnetConfig";

    /// Takes ownership of a VMnetConfig registry subtree. Run as one
    /// atomic operation; a failure leaves the subtree untouched.
    ///
    /// The script escalates NT privileges 9/17/18, sets the owner to
    /// the SYSTEM SID, grants Everyone read and Owner/Administrators
    /// full control.
    const REGISTRY_OWNERSHIP_SCRIPT: &str = r#"
param(
    [Parameter(Mandatory=$true)]
    [string]$RegKey,
    [System.Security.Principal.SecurityIdentifier]$OwnerSID="S-1-5-18"
)

$ErrorActionPreference = "Stop"

$import = '[DllImport("ntdll.dll")] public static extern int RtlAdjustPrivilege(ulong a, bool b, bool c, ref bool d);'
$ntdll = Add-Type -Member $import -Name NtDll -PassThru
$null = $ntdll::RtlAdjustPrivilege(9, 1, 0, [ref]0)
$null = $ntdll::RtlAdjustPrivilege(17, 1, 0, [ref]0)
$null = $ntdll::RtlAdjustPrivilege(18, 1, 0, [ref]0)

$key = [Microsoft.Win32.Registry]::LocalMachine.OpenSubKey($RegKey, 'ReadWriteSubTree', 'TakeOwnership')
$acl = New-Object System.Security.AccessControl.RegistrySecurity
$acl.SetOwner($OwnerSID)
$key.SetAccessControl($acl)

[System.Security.Principal.SecurityIdentifier]$AdminsSID = "S-1-5-32-544"
[System.Security.Principal.SecurityIdentifier]$EveryoneSID = "S-1-1-0"

$key = [Microsoft.Win32.Registry]::LocalMachine.OpenSubKey($RegKey, 'ReadWriteSubTree', 'ChangePermissions')
$rule = New-Object System.Security.AccessControl.RegistryAccessRule($EveryoneSID, 'ReadKey', 'ContainerInherit', 'None', 'Allow')
$acl.ResetAccessRule($rule)
$rule = New-Object System.Security.AccessControl.RegistryAccessRule($OwnerSID, 'FullControl', 'ContainerInherit', 'None', 'Allow')
$acl.ResetAccessRule($rule)
$rule = New-Object System.Security.AccessControl.RegistryAccessRule($AdminsSID, 'FullControl', 'ContainerInherit', 'None', 'Allow')
$acl.ResetAccessRule($rule)
$key.SetAccessControl($acl)
"#;

    pub fn add_device(name: &str) -> [&str; 4] {
        ["--", "add", "adapter", name]
    }

    pub fn remove_device(name: &str) -> [&str; 4] {
        ["--", "remove", "adapter", name]
    }

    pub fn set_subnet_addr<'a>(name: &'a str, addr: &'a str) -> [&'a str; 6] {
        ["--", "set", "vnet", name, "addr", addr]
    }

    pub fn set_subnet_mask<'a>(name: &'a str, mask: &'a str) -> [&'a str; 6] {
        ["--", "set", "vnet", name, "mask", mask]
    }

    pub fn set_nat(name: &str, enable: bool) -> [&str; 4] {
        ["--", if enable { "add" } else { "remove" }, "nat", name]
    }

    pub fn set_dhcp(name: &str, enable: bool) -> [&str; 4] {
        ["--", if enable { "add" } else { "remove" }, "dhcp", name]
    }

    pub fn enable_device(name: &str) -> [&str; 4] {
        ["--", "enable", "adapter", name]
    }

    pub fn disable_device(name: &str) -> [&str; 4] {
        ["--", "disable", "adapter", name]
    }

    pub fn update_device(name: &str) -> [&str; 4] {
        ["--", "update", "adapter", name]
    }

    pub fn update_nat(name: &str) -> [&str; 4] {
        ["--", "update", "nat", name]
    }

    pub fn status_nat(name: &str) -> [&str; 4] {
        ["--", "status", "nat", name]
    }

    pub fn status_dhcp(name: &str) -> [&str; 4] {
        ["--", "status", "dhcp", name]
    }

    pub fn service_nat<'a>(name: &'a str, action: &'a str) -> [&'a str; 4] {
        let verb = if action == "servicestart" { "start" } else { "stop" };
        ["--", verb, "nat", name]
    }

    pub fn service_dhcp<'a>(name: &'a str, action: &'a str) -> [&'a str; 4] {
        let verb = if action == "servicestart" { "start" } else { "stop" };
        ["--", verb, "dhcp", name]
    }

    /// The mapping write never reports a usable status, so the config
    /// rewrite is forced and success assumed.
    pub async fn reserve_address(
        cli: &VnetlibCli,
        device: &str,
        mac: &str,
        ip: &str,
    ) -> Result<()> {
        let _ = cli
            .runcmd(&["--", "set", "dhcp", device, "addipmac", ip, mac])
            .await;
        let _ = cli.runcmd(&["--", "update", "dhcp", device]).await;
        Ok(())
    }

    /// Reads the FixedIPtoMac registry map for `device` and returns the
    /// IP whose stored MAC matches.
    pub async fn lookup_reserved_address(
        _cli: &VnetlibCli,
        device: &str,
        mac: &str,
    ) -> Result<String> {
        let key = format!(r"HKLM:\{VMNETCONFIG_REGISTRY_PATH}\{device}\DHCP\FixedIPtoMac");
        let script = format!(
            "(Get-Item -Path '{key}').Property | ForEach-Object {{ \
             \"$_=$((Get-ItemProperty -Path '{key}' -Name $_).$_)\" }}"
        );
        let out = execute_with_output(
            Command::new("powershell").args(["-NoProfile", "-Command", &script]),
        )
        .await;
        if !out.success() {
            take_registry_ownership(&format!(
                r"{VMNETCONFIG_REGISTRY_PATH}\{device}\DHCP"
            ))
            .await?;
        }
        for line in out.output.lines() {
            if let Some((ip, stored)) = line.trim().split_once('=') {
                if stored.eq_ignore_ascii_case(mac) {
                    return Ok(ip.to_string());
                }
            }
        }
        Err(ServiceError::Vendor(format!("No entry found for MAC {mac}")))
    }

    /// Port forwards live as registry values keyed by host port under
    /// the device NAT subtree; deletion removes the value and its
    /// description sibling.
    pub async fn delete_port_fwd(
        _cli: &VnetlibCli,
        device: &str,
        protocol: &str,
        host_port: u16,
    ) -> Result<()> {
        let proto_key = if protocol == "tcp" { "TCPForward" } else { "UDPForward" };
        let key = format!(
            r"HKLM:\{VMNETCONFIG_REGISTRY_PATH}\{device}\NAT\{proto_key}"
        );
        let script = format!(
            "Remove-ItemProperty -Path '{key}' -Name '{host_port}' -ErrorAction Stop; \
             Remove-ItemProperty -Path '{key}' -Name '{host_port}Description' \
             -ErrorAction SilentlyContinue"
        );
        let out = execute_with_output(
            Command::new("powershell").args(["-NoProfile", "-Command", &script]),
        )
        .await;
        if !out.success() {
            return Err(ServiceError::Vendor("failed to delete port forward".to_string()));
        }
        Ok(())
    }

    pub async fn unused_device(cli: &VnetlibCli) -> Result<String> {
        let (_, out) = cli.runcmd(&["--", "list", "adapters"]).await;
        // Pick the first vmnet slot not reported by the tool.
        for slot in 1..=19u32 {
            let name = format!("vmnet{slot}");
            if !out.contains(&name) {
                return Ok(name);
            }
        }
        Err(ServiceError::Vendor(
            "failed to generate new device name".to_string(),
        ))
    }

    async fn take_registry_ownership(subtree: &str) -> Result<()> {
        let out = execute_with_output(Command::new("powershell").args([
            "-NoProfile",
            "-Command",
            &format!(
                "& {{ {REGISTRY_OWNERSHIP_SCRIPT} }} -RegKey '{subtree}'"
            ),
        ]))
        .await;
        if !out.success() {
            return Err(ServiceError::Vendor(
                "failed to take ownership of registry subtree".to_string(),
            ));
        }
        Ok(())
    }
}
