//! Shared driver state and behavior.
//!
//! Every concrete driver owns (a clone handle to) a [`BaseDriver`]:
//! resolved product paths, probed product information, the settings
//! stores, the vendor tool wrappers, the validation outcome, and the
//! optional internal port-forwarding engine.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::process::Command;
use tokio::sync::Mutex;
use vmgate_service::vmrun::VmrunExe;
use vmgate_service::{
    new_vmware_services, PortForwarding, VmnetCli, Vmrun, VmwareServices,
};
use vmgate_settings::{Address, Forward, Settings};
use vmgate_utility::networking_file::{NetworkingFile, PortFwd};
use vmgate_utility::nat_file::NatFile;
use vmgate_utility::process::execute_with_output;
use vmgate_utility::VmwarePaths;

use crate::error::{DriverError, Result};
use crate::types::{PortForward, PortForwardGuest, PortForwards, Vmnet, Vmnets, VmwareInfo};
use crate::Driver;

/// Description prefix marking orchestrator-managed forwards.
pub const PORTFWD_PREFIX: &str = "vagrant: ";

const VALIDATION_FAILURE_REASON: &str = "Invalid ownership/permissions detected for VMware \
installation.\nPlease re-install VMware and restart the vmgate\nservice.";

/// Shared state for the concrete drivers.
pub struct BaseDriver {
    paths: VmwarePaths,
    settings: Settings,
    vmrun: Arc<dyn Vmrun>,
    services: Arc<dyn VmwareServices>,
    vmnet_cli: VmnetCli,
    info: VmwareInfo,
    validated: AtomicBool,
    validation_reason: StdMutex<String>,
    pfwd: Mutex<Option<Arc<PortForwarding>>>,
}

impl BaseDriver {
    /// Builds the shared driver state: resolves paths, probes the
    /// product version and license, applies an optional license
    /// override, and loads the settings stores.
    ///
    /// # Errors
    ///
    /// Returns an error when the product cannot be located or probed,
    /// or the settings stores cannot be loaded.
    pub async fn new(license_override: Option<&str>) -> Result<Self> {
        let mut paths = VmwarePaths::load()?;
        let services = new_vmware_services(&paths.services)?;
        let vmrun = VmrunExe::new(&paths.vmrun)?;
        let settings = Settings::build()?;
        let vmnet_cli = VmnetCli::new(&paths.vmnet_cli, Arc::clone(&services))?;

        tracing::debug!("loading vmware information");
        let mut info = probe_vmware_info(&paths).await?;

        // The DHCP lease location varies with the product version on
        // some platforms.
        paths.update_dhcp_lease_path(&info.version)?;
        tracing::debug!(path = %paths.dhcp_lease, "dhcp lease file");

        tracing::debug!(license = %info.license, "initial vmware information loaded");
        if let Some(license) = license_override {
            if !license.is_empty() {
                tracing::debug!(original = %info.license, license_override = license,
                    "applying user defined license override");
                info.license = license.to_string();
            }
        }
        info.normalize();
        tracing::debug!(license = %info.license, "normalized vmware information");

        Ok(Self {
            paths,
            settings,
            vmrun,
            services,
            vmnet_cli,
            info,
            validated: AtomicBool::new(false),
            validation_reason: StdMutex::new(String::new()),
            pfwd: Mutex::new(None),
        })
    }

    /// Builds driver state around preconstructed collaborators.
    /// Intended for tests.
    #[doc(hidden)]
    pub fn with_parts(
        paths: VmwarePaths,
        settings: Settings,
        vmrun: Arc<dyn Vmrun>,
        services: Arc<dyn VmwareServices>,
        vmnet_cli: VmnetCli,
        info: VmwareInfo,
    ) -> Self {
        Self {
            paths,
            settings,
            vmrun,
            services,
            vmnet_cli,
            info,
            validated: AtomicBool::new(false),
            validation_reason: StdMutex::new(String::new()),
            pfwd: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn vmware_paths(&self) -> &VmwarePaths {
        &self.paths
    }

    #[must_use]
    pub fn info(&self) -> &VmwareInfo {
        &self.info
    }

    #[must_use]
    pub fn vmnet_cli(&self) -> &VmnetCli {
        &self.vmnet_cli
    }

    #[must_use]
    pub fn services(&self) -> &Arc<dyn VmwareServices> {
        &self.services
    }

    #[must_use]
    pub fn validated(&self) -> bool {
        self.validated.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn validation_reason(&self) -> String {
        self.validation_reason
            .lock()
            .expect("validation reason poisoned")
            .clone()
    }

    /// Loads the networking file with stored NAT descriptions merged
    /// onto matching forwards.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read.
    pub fn load_networking_file(&self) -> Result<NetworkingFile> {
        let mut file = NetworkingFile::load(&self.paths.networking)?;
        file.merge_fwds(&self.settings.nat.port_fwds());
        Ok(file)
    }

    /// Loads the `nat.conf` for a device.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    pub fn load_nat_file(&self, device: &str) -> Result<NatFile> {
        Ok(NatFile::load(self.paths.nat_conf_file(device))?)
    }

    /// Lists devices from the networking file, classifying each as
    /// `nat`, `hostOnly` or `bridged`.
    ///
    /// # Errors
    ///
    /// Returns an error when the networking file cannot be read.
    pub fn vmnets_from_networking_file(&self) -> Result<Vmnets> {
        tracing::info!("collecting vmnets");
        let file = NetworkingFile::load(&self.paths.networking)?;
        let vmnets = file
            .devices()
            .iter()
            .map(|device| {
                let mut vmnet = Vmnet {
                    name: device.name.clone(),
                    dhcp: if device.dhcp { "yes" } else { "no" }.to_string(),
                    ..Vmnet::default()
                };
                if device.nat {
                    vmnet.kind = "nat".to_string();
                }
                if !device.hostonly_subnet.is_empty() {
                    if vmnet.kind.is_empty() {
                        vmnet.kind = "hostOnly".to_string();
                    }
                    vmnet.subnet = device.hostonly_subnet.clone();
                    vmnet.mask = device.hostonly_netmask.clone();
                }
                if vmnet.kind.is_empty() {
                    vmnet.kind = "bridged".to_string();
                }
                vmnet
            })
            .collect();
        Ok(Vmnets::new(vmnets))
    }

    /// Lists enabled port forwards, preferring the internal engine
    /// when it is active (the slot filter is ignored there: the engine
    /// is slot-agnostic).
    ///
    /// # Errors
    ///
    /// Returns an error when the networking file cannot be read.
    pub async fn port_fwds(&self, slot: Option<u32>) -> Result<PortForwards> {
        if let Some(fwds) = self.internal_port_fwds().await {
            return Ok(PortForwards::new(fwds));
        }

        let file = self.load_networking_file()?;
        let fwds = file
            .port_fwds()
            .iter()
            .filter(|fwd| {
                if !fwd.enable {
                    tracing::trace!(port = fwd.host_port, "port forward discard, not enabled");
                    return false;
                }
                if let Some(slot) = slot {
                    if fwd.slot != slot {
                        tracing::trace!(slot = fwd.slot, wanted = slot, "port forward discard");
                        return false;
                    }
                }
                true
            })
            .map(settings_to_wire_fwd)
            .collect();
        Ok(PortForwards::new(fwds))
    }

    /// Runs the installation pre-flight checks and records the result.
    pub async fn validate(&self) -> bool {
        let outcome = self.run_validation().await;
        self.validated.store(outcome, Ordering::SeqCst);
        let reason = if outcome {
            "VMware validation successful".to_string()
        } else {
            VALIDATION_FAILURE_REASON.to_string()
        };
        *self
            .validation_reason
            .lock()
            .expect("validation reason poisoned") = reason;
        outcome
    }

    #[cfg(unix)]
    async fn run_validation(&self) -> bool {
        use vmgate_utility::ownership::root_owned;

        #[cfg(target_os = "macos")]
        self.validate_fusion_app().await;

        if !root_owned(&self.paths.install_dir, true) {
            tracing::error!(path = %self.paths.install_dir,
                "VMware validation failure: invalid installation directory ownership/permissions");
            return false;
        }

        // Executables and their parent directories must be root owned
        // and not writable by group or others.
        let check_paths = [
            self.paths.vmnet_cli.as_str(),
            self.paths.vnetlib.as_str(),
            self.paths.vmrun.as_str(),
        ];
        for check_path in check_paths {
            if check_path.is_empty() {
                continue;
            }
            #[cfg(target_os = "macos")]
            {
                let out = execute_with_output(Command::new("/usr/bin/codesign").args([
                    "--verify",
                    "--verbose",
                    check_path,
                ]))
                .await;
                if !out.success() {
                    tracing::error!(path = check_path, cause = %out.output,
                        "VMware validation failure");
                    return false;
                }
            }
            if !root_owned(check_path, true) {
                tracing::error!(path = check_path,
                    "VMware validation failure: invalid file ownership/permissions");
                return false;
            }
            let parent = Path::new(check_path)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !root_owned(&parent, true) {
                tracing::error!(path = %parent,
                    "VMware validation failure: invalid parent directory ownership/permissions");
                return false;
            }
        }
        true
    }

    // Installation on Windows already required administrator rights.
    #[cfg(windows)]
    async fn run_validation(&self) -> bool {
        true
    }

    /// Logs bundle signature problems. In-place product upgrades break
    /// bundle verification, so the outcome is informational only.
    #[cfg(target_os = "macos")]
    async fn validate_fusion_app(&self) {
        let out = execute_with_output(Command::new("/usr/bin/codesign").args([
            "--verify",
            "--verbose",
            &self.paths.install_dir,
        ]))
        .await;
        if !out.success() {
            tracing::warn!(cause = %out.output, "failed to validate VMware Fusion app bundle");
        }
    }

    /// Ensures the vmnet services are healthy, escalating from a plain
    /// start to a stop + reconfigure + start cycle.
    ///
    /// # Errors
    ///
    /// Returns an error when the services cannot be brought up.
    pub async fn verify_vmnet(&self) -> Result<()> {
        if self.vmnet_cli.status().await {
            tracing::trace!("vmnet services reporting as healthy");
            return Ok(());
        }
        tracing::debug!("ensuring vmnet service is stopped");
        let _ = self.vmnet_cli.stop().await;
        tracing::debug!("attempting to start the vmnet services");
        if self.vmnet_cli.start().await.is_ok() {
            return Ok(());
        }
        tracing::debug!("running vmnet configure after failed vmnet start");
        let _ = self.vmnet_cli.stop().await;
        let _ = self.vmnet_cli.configure(None).await;
        tracing::debug!("attempting to start vmnet services again");
        if self.vmnet_cli.start().await.is_ok() {
            return Ok(());
        }
        tracing::debug!("attempting final vmnet services start");
        let _ = self.vmnet_cli.stop().await;
        self.vmnet_cli.start().await?;
        Ok(())
    }

    /// Starts the internal user-space forwarding engine.
    ///
    /// # Errors
    ///
    /// Returns an error when persisted forwards cannot be activated.
    pub async fn enable_internal_port_forwarding(&self) -> Result<()> {
        let mut slot = self.pfwd.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        let pfwd = Arc::new(PortForwarding::new(Arc::clone(
            &self.settings.port_forwarding,
        )));
        tracing::debug!("starting internal port forwarding service");
        pfwd.load().await;
        pfwd.start().await?;
        tracing::debug!("internal port forwarding service running");
        *slot = Some(pfwd);
        Ok(())
    }

    /// Returns true when the internal engine is active.
    pub async fn internal_port_forwarding(&self) -> bool {
        self.pfwd.lock().await.is_some()
    }

    /// Returns the internal engine's forward list, when active.
    pub async fn internal_port_fwds(&self) -> Option<Vec<PortForward>> {
        let pfwd = Arc::clone(self.pfwd.lock().await.as_ref()?);
        let fwds = pfwd.fwds().await;
        Some(fwds.iter().map(forward_to_wire_fwd).collect())
    }

    /// Adds a forward through the internal engine.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine is disabled or activation
    /// fails.
    pub async fn add_internal_port_forward(&self, fwd: &PortForward) -> Result<()> {
        let pfwd = self.internal_engine().await?;
        Ok(pfwd.add(wire_to_settings_forward(fwd)).await?)
    }

    /// Removes a forward through the internal engine.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine is disabled or persistence
    /// fails.
    pub async fn delete_internal_port_forward(&self, fwd: &PortForward) -> Result<()> {
        let pfwd = self.internal_engine().await?;
        Ok(pfwd.remove(&wire_to_settings_forward(fwd)).await?)
    }

    async fn internal_engine(&self) -> Result<Arc<PortForwarding>> {
        self.pfwd
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| {
                DriverError::Unsupported(
                    "internal port forwarding service is not enabled".to_string(),
                )
            })
    }

    /// Validates an orchestrator-managed forward description: the
    /// `vagrant: ` prefix followed by a resolvable VMX path.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing prefix or unresolvable path.
    pub fn validate_port_fwd_description(&self, description: &str) -> Result<String> {
        let Some(path) = description.strip_prefix(PORTFWD_PREFIX) else {
            tracing::debug!(description, "port forward description prefix invalid");
            return Err(DriverError::InvalidDescription(
                "invalid port forward description format".to_string(),
            ));
        };
        let matched = self.match_vm_path(path)?;
        Ok(format!("{PORTFWD_PREFIX}{matched}"))
    }

    /// Resolves a VMX path on possibly case-insensitive file systems:
    /// the original path wins when only it exists; the lowercased path
    /// is accepted only when both exist and refer to the same inode.
    ///
    /// # Errors
    ///
    /// Returns an error when the path cannot be resolved.
    pub fn match_vm_path(&self, check_path: &str) -> Result<String> {
        resolve_vm_path(check_path)
    }

    /// Drops forwards whose description marks them orchestrator-managed
    /// and whose referenced VM is gone or no longer running.
    ///
    /// # Errors
    ///
    /// Returns an error when listing or deletion fails.
    pub async fn prune_port_fwds(&self, driver: &dyn Driver) -> Result<()> {
        let fwds = driver.port_fwds(None).await?;
        let mut stale = Vec::new();
        for fwd in fwds.port_forwards {
            let Some(vmx_path) = fwd.description.strip_prefix(PORTFWD_PREFIX) else {
                tracing::warn!(description = %fwd.description,
                    "prune check description no match");
                continue;
            };
            if let Ok(path) = self.match_vm_path(vmx_path) {
                if self.vm_alive(&path).await {
                    continue;
                }
            }
            tracing::trace!(port = fwd.port, protocol = %fwd.protocol,
                "prune forward, not in use");
            stale.push(fwd);
        }
        driver.delete_port_fwds(stale).await
    }

    /// Checks whether the VM at `vmx_path` is running. Probe failures
    /// count as alive so forwards are never pruned on uncertainty.
    #[cfg(unix)]
    pub async fn vm_alive(&self, vmx_path: &str) -> bool {
        let running = match self.vmrun.running_vms().await {
            Ok(running) => running,
            Err(err) => {
                tracing::error!(error = %err, "failed to list running vms");
                return true;
            }
        };
        for vm_path in running {
            if vm_path == vmx_path {
                return true;
            }
            if vm_path.to_lowercase() == vmx_path.to_lowercase()
                && same_file(vmx_path, &vm_path)
            {
                return true;
            }
        }
        false
    }

    /// Windows filters `vmrun list` by invoking user, so liveness is
    /// decided from the VM lock file pid instead.
    #[cfg(windows)]
    pub async fn vm_alive(&self, vmx_path: &str) -> bool {
        lock_file_pid_alive(vmx_path).await
    }

    #[must_use]
    pub fn vmrun(&self) -> &Arc<dyn Vmrun> {
        &self.vmrun
    }
}

/// Looks up VM liveness through the `<dir>/*.lck/*.lck` lock files,
/// which carry the owning pid as ` <pid>-`.
#[cfg(windows)]
async fn lock_file_pid_alive(vmx_path: &str) -> bool {
    let Some(dir) = Path::new(vmx_path).parent() else {
        return true;
    };
    let mut lock_files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "lck") && path.is_dir() {
                if let Ok(inner) = std::fs::read_dir(&path) {
                    for inner_entry in inner.flatten() {
                        let inner_path = inner_entry.path();
                        if inner_path.extension().is_some_and(|e| e == "lck") {
                            lock_files.push(inner_path);
                        }
                    }
                }
            }
        }
    }
    if lock_files.is_empty() {
        tracing::trace!(path = vmx_path, "no lock path found for vmx");
        return false;
    }
    if lock_files.len() > 1 {
        tracing::error!("lock path detection returned multiple paths, unexpected state");
        return true;
    }
    let Ok(content) = std::fs::read_to_string(&lock_files[0]) else {
        return true;
    };
    let Some(pid) = parse_lock_pid(&content) else {
        return true;
    };
    let out = execute_with_output(Command::new("tasklist").args([
        "/FI",
        &format!("PID eq {pid}"),
        "/NH",
    ]))
    .await;
    out.success() && out.output.contains(&pid.to_string())
}

/// Extracts the pid from lock file content shaped ` <pid>-`.
#[cfg(windows)]
fn parse_lock_pid(content: &str) -> Option<u32> {
    for token in content.split_whitespace() {
        if let Some(num) = token.split('-').next() {
            if let Ok(pid) = num.parse() {
                return Some(pid);
            }
        }
    }
    None
}

/// See [`BaseDriver::match_vm_path`].
pub(crate) fn resolve_vm_path(check_path: &str) -> Result<String> {
    let lower_path = check_path.to_lowercase();
    let check_exists = Path::new(check_path).exists();
    let lower_exists = Path::new(&lower_path).exists();
    if check_exists && !lower_exists {
        tracing::trace!(path = check_path, "exact vmx path match");
        return Ok(check_path.to_string());
    }
    if !check_exists && lower_exists {
        return Err(DriverError::InvalidDescription(
            "failed to validate VMX path".to_string(),
        ));
    }
    if !check_exists && !lower_exists {
        return Err(DriverError::InvalidDescription(
            "failed to detect VMX path".to_string(),
        ));
    }
    if same_file(check_path, &lower_path) {
        tracing::trace!(path = check_path, lower = %lower_path,
            "case insensitive vmx path match");
        return Ok(lower_path);
    }
    Err(DriverError::InvalidDescription(
        "VMX path provided invalid".to_string(),
    ))
}

#[cfg(unix)]
fn same_file(a: &str, b: &str) -> bool {
    vmgate_utility::ownership::same_file(a, b)
}

#[cfg(windows)]
fn same_file(a: &str, b: &str) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

/// Probes the product version and license edition through the vmx
/// binary.
async fn probe_vmware_info(paths: &VmwarePaths) -> Result<VmwareInfo> {
    tracing::trace!(vmx_path = %paths.vmx, "vmware version check");
    let out = execute_with_output(Command::new(&paths.vmx).arg("-v")).await;
    if !out.success() {
        tracing::trace!(output = %out.output, "vmware version check failed");
        return Err(DriverError::Vendor(
            "failed attempting to check VMware version".to_string(),
        ));
    }
    let mut info = parse_vmware_version(&out.output).ok_or_else(|| {
        DriverError::Vendor("failed to extract VMware version information".to_string())
    })?;

    let out = execute_with_output(
        Command::new(&paths.vmx).args(["--query-license", "LicenseEdition"]),
    )
    .await;
    if out.success() {
        info.license = out.output.trim().to_string();
    } else {
        tracing::warn!(output = %out.output, "failed to determine license edition");
        info.license = "unknown".to_string();
    }
    Ok(info)
}

/// Extracts product/version/build/type from `vmx -v` output, e.g.
/// `VMware Workstation 17.5.0 build-23298084 Release`.
pub(crate) fn parse_vmware_version(output: &str) -> Option<VmwareInfo> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if !token.eq_ignore_ascii_case("vmware") {
            continue;
        }
        let product = tokens.next()?;
        let version = tokens.next()?;
        if version != "e.x.p"
            && !(version.contains('.')
                && version.chars().all(|c| c.is_ascii_digit() || c == '.'))
        {
            return None;
        }
        return Some(VmwareInfo {
            product: product.to_string(),
            version: version.to_string(),
            build: tokens.next().unwrap_or_default().to_string(),
            kind: tokens.next().unwrap_or_default().to_string(),
            license: String::new(),
        });
    }
    None
}

/// Converts a persisted/parsed forward into the wire shape.
pub(crate) fn settings_to_wire_fwd(fwd: &PortFwd) -> PortForward {
    PortForward {
        port: fwd.host_port,
        protocol: fwd.protocol.clone(),
        description: fwd.description.clone(),
        guest: PortForwardGuest {
            ip: fwd.guest_ip.clone(),
            port: fwd.guest_port,
        },
        slot: fwd.slot,
    }
}

/// Converts a wire forward into the persisted shape.
pub(crate) fn wire_to_settings_fwd(fwd: &PortForward) -> PortFwd {
    PortFwd {
        enable: true,
        slot: fwd.slot,
        protocol: fwd.protocol.clone(),
        host_port: fwd.port,
        guest_ip: fwd.guest.ip.clone(),
        guest_port: fwd.guest.port,
        description: fwd.description.clone(),
    }
}

/// Converts an internal-engine forward into the wire shape.
pub(crate) fn forward_to_wire_fwd(fwd: &Forward) -> PortForward {
    PortForward {
        port: fwd.host.port,
        protocol: fwd.host.kind.clone(),
        description: fwd.description.clone(),
        guest: PortForwardGuest {
            ip: fwd.guest.host.clone(),
            port: fwd.guest.port,
        },
        slot: 0,
    }
}

/// Converts a wire forward into an internal-engine forward. The host
/// side binds every address since that is how the vendor forwarding
/// behaves.
pub(crate) fn wire_to_settings_forward(fwd: &PortForward) -> Forward {
    Forward {
        host: Address::new("0.0.0.0", fwd.port, fwd.protocol.clone()),
        guest: Address::new(fwd.guest.ip.clone(), fwd.guest.port, fwd.protocol.clone()),
        description: fwd.description.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_path_resolution() {
        // An all-lowercase base directory keeps the case probing on
        // the file name only.
        let base = std::env::temp_dir().join(format!("vmgate-vmx-{}", std::process::id()));
        std::fs::create_dir_all(&base).unwrap();

        let exact = base.join("Box.vmx");
        std::fs::write(&exact, "cfg").unwrap();
        let exact = exact.to_string_lossy().into_owned();
        // Only the original casing exists on a case-sensitive fs.
        assert_eq!(resolve_vm_path(&exact).unwrap(), exact);

        assert!(resolve_vm_path(&base.join("missing.vmx").to_string_lossy()).is_err());

        // Both spellings exist as distinct files: ambiguous, rejected
        // (a case-insensitive fs would report them as one inode).
        let upper = base.join("Twin.vmx");
        let lower = base.join("twin.vmx");
        std::fs::write(&upper, "a").unwrap();
        std::fs::write(&lower, "b").unwrap();
        let resolved = resolve_vm_path(&upper.to_string_lossy());
        if vmgate_utility::ownership::same_file(&upper, &lower) {
            assert!(resolved.is_ok());
        } else {
            assert!(resolved.is_err());
        }

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn version_output_parses() {
        let info =
            parse_vmware_version("VMware Workstation 17.5.0 build-23298084 Release\n").unwrap();
        assert_eq!(info.product, "Workstation");
        assert_eq!(info.version, "17.5.0");
        assert_eq!(info.build, "build-23298084");
        assert_eq!(info.kind, "Release");
    }

    #[test]
    fn experimental_version_parses() {
        let info = parse_vmware_version("VMware Fusion e.x.p build-1 Release").unwrap();
        assert_eq!(info.version, "e.x.p");
    }

    #[test]
    fn junk_version_rejected() {
        assert!(parse_vmware_version("no product here").is_none());
        assert!(parse_vmware_version("VMware Fusion not-a-version").is_none());
    }

    #[test]
    fn forward_conversions_round_trip() {
        let wire = PortForward {
            port: 2222,
            protocol: "tcp".to_string(),
            description: "vagrant: /tmp/a.vmx".to_string(),
            guest: PortForwardGuest {
                ip: "192.168.57.10".to_string(),
                port: 22,
            },
            slot: 8,
        };
        let settings = wire_to_settings_fwd(&wire);
        assert!(settings.enable);
        assert_eq!(settings.slot, 8);
        assert_eq!(settings_to_wire_fwd(&settings), wire);

        let internal = wire_to_settings_forward(&wire);
        assert_eq!(internal.host.host, "0.0.0.0");
        assert_eq!(internal.host.port, 2222);
        assert_eq!(internal.guest.kind, "tcp");
        let back = forward_to_wire_fwd(&internal);
        assert_eq!(back.port, wire.port);
        assert_eq!(back.guest, wire.guest);
    }
}
