//! The vendor `vmrest` subprocess and the remote driver built on it.
//!
//! The supervisor owns the vendor REST process: it generates throwaway
//! credentials, writes the vendor config file into an isolated home,
//! starts the process on demand and kills it after five minutes of
//! idleness. All state lives in a single actor task whose inbox is
//! activity pings, the idle timer and cancellation.
//!
//! [`VmrestDriver`] performs operations over that REST surface where
//! the vendor supports them and delegates everything else to the
//! wrapped fallback driver it owns.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use vmgate_utility::process::execute_with_output;
use vmgate_utility::VmwarePaths;

use crate::base::{wire_to_settings_fwd, BaseDriver};
use crate::error::{DriverError, Result};
use crate::types::{
    free_slot, PortForward, PortForwardGuest, PortForwards, Vmnet, Vmnets, VmwareInfo,
};
use crate::Driver;

const LOWERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBERS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!#$%&'()*+,-./:;<=>?@[]^_`{|}~";

const VMREST_MIN_VERSION: (u32, u32, u32) = (1, 2, 0);
#[cfg(unix)]
const VMREST_CONFIG: &str = ".vmrestCfg";
#[cfg(windows)]
const WINDOWS_VMREST_CONFIG: &str = "vmrest.cfg";
const VMREST_CONTENT_TYPE: &str = "application/vnd.vmware.vmw.rest-v1+json";
const VMREST_VAGRANT_DESC: &str = "vagrant: managed port";
const VMREST_KEEPALIVE_SECONDS: u64 = 300;

const VMWARE_NETDEV_PREFIX: &str = "vmnet";
const VAGRANT_NETDEV_PREFIX: &str = "vgtnet";

/// Handle to the supervised vmrest process.
pub struct Vmrest {
    activity: mpsc::Sender<()>,
    port: u16,
    username: String,
    password: String,
}

impl Vmrest {
    /// Validates the executable, writes the vendor configuration and
    /// spawns the supervisor actor.
    ///
    /// # Errors
    ///
    /// Returns an error when the executable is missing or too old, or
    /// the configuration cannot be written.
    pub async fn new(exe_path: &str, cancel: CancellationToken) -> Result<Self> {
        validate_vmrest(exe_path).await?;

        let username = string_gen(false, 0);
        let password = string_gen(true, 0);
        let salt = string_gen(true, 16);
        let port = free_local_port()?;
        let home = configure(port, &username, &password, &salt)?;

        tracing::trace!(home = %home, username = %username, port, "process configuration");

        let (activity_tx, activity_rx) = mpsc::channel(1);
        tokio::spawn(runner(
            exe_path.to_string(),
            home,
            activity_rx,
            cancel,
        ));

        Ok(Self {
            activity: activity_tx,
            port,
            username,
            password,
        })
    }

    /// Signals activity (starting the process when needed) and returns
    /// the API base URL.
    pub async fn active(&self) -> String {
        let _ = self.activity.send(()).await;
        self.url()
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://localhost:{}/api", self.port)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

/// Supervisor actor: starts the process on activity, kills it after
/// the keep-alive window passes without activity, reaps it when it
/// exits on its own, and tears it down on cancellation.
async fn runner(
    exe_path: String,
    home: String,
    mut activity: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    // Serializes process startup; held across the spawn only.
    let access = Mutex::new(());
    let mut child: Option<Child> = None;
    loop {
        match child.take() {
            Some(mut running) => {
                let action = tokio::select! {
                    Some(()) = activity.recv() => {
                        tracing::trace!("activity request detected");
                        RunnerAction::Idle
                    }
                    _ = tokio::time::sleep(Duration::from_secs(VMREST_KEEPALIVE_SECONDS)) => {
                        tracing::debug!("halting running process");
                        RunnerAction::Kill
                    }
                    status = running.wait() => {
                        tracing::debug!(status = ?status.ok(),
                            "process has been completed and reaped");
                        RunnerAction::Reaped
                    }
                    _ = cancel.cancelled() => {
                        tracing::warn!("halting due to cancellation");
                        RunnerAction::Shutdown
                    }
                };
                match action {
                    RunnerAction::Idle => child = Some(running),
                    RunnerAction::Reaped => {}
                    RunnerAction::Kill => {
                        if let Err(err) = running.kill().await {
                            tracing::warn!(error = %err, "failed to kill idle process");
                        }
                    }
                    RunnerAction::Shutdown => {
                        if let Err(err) = running.kill().await {
                            tracing::warn!(error = %err, "failed to kill process on shutdown");
                        }
                        break;
                    }
                }
            }
            None => {
                tokio::select! {
                    Some(()) = activity.recv() => {
                        tracing::trace!("activity request detected");
                        tracing::debug!("starting the process");
                        let _guard = access.lock().await;
                        match start_process(&exe_path, &home) {
                            Ok(started) => {
                                child = Some(started);
                                tracing::debug!("process has been started");
                            }
                            Err(err) => tracing::error!(error = %err, "failed to start"),
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::warn!("halting due to cancellation");
                        break;
                    }
                }
            }
        }
    }
}

enum RunnerAction {
    Idle,
    Kill,
    Reaped,
    Shutdown,
}

/// Spawns the vmrest process with its home pointed at the generated
/// configuration, wiring both output streams into the log.
fn start_process(exe_path: &str, home: &str) -> Result<Child> {
    let mut cmd = Command::new(exe_path);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.env("HOME", home);
    #[cfg(windows)]
    cmd.env("USERPROFILE", home);
    let mut child = cmd.spawn()?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!(output = %line, "vmrest stdout");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!(output = %line, "vmrest stderr");
            }
        });
    }
    Ok(child)
}

/// Writes the vendor configuration file and returns the home directory
/// the process must run under.
fn configure(port: u16, username: &str, password: &str, salt: &str) -> Result<String> {
    let hash = bcrypt::hash(format!("{salt}{password}"), bcrypt::DEFAULT_COST)
        .map_err(|err| DriverError::Vendor(format!("failed to generate config hash: {err}")))?;
    let content = format!("port={port}\r\nusername={username}\r\npassword={hash}\r\nsalt={salt}\r\n");

    #[cfg(unix)]
    {
        // An isolated throwaway home keeps the vendor config away from
        // any real user profile. Removed again at shutdown.
        let home = tempfile::Builder::new()
            .prefix("vmgate-vmrest")
            .tempdir()?
            .keep();
        std::fs::write(home.join(VMREST_CONFIG), content)?;
        let home_str = home.to_string_lossy().into_owned();
        let cleanup = home.clone();
        vmgate_utility::shutdown::register_shutdown_task(move || {
            tracing::trace!(path = %cleanup.display(), "removing generated home directory");
            if let Err(err) = std::fs::remove_dir_all(&cleanup) {
                tracing::error!(path = %cleanup.display(), error = %err,
                    "failed to remove generated home directory");
            }
        });
        Ok(home_str)
    }
    #[cfg(windows)]
    {
        let mut home = std::env::var("USERPROFILE")
            .map_err(|_| DriverError::Vendor("failed to determine user home".to_string()))?;
        // The 32-bit vendor executable resolves the SYSTEM profile
        // through SysWOW64 while this 64-bit process sees system32.
        let user = std::env::var("USERNAME").unwrap_or_default();
        if user.eq_ignore_ascii_case("system") {
            let updated = home.replacen("system32", "SysWOW64", 1);
            tracing::info!(original = %home, updated = %updated,
                "modified user home directory for SYSTEM");
            home = updated;
        }
        std::fs::write(std::path::Path::new(&home).join(WINDOWS_VMREST_CONFIG), content)?;
        Ok(home)
    }
}

/// Confirms the executable exists and reports a supported version.
async fn validate_vmrest(exe_path: &str) -> Result<()> {
    if !vmgate_utility::file_exists(exe_path) {
        tracing::trace!(path = exe_path, "missing vmrest executable");
        return Err(DriverError::Vendor(
            "failed to locate the vmrest executable".to_string(),
        ));
    }
    let out = execute_with_output(Command::new(exe_path).arg("-v")).await;
    let version = parse_vmrest_version(&out.output).ok_or_else(|| {
        tracing::trace!(output = %out.output, "failed to determine vmrest version information");
        DriverError::Vendor("failed to determine vmrest version".to_string())
    })?;
    tracing::trace!(?version, minimum = ?VMREST_MIN_VERSION, "validating vmrest version");
    if version < VMREST_MIN_VERSION {
        tracing::warn!(?version, "installed vmrest does not meet version requirements");
        return Err(DriverError::Vendor("vmrest version is incompatible".to_string()));
    }
    Ok(())
}

/// Extracts `(major, minor, patch)` from `vmrest -v` output, shaped
/// `vmrest 1.3.0 build-...`.
fn parse_vmrest_version(output: &str) -> Option<(u32, u32, u32)> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if token != "vmrest" {
            continue;
        }
        let version = tokens.next()?;
        let mut parts = version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().unwrap_or("0").parse().ok()?;
        let patch = parts.next().unwrap_or("0").parse().ok()?;
        return Some((major, minor, patch));
    }
    None
}

/// Asks the kernel for a currently free TCP port.
fn free_local_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Generates a random credential string: 8-10 characters cycling
/// through lowercase, digits, uppercase and (optionally) symbols.
fn string_gen(symbols: bool, len: usize) -> String {
    let mut rng = rand::thread_rng();
    let len = if len == 0 { rng.gen_range(8..=10) } else { len };
    let collections = if symbols { 4 } else { 3 };
    (0..len)
        .map(|i| {
            let set = match i % collections {
                1 => NUMBERS,
                2 => UPPERS,
                3 => SYMBOLS,
                _ => LOWERS,
            };
            set[rng.gen_range(0..set.len())] as char
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Remote driver
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RestGuest {
    ip: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct RestPortForward {
    port: u16,
    protocol: String,
    #[serde(default)]
    desc: String,
    guest: RestGuest,
}

#[derive(Debug, Deserialize)]
struct RestPortForwards {
    #[serde(default)]
    port_forwardings: Vec<RestPortForward>,
}

/// Driver performing operations through the vendor REST process, with
/// a wrapped fallback driver for everything the REST surface cannot
/// express.
pub struct VmrestDriver {
    base: Arc<BaseDriver>,
    fallback: Box<dyn Driver>,
    vmrest: Vmrest,
    client: reqwest::Client,
    is_big_sur_min: bool,
}

impl VmrestDriver {
    /// Builds the remote driver around an already supervised vmrest
    /// process and the fallback driver it wraps.
    #[must_use]
    pub fn from_parts(base: Arc<BaseDriver>, fallback: Box<dyn Driver>, vmrest: Vmrest) -> Self {
        Self {
            base,
            fallback,
            vmrest,
            client: reqwest::Client::new(),
            is_big_sur_min: big_sur_min(),
        }
    }

    /// Unwraps the remote driver, handing the fallback back.
    #[must_use]
    pub fn into_fallback(self) -> Box<dyn Driver> {
        self.fallback
    }

    /// Sends a request to the vmrest service, retrying transport
    /// failures with exponential backoff.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Vec<u8>> {
        tracing::info!("starting remote request to vmware service");
        let url = format!("{}/{}", self.vmrest.active().await, path);
        tracing::debug!(method = %method, url = %url, "sending request");

        let mut delay = Duration::from_millis(250);
        let mut last_err = None;
        let mut response = None;
        for _ in 0..4 {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .basic_auth(self.vmrest.username(), Some(self.vmrest.password()))
                .header(reqwest::header::ACCEPT, VMREST_CONTENT_TYPE);
            if let Some(body) = &body {
                req = req
                    .header(reqwest::header::CONTENT_TYPE, VMREST_CONTENT_TYPE)
                    .body(body.to_string());
            }
            match req.send().await {
                Ok(resp) => {
                    response = Some(resp);
                    break;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "request failed");
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        let Some(response) = response else {
            return Err(DriverError::Vendor(format!(
                "vmrest request failed: {}",
                last_err.map_or_else(|| "unreachable".to_string(), |e| e.to_string())
            )));
        };

        let status = response.status();
        let data = response
            .bytes()
            .await
            .map_err(|err| DriverError::Vendor(format!("vmrest response read failed: {err}")))?
            .to_vec();
        tracing::debug!(code = status.as_u16(), body = %String::from_utf8_lossy(&data),
            "received response");
        if status.as_u16() > 299 {
            let message = serde_json::from_slice::<serde_json::Value>(&data)
                .ok()
                .and_then(|v| v.get("Message")?.as_str().map(str::to_string))
                .ok_or_else(|| {
                    DriverError::Vendor("unknown error encountered with vmrest process".to_string())
                })?;
            return Err(DriverError::Vendor(format!("failure encountered: {message}")));
        }
        Ok(data)
    }

    /// Locates the NAT vmnet device.
    async fn detect_nat(&self) -> Result<Vmnet> {
        let devices = self.vmnets().await?;
        devices
            .vmnets
            .into_iter()
            .find(|vmnet| vmnet.kind == "nat")
            .ok_or_else(|| DriverError::NotFound("failed to locate NAT vmnet device".to_string()))
    }

    /// Picks a name for a new device from the unused slots.
    async fn set_vmnet_name(&self, vmnet: &mut Vmnet) -> Result<()> {
        let devices = self.vmnets().await?;
        let names: Vec<String> = devices.vmnets.into_iter().map(|v| v.name).collect();
        let slot = free_slot(&names, &[VMWARE_NETDEV_PREFIX, VAGRANT_NETDEV_PREFIX]);
        vmnet.name = format!("vmnet{slot}");
        Ok(())
    }
}

fn big_sur_min() -> bool {
    #[cfg(unix)]
    {
        vmgate_utility::ownership::is_big_sur_min()
    }
    #[cfg(windows)]
    {
        false
    }
}

#[async_trait::async_trait]
impl Driver for VmrestDriver {
    async fn vmnets(&self) -> Result<Vmnets> {
        tracing::trace!("requesting list of current vmnets");
        let data = self.request(reqwest::Method::GET, "vmnet", None).await?;
        let vmnets: Vmnets = serde_json::from_slice(&data)
            .map_err(|err| DriverError::Vendor(format!("failed to parse vmnets: {err}")))?;
        Ok(vmnets)
    }

    async fn add_vmnet(&self, vmnet: &mut Vmnet) -> Result<()> {
        tracing::trace!(name = %vmnet.name, "adding vmnet device");
        if !self.is_big_sur_min {
            return self.fallback.add_vmnet(vmnet).await;
        }
        // The vmnet framework does not expose subnet or mask
        // configuration, so reject requests that require it.
        if vmnet.kind != "bridged" && (!vmnet.mask.is_empty() || !vmnet.subnet.is_empty()) {
            return Err(DriverError::Unsupported(
                "networks with custom subnet/mask values are not supported on this platform"
                    .to_string(),
            ));
        }
        if vmnet.name.is_empty() {
            self.set_vmnet_name(vmnet).await?;
        }
        let body = serde_json::to_value(&*vmnet)
            .map_err(|err| DriverError::Vendor(format!("failed to encode vmnet: {err}")))?;
        self.request(reqwest::Method::POST, "vmnets", Some(body))
            .await?;
        Ok(())
    }

    async fn update_vmnet(&self, vmnet: &mut Vmnet) -> Result<()> {
        tracing::trace!(name = %vmnet.name, "updating vmnet device");
        if self.is_big_sur_min {
            return Err(DriverError::Unsupported(
                "VMware does not support updating vmnet device".to_string(),
            ));
        }
        self.fallback.update_vmnet(vmnet).await
    }

    async fn delete_vmnet(&self, vmnet: &Vmnet) -> Result<()> {
        tracing::trace!(name = %vmnet.name, "deleting vmnet device");
        if self.is_big_sur_min {
            return Err(DriverError::Unsupported(
                "VMware does not support deleting vmnet device".to_string(),
            ));
        }
        self.fallback.delete_vmnet(vmnet).await
    }

    async fn port_fwds(&self, slot: Option<u32>) -> Result<PortForwards> {
        if let Some(fwds) = self.base.internal_port_fwds().await {
            return Ok(PortForwards::new(fwds));
        }

        let (device, slot) = match slot {
            Some(slot) => (format!("vmnet{slot}"), slot),
            None => {
                let nat = self.detect_nat().await?;
                let slot = nat.slot().ok_or_else(|| {
                    DriverError::Vendor("error parsing vmnet device name for slot".to_string())
                })?;
                (nat.name, slot)
            }
        };
        tracing::trace!(device = %device, "requesting list of port forwards");
        let data = self
            .request(
                reqwest::Method::GET,
                &format!("vmnet/{device}/portforward"),
                None,
            )
            .await?;
        let parsed: RestPortForwards = serde_json::from_slice(&data)
            .map_err(|err| DriverError::Vendor(format!("failed to parse port forwards: {err}")))?;

        let stored = self.base.settings().nat.port_fwds();
        let fwds = parsed
            .port_forwardings
            .into_iter()
            .map(|rest| {
                let mut fwd = PortForward {
                    port: rest.port,
                    protocol: rest.protocol,
                    description: rest.desc,
                    guest: PortForwardGuest {
                        ip: rest.guest.ip,
                        port: rest.guest.port,
                    },
                    slot,
                };
                // Stored descriptions track orchestrator ownership;
                // the vendor only keeps its own placeholder text.
                for stored_fwd in &stored {
                    let nfwd = crate::base::settings_to_wire_fwd(stored_fwd);
                    if fwd.matches(&nfwd) {
                        fwd.description = nfwd.description;
                    }
                }
                fwd
            })
            .collect();
        Ok(PortForwards::new(fwds))
    }

    async fn add_port_fwds(&self, fwds: Vec<PortForward>) -> Result<()> {
        tracing::trace!(count = fwds.len(), "adding port forwards");
        for mut fwd in fwds {
            fwd.description = self
                .base
                .validate_port_fwd_description(&fwd.description)?;
            tracing::trace!(port = fwd.port, protocol = %fwd.protocol,
                "creating port forward");
            if self.base.internal_port_forwarding().await {
                self.base.add_internal_port_forward(&fwd).await?;
            } else {
                let body = serde_json::json!({
                    "guestIp": fwd.guest.ip,
                    "guestPort": fwd.guest.port,
                    "desc": VMREST_VAGRANT_DESC,
                });
                self.request(
                    reqwest::Method::PUT,
                    &format!(
                        "vmnet/vmnet{}/portforward/{}/{}",
                        fwd.slot, fwd.protocol, fwd.port
                    ),
                    Some(body),
                )
                .await?;
            }
            tracing::info!(port = fwd.port, protocol = %fwd.protocol, "port forward added");

            let stored = wire_to_settings_fwd(&fwd);
            self.base.settings().nat.remove(&stored);
            self.base.settings().nat.add(stored);
            self.base.settings().nat.save().map_err(|err| {
                tracing::error!(error = %err, "failed to save port forward nat settings");
                DriverError::Vendor(
                    "failed to store persistent port forward information".to_string(),
                )
            })?;
        }
        Ok(())
    }

    async fn delete_port_fwds(&self, fwds: Vec<PortForward>) -> Result<()> {
        tracing::trace!(count = fwds.len(), "removing port forwards");
        for fwd in fwds {
            tracing::trace!(port = fwd.port, protocol = %fwd.protocol,
                "deleting port forward");
            if self.base.internal_port_forwarding().await {
                self.base.delete_internal_port_forward(&fwd).await?;
            } else {
                self.request(
                    reqwest::Method::DELETE,
                    &format!(
                        "vmnet/vmnet{}/portforward/{}/{}",
                        fwd.slot, fwd.protocol, fwd.port
                    ),
                    None,
                )
                .await?;
            }
            tracing::info!(port = fwd.port, protocol = %fwd.protocol, "port forward removed");

            self.base.settings().nat.remove(&wire_to_settings_fwd(&fwd));
            self.base.settings().nat.save().map_err(|err| {
                tracing::error!(error = %err, "failed to save port forward nat settings");
                DriverError::Vendor(
                    "failed to store persistent port forward information".to_string(),
                )
            })?;
        }
        Ok(())
    }

    async fn prune_port_fwds(&self) -> Result<()> {
        self.base.prune_port_fwds(self).await
    }

    async fn lookup_dhcp_address(&self, device: &str, mac: &str) -> Result<String> {
        self.fallback.lookup_dhcp_address(device, mac).await
    }

    async fn reserve_dhcp_address(&self, slot: u32, mac: &str, ip: &str) -> Result<()> {
        if self.is_big_sur_min {
            return Err(DriverError::Unsupported(
                "DHCP reservations are not available on this platform".to_string(),
            ));
        }
        tracing::trace!(slot, mac, ip, "reserving dhcp address");
        let body = serde_json::json!({ "IP": ip });
        self.request(
            reqwest::Method::PUT,
            &format!("vmnet/vmnet{slot}/mactoip/{mac}"),
            Some(body),
        )
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "failed to create dhcp reservation");
            DriverError::Vendor("failed to create dhcp reservation".to_string())
        })?;
        Ok(())
    }

    async fn vmware_info(&self) -> Result<VmwareInfo> {
        Ok(self.base.info().clone())
    }

    fn vmware_paths(&self) -> &VmwarePaths {
        self.base.vmware_paths()
    }

    async fn verify_vmnet(&self) -> Result<()> {
        self.fallback.verify_vmnet().await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::PORTFWD_PREFIX;

    #[test]
    fn credential_generation_shapes() {
        for _ in 0..16 {
            let username = string_gen(false, 0);
            assert!((8..=10).contains(&username.len()));
            assert!(username.bytes().all(|b| {
                LOWERS.contains(&b) || UPPERS.contains(&b) || NUMBERS.contains(&b)
            }));
        }
        let salt = string_gen(true, 16);
        assert_eq!(salt.len(), 16);
        // Cycle order guarantees a symbol at index 3 when enabled.
        assert!(SYMBOLS.contains(&salt.as_bytes()[3]));
    }

    #[test]
    fn vmrest_version_parses() {
        assert_eq!(
            parse_vmrest_version("vmrest 1.3.0 build-23298084"),
            Some((1, 3, 0))
        );
        assert_eq!(parse_vmrest_version("vmrest 1.2"), Some((1, 2, 0)));
        assert!(parse_vmrest_version("no version output").is_none());
    }

    #[test]
    fn vmrest_version_comparison() {
        assert!((1, 3, 0) >= VMREST_MIN_VERSION);
        assert!((1, 2, 0) >= VMREST_MIN_VERSION);
        assert!((1, 1, 9) < VMREST_MIN_VERSION);
    }

    #[test]
    fn free_port_is_bindable() {
        let port = free_local_port().unwrap();
        assert!(port > 0);
    }

    #[test]
    fn config_description_constant_matches_wire() {
        assert!(VMREST_VAGRANT_DESC.starts_with(PORTFWD_PREFIX.trim_end()));
    }
}
