//! Wrapper over the vendor `vmnet-cli` / `vmware-networks` tool.
//!
//! Drives the vmnet service stack as a whole: status probe, start,
//! stop, and full reconfiguration from a `networking` file. On Linux
//! the configure path must be handed over as a writable copy via
//! `--migrate-network-settings`.

use std::sync::Arc;

use tokio::process::Command;
use vmgate_utility::process::execute_with_output;

use crate::error::{Result, ServiceError};
use crate::vmware_services::VmwareServices;

/// Typed interface over the vmnet service CLI.
pub struct VmnetCli {
    exe_path: String,
    services: Arc<dyn VmwareServices>,
}

impl VmnetCli {
    /// Builds the wrapper, validating the executable.
    ///
    /// # Errors
    ///
    /// Returns an error when the executable is missing or not
    /// root-owned.
    pub fn new(exe_path: &str, services: Arc<dyn VmwareServices>) -> Result<Self> {
        #[cfg(unix)]
        if !vmgate_utility::ownership::root_owned(exe_path, true) {
            return Err(ServiceError::InvalidExecutable(
                "failed to locate valid vmnet executable".to_string(),
            ));
        }
        Ok(Self {
            exe_path: exe_path.to_string(),
            services,
        })
    }

    /// Returns true when the vmnet services report as running.
    pub async fn status(&self) -> bool {
        let code = execute_with_output(Command::new(&self.exe_path).arg("--status"))
            .await
            .exit_code;
        let running = code == 0;
        tracing::debug!(state = if running { "running" } else { "stopped" }, "service status");
        running
    }

    /// Starts the vmnet services. A running service is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error when the vendor tool reports failure.
    pub async fn start(&self) -> Result<()> {
        if self.status().await {
            tracing::debug!("start ignored, service running");
            return Ok(());
        }
        self.services.open().await;
        let result = self.raw_start().await;
        self.services.close().await;
        result
    }

    /// Stops the vmnet services and reaps orphaned vmnet daemons.
    ///
    /// # Errors
    ///
    /// Returns an error when the vendor tool reports failure.
    pub async fn stop(&self) -> Result<()> {
        self.services.open().await;
        let result = self.raw_stop().await;
        self.services.close().await;
        result
    }

    /// Stops then starts the vmnet services.
    ///
    /// # Errors
    ///
    /// Returns the first vendor failure.
    pub async fn restart(&self) -> Result<()> {
        self.services.open().await;
        let result = async {
            self.raw_stop().await?;
            self.raw_start().await
        }
        .await;
        self.services.close().await;
        result
    }

    /// Applies a networking configuration. On Linux the file at `path`
    /// is copied to a writable 0644 sibling and migrated; elsewhere the
    /// plain `--configure` entry point is used.
    ///
    /// # Errors
    ///
    /// Returns an error when the vendor tool reports failure.
    pub async fn configure(&self, path: Option<&str>) -> Result<()> {
        #[cfg(target_os = "linux")]
        let (mut cmd, _copy) = {
            let Some(path) = path else {
                tracing::debug!("received empty path for configure, ignoring");
                return Ok(());
            };
            let copy = self.copy_networking_file(path)?;
            tracing::debug!(path = %copy.path().display(), "configure via migrate settings");
            let mut cmd = Command::new(&self.exe_path);
            cmd.arg("--migrate-network-settings").arg(copy.path());
            (cmd, copy)
        };
        #[cfg(not(target_os = "linux"))]
        let mut cmd = {
            let _ = path;
            let mut cmd = Command::new(&self.exe_path);
            cmd.arg("--configure");
            cmd
        };

        self.services.open().await;
        let result = async {
            let _ = self.raw_stop().await;
            tracing::debug!("configuring service");
            let out = execute_with_output(&mut cmd).await;
            if out.success() {
                Ok(())
            } else {
                tracing::debug!(exit_code = out.exit_code, output = %out.output,
                    "service configure failed");
                Err(ServiceError::Vendor(
                    "failed to configure vmnet service".to_string(),
                ))
            }
        }
        .await;
        self.services.close().await;
        result
    }

    async fn raw_start(&self) -> Result<()> {
        tracing::debug!("starting service");
        let out = execute_with_output(Command::new(&self.exe_path).arg("--start")).await;
        if out.success() {
            Ok(())
        } else {
            tracing::debug!(exit_code = out.exit_code, output = %out.output,
                "service start failed");
            Err(ServiceError::Vendor("failed to start vmnet service".to_string()))
        }
    }

    async fn raw_stop(&self) -> Result<()> {
        tracing::debug!("stopping service");
        let out = execute_with_output(Command::new(&self.exe_path).arg("--stop")).await;
        let result = if out.success() {
            Ok(())
        } else {
            tracing::debug!(exit_code = out.exit_code, output = %out.output,
                "service stop failed");
            Err(ServiceError::Vendor("failed to stop vmnet service".to_string()))
        };
        // Make sure no vmnet daemons linger after a stop.
        #[cfg(unix)]
        {
            let code = execute_with_output(Command::new("/usr/bin/pkill").args([
                "vmnet-natd",
                "vmnet-bridge",
                "vmnet-dhcpd",
            ]))
            .await
            .exit_code;
            tracing::trace!(exit_code = code, "service orphan cleanup");
        }
        result
    }

    #[cfg(target_os = "linux")]
    fn copy_networking_file(&self, path: &str) -> Result<tempfile::NamedTempFile> {
        use std::os::unix::fs::PermissionsExt;

        let source = std::path::Path::new(path);
        let dir = source.parent().unwrap_or_else(|| std::path::Path::new("."));
        let tmp = tempfile::Builder::new()
            .prefix("vmgate-vmnet-temp")
            .tempfile_in(dir)?;
        std::fs::copy(source, tmp.path())?;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))?;
        Ok(tmp)
    }
}
