//! Platform service-manager coordination.
//!
//! Vendor networking tools misbehave when their surrounding services
//! are not in the expected state. Every configuration operation is
//! bracketed by [`VmwareServices::open`] / [`VmwareServices::close`]:
//! on macOS the Fusion services helper is kept alive for the duration,
//! on Linux the vmnet device node modes are snapshotted and restored,
//! and on Windows nothing extra is required (the NAT/DHCP services are
//! restarted explicitly by the drivers).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Bracketing hooks around vendor configuration operations.
#[async_trait]
pub trait VmwareServices: Send + Sync {
    /// Prepares the host services for a configuration operation.
    async fn open(&self);

    /// Restores the host services after a configuration operation.
    async fn close(&self);
}

/// Builds the service manager for the current platform.
///
/// # Errors
///
/// Returns an error when the platform helper executable fails
/// validation.
pub fn new_vmware_services(services_path: &str) -> Result<Arc<dyn VmwareServices>> {
    platform::build(services_path)
}

#[cfg(target_os = "macos")]
mod platform {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::process::{Child, Command};
    use tokio::sync::Mutex;

    use crate::error::{Result, ServiceError};
    use super::VmwareServices;

    /// Keeps the "Open VMware Fusion Services" helper alive while a
    /// configuration operation runs, then tears it down.
    pub struct FusionServices {
        exe_path: String,
        child: Mutex<Option<Child>>,
    }

    pub fn build(services_path: &str) -> Result<Arc<dyn VmwareServices>> {
        if !services_path.is_empty()
            && !vmgate_utility::ownership::root_owned(services_path, true)
        {
            return Err(ServiceError::InvalidExecutable(
                "failed to locate valid vmware services executable".to_string(),
            ));
        }
        Ok(Arc::new(FusionServices {
            exe_path: services_path.to_string(),
            child: Mutex::new(None),
        }))
    }

    #[async_trait]
    impl VmwareServices for FusionServices {
        async fn open(&self) {
            if self.exe_path.is_empty() {
                return;
            }
            tracing::trace!("starting vmware fusion services");
            match Command::new(&self.exe_path).spawn() {
                Ok(child) => {
                    *self.child.lock().await = Some(child);
                    // The helper needs a moment before the vendor tools
                    // observe the services as open.
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                Err(err) => {
                    tracing::warn!(error = %err,
                        "failure during vmware fusion services startup");
                }
            }
        }

        async fn close(&self) {
            let Some(mut child) = self.child.lock().await.take() else {
                return;
            };
            if let Some(pid) = child.id() {
                let pid = nix::unistd::Pid::from_raw(pid as i32);
                if nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM).is_ok() {
                    tracing::trace!("stopped vmware fusion services with TERM");
                } else if child.start_kill().is_ok() {
                    tracing::trace!("stopped vmware fusion services with KILL");
                }
            }
            let _ = child.wait().await;
            tracing::trace!("finished vmware fusion services");
        }
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::collections::HashMap;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::error::Result;
    use super::VmwareServices;

    #[derive(Debug, Clone, Copy)]
    struct DeviceConfig {
        mode: u32,
        uid: u32,
        gid: u32,
    }

    /// Workstation resets `/dev/vmnet*` permissions while services are
    /// driven; the previous mode and ownership are captured before an
    /// operation and restored afterwards.
    pub struct WorkstationServices {
        dev_configs: Mutex<HashMap<PathBuf, DeviceConfig>>,
    }

    pub fn build(_services_path: &str) -> Result<Arc<dyn VmwareServices>> {
        Ok(Arc::new(WorkstationServices {
            dev_configs: Mutex::new(HashMap::new()),
        }))
    }

    fn vmnet_devices() -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir("/dev") else {
            return Vec::new();
        };
        entries
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("vmnet"))
            .map(|e| e.path())
            .collect()
    }

    impl WorkstationServices {
        async fn cache_devices(&self) {
            let mut configs = self.dev_configs.lock().await;
            configs.clear();
            for path in vmnet_devices() {
                match std::fs::metadata(&path) {
                    Ok(meta) => {
                        configs.insert(
                            path,
                            DeviceConfig {
                                mode: meta.permissions().mode(),
                                uid: meta.uid(),
                                gid: meta.gid(),
                            },
                        );
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err,
                            "failed to read vmnet device mode, skipping");
                    }
                }
            }
        }
    }

    #[async_trait]
    impl VmwareServices for WorkstationServices {
        async fn open(&self) {
            self.cache_devices().await;
        }

        async fn close(&self) {
            let configs = self.dev_configs.lock().await;
            for (path, config) in configs.iter() {
                if !path.exists() {
                    tracing::debug!(path = %path.display(),
                        "vmnet device no longer exists, skipping");
                    continue;
                }
                if let Err(err) = std::fs::set_permissions(
                    path,
                    std::fs::Permissions::from_mode(config.mode),
                ) {
                    tracing::warn!(path = %path.display(), error = %err,
                        "failed to reset vmnet device mode");
                }
                if let Err(err) = std::os::unix::fs::chown(
                    path,
                    Some(config.uid),
                    Some(config.gid),
                ) {
                    tracing::warn!(path = %path.display(), error = %err,
                        "failed to reset vmnet device ownership");
                }
            }
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::error::Result;
    use super::VmwareServices;

    /// No bracketing is required on Windows; the SCM services are
    /// restarted explicitly where a configuration change demands it.
    pub struct ScmServices;

    pub fn build(_services_path: &str) -> Result<Arc<dyn VmwareServices>> {
        Ok(Arc::new(ScmServices))
    }

    #[async_trait]
    impl VmwareServices for ScmServices {
        async fn open(&self) {}
        async fn close(&self) {}
    }
}
