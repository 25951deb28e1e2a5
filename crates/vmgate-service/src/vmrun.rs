//! Wrapper over the vendor `vmrun` tool.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use vmgate_utility::process::execute_with_output;

use crate::error::{Result, ServiceError};

/// Running-VM enumeration.
#[async_trait]
pub trait Vmrun: Send + Sync {
    /// Returns the VMX paths of currently running VMs. Paths that no
    /// longer exist on disk are dropped.
    async fn running_vms(&self) -> Result<Vec<String>>;
}

/// CLI-backed implementation of [`Vmrun`].
pub struct VmrunExe {
    exe_path: String,
}

impl VmrunExe {
    /// Builds the wrapper, validating the executable.
    ///
    /// # Errors
    ///
    /// Returns an error when the executable is missing or not
    /// root-owned.
    pub fn new(exe_path: &str) -> Result<Arc<dyn Vmrun>> {
        #[cfg(unix)]
        if !vmgate_utility::ownership::root_owned(exe_path, true) {
            return Err(ServiceError::InvalidExecutable(
                "failed to locate valid vmrun executable".to_string(),
            ));
        }
        Ok(Arc::new(Self {
            exe_path: exe_path.to_string(),
        }))
    }
}

#[async_trait]
impl Vmrun for VmrunExe {
    async fn running_vms(&self) -> Result<Vec<String>> {
        let out = execute_with_output(Command::new(&self.exe_path).arg("list")).await;
        if !out.success() {
            tracing::debug!(exit_code = out.exit_code, output = %out.output,
                "vmrun list failed");
            return Err(ServiceError::Vendor("failed to list running VMs".to_string()));
        }
        Ok(out
            .output
            .lines()
            .map(str::trim)
            .filter(|line| vmgate_utility::file_exists(line))
            .map(str::to_string)
            .collect())
    }
}
