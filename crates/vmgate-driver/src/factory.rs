//! Driver selection.
//!
//! Picks a concrete driver from the platform and the detected product:
//! Windows uses the advanced driver, macOS uses simple below Fusion 10
//! and advanced otherwise (experimental builds count as current), and
//! everything else uses simple. Professional editions are then upgraded
//! to the remote (vmrest) driver when the vendor REST process proves
//! usable, keeping the original driver as the wrapped fallback.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use vmgate_service::vnetlib::VnetlibCli;

use crate::advanced::AdvancedDriver;
use crate::base::BaseDriver;
use crate::error::Result;
use crate::simple::SimpleDriver;
use crate::vmrest::{Vmrest, VmrestDriver};
use crate::Driver;

/// Fusion major version where the advanced driver becomes usable.
#[cfg(target_os = "macos")]
const FUSION_ADVANCED_MAJOR_MIN: u32 = 10;

/// Driver construction options.
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Requested driver: `simple`, `advanced` or `vmrest`; anything
    /// else selects automatically.
    pub driver: Option<String>,
    /// License edition override (`standard` or `professional`).
    pub license_override: Option<String>,
    /// Force the internal user-space forwarding engine.
    pub internal_port_forwarding: bool,
}

/// Builds the driver for this host.
///
/// # Errors
///
/// Returns an error when the product cannot be probed or the selected
/// driver cannot be constructed.
pub async fn create_driver(
    options: &DriverOptions,
    cancel: CancellationToken,
) -> Result<Box<dyn Driver>> {
    let base = Arc::new(BaseDriver::new(options.license_override.as_deref()).await?);

    let mut attempt_vmrest = true;
    let mut driver: Box<dyn Driver> = match options.driver.as_deref() {
        Some("simple") => {
            tracing::warn!("creating simple driver via user request");
            attempt_vmrest = false;
            Box::new(SimpleDriver::new(Arc::clone(&base)))
        }
        Some("advanced") => {
            tracing::warn!("creating advanced driver via user request");
            attempt_vmrest = false;
            advanced_driver(Arc::clone(&base))?
        }
        other => {
            if let Some(name) = other {
                if !name.is_empty() && name != "vmrest" {
                    tracing::warn!(name, "unknown driver name provided, detecting driver");
                }
            }
            platform_driver(Arc::clone(&base))?
        }
    };

    if attempt_vmrest {
        tracing::info!("attempting to upgrade to vmrest driver");
        driver = upgrade_to_vmrest(Arc::clone(&base), driver, cancel).await;
    }

    if options.internal_port_forwarding || platform_requires_internal_forwarding() {
        tracing::info!("enabling internal port forwarding service");
        driver.enable_internal_port_forwarding().await?;
    }

    Ok(driver)
}

/// Selects the platform-appropriate non-remote driver.
fn platform_driver(base: Arc<BaseDriver>) -> Result<Box<dyn Driver>> {
    #[cfg(windows)]
    {
        tracing::debug!("creating new advanced driver");
        advanced_driver(base)
    }
    #[cfg(target_os = "macos")]
    {
        // Fusion below 10 rewrites the networking file in ways only
        // the simple driver copes with; experimental builds always
        // take the advanced path.
        let info = base.info();
        if info.version != "e.x.p" {
            match info.major_version() {
                Some(major) if major < FUSION_ADVANCED_MAJOR_MIN => {
                    tracing::debug!(major, required_minimum = FUSION_ADVANCED_MAJOR_MIN,
                        "using simple driver due to fusion version");
                    return Ok(Box::new(SimpleDriver::new(base)));
                }
                Some(_) => {}
                None => {
                    tracing::warn!(version = %info.version,
                        "failed to determine major version, using simple driver");
                    return Ok(Box::new(SimpleDriver::new(base)));
                }
            }
        }
        tracing::debug!("creating new advanced driver");
        advanced_driver(base)
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        tracing::debug!("creating new simple driver");
        Ok(Box::new(SimpleDriver::new(base)))
    }
}

fn advanced_driver(base: Arc<BaseDriver>) -> Result<Box<dyn Driver>> {
    let vnetlib = VnetlibCli::new(
        &base.vmware_paths().vnetlib,
        Arc::clone(base.services()),
    )?;
    Ok(Box::new(AdvancedDriver::new(base, vnetlib)))
}

/// Wraps `fallback` in the remote driver when the edition allows it
/// and a live vmnet listing over the REST surface succeeds. Any
/// failure keeps the fallback.
async fn upgrade_to_vmrest(
    base: Arc<BaseDriver>,
    fallback: Box<dyn Driver>,
    cancel: CancellationToken,
) -> Box<dyn Driver> {
    if base.info().is_standard() {
        tracing::warn!("standard vmware license detected, using fallback");
        return fallback;
    }
    tracing::debug!("attempting to setup vmrest");
    let vmrest = match Vmrest::new(&base.vmware_paths().vmrest, cancel).await {
        Ok(vmrest) => vmrest,
        Err(err) => {
            tracing::warn!(error = %err, "failed to create vmrest driver");
            tracing::info!("using fallback driver");
            return fallback;
        }
    };
    let driver = VmrestDriver::from_parts(base, fallback, vmrest);

    // License detection is not always correct, so confirm networking
    // functionality is actually reachable through the vmrest process.
    tracing::debug!("validating that vmrest service provides networking functionality");
    match driver.vmnets().await {
        Ok(_) => {
            tracing::debug!(status = "valid", "validation of vmrest service is complete");
            Box::new(driver)
        }
        Err(err) => {
            tracing::error!(status = "invalid", error = %err,
                "vmrest driver failed to access networking functions, using fallback");
            driver.into_fallback()
        }
    }
}

/// Big Sur and later lost vendor NAT forwarding, so the internal
/// engine is mandatory there.
fn platform_requires_internal_forwarding() -> bool {
    #[cfg(unix)]
    {
        vmgate_utility::ownership::is_big_sur_min()
    }
    #[cfg(windows)]
    {
        false
    }
}
