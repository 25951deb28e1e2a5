//! Base directory resolution for vmgate's own state.
//!
//! Installed packages land in a fixed location. When the binary is run
//! from somewhere else (development checkouts, tests) state is kept next
//! to the executable instead.

use std::path::PathBuf;

#[cfg(unix)]
const INSTALL_DIR: &str = "/opt/vmgate";
#[cfg(windows)]
const INSTALL_DIR: &str = r"C:\ProgramData\vmgate";

/// Returns the base directory used for vmgate state.
#[must_use]
pub fn install_directory() -> PathBuf {
    let idir = PathBuf::from(INSTALL_DIR);
    if let Ok(exe) = std::env::current_exe() {
        if !exe.starts_with(&idir) {
            if let Some(dir) = exe.parent() {
                return dir.to_path_buf();
            }
        }
    }
    idir
}

/// Returns the state subdirectory for `thing` (e.g. `settings`,
/// `certificates`).
#[must_use]
pub fn directory_for(thing: &str) -> PathBuf {
    install_directory().join(thing)
}
