//! Installation ownership and permission checks.
//!
//! The daemon runs privileged and executes binaries out of the VMware
//! installation, so it refuses to touch anything that is not owned by
//! root or is writable by group/other.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

/// Returns true when `path` is owned by uid 0, not writable by group or
/// other, and (when `need_exec` is set) executable by its owner.
#[must_use]
pub fn root_owned(path: impl AsRef<Path>, need_exec: bool) -> bool {
    let Ok(meta) = std::fs::metadata(path.as_ref()) else {
        return false;
    };
    if meta.uid() != 0 {
        return false;
    }
    let mode = meta.permissions().mode();
    if mode & 0o022 != 0 {
        return false;
    }
    if need_exec && mode & 0o100 == 0 {
        return false;
    }
    true
}

/// Returns true when the process runs with root privileges.
#[must_use]
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Returns the Darwin kernel major version (e.g. 20 for Big Sur).
///
/// On non-macOS platforms this returns `None`.
#[must_use]
pub fn darwin_major() -> Option<u32> {
    #[cfg(target_os = "macos")]
    {
        let uts = nix::sys::utsname::uname().ok()?;
        let release = uts.release().to_str()?;
        release.split('.').next()?.parse().ok()
    }
    #[cfg(not(target_os = "macos"))]
    {
        None
    }
}

/// Returns true on macOS Big Sur or later, where the vendor NAT port
/// forwarding is unavailable and user-space forwarding takes over.
#[must_use]
pub fn is_big_sur_min() -> bool {
    darwin_major().is_some_and(|major| major >= 20)
}

/// Returns true when both paths exist and refer to the same inode.
#[must_use]
pub fn same_file(a: impl AsRef<Path>, b: impl AsRef<Path>) -> bool {
    let (Ok(ma), Ok(mb)) = (std::fs::metadata(a), std::fs::metadata(b)) else {
        return false;
    };
    ma.dev() == mb.dev() && ma.ino() == mb.ino()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn unowned_or_writable_paths_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exe");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o777)).unwrap();
        // Group/other writable fails regardless of owner.
        assert!(!root_owned(&path, false));
        assert!(!root_owned(dir.path().join("missing"), false));
    }

    #[test]
    fn same_file_matches_inode() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        fs::write(&a, "x").unwrap();
        let b = dir.path().join("b");
        fs::hard_link(&a, &b).unwrap();
        assert!(same_file(&a, &b));

        let c = dir.path().join("c");
        fs::write(&c, "x").unwrap();
        assert!(!same_file(&a, &c));
        assert!(!same_file(&a, dir.path().join("missing")));
    }
}
