//! NAT port-forward settings store (`nat.json`).
//!
//! The store mirrors the port forwards pushed into the vendor
//! configuration so descriptions survive vendor rewrites. The on-disk
//! document is `{"fwds": [...]}`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use vmgate_utility::networking_file::PortFwd;

use crate::error::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct NatInfo {
    fwds: Vec<PortFwd>,
}

/// The persistent NAT port-forward set.
#[derive(Debug)]
pub struct NatSettings {
    path: PathBuf,
    info: Mutex<NatInfo>,
}

impl NatSettings {
    /// Loads the store at `path`, creating an empty file when missing.
    /// Unparsable content is renamed to `<path>.invalid` and replaced
    /// with an empty set.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read, or the
    /// initial empty store cannot be written.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let settings = Self {
            path: path.into(),
            info: Mutex::new(NatInfo::default()),
        };
        if settings.path.exists() {
            settings.reload()?;
        } else {
            tracing::debug!(path = %settings.path.display(),
                "nat settings file does not exist, creating");
            settings.save()?;
        }
        Ok(settings)
    }

    /// Returns a snapshot of the current forward set.
    #[must_use]
    pub fn port_fwds(&self) -> Vec<PortFwd> {
        self.info.lock().expect("nat settings poisoned").fwds.clone()
    }

    /// Drops every forward from the in-memory set.
    pub fn clear(&self) {
        self.info.lock().expect("nat settings poisoned").fwds.clear();
    }

    /// Adds a forward, replacing any entry with the same
    /// `(host_port, protocol)` key.
    pub fn add(&self, fwd: PortFwd) {
        let mut info = self.info.lock().expect("nat settings poisoned");
        if let Some(idx) = info
            .fwds
            .iter()
            .position(|f| f.host_port == fwd.host_port && f.protocol == fwd.protocol)
        {
            tracing::warn!(host_port = fwd.host_port, protocol = %fwd.protocol,
                "port forward addition conflict, replacing existing entry");
            info.fwds.remove(idx);
        }
        info.fwds.push(fwd);
    }

    /// Adds each forward in order.
    pub fn multi_add(&self, fwds: Vec<PortFwd>) {
        for fwd in fwds {
            self.add(fwd);
        }
    }

    /// Removes the forward matching on `(host_port, protocol)`. Unknown
    /// keys are a noop.
    pub fn remove(&self, fwd: &PortFwd) {
        let mut info = self.info.lock().expect("nat settings poisoned");
        if let Some(idx) = info
            .fwds
            .iter()
            .position(|f| f.host_port == fwd.host_port && f.protocol == fwd.protocol)
        {
            info.fwds.remove(idx);
        } else {
            tracing::trace!(host_port = fwd.host_port, protocol = %fwd.protocol,
                "port forward removal not found, noop");
        }
    }

    /// Re-reads the store from disk. A missing file clears the set;
    /// unparsable content is quarantined to `<path>.invalid`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or the quarantine
    /// rename fails.
    pub fn reload(&self) -> Result<()> {
        let mut info = self.info.lock().expect("nat settings poisoned");
        if !self.path.exists() {
            tracing::debug!("no nat settings file to reload, clearing");
            *info = NatInfo::default();
            return Ok(());
        }
        let data = fs::read(&self.path)?;
        match serde_json::from_slice::<NatInfo>(&data) {
            Ok(parsed) => {
                *info = parsed;
                Ok(())
            }
            Err(err) => {
                let invalid = invalid_path(&self.path);
                tracing::error!(error = %err, "failed to parse nat settings");
                fs::rename(&self.path, &invalid)?;
                tracing::warn!(invalid_path = %invalid.display(),
                    "moved invalid nat settings file, clearing");
                *info = NatInfo::default();
                Ok(())
            }
        }
    }

    /// Persists the store atomically (temp file + rename), creating the
    /// parent directory on demand.
    ///
    /// # Errors
    ///
    /// Returns an error when the rewrite fails. The in-memory set keeps
    /// any prior mutation either way.
    pub fn save(&self) -> Result<()> {
        let info = self.info.lock().expect("nat settings poisoned");
        write_json(&self.path, &*info)?;
        tracing::debug!("nat settings saved");
        Ok(())
    }
}

/// Serializes `value` to `path` via a temp file in the same directory.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    let data = serde_json::to_vec_pretty(value)?;
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    fs::write(tmp.path(), &data)?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

pub(crate) fn invalid_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".invalid");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fwd(host_port: u16, protocol: &str, guest_ip: &str) -> PortFwd {
        PortFwd {
            enable: true,
            slot: 8,
            protocol: protocol.to_string(),
            host_port,
            guest_ip: guest_ip.to_string(),
            guest_port: 22,
            description: "vagrant: /tmp/a.vmx".to_string(),
        }
    }

    #[test]
    fn load_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nat.json");
        let settings = NatSettings::load(&path).unwrap();
        assert!(path.exists());
        assert!(settings.port_fwds().is_empty());
    }

    #[test]
    fn add_replaces_colliding_key() {
        let dir = TempDir::new().unwrap();
        let settings = NatSettings::load(dir.path().join("nat.json")).unwrap();
        settings.add(fwd(2222, "tcp", "192.168.57.10"));
        settings.add(fwd(2222, "udp", "192.168.57.10"));
        settings.add(fwd(2222, "tcp", "192.168.57.11"));

        let fwds = settings.port_fwds();
        assert_eq!(fwds.len(), 2);
        let tcp = fwds.iter().find(|f| f.protocol == "tcp").unwrap();
        assert_eq!(tcp.guest_ip, "192.168.57.11");
    }

    #[test]
    fn remove_is_noop_for_unknown() {
        let dir = TempDir::new().unwrap();
        let settings = NatSettings::load(dir.path().join("nat.json")).unwrap();
        settings.add(fwd(2222, "tcp", "192.168.57.10"));
        settings.remove(&fwd(9999, "tcp", "192.168.57.10"));
        assert_eq!(settings.port_fwds().len(), 1);
        settings.remove(&fwd(2222, "tcp", "ignored"));
        assert!(settings.port_fwds().is_empty());
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nat.json");
        let settings = NatSettings::load(&path).unwrap();
        settings.add(fwd(2222, "tcp", "192.168.57.10"));
        settings.save().unwrap();

        let reloaded = NatSettings::load(&path).unwrap();
        assert_eq!(reloaded.port_fwds(), settings.port_fwds());
    }

    #[test]
    fn invalid_content_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nat.json");
        fs::write(&path, "{not json").unwrap();

        let settings = NatSettings::load(&path).unwrap();
        assert!(settings.port_fwds().is_empty());
        assert!(dir.path().join("nat.json.invalid").exists());
    }
}
