//! Internal port-forward settings store (`portforwarding.json`).
//!
//! Records the forwards served by the in-process user-space relay. The
//! on-disk document is `{"forwards": [...]}`.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::nat::{invalid_path, write_json};

/// One endpoint of a relay leg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
    /// Transport protocol, `tcp` or `udp`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Address {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, kind: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            kind: kind.into(),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A persisted user-space forward: host listener leg and guest target
/// leg, both carrying the same protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forward {
    pub host: Address,
    pub guest: Address,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ForwardInfo {
    forwards: Vec<Forward>,
}

/// The persistent internal-forward set.
#[derive(Debug)]
pub struct PortForwardingSettings {
    path: PathBuf,
    info: Mutex<ForwardInfo>,
}

impl PortForwardingSettings {
    /// Loads the store at `path`, creating an empty file when missing
    /// and quarantining unparsable content to `<path>.invalid`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read, or the
    /// initial empty store cannot be written.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let settings = Self {
            path: path.into(),
            info: Mutex::new(ForwardInfo::default()),
        };
        if settings.path.exists() {
            settings.reload()?;
        } else {
            tracing::debug!(path = %settings.path.display(),
                "port forwarding settings file does not exist, creating");
            settings.save()?;
        }
        Ok(settings)
    }

    /// Returns a snapshot of the persisted forwards.
    #[must_use]
    pub fn forwards(&self) -> Vec<Forward> {
        self.info
            .lock()
            .expect("forward settings poisoned")
            .forwards
            .clone()
    }

    /// Adds a forward and persists. Exact duplicates are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error when persistence fails; the in-memory set keeps
    /// the addition.
    pub fn add(&self, fwd: Forward) -> Result<()> {
        {
            let mut info = self.info.lock().expect("forward settings poisoned");
            if info.forwards.iter().any(|f| f == &fwd) {
                tracing::warn!(host = %fwd.host, "port forward already exists");
            } else {
                info.forwards.push(fwd);
            }
        }
        self.save()
    }

    /// Removes a forward and persists. Unknown forwards are a noop.
    ///
    /// # Errors
    ///
    /// Returns an error when persistence fails.
    pub fn delete(&self, fwd: &Forward) -> Result<()> {
        {
            let mut info = self.info.lock().expect("forward settings poisoned");
            info.forwards.retain(|f| f != fwd);
        }
        self.save()
    }

    /// Re-reads the store from disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or the quarantine
    /// rename fails.
    pub fn reload(&self) -> Result<()> {
        let mut info = self.info.lock().expect("forward settings poisoned");
        if !self.path.exists() {
            *info = ForwardInfo::default();
            return Ok(());
        }
        let data = fs::read(&self.path)?;
        match serde_json::from_slice::<ForwardInfo>(&data) {
            Ok(parsed) => {
                *info = parsed;
                Ok(())
            }
            Err(err) => {
                let invalid = invalid_path(&self.path);
                tracing::error!(error = %err, "failed to parse port forwarding settings");
                fs::rename(&self.path, &invalid)?;
                tracing::warn!(invalid_path = %invalid.display(),
                    "moved invalid port forwarding settings file, clearing");
                *info = ForwardInfo::default();
                Ok(())
            }
        }
    }

    /// Persists the store atomically.
    ///
    /// # Errors
    ///
    /// Returns an error when the rewrite fails.
    pub fn save(&self) -> Result<()> {
        let info = self.info.lock().expect("forward settings poisoned");
        write_json(&self.path, &*info)?;
        tracing::debug!("port forwarding settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn forward(port: u16) -> Forward {
        Forward {
            host: Address::new("0.0.0.0", port, "tcp"),
            guest: Address::new("192.168.57.10", 22, "tcp"),
            description: "vagrant: /tmp/a.vmx".to_string(),
        }
    }

    #[test]
    fn add_persists_and_deduplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portforwarding.json");
        let settings = PortForwardingSettings::load(&path).unwrap();

        settings.add(forward(2222)).unwrap();
        settings.add(forward(2222)).unwrap();
        assert_eq!(settings.forwards().len(), 1);

        let reloaded = PortForwardingSettings::load(&path).unwrap();
        assert_eq!(reloaded.forwards(), settings.forwards());
    }

    #[test]
    fn delete_removes_matching_forward() {
        let dir = TempDir::new().unwrap();
        let settings =
            PortForwardingSettings::load(dir.path().join("portforwarding.json")).unwrap();
        settings.add(forward(2222)).unwrap();
        settings.add(forward(8080)).unwrap();

        settings.delete(&forward(2222)).unwrap();
        let forwards = settings.forwards();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].host.port, 8080);

        // Unknown forward removal is a noop.
        settings.delete(&forward(2222)).unwrap();
        assert_eq!(settings.forwards().len(), 1);
    }

    #[test]
    fn invalid_content_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portforwarding.json");
        fs::write(&path, "[]").unwrap();

        let settings = PortForwardingSettings::load(&path).unwrap();
        assert!(settings.forwards().is_empty());
        assert!(dir.path().join("portforwarding.json.invalid").exists());
    }
}
