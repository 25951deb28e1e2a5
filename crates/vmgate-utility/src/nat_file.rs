//! Parser and emitter for a per-device VMware `nat.conf` file.
//!
//! The format is INI-like: `[section]` headers followed by `key = value`
//! entries. Section and entry order is preserved across a rewrite;
//! comments are dropped.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, UtilityError};

/// One `key = value` entry inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatEntry {
    pub key: String,
    pub value: String,
}

impl NatEntry {
    /// Returns true when the entry's key matches `key`.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.key == key
    }
}

/// A named section of the NAT configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NatSection {
    pub name: String,
    pub entries: Vec<NatEntry>,
}

impl NatSection {
    /// Removes the entry at `idx`.
    ///
    /// # Errors
    ///
    /// Returns an error when `idx` is out of range.
    pub fn delete_entry_at(&mut self, idx: usize) -> Result<()> {
        if idx >= self.entries.len() {
            return Err(UtilityError::NotFound(
                "invalid index for entry deletion".to_string(),
            ));
        }
        self.entries.remove(idx);
        Ok(())
    }

    /// Removes the first entry with key `key`.
    ///
    /// # Errors
    ///
    /// Returns an error when no entry matches.
    pub fn delete_entry(&mut self, key: &str) -> Result<()> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.matches(key))
            .ok_or_else(|| UtilityError::NotFound(format!("no NAT entry for key {key}")))?;
        self.entries.remove(idx);
        Ok(())
    }
}

/// In-memory model of a `nat.conf` file.
#[derive(Debug)]
pub struct NatFile {
    path: PathBuf,
    sections: Vec<NatSection>,
}

impl NatFile {
    /// Loads and parses the NAT configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)?;
        let mut sections: Vec<NatSection> = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push(NatSection {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                continue;
            }
            let Some(section) = sections.last_mut() else {
                tracing::trace!(line, "discarding line outside any section");
                continue;
            };
            if let Some((key, value)) = line.split_once('=') {
                section.entries.push(NatEntry {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                });
            } else {
                tracing::trace!(line, "unknown line format");
            }
        }

        Ok(Self { path, sections })
    }

    #[must_use]
    pub fn sections(&self) -> &[NatSection] {
        &self.sections
    }

    /// Returns the section named `name`.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&NatSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Mutable lookup of the section named `name`.
    pub fn section_mut(&mut self, name: &str) -> Option<&mut NatSection> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    /// Writes the configuration back atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns an error when the rewrite fails.
    pub fn save(&self) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix("vmgate-nat")
            .tempfile_in(dir)?;
        set_mode_0644(tmp.path())?;
        for section in &self.sections {
            writeln!(tmp, "[{}]", section.name)?;
            for entry in &section.entries {
                writeln!(tmp, "{} = {}", entry.key, entry.value)?;
            }
        }
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|err| UtilityError::Io(err.error))?;
        tracing::debug!(path = %self.path.display(), "nat.conf written");
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode_0644(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode_0644(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# VMware NAT configuration
[host]
ip = 192.168.57.2
netmask = 255.255.255.0

[incomingtcp]
2222 = 192.168.57.10:22
8080 = 192.168.57.10:80

[incomingudp]
53 = 192.168.57.10:53
";

    #[test]
    fn parse_preserves_section_and_entry_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nat.conf");
        fs::write(&path, SAMPLE).unwrap();
        let nat = NatFile::load(&path).unwrap();

        let names: Vec<_> = nat.sections().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["host", "incomingtcp", "incomingudp"]);
        let tcp = nat.section("incomingtcp").unwrap();
        assert_eq!(tcp.entries[0].key, "2222");
        assert_eq!(tcp.entries[1].key, "8080");
    }

    #[test]
    fn save_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nat.conf");
        fs::write(&path, SAMPLE).unwrap();
        let nat = NatFile::load(&path).unwrap();
        nat.save().unwrap();

        let reloaded = NatFile::load(&path).unwrap();
        assert_eq!(reloaded.sections(), nat.sections());
    }

    #[test]
    fn delete_entry_by_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nat.conf");
        fs::write(&path, SAMPLE).unwrap();
        let mut nat = NatFile::load(&path).unwrap();

        let tcp = nat.section_mut("incomingtcp").unwrap();
        tcp.delete_entry("2222").unwrap();
        assert_eq!(tcp.entries.len(), 1);
        assert!(tcp.delete_entry("2222").is_err());
    }
}
