//! DHCP lease database parsing.
//!
//! Two dialects exist. The vendor dhcpd writes ISC-style blocks:
//!
//! ```text
//! lease 192.168.57.10 {
//!     starts 3 2024/01/17 20:01:23;
//!     ends 3 2024/01/17 20:31:23;
//!     hardware ethernet 00:0c:29:aa:bb:cc;
//!     client-hostname "guest";
//! }
//! ```
//!
//! Big Sur's native dhcpd writes flat blocks:
//!
//! ```text
//! {
//!     name=guest
//!     ip_address=192.168.57.10
//!     hw_address=1,0:c:29:aa:bb:cc
//! }
//! ```
//!
//! Dialect selection is by path: anything under `/var` that is not under
//! `/var/db/vmware` is treated as macOS native. Vendor entries outside
//! their `starts`..`ends` window are dropped at load time; MACs are
//! normalized by zero-padding each colon group.

use chrono::{NaiveDateTime, Utc};

use crate::error::{Result, UtilityError};

/// Vendor lease timestamps are UTC in this layout.
const VMWARE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Path prefix of the vendor-managed lease databases on macOS.
const VMWARE_LEASE_FILE_PREFIX: &str = "/var/db/vmware";

/// A single active lease entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpEntry {
    pub address: String,
    pub mac: String,
    pub hostname: String,
    pub created: Option<NaiveDateTime>,
    pub expires: Option<NaiveDateTime>,
}

impl DhcpEntry {
    /// Zero-pads each colon-separated MAC group to two characters.
    pub fn normalize_mac(&mut self) {
        self.mac = normalize_mac(&self.mac);
    }
}

/// Zero-pads each colon group of `mac` and lowercases it.
#[must_use]
pub fn normalize_mac(mac: &str) -> String {
    if mac.is_empty() {
        return String::new();
    }
    mac.split(':')
        .map(|group| {
            if group.len() < 2 {
                format!("0{group}")
            } else {
                group.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(":")
        .to_ascii_lowercase()
}

/// A parsed DHCP lease database.
#[derive(Debug)]
pub struct DhcpLeaseFile {
    path: String,
    entries: Vec<DhcpEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Vmware,
    Macos,
}

fn dialect_for(path: &str) -> Dialect {
    if path.starts_with("/var") && !path.starts_with(VMWARE_LEASE_FILE_PREFIX) {
        Dialect::Macos
    } else {
        Dialect::Vmware
    }
}

impl DhcpLeaseFile {
    /// Loads the lease database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            tracing::warn!(path, error = %err, "failed to load DHCP lease file");
            UtilityError::Io(err)
        })?;
        let dialect = dialect_for(path);
        tracing::debug!(path, ?dialect, "loading DHCP lease file");
        let entries = match dialect {
            Dialect::Vmware => parse_vmware(&content, Utc::now().naive_utc()),
            Dialect::Macos => parse_macos(&content),
        };
        tracing::debug!(path, leases = entries.len(), "loaded active leases");
        Ok(Self {
            path: path.to_string(),
            entries,
        })
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn entries(&self) -> &[DhcpEntry] {
        &self.entries
    }

    /// Finds the leased address for `mac`. Lookup is case-insensitive
    /// and tolerant of missing leading zeros in the query.
    ///
    /// # Errors
    ///
    /// Returns [`UtilityError::NotFound`] when no lease matches.
    pub fn ip_for_mac(&self, mac: &str) -> Result<String> {
        let wanted = normalize_mac(mac);
        self.entries
            .iter()
            .find(|e| e.mac == wanted)
            .map(|e| e.address.clone())
            .ok_or_else(|| UtilityError::NotFound(format!("No entry found for MAC {mac}")))
    }
}

/// Parses vendor dhcpd blocks, keeping only leases active at `now`.
fn parse_vmware(content: &str, now: NaiveDateTime) -> Vec<DhcpEntry> {
    let mut entries = Vec::new();
    let mut current: Option<DhcpEntry> = None;
    let mut starts: Option<NaiveDateTime> = None;
    let mut ends: Option<NaiveDateTime> = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = strip_keyword(line, "lease") {
            let address = rest.split_whitespace().next().unwrap_or_default();
            current = Some(DhcpEntry {
                address: address.to_string(),
                ..DhcpEntry::default()
            });
            starts = None;
            ends = None;
            continue;
        }
        if line.starts_with('}') {
            if let Some(mut entry) = current.take() {
                // Entries carrying a time window are dropped unless the
                // window covers the current time.
                let active = match (starts, ends) {
                    (Some(start), Some(end)) => now >= start && now <= end,
                    _ => true,
                };
                if active {
                    entry.created = starts;
                    entry.expires = ends;
                    entry.normalize_mac();
                    entries.push(entry);
                }
            }
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        let line = line.trim_end_matches(';');
        if let Some(rest) = strip_keyword(line, "starts") {
            starts = parse_lease_time(rest);
        } else if let Some(rest) = strip_keyword(line, "ends") {
            ends = parse_lease_time(rest);
        } else if let Some(rest) = strip_keyword(line, "hardware") {
            if let Some(mac) = strip_keyword(rest, "ethernet") {
                entry.mac = mac.trim().to_string();
            }
        } else if let Some(rest) = strip_keyword(line, "client-hostname") {
            entry.hostname = rest.trim().trim_matches('"').to_string();
        }
    }
    entries
}

/// Parses macOS native dhcpd blocks. No time information is present.
fn parse_macos(content: &str) -> Vec<DhcpEntry> {
    let mut entries = Vec::new();
    let mut current: Option<DhcpEntry> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('{') {
            current = Some(DhcpEntry::default());
            continue;
        }
        if line.starts_with('}') {
            if let Some(mut entry) = current.take() {
                if !entry.address.is_empty() {
                    entry.normalize_mac();
                    entries.push(entry);
                }
            }
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "ip_address" => entry.address = value.trim().to_string(),
                // hw_address carries a leading hardware type: `1,<mac>`.
                "hw_address" => {
                    entry.mac = value
                        .trim()
                        .split_once(',')
                        .map_or(value.trim(), |(_, mac)| mac)
                        .to_string();
                }
                "name" => entry.hostname = value.trim().to_string(),
                _ => {}
            }
        }
    }
    entries
}

/// Strips a leading keyword (followed by whitespace) case-insensitively.
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    if line.len() < keyword.len() || !line[..keyword.len()].eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &line[keyword.len()..];
    if rest.is_empty() || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim_start())
}

/// Parses `"<weekday> <date> <time>"` as found after `starts`/`ends`.
fn parse_lease_time(rest: &str) -> Option<NaiveDateTime> {
    // Leading field is the weekday number; the remainder is the stamp.
    let (_, stamp) = rest.split_once(char::is_whitespace)?;
    NaiveDateTime::parse_from_str(stamp.trim(), VMWARE_TIME_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const VMWARE_SAMPLE: &str = "\
# Generated by vmnet-dhcpd
lease 192.168.57.10 {
    starts 3 2024/01/17 20:01:23;
    ends 3 2024/01/17 20:31:23;
    hardware ethernet 0:c:29:aa:bb:cc;
    client-hostname \"guest-a\";
}
lease 192.168.57.11 {
    hardware ethernet 00:0c:29:dd:ee:ff;
    client-hostname \"guest-b\";
}
";

    const MACOS_SAMPLE: &str = "\
{
    name=guest-c
    ip_address=192.168.57.12
    hw_address=1,0:1:2:3:4:5
    lease=0x65a8e3b7
}
";

    fn stamp(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn vmware_entries_filtered_by_window() {
        let inside = parse_vmware(VMWARE_SAMPLE, stamp(2024, 1, 17, 20, 15, 0));
        assert_eq!(inside.len(), 2);
        assert_eq!(inside[0].address, "192.168.57.10");
        assert_eq!(inside[0].hostname, "guest-a");

        // Outside the window only the timeless entry survives.
        let outside = parse_vmware(VMWARE_SAMPLE, stamp(2024, 1, 18, 0, 0, 0));
        assert_eq!(outside.len(), 1);
        assert_eq!(outside[0].address, "192.168.57.11");
    }

    #[test]
    fn vmware_mac_groups_zero_padded() {
        let entries = parse_vmware(VMWARE_SAMPLE, stamp(2024, 1, 17, 20, 15, 0));
        assert_eq!(entries[0].mac, "00:0c:29:aa:bb:cc");
    }

    #[test]
    fn macos_entries_parse_without_times() {
        let entries = parse_macos(MACOS_SAMPLE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "192.168.57.12");
        assert_eq!(entries[0].mac, "00:01:02:03:04:05");
        assert_eq!(entries[0].hostname, "guest-c");
        assert!(entries[0].created.is_none());
    }

    #[test]
    fn lookup_normalizes_query_mac() {
        let file = DhcpLeaseFile {
            path: String::new(),
            entries: parse_macos(MACOS_SAMPLE),
        };
        assert_eq!(file.ip_for_mac("00:01:02:03:04:05").unwrap(), "192.168.57.12");
        assert_eq!(file.ip_for_mac("0:1:2:3:4:5").unwrap(), "192.168.57.12");
        assert_eq!(file.ip_for_mac("00:01:02:03:04:05".to_uppercase().as_str()).unwrap(), "192.168.57.12");
        assert!(file.ip_for_mac("ff:ff:ff:ff:ff:ff").is_err());
    }

    #[test]
    fn dialect_selected_by_path() {
        assert_eq!(dialect_for("/var/db/dhcpd_leases"), Dialect::Macos);
        assert_eq!(
            dialect_for("/var/db/vmware/vmnet-dhcpd-vmnet8.leases"),
            Dialect::Vmware
        );
        assert_eq!(
            dialect_for("/etc/vmware/vmnet8/dhcpd/dhcpd.leases"),
            Dialect::Vmware
        );
    }
}
