//! Parser and emitter for the VMware `networking` configuration file.
//!
//! The file is line oriented. Three directive families matter here:
//!
//! ```text
//! answer VNET_<N>_<KEY> <VALUE>
//! add_nat_portfwd <slot> <proto> <host_port> <guest_ip> <guest_port> <description>
//! remove_nat_portfwd <slot> <proto> <host_port> <guest_ip> <guest_port> <description>
//! add_dhcp_mac_to_ip <slot> <mac> <ip>
//! ```
//!
//! Directives are matched case-insensitively and unknown lines are
//! ignored. Rewrites are atomic: a 0644 temp file in the target
//! directory is populated and renamed over the original.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, UtilityError};

/// A host virtual network adapter parsed from the `networking` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub slot: u32,
    pub dhcp: bool,
    pub nat: bool,
    pub hostonly_netmask: String,
    pub hostonly_subnet: String,
    pub virtual_adapter: bool,
}

/// A NAT port forward directive.
///
/// `enable` distinguishes `add_nat_portfwd` from `remove_nat_portfwd`
/// lines; disabled entries are kept so the vendor tooling removes the
/// forward on the next configure pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortFwd {
    #[serde(default)]
    pub enable: bool,
    pub slot: u32,
    pub protocol: String,
    pub host_port: u16,
    pub guest_ip: String,
    pub guest_port: u16,
    #[serde(default)]
    pub description: String,
}

/// A static DHCP MAC to IP reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpReservation {
    pub slot: u32,
    pub mac: String,
    pub address: String,
}

/// In-memory model of a `networking` file.
#[derive(Debug)]
pub struct NetworkingFile {
    path: PathBuf,
    devices: Vec<Device>,
    reservations: Vec<DhcpReservation>,
    port_fwds: Vec<PortFwd>,
}

impl NetworkingFile {
    /// Loads and parses the networking file at `path`. A missing file is
    /// treated as an empty configuration, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut file = Self {
            path: path.into(),
            devices: Vec::new(),
            reservations: Vec::new(),
            port_fwds: Vec::new(),
        };
        file.reload()?;
        Ok(file)
    }

    /// Re-reads the backing file, replacing the in-memory state.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read.
    pub fn reload(&mut self) -> Result<()> {
        self.devices.clear();
        self.reservations.clear();
        self.port_fwds.clear();

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err,
                    "networking file missing, starting empty");
                return Ok(());
            }
        };

        // Adapter answers are grouped per slot before devices are built,
        // keyed slot -> key -> value.
        let mut adapters: BTreeMap<u32, BTreeMap<String, String>> = BTreeMap::new();

        for line in content.lines() {
            let line = line.trim();
            if let Some((slot, key, value)) = parse_answer(line) {
                adapters.entry(slot).or_default().insert(key, value);
            } else if let Some(fwd) = parse_portfwd(line) {
                self.port_fwds.push(fwd);
            } else if let Some(res) = parse_reservation(line) {
                self.reservations.push(res);
            }
        }

        for (slot, answers) in adapters {
            if answers.get("VIRTUAL_ADAPTER").map(String::as_str) != Some("yes") {
                continue;
            }
            self.devices.push(Device {
                name: format!("vmnet{slot}"),
                slot,
                dhcp: answers.get("DHCP").map(String::as_str) == Some("yes"),
                nat: answers.get("NAT").map(String::as_str) == Some("yes"),
                hostonly_netmask: answers.get("HOSTONLY_NETMASK").cloned().unwrap_or_default(),
                hostonly_subnet: answers.get("HOSTONLY_SUBNET").cloned().unwrap_or_default(),
                virtual_adapter: true,
            });
        }

        tracing::debug!(path = %self.path.display(), devices = self.devices.len(),
            port_fwds = self.port_fwds.len(), reservations = self.reservations.len(),
            "networking file loaded");
        Ok(())
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    #[must_use]
    pub fn port_fwds(&self) -> &[PortFwd] {
        &self.port_fwds
    }

    #[must_use]
    pub fn reservations(&self) -> &[DhcpReservation] {
        &self.reservations
    }

    /// Finds a device by name.
    #[must_use]
    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Finds a device by slot number.
    #[must_use]
    pub fn device_by_slot(&self, slot: u32) -> Option<&Device> {
        self.devices.iter().find(|d| d.slot == slot)
    }

    /// Mutable lookup by name.
    pub fn device_by_name_mut(&mut self, name: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.name == name)
    }

    /// Creates a new virtual adapter in the lowest unused slot (>= 1).
    /// Host-only parameters are applied when both are provided.
    pub fn create_device(&mut self, netmask: Option<&str>, subnet: Option<&str>) -> &Device {
        let mut slot = 1;
        let mut used: Vec<u32> = self.devices.iter().map(|d| d.slot).collect();
        used.sort_unstable();
        for u in used {
            if u > slot {
                break;
            }
            slot += 1;
        }
        let mut device = Device {
            name: format!("vmnet{slot}"),
            slot,
            dhcp: true,
            virtual_adapter: true,
            ..Device::default()
        };
        if let (Some(mask), Some(subnet)) = (netmask, subnet) {
            device.hostonly_netmask = mask.to_string();
            device.hostonly_subnet = subnet.to_string();
        }
        tracing::debug!(name = %device.name, slot, "create device");
        self.devices.push(device);
        self.devices.last().expect("device just pushed")
    }

    /// Removes the device with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`UtilityError::NotFound`] when no device matches.
    pub fn remove_device_by_name(&mut self, name: &str) -> Result<()> {
        let idx = self
            .devices
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| UtilityError::NotFound(format!("no device named {name}")))?;
        self.devices.remove(idx);
        Ok(())
    }

    /// Removes the device in the given slot.
    ///
    /// # Errors
    ///
    /// Returns [`UtilityError::NotFound`] when no device matches.
    pub fn remove_device_by_slot(&mut self, slot: u32) -> Result<()> {
        let idx = self
            .devices
            .iter()
            .position(|d| d.slot == slot)
            .ok_or_else(|| UtilityError::NotFound(format!("no device in slot {slot}")))?;
        self.devices.remove(idx);
        Ok(())
    }

    /// Returns the enabled-or-disabled forward keyed by host port and
    /// protocol, if present.
    #[must_use]
    pub fn host_port_fwd(&self, host_port: u16, protocol: &str) -> Option<&PortFwd> {
        self.port_fwds
            .iter()
            .find(|f| f.host_port == host_port && f.protocol == protocol)
    }

    /// Adds a port forward. An existing entry with the same
    /// `(host_port, protocol)` key is replaced, leaving a single entry
    /// carrying the new guest target and description.
    pub fn add_port_fwd(&mut self, mut fwd: PortFwd) {
        if let Some(idx) = self
            .port_fwds
            .iter()
            .position(|f| f.host_port == fwd.host_port && f.protocol == fwd.protocol)
        {
            tracing::debug!(host_port = fwd.host_port, protocol = %fwd.protocol,
                "replacing existing port forward entry");
            self.port_fwds.remove(idx);
        }
        tracing::debug!(host_port = fwd.host_port, guest_ip = %fwd.guest_ip,
            guest_port = fwd.guest_port, "add port forward");
        fwd.enable = true;
        self.port_fwds.push(fwd);
    }

    /// Marks a port forward as removed. When the key is unknown a
    /// disabled entry is recorded so the vendor tooling drops the
    /// forward on the next configure pass.
    pub fn remove_port_fwd(&mut self, mut fwd: PortFwd) {
        tracing::debug!(host_port = fwd.host_port, guest_ip = %fwd.guest_ip,
            guest_port = fwd.guest_port, "remove port forward");
        match self
            .port_fwds
            .iter_mut()
            .find(|f| f.host_port == fwd.host_port && f.protocol == fwd.protocol)
        {
            Some(existing) => existing.enable = false,
            None => {
                fwd.enable = false;
                self.port_fwds.push(fwd);
            }
        }
    }

    /// Adds a DHCP reservation, replacing any existing entry for the
    /// same `(slot, mac)` pair. MAC comparison is case-insensitive.
    pub fn add_dhcp_reservation(&mut self, slot: u32, mac: &str, address: &str) {
        let new = DhcpReservation {
            slot,
            mac: mac.to_string(),
            address: address.to_string(),
        };
        match self
            .reservations
            .iter_mut()
            .find(|r| r.slot == slot && r.mac.eq_ignore_ascii_case(mac))
        {
            Some(existing) => *existing = new,
            None => self.reservations.push(new),
        }
    }

    /// Looks up a DHCP reservation by slot and MAC (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`UtilityError::NotFound`] when no reservation matches.
    pub fn lookup_dhcp_reservation(&self, slot: u32, mac: &str) -> Result<String> {
        self.reservations
            .iter()
            .find(|r| r.slot == slot && r.mac.eq_ignore_ascii_case(mac))
            .map(|r| r.address.clone())
            .ok_or_else(|| UtilityError::NotFound(format!("No entry found for MAC {mac}")))
    }

    /// Copies descriptions from `fwds` onto matching local entries. A
    /// match requires host port, protocol, slot, guest ip, guest port
    /// and the incoming entry to be enabled.
    pub fn merge_fwds(&mut self, fwds: &[PortFwd]) {
        for incoming in fwds {
            for existing in &mut self.port_fwds {
                if incoming.host_port == existing.host_port
                    && incoming.protocol == existing.protocol
                    && incoming.slot == existing.slot
                    && incoming.guest_ip == existing.guest_ip
                    && incoming.guest_port == existing.guest_port
                    && incoming.enable
                {
                    existing.description = incoming.description.clone();
                }
            }
        }
    }

    /// Merges another networking file's port forwards into this one.
    /// Enabled local entries matching on host port and protocol take the
    /// remote description, slot and guest fields. Used on platforms
    /// where the vendor rewrites the file and loses our metadata.
    pub fn merge(&mut self, other: &NetworkingFile) {
        for local in &mut self.port_fwds {
            if !local.enable {
                continue;
            }
            for remote in &other.port_fwds {
                if local.host_port == remote.host_port && local.protocol == remote.protocol {
                    local.description = remote.description.clone();
                    local.slot = remote.slot;
                    local.guest_ip = remote.guest_ip.clone();
                    local.guest_port = remote.guest_port;
                }
            }
        }
    }

    /// Writes the current state back to the configured path. The write
    /// is atomic: content goes to a 0644 temp file in the same
    /// directory which is then renamed over the target.
    ///
    /// # Errors
    ///
    /// Returns an error when the temp file cannot be created, written,
    /// or renamed.
    pub fn save(&self) -> Result<PathBuf> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix("vmgate-networking")
            .tempfile_in(dir)?;
        set_mode_0644(tmp.path())?;

        tmp.write_all(b"VERSION=1,0\n")?;
        for device in &self.devices {
            let yes_no = |b: bool| if b { "yes" } else { "no" };
            writeln!(tmp, "answer VNET_{}_DHCP {}", device.slot, yes_no(device.dhcp))?;
            writeln!(tmp, "answer VNET_{}_NAT {}", device.slot, yes_no(device.nat))?;
            if !device.hostonly_netmask.is_empty() {
                writeln!(
                    tmp,
                    "answer VNET_{}_HOSTONLY_NETMASK {}",
                    device.slot, device.hostonly_netmask
                )?;
            }
            if !device.hostonly_subnet.is_empty() {
                writeln!(
                    tmp,
                    "answer VNET_{}_HOSTONLY_SUBNET {}",
                    device.slot, device.hostonly_subnet
                )?;
            }
            writeln!(
                tmp,
                "answer VNET_{}_VIRTUAL_ADAPTER {}",
                device.slot,
                yes_no(device.virtual_adapter)
            )?;
        }
        for fwd in &self.port_fwds {
            let action = if fwd.enable { "add" } else { "remove" };
            writeln!(
                tmp,
                "{}_nat_portfwd {} {} {} {} {} {}",
                action,
                fwd.slot,
                fwd.protocol,
                fwd.host_port,
                fwd.guest_ip,
                fwd.guest_port,
                fwd.description
            )?;
        }
        for res in &self.reservations {
            writeln!(tmp, "add_dhcp_mac_to_ip {} {} {}", res.slot, res.mac, res.address)?;
        }
        tmp.flush()?;

        tmp.persist(&self.path)
            .map_err(|err| UtilityError::Io(err.error))?;
        tracing::debug!(path = %self.path.display(), "networking file written");
        Ok(self.path.clone())
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

/// Parses an `answer VNET_<N>_<KEY> <VALUE>` line.
fn parse_answer(line: &str) -> Option<(u32, String, String)> {
    let mut parts = line.split_whitespace();
    if !parts.next()?.eq_ignore_ascii_case("answer") {
        return None;
    }
    let key = parts.next()?;
    let value = parts.collect::<Vec<_>>().join(" ");
    let rest = key
        .strip_prefix("VNET_")
        .or_else(|| key.strip_prefix("vnet_"))?;
    let (slot, key) = rest.split_once('_')?;
    let slot: u32 = slot.parse().ok()?;
    if value.is_empty() {
        return None;
    }
    Some((slot, key.to_ascii_uppercase(), value))
}

/// Parses an `add_nat_portfwd`/`remove_nat_portfwd` line.
fn parse_portfwd(line: &str) -> Option<PortFwd> {
    let mut parts = line.split_whitespace();
    let directive = parts.next()?;
    let enable = if directive.eq_ignore_ascii_case("add_nat_portfwd") {
        true
    } else if directive.eq_ignore_ascii_case("remove_nat_portfwd") {
        false
    } else {
        return None;
    };
    let slot: u32 = parts.next()?.parse().ok()?;
    let protocol = parts.next()?.to_ascii_lowercase();
    if protocol != "tcp" && protocol != "udp" {
        return None;
    }
    let host_port: u16 = parts.next()?.parse().ok()?;
    let guest_ip = parts.next()?.to_string();
    let guest_port: u16 = parts.next()?.parse().ok()?;
    let description = parts.collect::<Vec<_>>().join(" ");
    Some(PortFwd {
        enable,
        slot,
        protocol,
        host_port,
        guest_ip,
        guest_port,
        description,
    })
}

/// Parses an `add_dhcp_mac_to_ip <slot> <mac> <ip>` line.
fn parse_reservation(line: &str) -> Option<DhcpReservation> {
    let mut parts = line.split_whitespace();
    if !parts.next()?.eq_ignore_ascii_case("add_dhcp_mac_to_ip") {
        return None;
    }
    let slot: u32 = parts.next()?.parse().ok()?;
    let mac = parts.next()?.to_string();
    let address = parts.next()?.to_string();
    Some(DhcpReservation { slot, mac, address })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
VERSION=1,0
answer VNET_1_DHCP yes
answer VNET_1_HOSTONLY_NETMASK 255.255.255.0
answer VNET_1_HOSTONLY_SUBNET 172.16.10.0
answer VNET_1_NAT no
answer VNET_1_VIRTUAL_ADAPTER yes
answer VNET_8_DHCP yes
answer VNET_8_NAT yes
answer VNET_8_VIRTUAL_ADAPTER yes
answer VNET_9_VIRTUAL_ADAPTER no
add_nat_portfwd 8 tcp 2222 192.168.57.10 22 vagrant: /tmp/a.vmx
remove_nat_portfwd 8 udp 999 192.168.57.11 999
add_dhcp_mac_to_ip 8 00:0c:29:aa:bb:cc 192.168.57.20
";

    fn load_sample(dir: &TempDir) -> NetworkingFile {
        let path = dir.path().join("networking");
        fs::write(&path, SAMPLE).unwrap();
        NetworkingFile::load(path).unwrap()
    }

    #[test]
    fn parses_devices_forwards_and_reservations() {
        let dir = TempDir::new().unwrap();
        let file = load_sample(&dir);

        assert_eq!(file.devices().len(), 2, "slot 9 has VIRTUAL_ADAPTER=no");
        let hostonly = file.device_by_slot(1).unwrap();
        assert!(hostonly.dhcp);
        assert!(!hostonly.nat);
        assert_eq!(hostonly.hostonly_subnet, "172.16.10.0");
        let nat = file.device_by_name("vmnet8").unwrap();
        assert!(nat.nat);

        assert_eq!(file.port_fwds().len(), 2);
        let fwd = file.host_port_fwd(2222, "tcp").unwrap();
        assert!(fwd.enable);
        assert_eq!(fwd.description, "vagrant: /tmp/a.vmx");
        assert!(!file.host_port_fwd(999, "udp").unwrap().enable);

        assert_eq!(file.reservations().len(), 1);
        assert_eq!(
            file.lookup_dhcp_reservation(8, "00:0C:29:AA:BB:CC").unwrap(),
            "192.168.57.20"
        );
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let file = NetworkingFile::load(dir.path().join("absent")).unwrap();
        assert!(file.devices().is_empty());
        assert!(file.port_fwds().is_empty());
    }

    #[test]
    fn save_round_trips() {
        let dir = TempDir::new().unwrap();
        let file = load_sample(&dir);
        file.save().unwrap();

        let reloaded = NetworkingFile::load(file.path()).unwrap();
        assert_eq!(reloaded.devices(), file.devices());
        assert_eq!(reloaded.port_fwds(), file.port_fwds());
        assert_eq!(reloaded.reservations(), file.reservations());
    }

    #[test]
    fn create_device_picks_lowest_free_slot() {
        let dir = TempDir::new().unwrap();
        let mut file = load_sample(&dir);
        // Slots 1 and 8 used; next created device lands in 2, then 3.
        assert_eq!(file.create_device(None, None).slot, 2);
        assert_eq!(file.create_device(None, None).name, "vmnet3");

        let dev = file.create_device(Some("255.255.255.0"), Some("172.16.99.0")).clone();
        assert_eq!(dev.hostonly_subnet, "172.16.99.0");
        assert!(dev.dhcp);
    }

    #[test]
    fn add_port_fwd_replaces_colliding_key() {
        let dir = TempDir::new().unwrap();
        let mut file = load_sample(&dir);
        file.add_port_fwd(PortFwd {
            slot: 8,
            protocol: "tcp".to_string(),
            host_port: 2222,
            guest_ip: "192.168.57.11".to_string(),
            guest_port: 22,
            description: "vagrant: /tmp/b.vmx".to_string(),
            ..PortFwd::default()
        });

        let matches: Vec<_> = file
            .port_fwds()
            .iter()
            .filter(|f| f.host_port == 2222 && f.protocol == "tcp")
            .collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].guest_ip, "192.168.57.11");
        assert!(matches[0].enable);
    }

    #[test]
    fn remove_unknown_port_fwd_records_disabled_entry() {
        let dir = TempDir::new().unwrap();
        let mut file = NetworkingFile::load(dir.path().join("networking")).unwrap();
        file.remove_port_fwd(PortFwd {
            slot: 8,
            protocol: "tcp".to_string(),
            host_port: 8080,
            guest_ip: "192.168.57.5".to_string(),
            guest_port: 80,
            ..PortFwd::default()
        });
        let fwd = file.host_port_fwd(8080, "tcp").unwrap();
        assert!(!fwd.enable);
    }

    #[test]
    fn merge_fwds_copies_description_on_full_match() {
        let dir = TempDir::new().unwrap();
        let mut file = load_sample(&dir);
        file.merge_fwds(&[PortFwd {
            enable: true,
            slot: 8,
            protocol: "tcp".to_string(),
            host_port: 2222,
            guest_ip: "192.168.57.10".to_string(),
            guest_port: 22,
            description: "custom description".to_string(),
        }]);
        assert_eq!(
            file.host_port_fwd(2222, "tcp").unwrap().description,
            "custom description"
        );

        // A partial match (different guest ip) must not merge.
        file.merge_fwds(&[PortFwd {
            enable: true,
            slot: 8,
            protocol: "tcp".to_string(),
            host_port: 2222,
            guest_ip: "10.0.0.1".to_string(),
            guest_port: 22,
            description: "wrong".to_string(),
        }]);
        assert_eq!(
            file.host_port_fwd(2222, "tcp").unwrap().description,
            "custom description"
        );
    }

    #[test]
    fn dhcp_reservation_replaces_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let mut file = load_sample(&dir);
        file.add_dhcp_reservation(8, "00:0C:29:AA:BB:CC", "192.168.57.30");
        assert_eq!(file.reservations().len(), 1);
        assert_eq!(file.reservations()[0].address, "192.168.57.30");
    }
}
