//! Wire and domain types shared by the drivers and the HTTP API.

use serde::{Deserialize, Serialize};

/// Detected VMware product information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmwareInfo {
    pub product: String,
    pub version: String,
    #[serde(default)]
    pub build: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub license: String,
}

impl VmwareInfo {
    /// Returns true for editions providing the professional feature
    /// set.
    ///
    /// Explicit `professional`/`standard` values win. An empty license
    /// (the free Fusion/Workstation license) counts as professional.
    /// Anything else is professional only when the license text names
    /// a pro-grade product.
    #[must_use]
    pub fn is_professional(&self) -> bool {
        match self.license.as_str() {
            "professional" => return true,
            "standard" => return false,
            "" => return true,
            _ => {}
        }
        self.license.contains("pro")
            || self.license.contains("workstation")
            || self.license.contains("ws")
    }

    /// Returns true for standard (non-professional) editions.
    #[must_use]
    pub fn is_standard(&self) -> bool {
        !self.is_professional()
    }

    /// Collapses the license field to `professional` or `standard`.
    pub fn normalize(&mut self) {
        self.license = if self.is_professional() {
            "professional".to_string()
        } else {
            "standard".to_string()
        };
    }

    /// Returns the numeric major version, when the version is not an
    /// experimental build.
    #[must_use]
    pub fn major_version(&self) -> Option<u32> {
        self.version.split('.').next()?.parse().ok()
    }
}

/// A host virtual network device on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vmnet {
    #[serde(default)]
    pub name: String,
    /// `bridged`, `hostOnly` or `nat`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// `yes` or `no`.
    #[serde(default)]
    pub dhcp: String,
    #[serde(default)]
    pub subnet: String,
    #[serde(default)]
    pub mask: String,
}

impl Vmnet {
    /// Returns the numeric slot encoded in the device name.
    #[must_use]
    pub fn slot(&self) -> Option<u32> {
        self.name.strip_prefix("vmnet")?.parse().ok()
    }
}

/// Device list envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vmnets {
    #[serde(default)]
    pub num: usize,
    #[serde(default)]
    pub vmnets: Vec<Vmnet>,
}

impl Vmnets {
    #[must_use]
    pub fn new(vmnets: Vec<Vmnet>) -> Self {
        Self {
            num: vmnets.len(),
            vmnets,
        }
    }
}

/// Guest leg of a port forward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForwardGuest {
    pub ip: String,
    pub port: u16,
}

/// A port forward on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForward {
    pub port: u16,
    pub protocol: String,
    #[serde(default)]
    pub description: String,
    pub guest: PortForwardGuest,
    /// Owning device slot; carried internally, not part of the wire
    /// format.
    #[serde(skip)]
    pub slot: u32,
}

impl PortForward {
    /// Returns true when both forwards target the same host key and
    /// guest endpoint.
    #[must_use]
    pub fn matches(&self, other: &PortForward) -> bool {
        self.port == other.port
            && self.protocol == other.protocol
            && self.guest.ip == other.guest.ip
            && self.guest.port == other.guest.port
    }
}

/// Port forward list envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortForwards {
    pub num: usize,
    pub port_forwards: Vec<PortForward>,
}

impl PortForwards {
    #[must_use]
    pub fn new(port_forwards: Vec<PortForward>) -> Self {
        Self {
            num: port_forwards.len(),
            port_forwards,
        }
    }
}

/// Finds the lowest unused vmnet slot (>= 1) among device names with
/// any of `prefixes`.
#[must_use]
pub fn free_slot(names: &[String], prefixes: &[&str]) -> u32 {
    let mut slots: Vec<u32> = names
        .iter()
        .filter_map(|name| {
            let mut trimmed = name.as_str();
            for prefix in prefixes {
                trimmed = trimmed.strip_prefix(prefix).unwrap_or(trimmed);
            }
            trimmed.parse().ok()
        })
        .collect();
    slots.sort_unstable();
    let mut slot = 1;
    for used in slots {
        if used > slot {
            break;
        }
        if used == slot {
            slot += 1;
        }
    }
    slot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(license: &str) -> VmwareInfo {
        VmwareInfo {
            product: "Fusion".to_string(),
            version: "13.5.0".to_string(),
            license: license.to_string(),
            ..VmwareInfo::default()
        }
    }

    #[test]
    fn explicit_license_values_win() {
        assert!(info("professional").is_professional());
        assert!(info("standard").is_standard());
    }

    #[test]
    fn empty_license_is_professional() {
        assert!(info("").is_professional());
    }

    #[test]
    fn license_text_gates_professional() {
        assert!(info("fusion-pro-2024").is_professional());
        assert!(info("workstation-17").is_professional());
        assert!(info("ws.17.x").is_professional());
        assert!(info("player-17").is_standard());
    }

    #[test]
    fn normalize_collapses_license() {
        let mut i = info("fusion-pro-2024");
        i.normalize();
        assert_eq!(i.license, "professional");
        let mut i = info("player-17");
        i.normalize();
        assert_eq!(i.license, "standard");
    }

    #[test]
    fn vmnet_slot_parses_from_name() {
        let vmnet = Vmnet {
            name: "vmnet8".to_string(),
            ..Vmnet::default()
        };
        assert_eq!(vmnet.slot(), Some(8));
        assert_eq!(Vmnet::default().slot(), None);
    }

    #[test]
    fn free_slot_scans_gaps() {
        let names = vec![
            "vmnet1".to_string(),
            "vmnet2".to_string(),
            "vmnet8".to_string(),
        ];
        assert_eq!(free_slot(&names, &["vmnet"]), 3);
        assert_eq!(free_slot(&[], &["vmnet"]), 1);
        let mixed = vec!["vmnet1".to_string(), "vgtnet2".to_string()];
        assert_eq!(free_slot(&mixed, &["vmnet", "vgtnet"]), 3);
    }

    #[test]
    fn port_forward_wire_shape() {
        let fwd = PortForward {
            port: 2222,
            protocol: "tcp".to_string(),
            description: "vagrant: /tmp/a.vmx".to_string(),
            guest: PortForwardGuest {
                ip: "192.168.57.10".to_string(),
                port: 22,
            },
            slot: 8,
        };
        let json = serde_json::to_value(&fwd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "port": 2222,
                "protocol": "tcp",
                "description": "vagrant: /tmp/a.vmx",
                "guest": {"ip": "192.168.57.10", "port": 22},
            })
        );
    }
}
