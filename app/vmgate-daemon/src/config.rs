//! Daemon configuration.
//!
//! Settings merge from three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML configuration file (`-config-file`)
//! 3. `VMGATE_`-prefixed environment variables
//!
//! Command line flags are applied on top by the caller, giving the
//! documented precedence of CLI > env > file > default.
//!
//! ```toml
//! [core]
//! debug = false
//! level = "info"
//! log_file = "/var/log/vmgate.log"
//!
//! [api]
//! port = 9922
//! driver = "advanced"
//! internal_port_forwarding = false
//! license_override = ""
//!
//! [service]
//! init = "systemd"
//! ```

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Default API listen port.
pub const DEFAULT_API_PORT: u16 = 9922;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub core: CoreConfig,
    pub api: ApiConfig,
    pub service: ServiceConfig,
}

/// Logging and process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub debug: bool,
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    pub log_file: Option<PathBuf>,
    pub log_append: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: "info".to_string(),
            log_file: None,
            log_append: true,
        }
    }
}

/// API service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
    /// Driver selection: `simple`, `advanced` or `vmrest`; empty for
    /// automatic.
    pub driver: String,
    pub internal_port_forwarding: bool,
    /// License edition override (`standard` or `professional`).
    pub license_override: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_API_PORT,
            driver: String::new(),
            internal_port_forwarding: false,
            license_override: String::new(),
        }
    }
}

/// Service-install settings. Carried for the installer entry points;
/// the API daemon itself only reads them when installed units pass
/// them back through the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub driver: String,
    pub license_override: String,
    /// Init system in use (`systemd`, `sysv`, `runit`).
    pub init: String,
    pub runit_dir: Option<PathBuf>,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            driver: String::new(),
            license_override: String::new(),
            init: String::new(),
            runit_dir: None,
            port: DEFAULT_API_PORT,
        }
    }
}

impl Config {
    /// Loads configuration from an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be parsed.
    pub fn load(config_file: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("VMGATE_").split("_")).extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_apply_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.api.port, DEFAULT_API_PORT);
        assert_eq!(config.core.level, "info");
        assert!(!config.api.internal_port_forwarding);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[core]\nlevel = \"debug\"\n\n[api]\nport = 9999\ndriver = \"simple\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.api.port, 9999);
        assert_eq!(config.api.driver, "simple");
        assert_eq!(config.core.level, "debug");
        // Untouched sections keep their defaults.
        assert_eq!(config.service.port, DEFAULT_API_PORT);
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nport = 9001\nfuture_flag = true\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.api.port, 9001);
    }
}
