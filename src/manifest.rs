//! Configuration file parsing for virtnet
//!
//! Parses `virtnet.toml` configuration files using serde

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Load configuration from a file
pub fn load(path: &Path) -> Result<VirtnetConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: VirtnetConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Load configuration, falling back to built-in defaults when the file is absent
pub fn load_or_default(path: &Path) -> Result<VirtnetConfig> {
    match fs::metadata(path) {
        Ok(_) => load(path),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(VirtnetConfig::default()),
        Err(e) => Err(Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct VirtnetConfig {
    /// Global configuration settings
    #[serde(default)]
    pub config: GlobalConfig,

    /// Paths of the host utilities virtnet drives
    #[serde(default)]
    pub tools: Tools,
}

impl VirtnetConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.config.data_dir.as_os_str().is_empty() {
            return Err(Error::ConfigValidation("data_dir must not be empty".into()));
        }

        for (name, path) in [
            ("ifconfig", &self.tools.ifconfig),
            ("jexec", &self.tools.jexec),
            ("jls", &self.tools.jls),
            ("dhclient", &self.tools.dhclient),
        ] {
            if path.trim().is_empty() {
                return Err(Error::ConfigValidation(format!(
                    "tools.{} must not be empty",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Path of the persistence file
    pub fn store_path(&self) -> PathBuf {
        self.config.data_dir.join("virtnet.json")
    }
}

/// Global configuration settings
#[derive(Debug, Deserialize)]
pub struct GlobalConfig {
    /// Directory holding persisted networks and devices
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// When the guest DHCP client runs relative to static aliases
    #[serde(default)]
    pub dhcp_order: DhcpOrder,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dhcp_order: DhcpOrder::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/db/virtnet")
}

/// Ordering of the guest DHCP client and static address aliasing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DhcpOrder {
    /// Run dhclient before any static alias is applied
    BeforeAddresses,
    /// Apply every static alias, then run dhclient
    #[default]
    AfterAddresses,
}

/// Host utility paths
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tools {
    #[serde(default = "default_ifconfig")]
    pub ifconfig: String,

    #[serde(default = "default_jexec")]
    pub jexec: String,

    #[serde(default = "default_jls")]
    pub jls: String,

    #[serde(default = "default_dhclient")]
    pub dhclient: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            ifconfig: default_ifconfig(),
            jexec: default_jexec(),
            jls: default_jls(),
            dhclient: default_dhclient(),
        }
    }
}

fn default_ifconfig() -> String {
    "/sbin/ifconfig".to_string()
}

fn default_jexec() -> String {
    "/usr/sbin/jexec".to_string()
}

fn default_jls() -> String {
    "/usr/sbin/jls".to_string()
}

fn default_dhclient() -> String {
    "/sbin/dhclient".to_string()
}
