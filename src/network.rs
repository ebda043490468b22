//! Virtual network topology for VNET guests
//!
//! Provides:
//! - The Network and NetworkDevice aggregates and their child records
//! - OS interface name derivation (`bridgeN`, `epairNa`/`epairNb`)
//! - Bridge and epair lifecycle controllers
//! - Live status projection for presentation

pub mod bridge;
pub mod epair;
pub mod probe;
pub mod view;

pub use bridge::Bridge;
pub use epair::Epair;

use crate::error::Result;
use crate::store::Store;
use serde::{Deserialize, Serialize};

/// Device option key that requests a DHCP client instead of being forwarded
pub const DHCP_OPTION: &str = "DHCP";

/// Bridge interface name for a network DeviceID
pub fn bridge_name(device_id: u32) -> String {
    format!("bridge{}", device_id)
}

/// Epair cloner name for a device DeviceID (`epair7` creates `epair7a`/`epair7b`)
pub fn epair_name(device_id: u32) -> String {
    format!("epair{}", device_id)
}

/// Protocol family selector passed to ifconfig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    /// Any colon in the address selects inet6
    pub fn for_address(address: &str) -> Self {
        if address.contains(':') {
            AddressFamily::Inet6
        } else {
            AddressFamily::Inet
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::Inet => "inet",
            AddressFamily::Inet6 => "inet6",
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form key/value option for a bridge or epair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOption {
    /// Row id (0 until persisted)
    pub id: u64,
    /// Owning Network or NetworkDevice UUID
    pub device_uuid: String,
    pub key: String,
    /// Empty for boolean flags
    pub value: String,
}

impl DeviceOption {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Key-only option such as `DHCP` or `stp`
    pub fn flag(key: impl Into<String>) -> Self {
        Self::new(key, "")
    }

    /// Parse `KEY` or `KEY=VALUE`
    pub fn parse(s: &str) -> Self {
        match s.split_once('=') {
            Some((key, value)) => Self::new(key, value),
            None => Self::flag(s),
        }
    }
}

/// Address aliased onto a bridge or guest-side interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub id: u64,
    pub device_uuid: String,
    /// Address as handed to ifconfig, with or without a prefix length
    pub address: String,
}

impl DeviceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::for_address(&self.address)
    }
}

/// Physical uplink enslaved into a network's bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPhysical {
    pub id: u64,
    pub network_uuid: String,
    /// Host interface name, e.g. `em0`
    pub device: String,
}

impl NetworkPhysical {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }
}

/// A logical network backed by one bridge interface
///
/// `device_id` must be unique among networks on a host and must not change
/// while the bridge exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    /// Empty until first persisted
    pub uuid: String,
    pub name: String,
    pub device_id: u32,
    /// Appended to the bridge create command
    pub options: Vec<DeviceOption>,
    pub addresses: Vec<DeviceAddress>,
    /// Enslaved in stored order
    pub physicals: Vec<NetworkPhysical>,
}

impl Network {
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
            ..Default::default()
        }
    }

    pub fn with_option(mut self, option: DeviceOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(DeviceAddress::new(address));
        self
    }

    /// Replace the value of an option with the same key, or append it
    ///
    /// The replaced option keeps its row id so a save updates it in place.
    pub fn set_option(&mut self, option: DeviceOption) {
        match self.options.iter_mut().find(|o| o.key == option.key) {
            Some(existing) => existing.value = option.value,
            None => self.options.push(option),
        }
    }

    pub fn with_physical(mut self, device: impl Into<String>) -> Self {
        self.physicals.push(NetworkPhysical::new(device));
        self
    }

    pub fn bridge_name(&self) -> String {
        bridge_name(self.device_id)
    }

    pub fn has_identity(&self) -> bool {
        !self.uuid.is_empty()
    }

    /// Remove the persisted record
    ///
    /// The bridge interface is left alone; stop it first to remove OS state.
    pub fn delete(&self, store: &mut dyn Store) -> Result<()> {
        if self.has_identity() {
            store.delete_network(self)?;
        }
        Ok(())
    }
}

/// One guest's attachment point to a Network, backed by an epair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkDevice {
    pub uuid: String,
    pub device_id: u32,
    /// Passed to `ifconfig epairNb vnet`, except `DHCP`
    pub options: Vec<DeviceOption>,
    /// Aliased inside the guest
    pub addresses: Vec<DeviceAddress>,
    /// Resolved owning network, if loaded
    pub network: Option<Network>,
    pub network_uuid: String,
    /// Owning guest identity (also its jail name)
    pub vm_uuid: String,
}

impl NetworkDevice {
    pub fn new(network: Network, vm_uuid: impl Into<String>, device_id: u32) -> Self {
        Self {
            device_id,
            network_uuid: network.uuid.clone(),
            network: Some(network),
            vm_uuid: vm_uuid.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, option: DeviceOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(DeviceAddress::new(address));
        self
    }

    pub fn epair_name(&self) -> String {
        epair_name(self.device_id)
    }

    /// Half that stays on the host and joins the bridge
    pub fn host_side(&self) -> String {
        format!("{}a", self.epair_name())
    }

    /// Half that moves into the guest
    pub fn guest_side(&self) -> String {
        format!("{}b", self.epair_name())
    }

    pub fn has_identity(&self) -> bool {
        !self.uuid.is_empty()
    }

    /// Detach the network and remove the persisted record; interfaces are untouched
    pub fn delete(&mut self, store: &mut dyn Store) -> Result<()> {
        self.network = None;

        if self.has_identity() {
            store.delete_device(self)?;
        }
        Ok(())
    }
}

/// Append option arguments: the key, then the value when non-empty
///
/// Options whose key equals `reserved` are not forwarded; returns whether
/// one was seen.
pub(crate) fn push_option_args(
    args: &mut Vec<String>,
    options: &[DeviceOption],
    reserved: Option<&str>,
) -> bool {
    let mut seen = false;

    for option in options {
        if reserved == Some(option.key.as_str()) {
            seen = true;
            continue;
        }

        args.push(option.key.clone());
        if !option.value.is_empty() {
            args.push(option.value.clone());
        }
    }

    seen
}
