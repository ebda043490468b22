//! Persistence for networks and network devices
//!
//! Aggregates are stored as flat tables (networks, devices and their child
//! records keyed by owner UUID) in a single JSON document under the data
//! directory. Child records are upserted; records dropped from an aggregate
//! in memory are not removed until the owner is deleted.

use crate::error::{Error, Result};
use crate::network::{DeviceAddress, DeviceOption, Network, NetworkDevice, NetworkPhysical};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Loads and saves Network and NetworkDevice aggregates
pub trait Store {
    /// Resolve a network key (UUID first, then name) to its UUID
    fn resolve_network(&self, key: &str) -> Result<String>;

    /// Load a network with its options, addresses and physicals
    fn load_network(&self, uuid: &str) -> Result<Network>;

    fn list_networks(&self) -> Result<Vec<Network>>;

    /// Load a device, resolving its owning network
    fn load_device(&self, uuid: &str) -> Result<NetworkDevice>;

    fn list_devices(&self) -> Result<Vec<NetworkDevice>>;

    fn load_devices_for_guest(&self, guest: &str) -> Result<Vec<NetworkDevice>>;

    /// Lowest DeviceID not held by any network
    fn next_network_device_id(&self) -> Result<u32>;

    /// Lowest DeviceID not held by any network device
    fn next_device_id(&self) -> Result<u32>;

    /// Insert or update a network and its child records, assigning identities
    fn save_network(&mut self, network: &mut Network) -> Result<()>;

    /// Save the device's network, then the device and its child records
    fn save_device(&mut self, device: &mut NetworkDevice) -> Result<()>;

    fn delete_network(&mut self, network: &Network) -> Result<()>;

    fn delete_device(&mut self, device: &NetworkDevice) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct NetworkRow {
    uuid: String,
    name: String,
    device_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct DeviceRow {
    uuid: String,
    device_id: u32,
    network_uuid: String,
    vm_uuid: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    networks: Vec<NetworkRow>,
    #[serde(default)]
    devices: Vec<DeviceRow>,
    #[serde(default)]
    options: Vec<DeviceOption>,
    #[serde(default)]
    addresses: Vec<DeviceAddress>,
    #[serde(default)]
    physicals: Vec<NetworkPhysical>,
}

/// Row types with a numeric primary key
trait Keyed {
    fn id(&self) -> u64;
    fn set_id(&mut self, id: u64);
}

macro_rules! keyed {
    ($($ty:ty),*) => {
        $(impl Keyed for $ty {
            fn id(&self) -> u64 {
                self.id
            }

            fn set_id(&mut self, id: u64) {
                self.id = id;
            }
        })*
    };
}

keyed!(DeviceOption, DeviceAddress, NetworkPhysical);

/// Insert rows with id 0 under a fresh id, update the rest in place
fn upsert<T: Keyed + Clone>(table: &mut Vec<T>, row: &mut T) {
    if row.id() == 0 {
        let next = table.iter().map(Keyed::id).max().unwrap_or(0) + 1;
        row.set_id(next);
        table.push(row.clone());
        return;
    }

    match table.iter_mut().find(|r| r.id() == row.id()) {
        Some(existing) => *existing = row.clone(),
        None => table.push(row.clone()),
    }
}

fn lowest_free(used: impl Iterator<Item = u32>) -> u32 {
    let mut used: Vec<u32> = used.collect();
    used.sort_unstable();
    used.dedup();

    let mut candidate = 0;
    for id in used {
        if id != candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}

impl Tables {
    fn network(&self, row: &NetworkRow) -> Network {
        Network {
            uuid: row.uuid.clone(),
            name: row.name.clone(),
            device_id: row.device_id,
            options: self.options_of(&row.uuid),
            addresses: self.addresses_of(&row.uuid),
            physicals: self
                .physicals
                .iter()
                .filter(|p| p.network_uuid == row.uuid)
                .cloned()
                .collect(),
        }
    }

    fn device(&self, row: &DeviceRow) -> NetworkDevice {
        NetworkDevice {
            uuid: row.uuid.clone(),
            device_id: row.device_id,
            options: self.options_of(&row.uuid),
            addresses: self.addresses_of(&row.uuid),
            network: self
                .networks
                .iter()
                .find(|n| n.uuid == row.network_uuid)
                .map(|n| self.network(n)),
            network_uuid: row.network_uuid.clone(),
            vm_uuid: row.vm_uuid.clone(),
        }
    }

    fn options_of(&self, owner: &str) -> Vec<DeviceOption> {
        self.options
            .iter()
            .filter(|o| o.device_uuid == owner)
            .cloned()
            .collect()
    }

    fn addresses_of(&self, owner: &str) -> Vec<DeviceAddress> {
        self.addresses
            .iter()
            .filter(|a| a.device_uuid == owner)
            .cloned()
            .collect()
    }

    fn save_children(
        &mut self,
        owner: &str,
        options: &mut [DeviceOption],
        addresses: &mut [DeviceAddress],
    ) {
        for option in options {
            option.device_uuid = owner.to_string();
            upsert(&mut self.options, option);
        }

        for address in addresses {
            if address.device_uuid.is_empty() {
                address.device_uuid = owner.to_string();
            }
            upsert(&mut self.addresses, address);
        }
    }

    fn remove_children(&mut self, owner: &str) {
        self.options.retain(|o| o.device_uuid != owner);
        self.addresses.retain(|a| a.device_uuid != owner);
        self.physicals.retain(|p| p.network_uuid != owner);
    }

    fn save_network(&mut self, network: &mut Network) -> Result<()> {
        if self
            .networks
            .iter()
            .any(|n| n.name == network.name && n.uuid != network.uuid)
        {
            return Err(Error::DuplicateNetworkName(network.name.clone()));
        }

        if self
            .networks
            .iter()
            .any(|n| n.device_id == network.device_id && n.uuid != network.uuid)
        {
            return Err(Error::DuplicateDeviceId {
                kind: "Network",
                device_id: network.device_id,
            });
        }

        if network.uuid.is_empty() {
            network.uuid = Uuid::new_v4().to_string();
        }

        let row = NetworkRow {
            uuid: network.uuid.clone(),
            name: network.name.clone(),
            device_id: network.device_id,
        };
        match self.networks.iter_mut().find(|n| n.uuid == row.uuid) {
            Some(existing) => *existing = row,
            None => self.networks.push(row),
        }

        let owner = network.uuid.clone();
        self.save_children(&owner, &mut network.options, &mut network.addresses);

        for physical in &mut network.physicals {
            if physical.network_uuid.is_empty() {
                physical.network_uuid = owner.clone();
            }
            upsert(&mut self.physicals, physical);
        }

        Ok(())
    }

    fn save_device(&mut self, device: &mut NetworkDevice) -> Result<()> {
        if let Some(network) = device.network.as_mut() {
            self.save_network(network)?;
            device.network_uuid = network.uuid.clone();
        }

        if device.network_uuid.is_empty() {
            let id = if device.uuid.is_empty() {
                device.epair_name()
            } else {
                device.uuid.clone()
            };
            return Err(Error::NetworkUnresolved(id));
        }

        if self
            .devices
            .iter()
            .any(|d| d.device_id == device.device_id && d.uuid != device.uuid)
        {
            return Err(Error::DuplicateDeviceId {
                kind: "Network device",
                device_id: device.device_id,
            });
        }

        if device.uuid.is_empty() {
            device.uuid = Uuid::new_v4().to_string();
        }

        let row = DeviceRow {
            uuid: device.uuid.clone(),
            device_id: device.device_id,
            network_uuid: device.network_uuid.clone(),
            vm_uuid: device.vm_uuid.clone(),
        };
        match self.devices.iter_mut().find(|d| d.uuid == row.uuid) {
            Some(existing) => *existing = row,
            None => self.devices.push(row),
        }

        let owner = device.uuid.clone();
        self.save_children(&owner, &mut device.options, &mut device.addresses);

        Ok(())
    }
}

/// Store backed by a JSON file, rewritten on every change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: Tables,
}

impl FileStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: &Path) -> Result<Self> {
        let tables = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| Error::StoreParse {
                path: path.to_path_buf(),
                source: e,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => Tables::default(),
            Err(e) => {
                return Err(Error::StoreRead {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            tables,
        })
    }

    fn flush(&self) -> Result<()> {
        let write_err = |e: std::io::Error| Error::StoreWrite {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let content = serde_json::to_string_pretty(&self.tables)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        debug!(path = %self.path.display(), "store written");
        Ok(())
    }
}

impl Store for FileStore {
    fn resolve_network(&self, key: &str) -> Result<String> {
        self.tables
            .networks
            .iter()
            .find(|n| n.uuid == key)
            .or_else(|| self.tables.networks.iter().find(|n| n.name == key))
            .map(|n| n.uuid.clone())
            .ok_or_else(|| Error::NetworkNotFound(key.to_string()))
    }

    fn load_network(&self, uuid: &str) -> Result<Network> {
        self.tables
            .networks
            .iter()
            .find(|n| n.uuid == uuid)
            .map(|row| self.tables.network(row))
            .ok_or_else(|| Error::NetworkNotFound(uuid.to_string()))
    }

    fn list_networks(&self) -> Result<Vec<Network>> {
        Ok(self
            .tables
            .networks
            .iter()
            .map(|row| self.tables.network(row))
            .collect())
    }

    fn load_device(&self, uuid: &str) -> Result<NetworkDevice> {
        self.tables
            .devices
            .iter()
            .find(|d| d.uuid == uuid)
            .map(|row| self.tables.device(row))
            .ok_or_else(|| Error::DeviceNotFound(uuid.to_string()))
    }

    fn list_devices(&self) -> Result<Vec<NetworkDevice>> {
        Ok(self
            .tables
            .devices
            .iter()
            .map(|row| self.tables.device(row))
            .collect())
    }

    fn load_devices_for_guest(&self, guest: &str) -> Result<Vec<NetworkDevice>> {
        Ok(self
            .tables
            .devices
            .iter()
            .filter(|d| d.vm_uuid == guest)
            .map(|row| self.tables.device(row))
            .collect())
    }

    fn next_network_device_id(&self) -> Result<u32> {
        Ok(lowest_free(self.tables.networks.iter().map(|n| n.device_id)))
    }

    fn next_device_id(&self) -> Result<u32> {
        Ok(lowest_free(self.tables.devices.iter().map(|d| d.device_id)))
    }

    fn save_network(&mut self, network: &mut Network) -> Result<()> {
        self.tables.save_network(network)?;
        self.flush()
    }

    fn save_device(&mut self, device: &mut NetworkDevice) -> Result<()> {
        self.tables.save_device(device)?;
        self.flush()
    }

    fn delete_network(&mut self, network: &Network) -> Result<()> {
        self.tables.networks.retain(|n| n.uuid != network.uuid);
        self.tables.remove_children(&network.uuid);
        self.flush()
    }

    fn delete_device(&mut self, device: &NetworkDevice) -> Result<()> {
        self.tables.devices.retain(|d| d.uuid != device.uuid);
        self.tables.remove_children(&device.uuid);
        self.flush()
    }
}
