//! Serializable views of networks and devices with live status

use crate::error::Result;
use crate::exec::Host;
use crate::network::{
    Bridge, DeviceAddress, DeviceOption, Epair, Network, NetworkDevice, NetworkPhysical,
};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

/// Live interface status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Online,
    Offline,
}

impl Status {
    fn from_online(online: bool) -> Self {
        if online {
            Status::Online
        } else {
            Status::Offline
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Online => f.pad("Online"),
            Status::Offline => f.pad("Offline"),
        }
    }
}

/// A network as presented to users
#[derive(Debug, Clone, Serialize)]
pub struct NetworkView {
    pub uuid: String,
    pub name: String,
    pub device_id: u32,
    pub bridge: String,
    pub status: Status,
    pub options: Vec<DeviceOption>,
    pub addresses: Vec<DeviceAddress>,
    pub physicals: Vec<NetworkPhysical>,
}

impl NetworkView {
    pub fn project(host: &Host<'_>, network: &Network) -> Self {
        Self {
            uuid: network.uuid.clone(),
            name: network.name.clone(),
            device_id: network.device_id,
            bridge: network.bridge_name(),
            status: Status::from_online(Bridge::new(host, network).is_online()),
            options: network.options.clone(),
            addresses: network.addresses.clone(),
            physicals: network.physicals.clone(),
        }
    }
}

/// A network device as presented to users
#[derive(Debug, Clone, Serialize)]
pub struct NetworkDeviceView {
    pub uuid: String,
    pub device_id: u32,
    pub epair: String,
    pub vm_uuid: String,
    pub status: Status,
    pub options: Vec<DeviceOption>,
    pub addresses: Vec<DeviceAddress>,
    pub network: Option<NetworkView>,
}

impl NetworkDeviceView {
    pub fn project(host: &Host<'_>, device: &NetworkDevice) -> Self {
        Self {
            uuid: device.uuid.clone(),
            device_id: device.device_id,
            epair: device.epair_name(),
            vm_uuid: device.vm_uuid.clone(),
            status: Status::from_online(Epair::new(host, device).is_online()),
            options: device.options.clone(),
            addresses: device.addresses.clone(),
            network: device
                .network
                .as_ref()
                .map(|network| NetworkView::project(host, network)),
        }
    }
}

/// Render a view as JSON indented by four spaces
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Tools;
    use crate::testing::FakeSystem;

    #[test]
    fn test_network_view_reports_live_status() {
        let sys = FakeSystem::new();
        let host = Host::new(&sys, Tools::default());
        let network = Network::new("lan", 5).with_address("10.5.0.1/24");

        let view = NetworkView::project(&host, &network);
        assert_eq!(view.status, Status::Offline);
        assert_eq!(view.bridge, "bridge5");

        Bridge::new(&host, &network).start().unwrap();
        assert_eq!(NetworkView::project(&host, &network).status, Status::Online);
    }

    #[test]
    fn test_device_view_embeds_network() {
        let sys = FakeSystem::new();
        let host = Host::new(&sys, Tools::default());
        let device = NetworkDevice::new(Network::new("lan", 5), "vm1", 2);

        Epair::new(&host, &device).bring_host_online().unwrap();

        let view = NetworkDeviceView::project(&host, &device);
        assert_eq!(view.status, Status::Online);
        assert_eq!(view.epair, "epair2");
        assert_eq!(view.network.as_ref().unwrap().status, Status::Online);
    }

    #[test]
    fn test_json_rendering() {
        let sys = FakeSystem::new();
        let host = Host::new(&sys, Tools::default());
        let network = Network::new("lan", 5).with_physical("igb0");

        let json = to_json(&NetworkView::project(&host, &network)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["status"], "Offline");
        assert_eq!(value["name"], "lan");
        assert_eq!(value["physicals"][0]["device"], "igb0");
        assert!(json.contains("\n    \"uuid\""));
    }
}
