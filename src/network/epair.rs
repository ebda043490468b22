//! Epair interface management for VNET guests
//!
//! Epairs are virtual Ethernet pairs used to connect VNET guests to bridges.
//! One end stays on the host (and is added to the network's bridge), the
//! other is moved into the guest.

use crate::error::{Error, Result};
use crate::exec::{self, Host};
use crate::guest::GuestRuntime;
use crate::manifest::DhcpOrder;
use crate::network::{probe, push_option_args, Bridge, Network, NetworkDevice, DHCP_OPTION};
use tracing::{debug, info, warn};

/// Live state of a device, derived from the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Host half does not exist
    HostOffline,
    /// Host half exists and is bridged; guest half not in the guest
    HostOnline,
    /// Guest half is inside the running guest
    GuestOnline,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceState::HostOffline => "host offline",
            DeviceState::HostOnline => "host online",
            DeviceState::GuestOnline => "guest online",
        };
        f.pad(s)
    }
}

/// Lifecycle controller for one network device's epair
pub struct Epair<'a, 'r> {
    host: &'a Host<'r>,
    device: &'a NetworkDevice,
}

impl<'a, 'r> Epair<'a, 'r> {
    pub fn new(host: &'a Host<'r>, device: &'a NetworkDevice) -> Self {
        Self { host, device }
    }

    fn network(&self) -> Result<&'a Network> {
        self.device.network.as_ref().ok_or_else(|| {
            let id = if self.device.has_identity() {
                self.device.uuid.clone()
            } else {
                self.device.epair_name()
            };
            Error::NetworkUnresolved(id)
        })
    }

    /// Check if the host-side half exists
    pub fn is_online(&self) -> bool {
        probe::is_online(self.host, &self.device.host_side())
    }

    /// Derive the current state of the device
    pub fn state(&self, guests: &dyn GuestRuntime) -> DeviceState {
        if !self.is_online() {
            return DeviceState::HostOffline;
        }

        let guest = self.device.vm_uuid.as_str();
        if !guest.is_empty() && guests.is_running(guest) {
            let argv = self.host.ifconfig_argv(&[self.device.guest_side()]);
            let present = guests
                .run_in_namespace(guest, &argv)
                .map(|out| out.success)
                .unwrap_or(false);
            if present {
                return DeviceState::GuestOnline;
            }
        }

        DeviceState::HostOnline
    }

    /// Bring the host half online and attach it to the network's bridge
    ///
    /// Starts the network if needed. An existing epair is destroyed and
    /// recreated rather than reconfigured.
    pub fn bring_host_online(&self) -> Result<()> {
        let network = self.network()?;
        Bridge::new(self.host, network).start()?;

        if self.is_online() {
            debug!(epair = %self.device.host_side(), "recreating existing epair");
            self.bring_offline()?;
        }

        let host_side = self.device.host_side();
        let bridge = network.bridge_name();
        info!(epair = %host_side, bridge = %bridge, "bringing host side online");

        self.host
            .ifconfig_checked(&host_side, &[self.device.epair_name(), "create".to_string()])?;

        self.host
            .ifconfig_checked(&host_side, &[bridge.as_str(), "addm", host_side.as_str()])?;

        if let Err(e) = self.host.ifconfig_checked(&host_side, &[host_side.as_str(), "up"]) {
            warn!(epair = %host_side, error = %e, "failed to bring host side up");
        }

        Ok(())
    }

    /// Move the guest half into a running guest and configure it there
    ///
    /// A failed address alias tears the whole device down before returning.
    pub fn bring_guest_online(&self, guests: &dyn GuestRuntime, guest: &str) -> Result<()> {
        if !guests.is_running(guest) {
            return Err(Error::GuestNotRunning(guest.to_string()));
        }

        if !self.is_online() {
            self.bring_host_online()?;
        }

        let guest_side = self.device.guest_side();
        info!(epair = %guest_side, guest = %guest, "bringing guest side online");

        let mut args = vec![guest_side.clone(), "vnet".to_string(), guest.to_string()];
        let needs_dhcp = push_option_args(&mut args, &self.device.options, Some(DHCP_OPTION));
        self.host.ifconfig_checked(&guest_side, &args[..])?;

        if needs_dhcp && self.host.dhcp() == DhcpOrder::BeforeAddresses {
            self.run_dhclient(guests, guest)?;
        }

        if let Err(e) = self.alias_guest_addresses(guests, guest) {
            warn!(epair = %guest_side, guest = %guest, error = %e, "address alias failed, rolling back device");
            if let Err(rollback) = self.bring_offline() {
                warn!(epair = %guest_side, error = %rollback, "rollback failed");
            }
            return Err(e);
        }

        if needs_dhcp && self.host.dhcp() == DhcpOrder::AfterAddresses {
            self.run_dhclient(guests, guest)?;
        }

        let argv = self.host.ifconfig_argv(&[guest_side.as_str(), "up"]);
        self.run_in_guest(guests, guest, &argv)
    }

    /// Destroy the epair
    ///
    /// Destroying the host half destroys the pair, wherever the guest half
    /// currently lives.
    pub fn bring_offline(&self) -> Result<()> {
        let host_side = self.device.host_side();

        if !self.is_online() {
            debug!(epair = %host_side, "epair already offline");
            return Ok(());
        }

        info!(epair = %host_side, "destroying epair");
        self.host
            .ifconfig_checked(&host_side, &[host_side.as_str(), "destroy"])
    }

    fn alias_guest_addresses(&self, guests: &dyn GuestRuntime, guest: &str) -> Result<()> {
        let guest_side = self.device.guest_side();

        for address in &self.device.addresses {
            let argv = self.host.ifconfig_argv(&[
                guest_side.as_str(),
                address.family().as_str(),
                address.address.as_str(),
                "alias",
            ]);
            self.run_in_guest(guests, guest, &argv)?;
        }

        Ok(())
    }

    fn run_dhclient(&self, guests: &dyn GuestRuntime, guest: &str) -> Result<()> {
        let argv = vec![self.host.tools().dhclient.clone(), self.device.guest_side()];
        self.run_in_guest(guests, guest, &argv)
    }

    fn run_in_guest(&self, guests: &dyn GuestRuntime, guest: &str, argv: &[String]) -> Result<()> {
        let output = guests.run_in_namespace(guest, argv)?;

        let mut shown = vec![self.host.tools().jexec.clone(), guest.to_string()];
        shown.extend(argv.iter().cloned());
        exec::check(&shown, &self.device.guest_side(), output)
    }
}
