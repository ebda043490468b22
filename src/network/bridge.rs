//! Bridge interface management
//!
//! Provides:
//! - Bringing a network's bridge online (create, up, uplinks, aliases)
//! - Taking it offline again
//!
//! Online/offline is never stored; it is read from the kernel each time.

use crate::error::Result;
use crate::exec::Host;
use crate::network::{probe, push_option_args, Network};
use tracing::{debug, info};

/// Lifecycle controller for one network's bridge
pub struct Bridge<'a, 'r> {
    host: &'a Host<'r>,
    network: &'a Network,
}

impl<'a, 'r> Bridge<'a, 'r> {
    pub fn new(host: &'a Host<'r>, network: &'a Network) -> Self {
        Self { host, network }
    }

    /// Bridge interface name (e.g., "bridge3")
    pub fn name(&self) -> String {
        self.network.bridge_name()
    }

    /// Check if the bridge interface exists
    pub fn is_online(&self) -> bool {
        probe::is_online(self.host, &self.name())
    }

    /// Bring the bridge online
    ///
    /// Does nothing if the bridge already exists. A failed step aborts the
    /// sequence and leaves the earlier steps in place for inspection.
    pub fn start(&self) -> Result<()> {
        let name = self.name();

        if self.is_online() {
            debug!(bridge = %name, "bridge already online");
            return Ok(());
        }

        info!(bridge = %name, network = %self.network.name, "starting network");

        // Create with options so key-only flags and key/value pairs share one path
        let mut args = vec![name.clone(), "create".to_string()];
        push_option_args(&mut args, &self.network.options, None);
        self.host.ifconfig_checked(&name, &args[..])?;

        self.host.ifconfig_checked(&name, &[name.as_str(), "up"])?;

        for physical in &self.network.physicals {
            self.host
                .ifconfig_checked(&name, &[name.as_str(), "addm", physical.device.as_str()])?;
        }

        for address in &self.network.addresses {
            self.host.ifconfig_checked(
                &name,
                &[
                    name.as_str(),
                    address.family().as_str(),
                    address.address.as_str(),
                    "alias",
                ],
            )?;
        }

        Ok(())
    }

    /// Destroy the bridge interface
    ///
    /// Destroying the bridge releases its members and aliases with it.
    pub fn stop(&self) -> Result<()> {
        let name = self.name();

        if !self.is_online() {
            debug!(bridge = %name, "bridge already offline");
            return Ok(());
        }

        info!(bridge = %name, network = %self.network.name, "stopping network");
        self.host.ifconfig_checked(&name, &[name.as_str(), "destroy"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::manifest::Tools;
    use crate::network::DeviceOption;
    use crate::testing::FakeSystem;

    fn lan() -> Network {
        Network::new("lan", 1)
            .with_physical("em0")
            .with_address("192.168.1.1/24")
    }

    #[test]
    fn test_start_issues_commands_in_order() {
        let sys = FakeSystem::new();
        sys.add_interface("em0");
        let host = Host::new(&sys, Tools::default());
        let network = lan();

        Bridge::new(&host, &network).start().unwrap();

        assert_eq!(
            sys.described(),
            vec![
                "ifconfig bridge1",
                "ifconfig bridge1 create",
                "ifconfig bridge1 up",
                "ifconfig bridge1 addm em0",
                "ifconfig bridge1 inet 192.168.1.1/24 alias",
            ]
        );
        assert!(sys.host_has("bridge1"));
    }

    #[test]
    fn test_start_appends_options_to_create() {
        let sys = FakeSystem::new();
        let host = Host::new(&sys, Tools::default());
        let network = Network::new("lan", 2)
            .with_option(DeviceOption::flag("stp"))
            .with_option(DeviceOption::new("maxaddr", "500"))
            .with_address("fd00::1/64")
            .with_address("10.0.0.1");

        Bridge::new(&host, &network).start().unwrap();

        let described = sys.described();
        assert_eq!(described[1], "ifconfig bridge2 create stp maxaddr 500");
        assert_eq!(described[3], "ifconfig bridge2 inet6 fd00::1/64 alias");
        assert_eq!(described[4], "ifconfig bridge2 inet 10.0.0.1 alias");
    }

    #[test]
    fn test_second_start_is_idempotent() {
        let combos = vec![
            Network::new("bare", 4),
            Network::new("opts", 4).with_option(DeviceOption::flag("stp")),
            Network::new("addrs", 4)
                .with_address("10.1.0.1/16")
                .with_address("::1"),
            lan(),
        ];

        for network in combos {
            let sys = FakeSystem::new();
            sys.add_interface("em0");
            let host = Host::new(&sys, Tools::default());
            let bridge = Bridge::new(&host, &network);

            bridge.start().unwrap();
            sys.clear_commands();
            bridge.start().unwrap();

            assert_eq!(sys.described(), vec![format!("ifconfig {}", bridge.name())]);
        }
    }

    #[test]
    fn test_stop_when_offline_is_noop() {
        let sys = FakeSystem::new();
        let host = Host::new(&sys, Tools::default());
        let network = lan();

        Bridge::new(&host, &network).stop().unwrap();
        assert_eq!(sys.described(), vec!["ifconfig bridge1"]);
    }

    #[test]
    fn test_stop_destroys_bridge() {
        let sys = FakeSystem::new();
        sys.add_interface("em0");
        let host = Host::new(&sys, Tools::default());
        let network = lan();
        let bridge = Bridge::new(&host, &network);

        bridge.start().unwrap();
        assert!(bridge.is_online());
        sys.clear_commands();

        bridge.stop().unwrap();
        assert_eq!(
            sys.described(),
            vec!["ifconfig bridge1", "ifconfig bridge1 destroy"]
        );
        assert!(!bridge.is_online());
    }

    #[test]
    fn test_failed_step_leaves_partial_state() {
        let sys = FakeSystem::new();
        let host = Host::new(&sys, Tools::default());
        // em0 missing: addm fails
        let network = lan();

        let err = Bridge::new(&host, &network).start().unwrap_err();
        match err {
            Error::CommandFailed {
                action, interface, ..
            } => {
                assert_eq!(action, "ifconfig bridge1 addm em0");
                assert_eq!(interface, "bridge1");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(sys.host_has("bridge1"));
        assert!(!sys.described().iter().any(|c| c.contains("alias")));
    }

    #[test]
    fn test_create_failure_reports_output() {
        let sys = FakeSystem::new();
        sys.fail_on("ifconfig bridge1 create");
        let host = Host::new(&sys, Tools::default());
        let network = Network::new("lan", 1);

        let err = Bridge::new(&host, &network).start().unwrap_err();
        assert!(err.to_string().contains("ifconfig bridge1 create"));
        assert!(err.to_string().contains("injected failure"));
    }
}
