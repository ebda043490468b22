//! virtnet - virtual network topology for VNET guests
//!
//! Manages bridges, physical uplinks, address aliases and per-guest epairs
//! on a FreeBSD host. Interface state is always read back from the kernel.

mod cli;
mod error;
mod exec;
mod guest;
mod manifest;
mod network;
mod store;

#[cfg(test)]
mod testing;

use cli::{Cli, Commands, DeviceAction, GuestAction, NetworkAction};
use error::{Error, Result};
use exec::{Host, SystemRunner};
use guest::{GuestRuntime, JailRuntime};
use network::view::{self, NetworkDeviceView, NetworkView};
use network::{Bridge, DeviceOption, Epair, Network, NetworkDevice, NetworkPhysical};
use store::{FileStore, Store};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "virtnet=debug" } else { "virtnet=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr; stdout carries command results
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    // Commands that don't require config
    let command = match cli.command {
        Commands::Completion { shell } => {
            Cli::generate_completion(shell);
            return Ok(());
        }
        command => command,
    };

    let config = manifest::load_or_default(&cli.config)?;
    let runner = SystemRunner;
    let host = Host::new(&runner, config.tools.clone()).dhcp_order(config.config.dhcp_order);
    let mut store = FileStore::open(&config.store_path())?;

    match command {
        Commands::Network { action } => network_command(&host, &mut store, action),
        Commands::Device { action } => device_command(&host, &mut store, action),
        Commands::Guest { action } => guest_command(&host, &store, action),
        Commands::Completion { .. } => Ok(()),
    }
}

fn load_network(store: &dyn Store, key: &str) -> Result<Network> {
    let uuid = store.resolve_network(key)?;
    store.load_network(&uuid)
}

fn network_command(host: &Host<'_>, store: &mut dyn Store, action: NetworkAction) -> Result<()> {
    match action {
        NetworkAction::Create {
            name,
            device_id,
            options,
            addresses,
            physicals,
        } => {
            let device_id = match device_id {
                Some(id) => id,
                None => store.next_network_device_id()?,
            };

            let mut network = Network::new(name, device_id);
            for option in &options {
                network = network.with_option(DeviceOption::parse(option));
            }
            for address in addresses {
                network = network.with_address(address);
            }
            for physical in physicals {
                network = network.with_physical(physical);
            }

            store.save_network(&mut network)?;
            println!(
                "Created network '{}' on {} ({})",
                network.name,
                network.bridge_name(),
                network.uuid
            );
        }
        NetworkAction::List { json } => {
            let views: Vec<NetworkView> = store
                .list_networks()?
                .iter()
                .map(|network| NetworkView::project(host, network))
                .collect();

            if json {
                println!("{}", view::to_json(&views)?);
            } else if views.is_empty() {
                println!("No networks defined.");
            } else {
                println!("{:<16} {:<10} {:<8} UUID", "NAME", "BRIDGE", "STATUS");
                for v in views {
                    println!("{:<16} {:<10} {:<8} {}", v.name, v.bridge, v.status, v.uuid);
                }
            }
        }
        NetworkAction::Show { network } => {
            let network = load_network(store, &network)?;
            println!("{}", view::to_json(&NetworkView::project(host, &network))?);
        }
        NetworkAction::Start { network } => {
            let network = load_network(store, &network)?;
            Bridge::new(host, &network).start()?;
            println!("Network '{}' online on {}", network.name, network.bridge_name());
        }
        NetworkAction::Stop { network } => {
            let network = load_network(store, &network)?;
            Bridge::new(host, &network).stop()?;
            println!("Network '{}' offline", network.name);
        }
        NetworkAction::Delete { network, force } => {
            let network = load_network(store, &network)?;
            let bridge = Bridge::new(host, &network);

            if bridge.is_online() {
                if !force {
                    return Err(Error::NetworkOnline(network.name.clone()));
                }
                bridge.stop()?;
            }

            let attached = store
                .list_devices()?
                .iter()
                .filter(|d| d.network_uuid == network.uuid)
                .count();
            if attached > 0 {
                warn!(network = %network.name, devices = attached, "deleting network with attached devices");
            }

            network.delete(store)?;
            println!("Deleted network '{}'", network.name);
        }
        NetworkAction::AddAddress { network, address } => {
            let mut network = load_network(store, &network)?;
            network = network.with_address(address);
            store.save_network(&mut network)?;
            println!("Address added to '{}'; applied on next start", network.name);
        }
        NetworkAction::AddPhysical { network, device } => {
            let mut network = load_network(store, &network)?;
            network.physicals.push(NetworkPhysical::new(device));
            store.save_network(&mut network)?;
            println!("Uplink added to '{}'; applied on next start", network.name);
        }
        NetworkAction::SetOption { network, option } => {
            let mut network = load_network(store, &network)?;
            network.set_option(DeviceOption::parse(&option));
            store.save_network(&mut network)?;
            println!("Option set on '{}'; applied on next start", network.name);
        }
    }

    Ok(())
}

fn device_command(host: &Host<'_>, store: &mut dyn Store, action: DeviceAction) -> Result<()> {
    let jails = JailRuntime::new(host);

    match action {
        DeviceAction::Create {
            network,
            guest,
            device_id,
            options,
            addresses,
        } => {
            let network = load_network(store, &network)?;
            let device_id = match device_id {
                Some(id) => id,
                None => store.next_device_id()?,
            };

            let mut device = NetworkDevice::new(network, guest, device_id);
            for option in &options {
                device = device.with_option(DeviceOption::parse(option));
            }
            for address in addresses {
                device = device.with_address(address);
            }

            store.save_device(&mut device)?;
            println!(
                "Created device {} ({}) for guest '{}'",
                device.uuid,
                device.epair_name(),
                device.vm_uuid
            );
        }
        DeviceAction::List { guest, json } => {
            let devices = match guest {
                Some(ref guest) => store.load_devices_for_guest(guest)?,
                None => store.list_devices()?,
            };

            if json {
                let views: Vec<NetworkDeviceView> = devices
                    .iter()
                    .map(|device| NetworkDeviceView::project(host, device))
                    .collect();
                println!("{}", view::to_json(&views)?);
            } else if devices.is_empty() {
                println!("No network devices defined.");
            } else {
                println!(
                    "{:<36} {:<8} {:<13} {:<16} GUEST",
                    "UUID", "EPAIR", "STATE", "NETWORK"
                );
                for device in &devices {
                    let network = device
                        .network
                        .as_ref()
                        .map(|n| n.name.as_str())
                        .unwrap_or("-");
                    println!(
                        "{:<36} {:<8} {:<13} {:<16} {}",
                        device.uuid,
                        device.epair_name(),
                        Epair::new(host, device).state(&jails),
                        network,
                        device.vm_uuid
                    );
                }
            }
        }
        DeviceAction::Show { device } => {
            let device = store.load_device(&device)?;
            println!("{}", view::to_json(&NetworkDeviceView::project(host, &device))?);
        }
        DeviceAction::Up { device } => {
            let device = store.load_device(&device)?;
            Epair::new(host, &device).bring_host_online()?;
            println!("{} online on host", device.host_side());
        }
        DeviceAction::Attach { device } => {
            let device = store.load_device(&device)?;
            Epair::new(host, &device).bring_guest_online(&jails, &device.vm_uuid)?;
            println!("{} online in guest '{}'", device.guest_side(), device.vm_uuid);
        }
        DeviceAction::Down { device } => {
            let device = store.load_device(&device)?;
            Epair::new(host, &device).bring_offline()?;
            println!("{} offline", device.epair_name());
        }
        DeviceAction::Delete { device } => {
            let mut device = store.load_device(&device)?;
            if Epair::new(host, &device).is_online() {
                warn!(epair = %device.host_side(), "device deleted while its epair still exists");
            }
            device.delete(store)?;
            println!("Deleted device {}", device.uuid);
        }
    }

    Ok(())
}

fn guest_command(host: &Host<'_>, store: &dyn Store, action: GuestAction) -> Result<()> {
    let jails = JailRuntime::new(host);

    match action {
        GuestAction::Up { guest } => {
            if !jails.is_running(&guest) {
                return Err(Error::GuestNotRunning(guest));
            }

            let devices = store.load_devices_for_guest(&guest)?;
            for device in &devices {
                Epair::new(host, device).bring_guest_online(&jails, &guest)?;
            }
            info!(guest = %guest, devices = devices.len(), "guest networking online");
            println!("{} device(s) online in guest '{}'", devices.len(), guest);
        }
        GuestAction::Down { guest } => {
            let devices = store.load_devices_for_guest(&guest)?;
            for device in &devices {
                Epair::new(host, device).bring_offline()?;
            }
            println!("{} device(s) offline for guest '{}'", devices.len(), guest);
        }
    }

    Ok(())
}
