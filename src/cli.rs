//! Command-line interface for virtnet
//!
//! Uses clap with derive for type-safe CLI parsing

use crate::error::Error;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// virtnet - bridge and epair topology for VNET guests
#[derive(Parser)]
#[command(name = "virtnet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "virtnet.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Network (bridge) management
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },

    /// Network device (epair) management
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },

    /// Bring all of a guest's devices online or offline
    Guest {
        #[command(subcommand)]
        action: GuestAction,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Actions for the network command
#[derive(Subcommand)]
pub enum NetworkAction {
    /// Define a new network
    Create {
        /// Network name
        name: String,

        /// Bridge number (bridgeN); lowest free number if omitted
        #[arg(short, long)]
        device_id: Option<u32>,

        /// Bridge create option (KEY or KEY=VALUE)
        #[arg(short, long = "option")]
        options: Vec<String>,

        /// Address to alias onto the bridge (IP or CIDR)
        #[arg(short, long = "address", value_parser = parse_address)]
        addresses: Vec<String>,

        /// Physical interface to add to the bridge
        #[arg(short, long = "physical")]
        physicals: Vec<String>,
    },

    /// List networks
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a network as JSON
    Show {
        /// Network name or UUID
        network: String,
    },

    /// Bring a network's bridge online
    Start {
        /// Network name or UUID
        network: String,
    },

    /// Destroy a network's bridge
    Stop {
        /// Network name or UUID
        network: String,
    },

    /// Delete a network definition
    Delete {
        /// Network name or UUID
        network: String,

        /// Stop the bridge first if it is online
        #[arg(short, long)]
        force: bool,
    },

    /// Add an address alias (applied on next start)
    AddAddress {
        /// Network name or UUID
        network: String,

        /// Address (IP or CIDR)
        #[arg(value_parser = parse_address)]
        address: String,
    },

    /// Add a physical uplink (applied on next start)
    AddPhysical {
        /// Network name or UUID
        network: String,

        /// Interface name
        device: String,
    },

    /// Set a bridge create option, replacing any with the same key (applied on next start)
    SetOption {
        /// Network name or UUID
        network: String,

        /// KEY or KEY=VALUE
        option: String,
    },
}

/// Actions for the device command
#[derive(Subcommand)]
pub enum DeviceAction {
    /// Define a new device attaching a guest to a network
    Create {
        /// Network name or UUID
        #[arg(short, long)]
        network: String,

        /// Guest UUID (also its jail name)
        #[arg(short, long)]
        guest: String,

        /// Epair number (epairN); lowest free number if omitted
        #[arg(short, long)]
        device_id: Option<u32>,

        /// Guest-side option (KEY or KEY=VALUE; DHCP runs dhclient)
        #[arg(short, long = "option")]
        options: Vec<String>,

        /// Address to alias inside the guest (IP or CIDR)
        #[arg(short, long = "address", value_parser = parse_address)]
        addresses: Vec<String>,
    },

    /// List devices
    List {
        /// Only devices of this guest
        #[arg(short, long)]
        guest: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a device as JSON
    Show {
        /// Device UUID
        device: String,
    },

    /// Bring the host side online and attach it to the bridge
    Up {
        /// Device UUID
        device: String,
    },

    /// Move the guest side into its (running) guest and configure it
    Attach {
        /// Device UUID
        device: String,
    },

    /// Destroy the epair
    Down {
        /// Device UUID
        device: String,
    },

    /// Delete a device definition
    Delete {
        /// Device UUID
        device: String,
    },
}

/// Actions for the guest command
#[derive(Subcommand)]
pub enum GuestAction {
    /// Bring every device of a running guest online
    Up {
        /// Guest UUID
        guest: String,
    },

    /// Take every device of a guest offline
    Down {
        /// Guest UUID
        guest: String,
    },
}

/// Accept an IP address or CIDR network
fn parse_address(s: &str) -> Result<String, Error> {
    if s.parse::<ipnet::IpNet>().is_ok() || s.parse::<std::net::IpAddr>().is_ok() {
        Ok(s.to_string())
    } else {
        Err(Error::InvalidAddress(s.to_string()))
    }
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "virtnet", &mut std::io::stdout());
    }
}
