//! In-memory host used by unit tests
//!
//! Records every argv and simulates just enough of ifconfig, jls, jexec and
//! dhclient to exercise interface lifecycles without touching the kernel.

use crate::error::Result;
use crate::exec::{describe, CommandOutput, Runner};
use crate::guest::GuestRuntime;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Default)]
struct State {
    commands: Vec<Vec<String>>,
    host: BTreeSet<String>,
    guests: BTreeMap<String, BTreeSet<String>>,
    failures: Vec<String>,
}

/// Simulated host and guest namespaces
#[derive(Default)]
pub struct FakeSystem {
    state: RefCell<State>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every argv run so far, in order
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state.borrow().commands.clone()
    }

    /// Commands rendered as strings, program paths stripped
    pub fn described(&self) -> Vec<String> {
        self.state
            .borrow()
            .commands
            .iter()
            .map(|argv| describe(argv))
            .collect()
    }

    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }

    /// Make any command whose rendering contains `fragment` fail
    pub fn fail_on(&self, fragment: &str) {
        self.state.borrow_mut().failures.push(fragment.to_string());
    }

    /// Add a pre-existing host interface such as a physical NIC
    pub fn add_interface(&self, name: &str) {
        self.state.borrow_mut().host.insert(name.to_string());
    }

    pub fn start_guest(&self, guest: &str) {
        self.state
            .borrow_mut()
            .guests
            .entry(guest.to_string())
            .or_default();
    }

    pub fn host_has(&self, name: &str) -> bool {
        self.state.borrow().host.contains(name)
    }

    pub fn guest_has(&self, guest: &str, name: &str) -> bool {
        self.state
            .borrow()
            .guests
            .get(guest)
            .is_some_and(|ifaces| ifaces.contains(name))
    }

    fn program(argv: &[String]) -> &str {
        argv.first()
            .and_then(|p| Path::new(p).file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    fn exec(state: &mut State, argv: &[String], guest: Option<&str>) -> CommandOutput {
        match Self::program(argv) {
            "ifconfig" => Self::ifconfig(state, &argv[1..], guest),
            "jls" => match argv.get(2) {
                Some(name) if state.guests.contains_key(name) => CommandOutput::ok("1"),
                _ => CommandOutput::failed("jls: jail not found"),
            },
            "jexec" => match argv.get(1) {
                Some(name) if state.guests.contains_key(name) => {
                    let name = name.clone();
                    Self::exec(state, &argv[2..], Some(&name))
                }
                _ => CommandOutput::failed("jexec: jail not found"),
            },
            "dhclient" => {
                let present = match (guest, argv.get(1)) {
                    (Some(g), Some(iface)) => state.guests[g].contains(iface),
                    _ => false,
                };
                if present {
                    CommandOutput::ok("bound")
                } else {
                    CommandOutput::failed("dhclient: no such interface")
                }
            }
            other => CommandOutput::failed(format!("{}: command not found", other)),
        }
    }

    fn ifconfig(state: &mut State, args: &[String], guest: Option<&str>) -> CommandOutput {
        let Some(name) = args.first() else {
            return CommandOutput::ok("");
        };

        let exists = match guest {
            Some(g) => state.guests[g].contains(name),
            None => state.host.contains(name),
        };

        match args.get(1).map(String::as_str) {
            Some("create") if guest.is_none() => {
                if name.starts_with("epair") {
                    let (a, b) = (format!("{}a", name), format!("{}b", name));
                    if state.host.contains(&a) {
                        return CommandOutput::failed("ifconfig: SIOCIFCREATE2: File exists");
                    }
                    state.host.insert(a.clone());
                    state.host.insert(b);
                    CommandOutput::ok(a)
                } else if exists {
                    CommandOutput::failed("ifconfig: SIOCIFCREATE2: File exists")
                } else {
                    state.host.insert(name.clone());
                    CommandOutput::ok(name.clone())
                }
            }
            Some("destroy") if guest.is_none() => {
                if !exists {
                    return CommandOutput::failed(format!(
                        "ifconfig: interface {} does not exist",
                        name
                    ));
                }
                let mut doomed = vec![name.clone()];
                if name.starts_with("epair") {
                    let stem = name.trim_end_matches(['a', 'b']);
                    doomed = vec![format!("{}a", stem), format!("{}b", stem)];
                }
                for iface in &doomed {
                    state.host.remove(iface);
                    for ifaces in state.guests.values_mut() {
                        ifaces.remove(iface);
                    }
                }
                CommandOutput::ok("")
            }
            Some("vnet") if guest.is_none() => {
                let target = args.get(2).cloned().unwrap_or_default();
                if !exists || !state.guests.contains_key(&target) {
                    return CommandOutput::failed("ifconfig: SIOCSIFVNET: Invalid argument");
                }
                state.host.remove(name);
                if let Some(ifaces) = state.guests.get_mut(&target) {
                    ifaces.insert(name.clone());
                }
                CommandOutput::ok("")
            }
            Some("addm") => {
                let member = args.get(2).map(|m| state.host.contains(m)).unwrap_or(false);
                if exists && member {
                    CommandOutput::ok("")
                } else {
                    CommandOutput::failed("ifconfig: BRDGADD: No such file or directory")
                }
            }
            _ if exists => CommandOutput::ok(""),
            _ => CommandOutput::failed(format!("ifconfig: interface {} does not exist", name)),
        }
    }
}

impl Runner for FakeSystem {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let mut state = self.state.borrow_mut();
        state.commands.push(argv.to_vec());

        let rendered = describe(argv);
        if state.failures.iter().any(|f| rendered.contains(f.as_str())) {
            return Ok(CommandOutput::failed(format!("injected failure: {}", rendered)));
        }

        Ok(Self::exec(&mut state, argv, None))
    }
}

impl GuestRuntime for FakeSystem {
    fn is_running(&self, guest: &str) -> bool {
        self.state.borrow().guests.contains_key(guest)
    }

    fn run_in_namespace(&self, guest: &str, argv: &[String]) -> Result<CommandOutput> {
        let mut full = vec!["/usr/sbin/jexec".to_string(), guest.to_string()];
        full.extend(argv.iter().cloned());
        self.run(&full)
    }
}
