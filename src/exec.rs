//! Host command execution
//!
//! Every bridge and epair operation is a sequence of external commands run
//! one at a time. This module provides:
//! - The `Runner` seam that actually spawns a process
//! - `Host`, which knows the tool paths and turns failed commands into errors

use crate::error::{Error, Result};
use crate::manifest::{DhcpOrder, Tools};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status zero
    pub success: bool,
    /// Combined stdout and stderr
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Runs a command to completion and captures its output
///
/// Implementations block until the command exits. There is no timeout: a
/// hung command hangs the caller.
pub trait Runner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput>;
}

/// Runs commands on the local host with `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::CommandSpawn {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::CommandSpawn {
                command: program.clone(),
                source: e,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let combined = combined.trim_end();
        if output.status.success() {
            Ok(CommandOutput::ok(combined))
        } else {
            Ok(CommandOutput::failed(combined))
        }
    }
}

/// The host whose interfaces are being managed
///
/// Callers must serialize lifecycle operations: at most one operation may be
/// in flight per Network or NetworkDevice identity, across all processes.
pub struct Host<'r> {
    runner: &'r dyn Runner,
    tools: Tools,
    dhcp_order: DhcpOrder,
}

impl<'r> Host<'r> {
    pub fn new(runner: &'r dyn Runner, tools: Tools) -> Self {
        Self {
            runner,
            tools,
            dhcp_order: DhcpOrder::default(),
        }
    }

    /// Set when the DHCP client runs relative to static guest aliases
    pub fn dhcp_order(mut self, order: DhcpOrder) -> Self {
        self.dhcp_order = order;
        self
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    pub fn dhcp(&self) -> DhcpOrder {
        self.dhcp_order
    }

    /// Run an arbitrary argv through the runner
    pub fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        debug!(command = %describe(argv), "running");
        self.runner.run(argv)
    }

    /// Build an ifconfig argv from its arguments
    pub fn ifconfig_argv<S: AsRef<str>>(&self, args: &[S]) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.tools.ifconfig.clone());
        argv.extend(args.iter().map(|a| a.as_ref().to_string()));
        argv
    }

    /// Run ifconfig and return its raw output, whatever the exit status
    pub fn ifconfig<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput> {
        self.run(&self.ifconfig_argv(args))
    }

    /// Run ifconfig against `interface` and fail unless it exits zero
    pub fn ifconfig_checked<S: AsRef<str>>(&self, interface: &str, args: &[S]) -> Result<()> {
        let argv = self.ifconfig_argv(args);
        let output = self.run(&argv)?;
        check(&argv, interface, output)
    }
}

/// Turn a non-zero exit into `Error::CommandFailed`
pub fn check(argv: &[String], interface: &str, output: CommandOutput) -> Result<()> {
    if output.success {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            action: describe(argv),
            interface: interface.to_string(),
            output: output.output,
        })
    }
}

/// Render an argv for messages, with the program shown by its base name
///
/// `["/sbin/ifconfig", "bridge1", "create"]` becomes `ifconfig bridge1 create`.
pub fn describe(argv: &[String]) -> String {
    let mut parts = argv.iter();
    let Some(program) = parts.next() else {
        return String::new();
    };

    let name = Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);

    std::iter::once(name)
        .chain(parts.map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSystem;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_describe_strips_program_path() {
        assert_eq!(
            describe(&argv(&["/sbin/ifconfig", "bridge1", "create"])),
            "ifconfig bridge1 create"
        );
        assert_eq!(describe(&argv(&["jexec", "vm", "dhclient"])), "jexec vm dhclient");
        assert_eq!(describe(&[]), "");
    }

    #[test]
    fn test_check_maps_failure_to_command_error() {
        let err = check(
            &argv(&["/sbin/ifconfig", "bridge9", "up"]),
            "bridge9",
            CommandOutput::failed("ifconfig: interface bridge9 does not exist"),
        )
        .unwrap_err();

        match err {
            Error::CommandFailed {
                action,
                interface,
                output,
            } => {
                assert_eq!(action, "ifconfig bridge9 up");
                assert_eq!(interface, "bridge9");
                assert!(output.contains("does not exist"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_check_passes_success() {
        assert!(check(&argv(&["true"]), "lo0", CommandOutput::ok("")).is_ok());
    }

    #[test]
    fn test_ifconfig_uses_configured_path() {
        let sys = FakeSystem::new();
        let tools = Tools {
            ifconfig: "/opt/bin/ifconfig".to_string(),
            ..Tools::default()
        };
        let host = Host::new(&sys, tools);

        host.ifconfig(&["lo0"]).unwrap();
        assert_eq!(sys.commands(), vec![argv(&["/opt/bin/ifconfig", "lo0"])]);
    }

    #[test]
    fn test_system_runner_captures_exit_status() {
        let runner = SystemRunner;
        let ok = runner.run(&argv(&["sh", "-c", "echo hello"])).unwrap();
        assert!(ok.success);
        assert_eq!(ok.output, "hello");

        let failed = runner.run(&argv(&["sh", "-c", "echo oops >&2; exit 3"])).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.output, "oops");
    }

    #[test]
    fn test_system_runner_reports_missing_program() {
        let err = SystemRunner
            .run(&argv(&["/nonexistent/virtnet-test-binary"]))
            .unwrap_err();
        assert!(matches!(err, Error::CommandSpawn { .. }));
    }
}
