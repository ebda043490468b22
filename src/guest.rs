//! Guest runtime access
//!
//! Guests are VNET jails named after their UUID. virtnet never starts or
//! stops a guest; it only asks whether one is running and runs commands
//! inside its network namespace.

use crate::error::Result;
use crate::exec::{CommandOutput, Host};

/// Running-guest queries and namespace-scoped command execution
pub trait GuestRuntime {
    /// Whether the guest's process and network namespace currently exist
    fn is_running(&self, guest: &str) -> bool;

    /// Run `argv` inside the guest's network namespace
    fn run_in_namespace(&self, guest: &str, argv: &[String]) -> Result<CommandOutput>;
}

/// Guest runtime backed by jls(8) and jexec(8)
pub struct JailRuntime<'h, 'r> {
    host: &'h Host<'r>,
}

impl<'h, 'r> JailRuntime<'h, 'r> {
    pub fn new(host: &'h Host<'r>) -> Self {
        Self { host }
    }
}

impl GuestRuntime for JailRuntime<'_, '_> {
    fn is_running(&self, guest: &str) -> bool {
        let argv = vec![
            self.host.tools().jls.clone(),
            "-j".to_string(),
            guest.to_string(),
            "jid".to_string(),
        ];

        // jls exits non-zero for an unknown jail
        self.host
            .run(&argv)
            .map(|out| out.success)
            .unwrap_or(false)
    }

    fn run_in_namespace(&self, guest: &str, argv: &[String]) -> Result<CommandOutput> {
        let mut full = Vec::with_capacity(argv.len() + 2);
        full.push(self.host.tools().jexec.clone());
        full.push(guest.to_string());
        full.extend(argv.iter().cloned());
        self.host.run(&full)
    }
}
