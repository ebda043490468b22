//! Interface presence queries
//!
//! The kernel's interface list is the only record of whether a bridge or
//! epair is online. Nothing here caches.

use crate::exec::Host;

/// Whether `interface` currently exists on the host
///
/// Any failure, including a failure to run ifconfig at all, reads as
/// offline.
pub fn is_online(host: &Host<'_>, interface: &str) -> bool {
    host.ifconfig(&[interface])
        .map(|out| out.success)
        .unwrap_or(false)
}
