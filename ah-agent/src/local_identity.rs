//! Local Identity (§3): the agent's own IPv4 address, discovered by
//! scanning non-loopback interfaces via the `netdev` crate — grounded on
//! `examples/isalcedo-FamilyCom/crates/familycomd/src/discovery.rs`'s use of
//! `netdev::get_default_interface()` — rather than hand-rolled `/proc`
//! parsing, per the original's `AHClient::setIP()`
//! (`examples/original_source/src/ahclient.cpp`), which scanned
//! `getifaddrs()` for the first interface not named `lo*`.

use anyhow::{anyhow, Result};
use std::net::Ipv4Addr;

/// Returns the first IPv4 address found on a non-loopback interface.
pub fn detect_local_ipv4() -> Result<Ipv4Addr> {
    let interfaces = netdev::get_interfaces();
    interfaces
        .iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| iface.ipv4.first().map(|net| net.addr()))
        .ok_or_else(|| anyhow!("no non-loopback IPv4 interface found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_local_ipv4_never_returns_loopback() {
        // Best-effort: CI sandboxes may have no non-loopback interface at
        // all, in which case this is a no-op rather than a failure.
        if let Ok(ip) = detect_local_ipv4() {
            assert!(!ip.is_loopback());
        }
    }
}
