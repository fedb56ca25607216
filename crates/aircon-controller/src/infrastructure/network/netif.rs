//! Enumeration of usable local IPv4 interfaces.
//!
//! Discovery announces the controller once per usable interface.  "Usable"
//! means: not internal (loopback), carries at least one IPv4 address, and
//! the interface name does not match the denylist of virtual/tunnel adapter
//! fragments.  Announcing on a VM host-only adapter or a VPN tunnel never
//! reaches the appliance and only wastes a listener slot.
//!
//! Enumerated fresh on every discovery attempt; never cached.

use std::net::Ipv4Addr;

use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::IpNetwork;
use tracing::debug;

/// Interface-name fragments that identify virtual or tunnel adapters.
pub const IGNORED_NAME_FRAGMENTS: [&str; 4] = ["vmnet", "vboxnet", "vnic", "tun"];

/// One usable local IPv4 address and the interface it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterfaceDescriptor {
    /// OS interface name (e.g. `eth0`, `en1`).
    pub name: String,
    /// The interface's IPv4 address.
    pub address: Ipv4Addr,
}

/// Enumerates all usable local IPv4 addresses.
///
/// Returns an empty vector if none qualify; the caller treats that as a
/// discovery failure.  No side effects.
pub fn list() -> Vec<NetworkInterfaceDescriptor> {
    let descriptors = descriptors_from(datalink::interfaces());
    debug!(count = descriptors.len(), "enumerated usable IPv4 interfaces");
    descriptors
}

/// Filters an explicit interface list down to usable IPv4 descriptors.
///
/// Split out from [`list`] so the filtering rules can be exercised without
/// touching the host's real interface table.
pub fn descriptors_from(interfaces: Vec<NetworkInterface>) -> Vec<NetworkInterfaceDescriptor> {
    interfaces
        .into_iter()
        .filter(|interface| !interface.is_loopback() && !is_denylisted(&interface.name))
        .flat_map(|interface| {
            let name = interface.name.clone();
            interface
                .ips
                .into_iter()
                .filter_map(|network| match network {
                    IpNetwork::V4(v4) => Some(v4.ip()),
                    IpNetwork::V6(_) => None,
                })
                .filter(|address| !address.is_loopback())
                .map(move |address| NetworkInterfaceDescriptor {
                    name: name.clone(),
                    address,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn is_denylisted(name: &str) -> bool {
    IGNORED_NAME_FRAGMENTS
        .iter()
        .any(|fragment| name.contains(fragment))
}
