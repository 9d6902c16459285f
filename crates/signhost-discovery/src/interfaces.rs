//! Local IPv4 interface enumeration

use std::io;
use std::net::Ipv4Addr;

use if_addrs::IfAddr;

use crate::subnet::Subnet;

/// One IPv4 address configured on a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAddress {
    /// Interface name
    pub name: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl LocalAddress {
    #[must_use]
    pub fn subnet(&self) -> Subnet {
        Subnet::from_netmask(self.ip, self.netmask)
    }
}

/// Non-loopback, non-link-local IPv4 addresses of this machine
///
/// An interface that carries an address is treated as up.
///
/// # Errors
/// Returns the OS error if interfaces cannot be listed.
pub fn local_addresses() -> io::Result<Vec<LocalAddress>> {
    let mut out = Vec::new();
    for iface in if_addrs::get_if_addrs()? {
        if iface.is_loopback() {
            continue;
        }
        let IfAddr::V4(v4) = &iface.addr else {
            continue;
        };
        if v4.ip.is_loopback() || v4.ip.is_link_local() || v4.ip.is_unspecified() {
            continue;
        }
        out.push(LocalAddress {
            name: iface.name.clone(),
            ip: v4.ip,
            netmask: v4.netmask,
        });
    }
    Ok(out)
}

/// First usable local IPv4 address, if any
#[must_use]
pub fn primary_ipv4() -> Option<Ipv4Addr> {
    local_addresses().ok()?.first().map(|a| a.ip)
}
