//! IPv4 subnet arithmetic for scan ranges

use std::fmt;
use std::net::Ipv4Addr;

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

/// A scan range: the network around one local (or override) address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
    /// The address the range was derived from; never dialed
    anchor: Ipv4Addr,
    /// Other local addresses inside the range; never dialed either
    local: Vec<Ipv4Addr>,
}

impl Subnet {
    #[must_use]
    pub fn new(anchor: Ipv4Addr, prefix: u8) -> Self {
        let prefix = prefix.min(32);
        Self {
            network: Ipv4Addr::from(u32::from(anchor) & mask(prefix)),
            prefix,
            anchor,
            local: Vec::new(),
        }
    }

    /// Subnet of an interface address given its netmask
    #[must_use]
    pub fn from_netmask(anchor: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        let prefix = u32::from(netmask).leading_ones();
        Self::new(anchor, u8::try_from(prefix).unwrap_or(32))
    }

    /// The /24 containing `anchor`
    #[must_use]
    pub fn around(anchor: Ipv4Addr) -> Self {
        Self::new(anchor, 24)
    }

    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    #[must_use]
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    #[must_use]
    pub fn anchor(&self) -> Ipv4Addr {
        self.anchor
    }

    #[must_use]
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix))
    }

    /// Usable host addresses, excluding network and broadcast
    #[must_use]
    pub fn host_count(&self) -> u64 {
        if self.prefix >= 31 {
            0
        } else {
            (1_u64 << (32 - u32::from(self.prefix))) - 2
        }
    }

    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & mask(self.prefix) == u32::from(self.network)
    }

    /// Local addresses besides the anchor that are skipped
    #[must_use]
    pub fn local_addresses(&self) -> &[Ipv4Addr] {
        &self.local
    }

    /// Also skip `ip` when it falls inside this range
    #[must_use]
    pub fn excluding(mut self, ip: Ipv4Addr) -> Self {
        if ip != self.anchor && self.contains(ip) && !self.local.contains(&ip) {
            self.local.push(ip);
        }
        self
    }

    /// Collapse to the anchor's /24 when wider than `max_hosts`
    #[must_use]
    pub fn clamped(self, max_hosts: u64) -> Self {
        if self.host_count() > max_hosts {
            let local = self.local.clone();
            local
                .into_iter()
                .fold(Self::around(self.anchor), Self::excluding)
        } else {
            self
        }
    }

    /// Whether two ranges cover the same addresses
    #[must_use]
    pub fn same_range(&self, other: &Subnet) -> bool {
        self.network == other.network && self.prefix == other.prefix
    }

    /// Addresses to dial: every usable host except the local ones
    pub fn candidates(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let anchor = u32::from(self.anchor);
        let local: Vec<u32> = self.local.iter().copied().map(u32::from).collect();
        let range = if self.prefix >= 31 {
            0..0
        } else {
            (u32::from(self.network) + 1)..u32::from(self.broadcast())
        };
        range
            .filter(move |a| *a != anchor && !local.contains(a))
            .map(Ipv4Addr::from)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Clamp every range and drop ranges already covered
///
/// Every input anchor is excluded from each range that contains it, so a
/// host with several addresses on one network never dials itself.
#[must_use]
pub fn normalize(subnets: impl IntoIterator<Item = Subnet>, max_hosts: u64) -> Vec<Subnet> {
    let subnets: Vec<Subnet> = subnets.into_iter().collect();
    let anchors: Vec<Ipv4Addr> = subnets.iter().map(Subnet::anchor).collect();

    let mut out: Vec<Subnet> = Vec::new();
    for subnet in subnets {
        let subnet = subnet.clamped(max_hosts);
        if !out.iter().any(|s| s.same_range(&subnet)) {
            out.push(subnet);
        }
    }
    out.into_iter()
        .map(|subnet| anchors.iter().copied().fold(subnet, Subnet::excluding))
        .collect()
}
