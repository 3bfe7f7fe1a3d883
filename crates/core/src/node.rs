use std::fmt::Display;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Identity of a mesh node, backed by its IPv4 address.
///
/// The unspecified address (`0.0.0.0`) acts as the "no such node" sentinel
/// and is rejected wherever a real endpoint is required. Ordering is by the
/// address's numeric value, which is what pair canonicalization relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ipv4Addr);

impl NodeId {
    pub const fn new(addr: Ipv4Addr) -> Self {
        NodeId(addr)
    }

    /// True for the `0.0.0.0` sentinel.
    pub fn is_unspecified(&self) -> bool {
        self.0.is_unspecified()
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.0
    }
}

impl From<Ipv4Addr> for NodeId {
    fn from(addr: Ipv4Addr) -> Self {
        NodeId(addr)
    }
}

impl From<[u8; 4]> for NodeId {
    fn from(octets: [u8; 4]) -> Self {
        NodeId(Ipv4Addr::from(octets))
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 48-bit link-layer address of a wireless interface, resolved to a [`NodeId`]
/// through the prober when looking up transmit rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkAddr([u8; 6]);

impl LinkAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        LinkAddr(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for LinkAddr {
    fn from(octets: [u8; 6]) -> Self {
        LinkAddr(octets)
    }
}

impl Display for LinkAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
