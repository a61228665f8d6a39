//! IPv4 subnets and the sequential address allocator for container interfaces.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 subnet in CIDR notation, e.g. `192.168.1.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// The narrowest subnet that still has room for the infrastructure address and one member.
    pub const MAX_PREFIX_LEN: u8 = 29;

    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self, SubnetError> {
        if prefix_len > Self::MAX_PREFIX_LEN {
            return Err(SubnetError::PrefixTooLong(prefix_len));
        }
        let subnet = Self {
            network,
            prefix_len,
        };
        if u32::from(network) & !subnet.mask() != 0 {
            return Err(SubnetError::HostBitsSet(network, prefix_len));
        }
        Ok(subnet)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !self.mask())
    }

    fn mask(&self) -> u32 {
        // A /0 shifts every bit out.
        u32::MAX
            .checked_shl(32 - u32::from(self.prefix_len))
            .unwrap_or(0)
    }

    /// The number of member addresses: everything between the infrastructure address and the
    /// broadcast address.
    pub fn member_capacity(&self) -> u64 {
        u64::from(u32::from(self.broadcast()) - u32::from(self.network)) - 2
    }

    /// Returns the host address `offset` steps past the network address, or `None` if it is
    /// not assignable to a host.
    fn host(&self, offset: u64) -> Option<Ipv4Addr> {
        let addr = u64::from(u32::from(self.network)) + offset;
        (addr < u64::from(u32::from(self.broadcast()))).then(|| Ipv4Addr::from(addr as u32))
    }
}

impl Default for Subnet {
    fn default() -> Self {
        Self {
            network: Ipv4Addr::new(192, 168, 1, 0),
            prefix_len: 24,
        }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Subnet {
    type Err = SubnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| SubnetError::Malformed(s.to_owned()))?;
        let network = addr
            .parse()
            .map_err(|_| SubnetError::Malformed(s.to_owned()))?;
        let prefix_len = len
            .parse()
            .map_err(|_| SubnetError::Malformed(s.to_owned()))?;
        Self::new(network, prefix_len)
    }
}

impl TryFrom<String> for Subnet {
    type Error = SubnetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

/// An address assigned to an interface, together with its prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_new::new)]
pub struct InterfaceAddr {
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

impl fmt::Display for InterfaceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// Hands out member addresses sequentially from a subnet.
///
/// Offset 1 is the shared infrastructure address; member ordinal `k` receives
/// `network + 2 + k`. Addresses are never reused within one allocator.
#[derive(Debug, Clone)]
pub struct IpAllocator {
    subnet: Subnet,
    next: usize,
}

impl IpAllocator {
    pub fn new(subnet: Subnet) -> Self {
        Self { subnet, next: 0 }
    }

    /// The address of the infrastructure nodes.
    pub fn infrastructure(&self) -> Result<InterfaceAddr, AllocError> {
        self.subnet
            .host(1)
            .map(|addr| InterfaceAddr::new(addr, self.subnet.prefix_len))
            .ok_or(AllocError::RangeExhausted {
                subnet: self.subnet,
                ordinal: 0,
            })
    }

    /// The address of member ordinal `ordinal`. Pure: does not advance the allocator.
    pub fn address_at(&self, ordinal: usize) -> Result<InterfaceAddr, AllocError> {
        self.subnet
            .host(2 + ordinal as u64)
            .map(|addr| InterfaceAddr::new(addr, self.subnet.prefix_len))
            .ok_or(AllocError::RangeExhausted {
                subnet: self.subnet,
                ordinal,
            })
    }

    /// Allocates the next member address.
    pub fn next_address(&mut self) -> Result<InterfaceAddr, AllocError> {
        let addr = self.address_at(self.next)?;
        self.next += 1;
        Ok(addr)
    }
}

/// Error parsing a [`Subnet`].
#[derive(Debug, thiserror::Error)]
pub enum SubnetError {
    /// Not of the form `a.b.c.d/len`.
    #[error("malformed subnet {0:?} (expected a.b.c.d/len)")]
    Malformed(String),

    /// The prefix leaves no room for hosts.
    #[error("prefix length /{0} is too long (at most /{max})", max = Subnet::MAX_PREFIX_LEN)]
    PrefixTooLong(u8),

    /// The network address has host bits set.
    #[error("{0}/{1} has host bits set")]
    HostBitsSet(Ipv4Addr, u8),
}

/// Error allocating an address.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// The subnet has no host address left for this ordinal.
    #[error("subnet {subnet} has no address left for member {ordinal}")]
    RangeExhausted { subnet: Subnet, ordinal: usize },
}
