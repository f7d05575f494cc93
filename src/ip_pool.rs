use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};

#[derive(Debug, PartialEq, Eq)]
pub enum AddressPoolError {
    /// The start address lies outside the usable host range.
    StartOutsideSubnet(Ipv4Addr, Ipv4Net),
    /// The IPv6 prefix cannot hold every IPv4 host offset.
    Ipv6PrefixTooSmall(Ipv6Net),
}

impl fmt::Display for AddressPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressPoolError::StartOutsideSubnet(start, net) => {
                write!(f, "start address {start} is not a host address of {net}")
            }
            AddressPoolError::Ipv6PrefixTooSmall(net) => {
                write!(f, "IPv6 prefix {net} is too small for the IPv4 subnet")
            }
        }
    }
}

impl std::error::Error for AddressPoolError {}

/// IPv4 host range handed out lowest-first from a configured offset. A
/// device's IPv6 address is derived from its IPv4 host offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPool {
    v4_subnet: Ipv4Net,
    v6_prefix: Ipv6Net,
    first: u32,
    last: u32,
}

impl AddressPool {
    pub fn new(
        v4_subnet: Ipv4Net,
        start: Ipv4Addr,
        v6_prefix: Ipv6Net,
    ) -> Result<Self, AddressPoolError> {
        let v4_subnet = v4_subnet.trunc();
        let v6_prefix = v6_prefix.trunc();

        let network = u32::from(v4_subnet.network());
        let broadcast = u32::from(v4_subnet.broadcast());
        // /31 and /32 have no network/broadcast reservation.
        let (first_host, last_host) = if v4_subnet.prefix_len() >= 31 {
            (network, broadcast)
        } else {
            (network + 1, broadcast - 1)
        };

        let start = u32::from(start);
        if start > last_host || !v4_subnet.contains(&Ipv4Addr::from(start)) {
            return Err(AddressPoolError::StartOutsideSubnet(
                Ipv4Addr::from(start),
                v4_subnet,
            ));
        }

        let v4_host_bits = 32 - u32::from(v4_subnet.prefix_len());
        let v6_host_bits = 128 - u32::from(v6_prefix.prefix_len());
        if v6_host_bits < v4_host_bits {
            return Err(AddressPoolError::Ipv6PrefixTooSmall(v6_prefix));
        }

        Ok(Self {
            v4_subnet,
            v6_prefix,
            first: start.max(first_host),
            last: last_host,
        })
    }

    pub fn v4_subnet(&self) -> Ipv4Net {
        self.v4_subnet
    }

    /// First and last candidate, inclusive, as integers.
    pub fn bounds(&self) -> (u32, u32) {
        (self.first, self.last)
    }

    /// Lowest candidate not present in `allocated`.
    ///
    /// `allocated` must be sorted ascending; values outside the range are ignored.
    pub fn first_free(&self, allocated: &[u32]) -> Option<Ipv4Addr> {
        let mut candidate = self.first;
        for &taken in allocated {
            if taken < candidate {
                continue;
            }
            if taken > candidate {
                break;
            }
            if candidate == self.last {
                return None;
            }
            candidate += 1;
        }
        (candidate <= self.last).then(|| Ipv4Addr::from(candidate))
    }

    /// IPv6 address paired with `v4`: same host offset inside the IPv6 prefix.
    pub fn ipv6_for(&self, v4: Ipv4Addr) -> Ipv6Addr {
        let offset = u32::from(v4) - u32::from(self.v4_subnet.network());
        Ipv6Addr::from(u128::from(self.v6_prefix.network()) | u128::from(offset))
    }
}
