use zerocopy::{Immutable, IntoBytes, NetworkEndian, U128, U32};

//------------ AddressFamily (trait) ----------------------------------------

/// The address family of an IP address as a trait.
///
/// Each family gets its own exactly-sized type, so a trie over IPv4
/// addresses only ever pays for four octets per stored path. The trie
/// engine walks addresses one octet at a time, so next to the usual
/// conversions the trait provides octet access, octet substitution (used
/// when a matched prefix is reconstructed from a position in the trie) and
/// truncation to a prefix length (used to canonicalize incoming prefixes).
pub trait AddressFamily:
    std::fmt::Debug + std::hash::Hash + Eq + Copy + IntoBytes + Immutable
{
    /// The number of bits in the byte representation of the family.
    const BITS: u8;

    /// The number of 8-bit strides in an address of this family.
    const STRIDES: usize;

    type InnerIpAddr;

    fn from_ipaddr(ip_addr: Self::InnerIpAddr) -> Self;

    fn into_ipaddr(self) -> std::net::IpAddr;

    fn zero() -> Self;

    /// The octet at `depth`, most-significant first.
    fn octet(&self, depth: usize) -> u8 {
        self.as_bytes()[depth]
    }

    /// A copy of self with the octet at `depth` replaced.
    fn with_octet(self, depth: usize, octet: u8) -> Self;

    /// Clean out all bits beyond `len`. Used to canonicalize prefixes and
    /// to compare a covering prefix against a longer one.
    fn truncate_to_len(self, len: u8) -> Self;
}

//-------------- Ipv4 Type --------------------------------------------------

/// Exactly fitting IPv4 bytes (4 octets).
pub type IPv4 = U32<NetworkEndian>;

impl AddressFamily for IPv4 {
    const BITS: u8 = 32;
    const STRIDES: usize = 4;
    type InnerIpAddr = std::net::Ipv4Addr;

    fn from_ipaddr(ip_addr: Self::InnerIpAddr) -> Self {
        IPv4::from(ip_addr.octets())
    }

    fn into_ipaddr(self) -> std::net::IpAddr {
        std::net::IpAddr::V4(std::net::Ipv4Addr::from(u32::from(self)))
    }

    fn zero() -> Self {
        0.into()
    }

    fn with_octet(self, depth: usize, octet: u8) -> Self {
        let mut bytes = u32::from(self).to_be_bytes();
        bytes[depth] = octet;
        IPv4::from(bytes)
    }

    fn truncate_to_len(self, len: u8) -> Self {
        match len {
            0 => U32::new(0),
            1..=31 => {
                (self >> U32::from(32 - len as u32))
                    << U32::from(32 - len as u32)
            }
            32 => self,
            len => panic!("Can't truncate to more than 32 bits: {}", len),
        }
    }
}

//-------------- Ipv6 Type --------------------------------------------------

/// Exactly fitting IPv6 bytes (16 octets).
pub type IPv6 = U128<NetworkEndian>;

impl AddressFamily for IPv6 {
    const BITS: u8 = 128;
    const STRIDES: usize = 16;
    type InnerIpAddr = std::net::Ipv6Addr;

    fn from_ipaddr(ip_addr: Self::InnerIpAddr) -> Self {
        IPv6::from(ip_addr.octets())
    }

    fn into_ipaddr(self) -> std::net::IpAddr {
        std::net::IpAddr::V6(std::net::Ipv6Addr::from(u128::from(self)))
    }

    fn zero() -> Self {
        0.into()
    }

    fn with_octet(self, depth: usize, octet: u8) -> Self {
        let mut bytes = u128::from(self).to_be_bytes();
        bytes[depth] = octet;
        IPv6::from(bytes)
    }

    fn truncate_to_len(self, len: u8) -> Self {
        match len {
            0 => U128::new(0),
            1..=127 => {
                (self >> U128::from(128 - len as u128))
                    << U128::from(128 - len as u128)
            }
            128 => self,
            len => panic!("Can't truncate to more than 128 bits: {}", len),
        }
    }
}
