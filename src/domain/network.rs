// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4)")]
    InvalidPrefixLength(u8),

    #[error("Host bits set in {0}; expected network address {1}")]
    HostBitsSet(String, String),
}

/// IPv4 address block value object
///
/// Represents a network address together with its prefix length.
/// Invariants:
/// - Valid IPv4 address
/// - Prefix length 0-32
/// - No host bits set (`10.0.1.0/24`, never `10.0.1.7/24`)
///
/// # Examples
///
/// ```rust
/// use stack_provision::domain::CidrBlock;
///
/// let vpc = CidrBlock::new("10.0.0.0/16").unwrap();
/// let subnet = CidrBlock::new("10.0.3.0/24").unwrap();
/// assert!(vpc.contains(&subnet));
/// assert_eq!(subnet.to_string(), "10.0.3.0/24");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock {
    network: Ipv4Addr,
    prefix_length: u8,
}

impl CidrBlock {
    /// The whole IPv4 space, used for default routes and open rules
    pub const ANY: CidrBlock = CidrBlock {
        network: Ipv4Addr::UNSPECIFIED,
        prefix_length: 0,
    };

    /// Parse a block in CIDR notation
    ///
    /// # Invariants
    /// - Valid IPv4 address and prefix
    /// - Address must be the network address of the block
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        Self::from_parts(address, prefix_length)
    }

    /// Create from separate address and prefix
    pub fn from_parts(address: Ipv4Addr, prefix_length: u8) -> Result<Self, NetworkError> {
        if prefix_length > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        let network = Ipv4Addr::from(u32::from(address) & mask(prefix_length));
        if network != address {
            return Err(NetworkError::HostBitsSet(
                format!("{}/{}", address, prefix_length),
                format!("{}/{}", network, prefix_length),
            ));
        }

        Ok(Self {
            network,
            prefix_length,
        })
    }

    /// Network address of the block
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_length))
    }

    /// Last address of the block
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix_length))
    }

    /// Check whether an address falls inside the block
    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix_length) == u32::from(self.network)
    }

    /// Check whether `other` lies entirely inside this block
    pub fn contains(&self, other: &CidrBlock) -> bool {
        other.prefix_length >= self.prefix_length && self.contains_addr(other.network)
    }

    /// Check whether two blocks share any address
    pub fn overlaps(&self, other: &CidrBlock) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// The `n`-th address of the block, if it exists
    pub fn nth(&self, n: u32) -> Option<Ipv4Addr> {
        if u64::from(n) >= self.size() {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.network) + n))
    }
}

fn mask(prefix_length: u8) -> u32 {
    match prefix_length {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_length)
    }
}

impl FromStr for CidrBlock {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CidrBlock> for String {
    fn from(block: CidrBlock) -> Self {
        block.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_block() {
        let block = CidrBlock::new("10.0.1.0/24").unwrap();
        assert_eq!(block.network().to_string(), "10.0.1.0");
        assert_eq!(block.prefix_length(), 24);
        assert_eq!(block.size(), 256);
        assert_eq!(block.broadcast().to_string(), "10.0.1.255");
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(CidrBlock::new("10.0.1.0").is_err()); // No prefix
        assert!(CidrBlock::new("999.0.1.0/24").is_err());
        assert!(CidrBlock::new("10.0.1.0/33").is_err());
        assert!(matches!(
            CidrBlock::new("10.0.1.7/24"),
            Err(NetworkError::HostBitsSet(_, _))
        ));
    }

    #[test]
    fn test_containment() {
        let vpc = CidrBlock::new("10.0.0.0/16").unwrap();
        let public = CidrBlock::new("10.0.1.0/24").unwrap();
        let outside = CidrBlock::new("10.1.0.0/24").unwrap();

        assert!(vpc.contains(&public));
        assert!(!public.contains(&vpc));
        assert!(!vpc.contains(&outside));
        assert!(CidrBlock::ANY.contains(&vpc));
    }

    #[test]
    fn test_overlap() {
        let a = CidrBlock::new("10.0.1.0/24").unwrap();
        let b = CidrBlock::new("10.0.2.0/24").unwrap();
        let wide = CidrBlock::new("10.0.0.0/22").unwrap();

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&wide));
        assert!(wide.overlaps(&b));
    }

    #[test]
    fn test_nth_address() {
        let block = CidrBlock::new("10.0.3.0/24").unwrap();
        assert_eq!(block.nth(55), Some(Ipv4Addr::new(10, 0, 3, 55)));
        assert_eq!(block.nth(256), None);
    }

    #[test]
    fn test_serde_as_string() {
        let block = CidrBlock::new("10.0.0.0/16").unwrap();
        let json = serde_json::to_string(&block).unwrap();
        assert_eq!(json, "\"10.0.0.0/16\"");
        let back: CidrBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
        assert!(serde_json::from_str::<CidrBlock>("\"10.0.0.1/16\"").is_err());
    }
}
