// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provider Resource Kinds
//!
//! The vocabulary of resources a stack can declare. Each kind knows the
//! identifier prefix the provider uses for it and the category it belongs
//! to, which drives subject routing for provisioning events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider resource taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    // Network topology
    /// Isolated virtual network
    Network,
    /// Address partition of a network
    Subnet,
    /// Gateway to the public internet
    InternetGateway,
    /// Static public address
    ElasticIp,
    /// Outbound address translation for private subnets
    NatGateway,
    /// Route table
    RouteTable,
    /// Single route inside a route table
    Route,
    /// Binding of a subnet to a route table
    RouteTableAssociation,

    // Access control
    /// Traffic-filtering rule set
    SecurityGroup,
    /// Single rule attached to a rule set after both ends exist
    SecurityGroupRule,

    // Compute
    /// Compute instance
    Instance,
}

/// High-level grouping of resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Network,
    Security,
    Compute,
}

impl ResourceKind {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::InternetGateway => "internet_gateway",
            Self::ElasticIp => "elastic_ip",
            Self::NatGateway => "nat_gateway",
            Self::RouteTable => "route_table",
            Self::Route => "route",
            Self::RouteTableAssociation => "route_table_association",
            Self::SecurityGroup => "security_group",
            Self::SecurityGroupRule => "security_group_rule",
            Self::Instance => "instance",
        }
    }

    /// Prefix of provider-assigned identifiers
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Network => "vpc",
            Self::Subnet => "subnet",
            Self::InternetGateway => "igw",
            Self::ElasticIp => "eipalloc",
            Self::NatGateway => "nat",
            Self::RouteTable => "rtb",
            Self::Route => "r",
            Self::RouteTableAssociation => "rtbassoc",
            Self::SecurityGroup => "sg",
            Self::SecurityGroupRule => "sgr",
            Self::Instance => "i",
        }
    }

    /// Get the resource category
    pub fn category(&self) -> ResourceCategory {
        match self {
            Self::Network
            | Self::Subnet
            | Self::InternetGateway
            | Self::ElasticIp
            | Self::NatGateway
            | Self::RouteTable
            | Self::Route
            | Self::RouteTableAssociation => ResourceCategory::Network,
            Self::SecurityGroup | Self::SecurityGroupRule => ResourceCategory::Security,
            Self::Instance => ResourceCategory::Compute,
        }
    }

    /// Check if this kind gets a private address from its subnet
    pub fn is_addressable(&self) -> bool {
        matches!(self, Self::Instance)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResourceCategory {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Security => "security",
            Self::Compute => "compute",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(ResourceKind::NatGateway.category(), ResourceCategory::Network);
        assert_eq!(ResourceKind::SecurityGroup.category(), ResourceCategory::Security);
        assert_eq!(ResourceKind::Instance.category(), ResourceCategory::Compute);
    }

    #[test]
    fn test_serialization_matches_as_str() {
        for kind in [
            ResourceKind::Network,
            ResourceKind::RouteTableAssociation,
            ResourceKind::SecurityGroupRule,
            ResourceKind::Instance,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_only_instances_are_addressable() {
        assert!(ResourceKind::Instance.is_addressable());
        assert!(!ResourceKind::Subnet.is_addressable());
    }
}
