// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Domain Models
//!
//! Declaration builders and the value objects they validate.
//!
//! # Value Objects with Invariants
//!
//! - [`CidrBlock`] - IPv4 address block without host bits
//! - [`PortRange`] - inclusive, non-reversed port range
//! - [`ResourceKind`] - provider resource taxonomy
//!
//! # Builders
//!
//! - [`NetworkSpec`] - network, subnets, gateways and routes
//! - [`AccessPolicySet`] - per-tier security groups
//! - [`InstanceSpec`] - one compute instance per role
//!
//! Builders register resources with a [`crate::resolver::Resolver`] and hand
//! back entity references for the declarations that follow.

pub mod access_policy;
pub mod instance;
pub mod network;
pub mod resource_type;
pub mod topology;

pub use access_policy::{
    AccessPolicySet, AccessPolicySpec, DeclaredPolicies, Peer, PortRange, Protocol, Rule, Tier,
    ADMIN_PORT,
};
pub use instance::{InstanceSpec, Role, RootVolume};
pub use network::{CidrBlock, NetworkError};
pub use resource_type::{ResourceCategory, ResourceKind};
pub use topology::{
    DeclaredNetwork, GatewayTarget, NetworkSpec, RouteSpec, SubnetSpec, Visibility,
};
