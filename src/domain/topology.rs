// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Topology Builder
//!
//! Declares an isolated network with public and private partitions and the
//! gateways connecting them to the outside world.
//!
//! # Layout
//!
//! ```text
//!                    internet
//!                       │
//!                 internet gateway
//!                       │
//!   public route table (0.0.0.0/0 → igw)
//!     ├── public subnet(s) ── NAT gateway (+ elastic IP)
//!                                 │
//!   private route table (0.0.0.0/0 → nat)
//!     └── private subnet(s)
//! ```
//!
//! # Invariants
//!
//! - Every subnet block is contained in the network block
//! - Subnet blocks are pairwise disjoint
//! - Subnet names are unique
//! - Private subnets require a NAT gateway hosted in a public subnet

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{CidrBlock, ResourceKind};
use crate::errors::DeclarationError;
use crate::resolver::{EntityRef, Resource, ResourceArgs, Resolver};

/// Whether a subnet is reachable from outside the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Instances get externally reachable addresses; default route via internet gateway
    Public,
    /// No external addresses; default route via NAT gateway
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// One address partition of a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub name: String,
    pub cidr: CidrBlock,
    pub availability_zone: String,
    pub visibility: Visibility,
}

impl SubnetSpec {
    pub fn public(name: impl Into<String>, cidr: CidrBlock, zone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr,
            availability_zone: zone.into(),
            visibility: Visibility::Public,
        }
    }

    pub fn private(name: impl Into<String>, cidr: CidrBlock, zone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr,
            availability_zone: zone.into(),
            visibility: Visibility::Private,
        }
    }
}

/// Gateway a default route points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayTarget {
    InternetGateway,
    NatGateway,
}

/// Binds a partition's route table to a gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub route_table: Visibility,
    pub destination: CidrBlock,
    pub target: GatewayTarget,
}

/// Isolated network with its subnets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Prefix for every resource name
    pub name: String,
    pub cidr: CidrBlock,
    pub enable_dns_support: bool,
    pub enable_dns_hostnames: bool,
    pub subnets: Vec<SubnetSpec>,
    /// Public subnet hosting the NAT gateway
    pub nat_subnet: Option<String>,
    /// Tags applied to every resource in addition to `Name`
    pub tags: BTreeMap<String, String>,
}

impl NetworkSpec {
    /// Network with DNS support and hostnames enabled and no subnets
    pub fn new(name: impl Into<String>, cidr: CidrBlock) -> Self {
        Self {
            name: name.into(),
            cidr,
            enable_dns_support: true,
            enable_dns_hostnames: true,
            subnets: Vec::new(),
            nat_subnet: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_subnet(mut self, subnet: SubnetSpec) -> Self {
        self.subnets.push(subnet);
        self
    }

    /// Host the NAT gateway in the named public subnet
    pub fn with_nat_in(mut self, subnet: impl Into<String>) -> Self {
        self.nat_subnet = Some(subnet.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn subnet(&self, name: &str) -> Option<&SubnetSpec> {
        self.subnets.iter().find(|s| s.name == name)
    }

    /// Subnets of one partition in declaration order
    pub fn subnets_with(&self, visibility: Visibility) -> impl Iterator<Item = &SubnetSpec> {
        self.subnets
            .iter()
            .filter(move |s| s.visibility == visibility)
    }

    /// Default routes implied by the partitions present
    pub fn routes(&self) -> Vec<RouteSpec> {
        let mut routes = Vec::new();
        if self.subnets_with(Visibility::Public).next().is_some() {
            routes.push(RouteSpec {
                route_table: Visibility::Public,
                destination: CidrBlock::ANY,
                target: GatewayTarget::InternetGateway,
            });
        }
        if self.subnets_with(Visibility::Private).next().is_some() {
            routes.push(RouteSpec {
                route_table: Visibility::Private,
                destination: CidrBlock::ANY,
                target: GatewayTarget::NatGateway,
            });
        }
        routes
    }

    /// Check the addressing invariants
    pub fn validate(&self) -> Result<(), DeclarationError> {
        let mut names = BTreeSet::new();
        for subnet in &self.subnets {
            if !names.insert(subnet.name.as_str()) {
                return Err(invalid(format!("subnet name {} is used twice", subnet.name)));
            }
            if !self.cidr.contains(&subnet.cidr) {
                return Err(invalid(format!(
                    "subnet {} ({}) is outside network {}",
                    subnet.name, subnet.cidr, self.cidr
                )));
            }
        }

        for (i, a) in self.subnets.iter().enumerate() {
            for b in &self.subnets[i + 1..] {
                if a.cidr.overlaps(&b.cidr) {
                    return Err(invalid(format!(
                        "subnets {} ({}) and {} ({}) overlap",
                        a.name, a.cidr, b.name, b.cidr
                    )));
                }
            }
        }

        let has_private = self.subnets_with(Visibility::Private).next().is_some();
        match (&self.nat_subnet, has_private) {
            (None, true) => {
                return Err(invalid(
                    "private subnets require a NAT gateway subnet".to_string(),
                ))
            }
            (Some(nat), _) => match self.subnet(nat) {
                Some(s) if s.visibility == Visibility::Public => {}
                Some(_) => {
                    return Err(invalid(format!("NAT gateway subnet {} is not public", nat)))
                }
                None => return Err(invalid(format!("NAT gateway subnet {} is not declared", nat))),
            },
            (None, false) => {}
        }

        Ok(())
    }

    /// Validate and register every network resource with the resolver
    pub fn declare(&self, resolver: &mut Resolver) -> Result<DeclaredNetwork, DeclarationError> {
        self.validate()?;

        let vpc = resolver.declare(
            Resource::new(
                self.resource_name("vpc"),
                ResourceKind::Network,
                ResourceArgs::new()
                    .set("cidr_block", self.cidr.to_string())
                    .set("enable_dns_support", self.enable_dns_support)
                    .set("enable_dns_hostnames", self.enable_dns_hostnames)
                    .tags(&self.tags_for(&self.resource_name("vpc"))),
            ),
            &[],
        )?;

        let mut subnets = BTreeMap::new();
        for subnet in &self.subnets {
            let entity = resolver.declare(
                Resource::new(
                    subnet.name.clone(),
                    ResourceKind::Subnet,
                    ResourceArgs::new()
                        .set_deferred("vpc_id", &vpc.id())
                        .set("cidr_block", subnet.cidr.to_string())
                        .set("availability_zone", subnet.availability_zone.clone())
                        .set(
                            "map_public_ip_on_launch",
                            subnet.visibility == Visibility::Public,
                        )
                        .tags(&self.tags_for(&subnet.name)),
                ),
                &[],
            )?;
            subnets.insert(subnet.name.clone(), entity);
        }

        let igw_name = self.resource_name("igw");
        let internet_gateway = resolver.declare(
            Resource::new(
                igw_name.clone(),
                ResourceKind::InternetGateway,
                ResourceArgs::new()
                    .set_deferred("vpc_id", &vpc.id())
                    .tags(&self.tags_for(&igw_name)),
            ),
            &[],
        )?;

        let mut elastic_ip = None;
        let mut nat_gateway = None;
        if let Some(nat_subnet) = &self.nat_subnet {
            let eip_name = self.resource_name("nat-eip");
            let eip = resolver.declare(
                Resource::new(
                    eip_name.clone(),
                    ResourceKind::ElasticIp,
                    ResourceArgs::new()
                        .set("domain", "vpc")
                        .tags(&self.tags_for(&eip_name)),
                ),
                &[],
            )?;

            let nat_name = self.resource_name("nat-gateway");
            let host = lookup(&subnets, nat_subnet)?;
            // The NAT gateway needs the internet gateway attached before it can route
            let nat = resolver.declare(
                Resource::new(
                    nat_name.clone(),
                    ResourceKind::NatGateway,
                    ResourceArgs::new()
                        .set_deferred("allocation_id", &eip.id())
                        .set_deferred("subnet_id", &host.id())
                        .tags(&self.tags_for(&nat_name)),
                ),
                &[internet_gateway.clone()],
            )?;
            elastic_ip = Some(eip);
            nat_gateway = Some(nat);
        }

        let mut route_tables = BTreeMap::new();
        let mut routes = BTreeMap::new();
        for route in self.routes() {
            let prefix = route.route_table.as_str();
            let rt_name = self.resource_name(&format!("{}-rt", prefix));
            let table = resolver.declare(
                Resource::new(
                    rt_name.clone(),
                    ResourceKind::RouteTable,
                    ResourceArgs::new()
                        .set_deferred("vpc_id", &vpc.id())
                        .tags(&self.tags_for(&rt_name)),
                ),
                &[],
            )?;

            let args = ResourceArgs::new()
                .set_deferred("route_table_id", &table.id())
                .set("destination_cidr_block", route.destination.to_string());
            let args = match (route.target, &nat_gateway) {
                (GatewayTarget::InternetGateway, _) => {
                    args.set_deferred("gateway_id", &internet_gateway.id())
                }
                (GatewayTarget::NatGateway, Some(nat)) => {
                    args.set_deferred("nat_gateway_id", &nat.id())
                }
                (GatewayTarget::NatGateway, None) => {
                    return Err(invalid("private route without a NAT gateway".to_string()))
                }
            };
            let entity = resolver.declare(
                Resource::new(
                    self.resource_name(&format!("{}-route", prefix)),
                    ResourceKind::Route,
                    args,
                ),
                &[],
            )?;

            route_tables.insert(route.route_table, table);
            routes.insert(route.route_table, entity);
        }

        let mut associations = BTreeMap::new();
        for visibility in [Visibility::Public, Visibility::Private] {
            let Some(table) = route_tables.get(&visibility) else {
                continue;
            };
            for (k, subnet) in self.subnets_with(visibility).enumerate() {
                let entity = resolver.declare(
                    Resource::new(
                        self.resource_name(&format!("{}-rt-assoc-{}", visibility.as_str(), k + 1)),
                        ResourceKind::RouteTableAssociation,
                        ResourceArgs::new()
                            .set_deferred("subnet_id", &lookup(&subnets, &subnet.name)?.id())
                            .set_deferred("route_table_id", &table.id()),
                    ),
                    &[],
                )?;
                associations.insert(subnet.name.clone(), entity);
            }
        }

        debug!(
            "Declared network {} with {} subnets and {} routes",
            self.name,
            subnets.len(),
            routes.len()
        );

        Ok(DeclaredNetwork {
            vpc,
            subnets,
            internet_gateway,
            elastic_ip,
            nat_gateway,
            route_tables,
            routes,
            associations,
        })
    }

    fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name, suffix)
    }

    fn tags_for(&self, name: &str) -> BTreeMap<String, String> {
        let mut tags = self.tags.clone();
        tags.insert("Name".to_string(), name.to_string());
        tags
    }
}

/// Handles to the declared network resources
#[derive(Debug, Clone)]
pub struct DeclaredNetwork {
    pub vpc: EntityRef,
    pub subnets: BTreeMap<String, EntityRef>,
    pub internet_gateway: EntityRef,
    pub elastic_ip: Option<EntityRef>,
    pub nat_gateway: Option<EntityRef>,
    pub route_tables: BTreeMap<Visibility, EntityRef>,
    pub routes: BTreeMap<Visibility, EntityRef>,
    /// Route table association per subnet name
    pub associations: BTreeMap<String, EntityRef>,
}

impl DeclaredNetwork {
    pub fn subnet(&self, name: &str) -> Result<&EntityRef, DeclarationError> {
        lookup(&self.subnets, name)
    }

    pub fn association(&self, subnet: &str) -> Result<&EntityRef, DeclarationError> {
        lookup(&self.associations, subnet)
    }

    pub fn route(&self, visibility: Visibility) -> Result<&EntityRef, DeclarationError> {
        self.routes
            .get(&visibility)
            .ok_or_else(|| invalid(format!("no {} route declared", visibility.as_str())))
    }

    pub fn nat_gateway(&self) -> Result<&EntityRef, DeclarationError> {
        self.nat_gateway
            .as_ref()
            .ok_or_else(|| invalid("no NAT gateway declared".to_string()))
    }
}

fn lookup<'a>(
    map: &'a BTreeMap<String, EntityRef>,
    name: &str,
) -> Result<&'a EntityRef, DeclarationError> {
    map.get(name)
        .ok_or_else(|| DeclarationError::UnknownEntity(name.to_string()))
}

fn invalid(message: String) -> DeclarationError {
    DeclarationError::InvalidTopology(message)
}
