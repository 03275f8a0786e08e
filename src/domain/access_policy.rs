// Copyright (c) 2025 - Cowboy AI, Inc.
//! Access Policy Builder
//!
//! Per-tier traffic filtering rules (security groups).
//!
//! # Tier Isolation
//!
//! ```text
//! internet ──▶ edge ──▶ application ──▶ data
//!                                   └─▶ messaging
//! ```
//!
//! Cross-tier ingress names the upstream tier's policy identity, never a raw
//! address block. A data-tier database port is therefore only reachable from
//! instances carrying the application-tier policy, wherever they are placed.
//! Raw address blocks are accepted for ingress on the edge tier and for
//! administrative SSH on every tier.
//!
//! # Declaration Order
//!
//! A group is declared after every group its ingress admits, so inline
//! ingress can name their ids. Egress towards another policy usually points
//! downstream, against that order, and is declared as a standalone
//! [`ResourceKind::SecurityGroupRule`] once both groups exist.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use super::{CidrBlock, ResourceKind};
use crate::deferred::{self, Deferred};
use crate::errors::DeclarationError;
use crate::resolver::{EntityRef, Resource, ResourceArgs, Resolver};

/// Administrative SSH port, allowed from raw address blocks on every tier
pub const ADMIN_PORT: u16 = 22;

/// Role grouping of instances sharing a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Edge,
    Application,
    Data,
    Messaging,
}

impl Tier {
    /// The only tier allowed to reach this one by policy identity
    pub fn upstream(&self) -> Option<Tier> {
        match self {
            Tier::Edge => None,
            Tier::Application => Some(Tier::Edge),
            Tier::Data | Tier::Messaging => Some(Tier::Application),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Edge => "edge",
            Tier::Application => "application",
            Tier::Data => "data",
            Tier::Messaging => "messaging",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Every protocol (`-1` at the provider)
    All,
}

impl Protocol {
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::All => "-1",
        }
    }
}

/// Inclusive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    from: u16,
    to: u16,
}

impl PortRange {
    /// Range used with [`Protocol::All`]
    pub const ANY: PortRange = PortRange { from: 0, to: 0 };

    pub fn new(from: u16, to: u16) -> Result<Self, DeclarationError> {
        if from > to {
            return Err(DeclarationError::InvalidPolicy(format!(
                "port range {}-{} is reversed",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    pub fn single(port: u16) -> Self {
        Self { from: port, to: port }
    }

    pub fn from_port(&self) -> u16 {
        self.from
    }

    pub fn to_port(&self) -> u16 {
        self.to
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.from..=self.to).contains(&port)
    }

    fn is_admin_only(&self) -> bool {
        self.from == ADMIN_PORT && self.to == ADMIN_PORT
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

/// Source or destination of a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    /// Instances carrying the named policy
    Policy(String),
    /// A raw address block
    Cidr(CidrBlock),
}

impl Peer {
    pub fn policy(name: impl Into<String>) -> Self {
        Peer::Policy(name.into())
    }

    pub fn anywhere() -> Self {
        Peer::Cidr(CidrBlock::ANY)
    }
}

/// One filtering rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub protocol: Protocol,
    pub ports: PortRange,
    pub peer: Peer,
}

impl Rule {
    pub fn tcp(port: u16, peer: Peer) -> Self {
        Self {
            protocol: Protocol::Tcp,
            ports: PortRange::single(port),
            peer,
        }
    }

    pub fn tcp_range(from: u16, to: u16, peer: Peer) -> Result<Self, DeclarationError> {
        Ok(Self {
            protocol: Protocol::Tcp,
            ports: PortRange::new(from, to)?,
            peer,
        })
    }

    /// Every protocol and port
    pub fn all_traffic(peer: Peer) -> Self {
        Self {
            protocol: Protocol::All,
            ports: PortRange::ANY,
            peer,
        }
    }

    fn covers(&self, port: u16) -> bool {
        self.protocol == Protocol::All || self.ports.contains(port)
    }

    /// Provider representation with policy names replaced by their ids
    fn to_provider_json(&self, policy_ids: &BTreeMap<String, String>) -> Value {
        let mut rule = json!({
            "protocol": self.protocol.as_provider_str(),
            "from_port": self.ports.from_port(),
            "to_port": self.ports.to_port(),
        });
        match &self.peer {
            Peer::Cidr(cidr) => rule["cidr_blocks"] = json!([cidr.to_string()]),
            Peer::Policy(name) => {
                let id = policy_ids.get(name).cloned().unwrap_or_default();
                rule["security_groups"] = json!([id]);
            }
        }
        rule
    }
}

/// Named per-tier rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicySpec {
    pub name: String,
    pub tier: Tier,
    pub description: String,
    pub ingress: Vec<Rule>,
    pub egress: Vec<Rule>,
}

impl AccessPolicySpec {
    pub fn new(name: impl Into<String>, tier: Tier, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier,
            description: description.into(),
            ingress: Vec::new(),
            egress: Vec::new(),
        }
    }

    pub fn allow_in(mut self, rule: Rule) -> Self {
        self.ingress.push(rule);
        self
    }

    pub fn allow_out(mut self, rule: Rule) -> Self {
        self.egress.push(rule);
        self
    }

    /// Unrestricted egress
    pub fn allow_all_out(self) -> Self {
        self.allow_out(Rule::all_traffic(Peer::anywhere()))
    }

    /// Check whether traffic on `port` from `peer` is admitted
    ///
    /// A raw-block peer is admitted when a raw-block rule covers it.
    pub fn permits(&self, port: u16, peer: &Peer) -> bool {
        self.ingress.iter().any(|rule| {
            rule.covers(port)
                && match (&rule.peer, peer) {
                    (Peer::Policy(a), Peer::Policy(b)) => a == b,
                    (Peer::Cidr(allowed), Peer::Cidr(source)) => allowed.contains(source),
                    _ => false,
                }
        })
    }

    /// Policies admitted by ingress rules
    fn ingress_sources(&self) -> BTreeSet<&str> {
        policy_peers(&self.ingress)
    }

    fn referenced_policies(&self) -> BTreeSet<&str> {
        let mut names = self.ingress_sources();
        names.extend(policy_peers(&self.egress));
        names
    }
}

/// All policies of a stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicySet {
    policies: Vec<AccessPolicySpec>,
}

impl AccessPolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: AccessPolicySpec) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AccessPolicySpec> {
        self.policies.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccessPolicySpec> {
        self.policies.iter()
    }

    /// Check references and the tier isolation convention
    pub fn validate(&self) -> Result<(), DeclarationError> {
        let mut names = BTreeSet::new();
        for policy in &self.policies {
            if !names.insert(policy.name.as_str()) {
                return Err(invalid(format!("policy {} is declared twice", policy.name)));
            }
        }

        for policy in &self.policies {
            for reference in policy.referenced_policies() {
                if reference == policy.name {
                    return Err(invalid(format!("policy {} references itself", policy.name)));
                }
                if self.get(reference).is_none() {
                    return Err(invalid(format!(
                        "policy {} references unknown policy {}",
                        policy.name, reference
                    )));
                }
            }
        }

        self.ingress_order()?;

        for policy in &self.policies {
            for rule in &policy.ingress {
                match &rule.peer {
                    Peer::Policy(source) => {
                        let source_tier = self.get(source).map(|p| p.tier);
                        if source_tier != policy.tier.upstream() {
                            return Err(invalid(format!(
                                "{} ({}) may only admit its upstream tier, not {}",
                                policy.name, policy.tier, source
                            )));
                        }
                    }
                    Peer::Cidr(cidr) => {
                        if policy.tier != Tier::Edge && !rule.ports.is_admin_only() {
                            return Err(invalid(format!(
                                "{} ({}) admits {} on port {} from a raw address block",
                                policy.name, policy.tier, cidr, rule.ports
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Policies ordered so every ingress source comes before the policy
    /// admitting it; ties keep tier order, then insertion order
    fn ingress_order(&self) -> Result<Vec<&AccessPolicySpec>, DeclarationError> {
        let index: BTreeMap<&str, usize> = self
            .policies
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), i))
            .collect();

        let mut remaining = vec![0usize; self.policies.len()];
        let mut admitted_by: Vec<Vec<usize>> = vec![Vec::new(); self.policies.len()];
        for (i, policy) in self.policies.iter().enumerate() {
            for source in policy.ingress_sources() {
                if let Some(&j) = index.get(source) {
                    remaining[i] += 1;
                    admitted_by[j].push(i);
                }
            }
        }

        let mut ready: BTreeSet<(Tier, usize)> = remaining
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n == 0)
            .map(|(i, _)| (self.policies[i].tier, i))
            .collect();
        let mut order = Vec::with_capacity(self.policies.len());
        while let Some((_, i)) = ready.pop_first() {
            order.push(&self.policies[i]);
            for &d in &admitted_by[i] {
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    ready.insert((self.policies[d].tier, d));
                }
            }
        }

        if order.len() < self.policies.len() {
            let placed: BTreeSet<&str> = order.iter().map(|p| p.name.as_str()).collect();
            return Err(invalid(format!(
                "policy references form a cycle: {}",
                self.cycle_among(&placed).join(" -> ")
            )));
        }
        Ok(order)
    }

    /// Follow unplaced ingress sources until a policy repeats
    fn cycle_among<'a>(&'a self, placed: &BTreeSet<&str>) -> Vec<&'a str> {
        let mut path: Vec<&str> = Vec::new();
        let mut current = self.policies.iter().find(|p| !placed.contains(p.name.as_str()));
        while let Some(policy) = current {
            let name = policy.name.as_str();
            if let Some(start) = path.iter().position(|n| *n == name) {
                let mut cycle = path.split_off(start);
                cycle.push(name);
                return cycle;
            }
            path.push(name);
            current = policy
                .ingress_sources()
                .into_iter()
                .find(|source| !placed.contains(source))
                .and_then(|source| self.get(source));
        }
        path
    }

    /// Validate and register one security group per policy, admitted
    /// groups first, then one standalone rule per policy-targeted egress
    pub fn declare(
        &self,
        resolver: &mut Resolver,
        vpc: &EntityRef,
    ) -> Result<DeclaredPolicies, DeclarationError> {
        self.validate()?;

        let ordered = self.ingress_order()?;

        let mut declared: BTreeMap<String, EntityRef> = BTreeMap::new();
        for policy in &ordered {
            let mut refs: Vec<String> = Vec::new();
            let mut ids: Vec<Deferred<String>> = Vec::new();
            for name in policy.ingress_sources() {
                refs.push(name.to_string());
                ids.push(group(&declared, name)?.id());
            }

            let ingress = policy.ingress.clone();
            let egress: Vec<Rule> = policy
                .egress
                .iter()
                .filter(|rule| matches!(rule.peer, Peer::Cidr(_)))
                .cloned()
                .collect();
            let rules = deferred::resolve(ids, move |ids| {
                let policy_ids: BTreeMap<String, String> =
                    refs.iter().cloned().zip(ids).collect();
                let render = |rules: &[Rule]| -> Value {
                    rules
                        .iter()
                        .map(|rule| rule.to_provider_json(&policy_ids))
                        .collect()
                };
                (render(&ingress), render(&egress))
            });

            let tags = BTreeMap::from([("Name".to_string(), policy.name.clone())]);
            let entity = resolver.declare(
                Resource::new(
                    policy.name.clone(),
                    ResourceKind::SecurityGroup,
                    ResourceArgs::new()
                        .set_deferred("vpc_id", &vpc.id())
                        .set("description", policy.description.clone())
                        .set_deferred("ingress", &rules.map(|(ingress, _)| ingress))
                        .set_deferred("egress", &rules.map(|(_, egress)| egress))
                        .tags(&tags),
                ),
                &[],
            )?;
            debug!(
                "Declared {} policy {} with {} ingress rules",
                policy.tier,
                policy.name,
                policy.ingress.len()
            );
            declared.insert(policy.name.clone(), entity);
        }

        let mut rules = Vec::new();
        for policy in &ordered {
            for (n, rule) in policy.egress.iter().enumerate() {
                let Peer::Policy(target) = &rule.peer else {
                    continue;
                };
                let entity = resolver.declare(
                    Resource::new(
                        format!("{}-egress-{}", policy.name, n),
                        ResourceKind::SecurityGroupRule,
                        ResourceArgs::new()
                            .set("type", "egress")
                            .set_deferred("security_group_id", &group(&declared, &policy.name)?.id())
                            .set_deferred(
                                "source_security_group_id",
                                &group(&declared, target)?.id(),
                            )
                            .set("protocol", rule.protocol.as_provider_str())
                            .set("from_port", rule.ports.from_port())
                            .set("to_port", rule.ports.to_port()),
                    ),
                    &[],
                )?;
                debug!("Declared egress rule {} -> {} on {}", policy.name, target, rule.ports);
                rules.push(entity);
            }
        }

        Ok(DeclaredPolicies {
            groups: declared,
            rules,
        })
    }
}

fn group<'a>(
    declared: &'a BTreeMap<String, EntityRef>,
    name: &str,
) -> Result<&'a EntityRef, DeclarationError> {
    declared
        .get(name)
        .ok_or_else(|| DeclarationError::UnknownEntity(name.to_string()))
}

fn policy_peers(rules: &[Rule]) -> BTreeSet<&str> {
    rules
        .iter()
        .filter_map(|rule| match &rule.peer {
            Peer::Policy(name) => Some(name.as_str()),
            Peer::Cidr(_) => None,
        })
        .collect()
}

/// Handles to the declared security groups
#[derive(Debug, Clone)]
pub struct DeclaredPolicies {
    groups: BTreeMap<String, EntityRef>,
    rules: Vec<EntityRef>,
}

impl DeclaredPolicies {
    pub fn get(&self, name: &str) -> Result<&EntityRef, DeclarationError> {
        self.groups
            .get(name)
            .ok_or_else(|| DeclarationError::UnknownEntity(name.to_string()))
    }

    /// Standalone egress rules
    pub fn rules(&self) -> &[EntityRef] {
        &self.rules
    }
}

fn invalid(message: String) -> DeclarationError {
    DeclarationError::InvalidPolicy(message)
}
