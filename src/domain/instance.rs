// Copyright (c) 2025 - Cowboy AI, Inc.
//! Instance Provisioner
//!
//! One compute instance per role, placed in a subnet and carrying its tier's
//! access policy. The bootstrap script is a deferred value; whatever it
//! consumes becomes an implicit dependency of the instance.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::access_policy::{DeclaredPolicies, Tier};
use super::topology::DeclaredNetwork;
use super::ResourceKind;
use crate::bootstrap::RenderedScript;
use crate::deferred::Deferred;
use crate::errors::DeclarationError;
use crate::resolver::{EntityRef, Resource, ResourceArgs, Resolver};

/// Instance role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Database,
    Messaging,
    Microservices,
    Nginx,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Database => "database",
            Role::Messaging => "messaging",
            Role::Microservices => "microservices",
            Role::Nginx => "nginx",
        }
    }

    /// Tier whose policy instances of this role carry
    pub fn tier(&self) -> Tier {
        match self {
            Role::Database => Tier::Data,
            Role::Messaging => Tier::Messaging,
            Role::Microservices => Tier::Application,
            Role::Nginx => Tier::Edge,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root block device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootVolume {
    pub size_gb: u32,
    pub volume_type: String,
}

impl RootVolume {
    pub fn gp2(size_gb: u32) -> Self {
        Self {
            size_gb,
            volume_type: "gp2".to_string(),
        }
    }
}

impl Default for RootVolume {
    fn default() -> Self {
        Self::gp2(10)
    }
}

/// Compute instance declaration
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub name: String,
    pub role: Role,
    /// Subnet name within the declared network
    pub subnet: String,
    /// Access policy name
    pub policy: String,
    pub image: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub root_volume: RootVolume,
    pub associate_public_ip: bool,
    pub tags: BTreeMap<String, String>,
    pub user_data: Option<Deferred<RenderedScript>>,
    /// Destroy and recreate when the rendered bootstrap script changes;
    /// other argument changes update in place
    pub replace_on_change: bool,
    pub depends_on: Vec<EntityRef>,
}

impl InstanceSpec {
    pub fn new(
        name: impl Into<String>,
        role: Role,
        subnet: impl Into<String>,
        policy: impl Into<String>,
        image: impl Into<String>,
        instance_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            subnet: subnet.into(),
            policy: policy.into(),
            image: image.into(),
            instance_type: instance_type.into(),
            key_name: None,
            root_volume: RootVolume::default(),
            associate_public_ip: false,
            tags: BTreeMap::new(),
            user_data: None,
            replace_on_change: true,
            depends_on: Vec::new(),
        }
    }

    pub fn key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    pub fn root_volume(mut self, volume: RootVolume) -> Self {
        self.root_volume = volume;
        self
    }

    pub fn public_ip(mut self) -> Self {
        self.associate_public_ip = true;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tags(mut self, tags: &BTreeMap<String, String>) -> Self {
        self.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn user_data(mut self, script: Deferred<RenderedScript>) -> Self {
        self.user_data = Some(script);
        self
    }

    pub fn replace_on_change(mut self, replace: bool) -> Self {
        self.replace_on_change = replace;
        self
    }

    pub fn depends_on(mut self, entity: &EntityRef) -> Self {
        self.depends_on.push(entity.clone());
        self
    }

    /// Register the instance with the resolver
    pub fn declare(
        &self,
        resolver: &mut Resolver,
        network: &DeclaredNetwork,
        policies: &DeclaredPolicies,
    ) -> Result<EntityRef, DeclarationError> {
        let subnet = network.subnet(&self.subnet)?;
        let policy = policies.get(&self.policy)?;

        let mut tags = self.tags.clone();
        tags.insert("Name".to_string(), self.name.clone());
        tags.insert("Type".to_string(), self.role.as_str().to_string());

        let mut args = ResourceArgs::new()
            .set("ami", self.image.clone())
            .set("instance_type", self.instance_type.clone())
            .set_deferred("subnet_id", &subnet.id())
            .set_deferred(
                "vpc_security_group_ids",
                &policy.id().map(|id| json!([id])),
            )
            .set("associate_public_ip_address", self.associate_public_ip)
            .set(
                "root_block_device",
                json!({
                    "volume_size": self.root_volume.size_gb,
                    "volume_type": self.root_volume.volume_type,
                }),
            )
            .set("user_data_replace_on_change", self.replace_on_change)
            .tags(&tags);
        if let Some(key_name) = &self.key_name {
            args = args.set("key_name", key_name.clone());
        }
        if let Some(script) = &self.user_data {
            args = args.set_deferred("user_data", script);
        }

        let mut resource = Resource::new(self.name.clone(), ResourceKind::Instance, args);
        if self.replace_on_change {
            resource = resource.replace_on_change_of("user_data");
        }

        let entity = resolver.declare(resource, &self.depends_on)?;
        debug!(
            "Declared {} instance {} in {} with {} explicit dependencies",
            self.role,
            self.name,
            self.subnet,
            self.depends_on.len()
        );
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> InstanceSpec {
        InstanceSpec::new("app", Role::Microservices, "public-1", "app-sg", "ami-1", "t2.micro")
    }

    #[test]
    fn test_role_tiers() {
        assert_eq!(Role::Database.tier(), Tier::Data);
        assert_eq!(Role::Nginx.tier(), Tier::Edge);
        assert_eq!(Role::Microservices.to_string(), "microservices");
    }

    #[test]
    fn test_builder_defaults() {
        let spec = spec().key_name("kp").public_ip().tag("Environment", "Testing");
        assert_eq!(spec.root_volume, RootVolume::gp2(10));
        assert!(spec.associate_public_ip);
        assert!(spec.replace_on_change);
        assert_eq!(spec.key_name.as_deref(), Some("kp"));
    }
}
