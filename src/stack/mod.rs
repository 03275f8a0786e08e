// Copyright (c) 2025 - Cowboy AI, Inc.
//! E-commerce Microservices Stack
//!
//! The concrete deployment: one network, four security groups and four
//! instances.
//!
//! # Materialization Order
//!
//! ```text
//! vpc ─▶ subnets ─▶ igw ─▶ nat (+eip) ─▶ routes ─▶ associations
//!                                                     │
//!         ┌───────────────────────────────────────────┤
//!         ▼                                           ▼
//!     database (private 1)                    messaging (private 2)
//!         └──────────────┬────────────────────────────┘
//!                        ▼  DATABASE_HOST, MESSAGING_HOST
//!               microservices (public 1)
//!                        ▼  MICROSERVICES_HOST
//!                  nginx (public 2)
//! ```

pub mod scripts;

use std::collections::BTreeMap;
use tracing::info;

use crate::bootstrap::{compose, Bindings, RenderedScript};
use crate::config::StackConfig;
use crate::domain::{
    AccessPolicySet, AccessPolicySpec, CidrBlock, DeclaredNetwork, DeclaredPolicies,
    InstanceSpec, NetworkSpec, Peer, Role, RootVolume, Rule, SubnetSpec, Tier, Visibility,
    ADMIN_PORT,
};
use crate::deferred::Deferred;
use crate::errors::DeclarationError;
use crate::resolver::{EntityRef, Resolver};

/// Handles to the declared stack
#[derive(Debug, Clone)]
pub struct EcommerceStack {
    pub network: DeclaredNetwork,
    pub policies: DeclaredPolicies,
    pub database: EntityRef,
    pub messaging: EntityRef,
    pub microservices: EntityRef,
    pub nginx: EntityRef,
    /// Bootstrap script per role name
    pub scripts: BTreeMap<&'static str, Deferred<RenderedScript>>,
}

impl EcommerceStack {
    /// Bootstrap script of `role`
    pub fn script(&self, role: Role) -> Option<&Deferred<RenderedScript>> {
        self.scripts.get(role.as_str())
    }
}

fn cidr(block: &str) -> Result<CidrBlock, DeclarationError> {
    CidrBlock::new(block).map_err(|e| DeclarationError::InvalidTopology(e.to_string()))
}

fn name(config: &StackConfig, suffix: &str) -> String {
    format!("{}-{}", config.stack_name, suffix)
}

/// Network with two public and two private subnets across two zones
pub fn network_spec(config: &StackConfig) -> Result<NetworkSpec, DeclarationError> {
    let [zone_a, zone_b] = &config.availability_zones;
    Ok(NetworkSpec::new(config.stack_name.clone(), cidr("10.0.0.0/16")?)
        .with_subnet(SubnetSpec::public(
            name(config, "public-subnet-1"),
            cidr("10.0.1.0/24")?,
            zone_a.clone(),
        ))
        .with_subnet(SubnetSpec::public(
            name(config, "public-subnet-2"),
            cidr("10.0.2.0/24")?,
            zone_b.clone(),
        ))
        .with_subnet(SubnetSpec::private(
            name(config, "private-subnet-1"),
            cidr("10.0.3.0/24")?,
            zone_a.clone(),
        ))
        .with_subnet(SubnetSpec::private(
            name(config, "private-subnet-2"),
            cidr("10.0.4.0/24")?,
            zone_b.clone(),
        ))
        .with_nat_in(name(config, "public-subnet-1")))
}

/// Security groups of the four tiers
pub fn access_policies(config: &StackConfig) -> Result<AccessPolicySet, DeclarationError> {
    let nginx = name(config, "nginx-sg");
    let microservices = name(config, "microservices-sg");
    let ssh = || Rule::tcp(ADMIN_PORT, Peer::anywhere());

    let mut messaging = AccessPolicySpec::new(
        name(config, "messaging-sg"),
        Tier::Messaging,
        "Security group for messaging systems",
    )
    .allow_in(ssh());
    // RabbitMQ, management UI, Kafka, Kafka internal, ZooKeeper, Redis
    for port in [5672, 15672, 9092, 29092, 2181, 6379] {
        messaging = messaging.allow_in(Rule::tcp(port, Peer::policy(microservices.clone())));
    }

    Ok(AccessPolicySet::new()
        .with(
            AccessPolicySpec::new(
                nginx.clone(),
                Tier::Edge,
                "Security group for Nginx gateway instance",
            )
            .allow_in(ssh())
            .allow_in(Rule::tcp(80, Peer::anywhere()))
            .allow_in(Rule::tcp(443, Peer::anywhere()))
            .allow_all_out(),
        )
        .with(
            AccessPolicySpec::new(
                microservices.clone(),
                Tier::Application,
                "Security group for microservices instance",
            )
            .allow_in(ssh())
            .allow_in(Rule::tcp_range(8000, 8004, Peer::policy(nginx.clone()))?)
            .allow_in(Rule::tcp(8082, Peer::policy(nginx)))
            .allow_all_out(),
        )
        .with(
            AccessPolicySpec::new(
                name(config, "database-sg"),
                Tier::Data,
                "Security group for database instance",
            )
            .allow_in(ssh())
            .allow_in(Rule::tcp_range(27017, 27018, Peer::policy(microservices.clone()))?)
            .allow_in(Rule::tcp_range(5432, 5434, Peer::policy(microservices))?)
            .allow_all_out(),
        )
        .with(messaging.allow_all_out()))
}

fn instance(config: &StackConfig, role: Role, subnet: &str) -> InstanceSpec {
    InstanceSpec::new(
        name(config, role.as_str()),
        role,
        name(config, subnet),
        name(config, &format!("{}-sg", role.as_str())),
        config.ami_id.clone(),
        config.instance_type.clone(),
    )
    .key_name(config.key_name.clone())
    .tag("Environment", config.environment.clone())
    .tag("Project", config.project.clone())
}

/// Declare the whole stack and its exports
pub fn declare(
    config: &StackConfig,
    resolver: &mut Resolver,
) -> Result<EcommerceStack, DeclarationError> {
    let network = network_spec(config)?.declare(resolver)?;
    let policies = access_policies(config)?.declare(resolver, &network.vpc)?;

    let prefix = scripts::common_prefix(&config.git_repo_url)?;
    let nat = network.nat_gateway()?.clone();
    let private_route = network.route(Visibility::Private)?.clone();

    let database_script = compose(
        &prefix,
        &scripts::role_template(config, Role::Database)?,
        &Bindings::new(),
    )?;
    let database = instance(config, Role::Database, "private-subnet-1")
        .user_data(database_script.clone())
        .depends_on(&nat)
        .depends_on(&private_route)
        .depends_on(network.association(&name(config, "private-subnet-1"))?)
        .declare(resolver, &network, &policies)?;

    let messaging_script = compose(
        &prefix,
        &scripts::role_template(config, Role::Messaging)?,
        &Bindings::new(),
    )?;
    let messaging = instance(config, Role::Messaging, "private-subnet-2")
        .user_data(messaging_script.clone())
        .depends_on(&nat)
        .depends_on(&private_route)
        .depends_on(network.association(&name(config, "private-subnet-2"))?)
        .declare(resolver, &network, &policies)?;

    let microservices_bindings = Bindings::new()
        .bind("DATABASE_HOST", database.private_ip())?
        .bind("MESSAGING_HOST", messaging.private_ip())?
        .bind_known("SMTP_USER", config.smtp_user.clone())?
        .bind_known("SMTP_PASSWORD", config.smtp_password.clone())?;
    let microservices_script = compose(
        &prefix,
        &scripts::role_template(config, Role::Microservices)?,
        &microservices_bindings,
    )?;
    let microservices = instance(config, Role::Microservices, "public-subnet-1")
        .public_ip()
        .user_data(microservices_script.clone())
        .depends_on(&database)
        .depends_on(&messaging)
        .declare(resolver, &network, &policies)?;

    let nginx_bindings = Bindings::new().bind("MICROSERVICES_HOST", microservices.private_ip())?;
    let nginx_script = compose(
        &prefix,
        &scripts::role_template(config, Role::Nginx)?,
        &nginx_bindings,
    )?;
    let nginx = instance(config, Role::Nginx, "public-subnet-2")
        .public_ip()
        .root_volume(RootVolume::gp2(8))
        .user_data(nginx_script.clone())
        .depends_on(&microservices)
        .declare(resolver, &network, &policies)?;

    resolver.export("vpc_id", network.vpc.id());
    for subnet in [
        "public_subnet_1",
        "public_subnet_2",
        "private_subnet_1",
        "private_subnet_2",
    ] {
        let entity = network.subnet(&name(config, &subnet.replace('_', "-")))?;
        resolver.export(format!("{}_id", subnet), entity.id());
    }

    resolver.export("microservices_instance_id", microservices.id());
    resolver.export("microservices_instance_private_ip", microservices.private_ip());
    resolver.export("microservices_instance_public_ip", microservices.public_ip());
    resolver.export("database_instance_id", database.id());
    resolver.export("database_instance_private_ip", database.private_ip());
    resolver.export("nginx_instance_id", nginx.id());
    resolver.export("nginx_instance_public_ip", nginx.public_ip());
    resolver.export("messaging_instance_id", messaging.id());
    resolver.export("messaging_instance_private_ip", messaging.private_ip());

    info!(
        "Declared stack {} with {} resources and {} exports",
        config.stack_name,
        resolver.len(),
        resolver.export_names().len()
    );

    Ok(EcommerceStack {
        network,
        policies,
        database,
        messaging,
        microservices,
        nginx,
        scripts: BTreeMap::from([
            (Role::Database.as_str(), database_script),
            (Role::Messaging.as_str(), messaging_script),
            (Role::Microservices.as_str(), microservices_script),
            (Role::Nginx.as_str(), nginx_script),
        ]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StackConfig {
        StackConfig::from_lookup(|key| match key {
            "SMTP_USER" => Some("mailer".into()),
            "SMTP_PASSWORD" => Some("s3cret".into()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_specs_validate() {
        assert!(network_spec(&config()).unwrap().validate().is_ok());
        assert!(access_policies(&config()).unwrap().validate().is_ok());
    }

    #[test]
    fn test_database_port_only_from_microservices() {
        let policies = access_policies(&config()).unwrap();
        let database = policies.get("ecommerce-database-sg").unwrap();

        assert!(database.permits(5432, &Peer::policy("ecommerce-microservices-sg")));
        assert!(!database.permits(5432, &Peer::policy("ecommerce-nginx-sg")));
        assert!(!database.permits(5432, &Peer::anywhere()));
        assert!(database.permits(22, &Peer::anywhere()));
    }

    #[test]
    fn test_declared_resource_count() {
        let mut resolver = Resolver::new("ecommerce");
        declare(&config(), &mut resolver).unwrap();
        // vpc, 4 subnets, igw, eip, nat, 2 tables, 2 routes, 4 associations, 4 groups, 4 instances
        assert_eq!(resolver.len(), 24);
        assert_eq!(resolver.export_names().len(), 14);
    }
}
