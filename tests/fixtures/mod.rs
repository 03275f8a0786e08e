// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for stack-provision
//!
//! Deterministic configuration and small resource graphs shared by the
//! integration suites.

#![allow(dead_code)]

use std::collections::HashMap;

use stack_provision::config::StackConfig;
use stack_provision::domain::ResourceKind;
use stack_provision::resolver::{EntityRef, Resource, ResourceArgs, Resolver};

pub const SMTP_USER: &str = "mailer@example.com";
pub const SMTP_PASSWORD: &str = "s3cret";

/// Stack configuration with the required SMTP credentials plus `extra`
pub fn config_with(extra: &[(&str, &str)]) -> StackConfig {
    let mut values: HashMap<String, String> = HashMap::from([
        ("SMTP_USER".to_string(), SMTP_USER.to_string()),
        ("SMTP_PASSWORD".to_string(), SMTP_PASSWORD.to_string()),
    ]);
    for (key, value) in extra {
        values.insert(key.to_string(), value.to_string());
    }
    StackConfig::from_lookup(|key| values.get(key).cloned()).expect("fixture config is valid")
}

/// Default stack configuration
pub fn config() -> StackConfig {
    config_with(&[])
}

/// Declare a resource with no provider-relevant arguments
pub fn declare_plain(resolver: &mut Resolver, name: &str, deps: &[EntityRef]) -> EntityRef {
    resolver
        .declare(
            Resource::new(name, ResourceKind::SecurityGroup, ResourceArgs::new()),
            deps,
        )
        .expect("unique fixture name")
}

/// Declare a resource consuming `producer`'s id under `key`
pub fn declare_consuming(
    resolver: &mut Resolver,
    name: &str,
    key: &str,
    producer: &EntityRef,
) -> EntityRef {
    resolver
        .declare(
            Resource::new(
                name,
                ResourceKind::SecurityGroup,
                ResourceArgs::new().set_deferred(key, &producer.id()),
            ),
            &[],
        )
        .expect("unique fixture name")
}
