// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Declarations and Arguments
//!
//! A [`Resource`] is what gets declared: a name, a kind and a set of
//! arguments. Arguments are either plain JSON values or deferred values;
//! the producers of every deferred argument are the resource's implicit
//! dependencies.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::EntityRef;
use crate::deferred::Deferred;
use crate::domain::ResourceKind;

/// One resource argument
#[derive(Debug, Clone)]
pub enum Input {
    /// Known at declaration time
    Value(Value),
    /// Known once its producers materialize
    Deferred(Deferred<Value>),
}

impl Input {
    /// Current value, if resolved
    pub fn try_get(&self) -> Option<Value> {
        match self {
            Input::Value(value) => Some(value.clone()),
            Input::Deferred(deferred) => deferred.try_get(),
        }
    }
}

/// Ordered argument map of a resource
#[derive(Debug, Clone, Default)]
pub struct ResourceArgs {
    inputs: BTreeMap<String, Input>,
}

impl ResourceArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a known argument
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), Input::Value(value.into()));
        self
    }

    /// Set a deferred argument
    pub fn set_deferred<T>(mut self, key: impl Into<String>, value: &Deferred<T>) -> Self
    where
        T: Into<Value> + Clone + Send + Sync + 'static,
    {
        let value: Deferred<Value> = value.map(|v: T| v.into());
        self.inputs.insert(key.into(), Input::Deferred(value));
        self
    }

    /// Set string tags
    pub fn tags(self, tags: &BTreeMap<String, String>) -> Self {
        let tags: serde_json::Map<String, Value> = tags
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.set("tags", Value::Object(tags))
    }

    /// Iterate arguments in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Input)> {
        self.inputs.iter()
    }

    /// Get a single argument
    pub fn get(&self, key: &str) -> Option<&Input> {
        self.inputs.get(key)
    }

    /// Producers of all deferred arguments
    pub fn producers(&self) -> BTreeSet<EntityRef> {
        self.inputs
            .values()
            .filter_map(|input| match input {
                Input::Deferred(deferred) => Some(deferred.producers().iter().cloned()),
                Input::Value(_) => None,
            })
            .flatten()
            .collect()
    }
}

/// A resource to declare
#[derive(Debug, Clone)]
pub struct Resource {
    /// Logical name, unique within a resolver
    pub name: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Arguments
    pub args: ResourceArgs,

    /// Arguments whose change destroys and recreates the resource; any
    /// other change is an in-place update
    pub replace_triggers: BTreeSet<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, kind: ResourceKind, args: ResourceArgs) -> Self {
        Self {
            name: name.into(),
            kind,
            args,
            replace_triggers: BTreeSet::new(),
        }
    }

    /// Replace the resource whenever argument `key` changes
    pub fn replace_on_change_of(mut self, key: impl Into<String>) -> Self {
        self.replace_triggers.insert(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_arguments_have_no_producers() {
        let args = ResourceArgs::new()
            .set("cidr_block", "10.0.0.0/16")
            .set("enable_dns_support", true);
        assert!(args.producers().is_empty());
        assert_eq!(args.get("cidr_block").unwrap().try_get(), Some(json!("10.0.0.0/16")));
    }

    #[test]
    fn test_deferred_arguments_collect_producers() {
        let vpc = EntityRef::new(0, "vpc");
        let igw = EntityRef::new(1, "igw");
        let args = ResourceArgs::new()
            .set_deferred("vpc_id", &vpc.id())
            .set_deferred("gateway_id", &igw.id());

        let producers = args.producers();
        assert!(producers.contains(&vpc));
        assert!(producers.contains(&igw));
        assert!(args.get("vpc_id").unwrap().try_get().is_none());
    }

    #[test]
    fn test_tags_are_an_object() {
        let tags = BTreeMap::from([("Name".to_string(), "ecommerce-vpc".to_string())]);
        let args = ResourceArgs::new().tags(&tags);
        assert_eq!(
            args.get("tags").unwrap().try_get(),
            Some(json!({"Name": "ecommerce-vpc"}))
        );
    }
}
