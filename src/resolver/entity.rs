// Copyright (c) 2025 - Cowboy AI, Inc.
//! Entity Handles
//!
//! An [`EntityRef`] is returned by `Resolver::declare` and identifies one
//! declared resource. It owns the slot into which the resolver writes the
//! provider's outputs, so deferred attributes can be derived from the
//! handle alone.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::deferred::Deferred;
use crate::provider::{keys, ProviderOutputs};

/// Reference to a declared entity
///
/// Equality, ordering and hashing use the declaration sequence number and
/// name; clones share the output slot.
#[derive(Clone)]
pub struct EntityRef {
    seq: usize,
    name: Arc<str>,
    slot: Arc<OnceLock<ProviderOutputs>>,
}

impl EntityRef {
    pub(crate) fn new(seq: usize, name: &str) -> Self {
        Self {
            seq,
            name: Arc::from(name),
            slot: Arc::new(OnceLock::new()),
        }
    }

    /// Declaration sequence number
    pub fn seq(&self) -> usize {
        self.seq
    }

    /// Logical resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deferred provider output of this entity
    ///
    /// Resolves once the entity is materialized, provided the provider
    /// returned `key`. Consuming it makes the consumer depend on this entity.
    pub fn output(&self, key: impl Into<String>) -> Deferred<String> {
        let key = key.into();
        let slot = Arc::clone(&self.slot);
        Deferred::from_fn(BTreeSet::from([self.clone()]), move || {
            slot.get().and_then(|outputs| outputs.get(&key).cloned())
        })
    }

    /// Deferred provider identifier
    pub fn id(&self) -> Deferred<String> {
        self.output(keys::ID)
    }

    /// Deferred private address (instances)
    pub fn private_ip(&self) -> Deferred<String> {
        self.output(keys::PRIVATE_IP)
    }

    /// Deferred public address (instances, elastic IPs)
    pub fn public_ip(&self) -> Deferred<String> {
        self.output(keys::PUBLIC_IP)
    }

    /// Check whether outputs have been recorded
    pub fn is_materialized(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Outputs recorded for this entity, if materialized
    pub fn outputs(&self) -> Option<&ProviderOutputs> {
        self.slot.get()
    }

    /// Record outputs; returns `false` if the slot was already filled
    pub(crate) fn fill(&self, outputs: ProviderOutputs) -> bool {
        self.slot.set(outputs).is_ok()
    }

    /// Check whether two handles share one slot
    pub(crate) fn same_entity(&self, other: &EntityRef) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.name == other.name
    }
}

impl Eq for EntityRef {}

impl PartialOrd for EntityRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl Hash for EntityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.seq.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.seq)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_resolves_after_fill() {
        let entity = EntityRef::new(0, "database");
        let ip = entity.private_ip();

        assert!(!ip.is_resolved());
        assert!(ip.producers().contains(&entity));

        let mut outputs = ProviderOutputs::new();
        outputs.insert(keys::PRIVATE_IP.into(), "10.0.3.10".into());
        assert!(entity.fill(outputs.clone()));
        assert!(!entity.fill(outputs));

        assert_eq!(ip.try_get().as_deref(), Some("10.0.3.10"));
        assert!(entity.id().try_get().is_none());
    }

    #[test]
    fn test_identity_is_seq_and_name() {
        let a = EntityRef::new(1, "vpc");
        let b = EntityRef::new(1, "vpc");
        assert_eq!(a, b);
        assert!(!a.same_entity(&b));
        assert!(a.same_entity(&a.clone()));
        assert!(EntityRef::new(0, "z") < EntityRef::new(1, "a"));
    }
}
