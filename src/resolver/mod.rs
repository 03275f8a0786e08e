// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dependency/Output Resolver
//!
//! The resolver owns the declared entities and the edges between them and
//! decides the order in which they are materialized.
//!
//! # Edges
//!
//! ```text
//! explicit:  declare(resource, &[nat_gateway])      app ──▶ nat_gateway
//! implicit:  args.set_deferred("x", &db.private_ip())  app ──▶ db
//! ```
//!
//! Both kinds are honored identically. An implicit edge is what prevents an
//! instance from being created before the value its bootstrap script needs
//! exists.
//!
//! # Lifecycle
//!
//! ```text
//! declare* ──▶ plan ──▶ materialize_all ──▶ MaterializationReport
//!                 │
//!                 └── DeclarationError (nothing created)
//! ```
//!
//! A resolver materializes once. A later run declares the stack again into
//! a fresh resolver and passes the previous [`StackState`].

pub mod args;
pub mod entity;
pub mod graph;
pub mod materialize;
pub mod state;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

pub use args::{Input, Resource, ResourceArgs};
pub use entity::EntityRef;
pub use graph::Plan;
pub use materialize::Materializer;
pub use state::{
    fingerprint, partial_fingerprint, ChangeAction, MaterializationReport, ResourceState,
    StackOutputs, StackState,
};

use crate::deferred::{self, Deferred};
use crate::errors::{DeclarationError, ProvisionError};
use crate::provider::Provider;

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) entity: EntityRef,
    pub(crate) resource: Resource,
    pub(crate) explicit: BTreeSet<EntityRef>,
}

/// Registry of declared entities and their dependency edges
#[derive(Debug)]
pub struct Resolver {
    stack: String,
    nodes: Vec<Node>,
    by_name: HashMap<String, usize>,
    exports: BTreeMap<String, Deferred<String>>,
    materialized: AtomicBool,
}

impl Resolver {
    /// Create an empty resolver for the named stack
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            nodes: Vec::new(),
            by_name: HashMap::new(),
            exports: BTreeMap::new(),
            materialized: AtomicBool::new(false),
        }
    }

    /// Stack name
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Register a resource with explicit dependencies
    ///
    /// Implicit dependencies are taken from the producers of the resource's
    /// deferred arguments. Cycles are reported by [`Resolver::plan`].
    pub fn declare(
        &mut self,
        resource: Resource,
        explicit_deps: &[EntityRef],
    ) -> Result<EntityRef, DeclarationError> {
        if self.by_name.contains_key(&resource.name) {
            return Err(DeclarationError::DuplicateName(resource.name));
        }

        let seq = self.nodes.len();
        let entity = EntityRef::new(seq, &resource.name);
        debug!(
            "Declared {} {} with {} explicit dependencies",
            resource.kind,
            resource.name,
            explicit_deps.len()
        );

        self.by_name.insert(resource.name.clone(), seq);
        self.nodes.push(Node {
            entity: entity.clone(),
            resource,
            explicit: explicit_deps.iter().cloned().collect(),
        });
        Ok(entity)
    }

    /// Add an explicit edge after declaration
    pub fn depends_on(
        &mut self,
        dependent: &EntityRef,
        dependency: &EntityRef,
    ) -> Result<(), DeclarationError> {
        let index = self.index_of(dependent)?;
        self.nodes[index].explicit.insert(dependency.clone());
        Ok(())
    }

    /// Register a derived deferred value computed from `values` by `f`
    pub fn resolve<T, U, F>(&self, values: Vec<Deferred<T>>, f: F) -> Deferred<U>
    where
        T: Clone + Send + Sync + 'static,
        U: Clone + Send + Sync + 'static,
        F: Fn(Vec<T>) -> U + Send + Sync + 'static,
    {
        deferred::resolve(values, f)
    }

    /// Expose a value under `name` in the run's outputs
    pub fn export(&mut self, name: impl Into<String>, value: Deferred<String>) {
        self.exports.insert(name.into(), value);
    }

    /// Names of all exports
    pub fn export_names(&self) -> Vec<&str> {
        self.exports.keys().map(String::as_str).collect()
    }

    /// Look up a declared entity by name
    pub fn entity(&self, name: &str) -> Option<&EntityRef> {
        self.by_name.get(name).map(|&i| &self.nodes[i].entity)
    }

    /// Number of declared entities
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compute the materialization order
    pub fn plan(&self) -> Result<Plan, DeclarationError> {
        let entities: Vec<EntityRef> = self.nodes.iter().map(|n| n.entity.clone()).collect();
        let deps = self
            .nodes
            .iter()
            .map(|node| {
                node.explicit
                    .iter()
                    .chain(node.resource.args.producers().iter())
                    .map(|dep| self.index_of(dep))
                    .collect::<Result<BTreeSet<usize>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        graph::topological_plan(&entities, &deps)
    }

    /// Materialize every entity against `provider` with default settings
    pub async fn materialize_all(
        &self,
        provider: &dyn Provider,
    ) -> Result<MaterializationReport, ProvisionError> {
        Materializer::new(self, provider).run().await
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn exports(&self) -> &BTreeMap<String, Deferred<String>> {
        &self.exports
    }

    /// Claim the single materialization of this resolver
    pub(crate) fn begin_materialization(&self) -> Result<(), DeclarationError> {
        if self.materialized.swap(true, Ordering::SeqCst) {
            return Err(DeclarationError::AlreadyMaterialized);
        }
        Ok(())
    }

    pub(crate) fn index_of(&self, entity: &EntityRef) -> Result<usize, DeclarationError> {
        self.nodes
            .get(entity.seq())
            .filter(|node| node.entity.same_entity(entity))
            .map(|_| entity.seq())
            .ok_or_else(|| DeclarationError::UnknownEntity(entity.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;

    #[test]
    fn test_duplicate_names_rejected() {
        let mut resolver = Resolver::new("test");
        resolver
            .declare(Resource::new("vpc", ResourceKind::Network, ResourceArgs::new()), &[])
            .unwrap();
        let err = resolver
            .declare(Resource::new("vpc", ResourceKind::Network, ResourceArgs::new()), &[])
            .unwrap_err();
        assert_eq!(err, DeclarationError::DuplicateName("vpc".into()));
    }

    #[test]
    fn test_implicit_edge_from_deferred_argument() {
        let mut resolver = Resolver::new("test");
        let vpc = resolver
            .declare(Resource::new("vpc", ResourceKind::Network, ResourceArgs::new()), &[])
            .unwrap();
        resolver
            .declare(
                Resource::new(
                    "subnet",
                    ResourceKind::Subnet,
                    ResourceArgs::new().set_deferred("vpc_id", &vpc.id()),
                ),
                &[],
            )
            .unwrap();

        let plan = resolver.plan().unwrap();
        assert_eq!(plan.dependencies_of("subnet"), vec!["vpc"]);
    }

    #[test]
    fn test_foreign_entity_is_unknown() {
        let mut other = Resolver::new("other");
        let foreign = other
            .declare(Resource::new("vpc", ResourceKind::Network, ResourceArgs::new()), &[])
            .unwrap();

        let mut resolver = Resolver::new("test");
        resolver
            .declare(Resource::new("vpc", ResourceKind::Network, ResourceArgs::new()), &[])
            .unwrap();
        resolver
            .declare(
                Resource::new("igw", ResourceKind::InternetGateway, ResourceArgs::new()),
                &[foreign],
            )
            .unwrap();

        assert_eq!(
            resolver.plan().unwrap_err(),
            DeclarationError::UnknownEntity("vpc".into())
        );
    }

    #[test]
    fn test_materialization_is_claimed_once() {
        let resolver = Resolver::new("test");
        assert!(resolver.begin_materialization().is_ok());
        assert_eq!(
            resolver.begin_materialization(),
            Err(DeclarationError::AlreadyMaterialized)
        );
    }
}
