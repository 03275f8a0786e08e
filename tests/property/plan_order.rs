// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Planning and Materialization Order
//!
//! Random acyclic graphs are declared in a shuffled order, mixing implicit
//! edges (a deferred argument consuming an already declared entity) and
//! explicit edges added afterwards. Whatever the declaration order, the
//! plan and the actual provider call order must respect every edge.

use proptest::prelude::*;
use stack_provision::domain::ResourceKind;
use stack_provision::errors::DeclarationError;
use stack_provision::provider::InMemoryProvider;
use stack_provision::resolver::{EntityRef, Resolver, Resource, ResourceArgs};

// ============================================================================
// Graph Generation
// ============================================================================

/// Node count, `(dependent, dependency)` edges and a declaration order
#[derive(Debug, Clone)]
struct Dag {
    size: usize,
    edges: Vec<(usize, usize)>,
    declaration_order: Vec<usize>,
}

/// Edges always point from a higher to a lower logical index, so the graph is acyclic
fn arb_dag() -> impl Strategy<Value = Dag> {
    (1usize..16).prop_flat_map(|size| {
        let edges = prop::collection::vec((0..size, 0..size), 0..size * 2).prop_map(|pairs| {
            let mut edges: Vec<(usize, usize)> = pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.max(b), a.min(b)))
                .collect();
            edges.sort();
            edges.dedup();
            edges
        });
        let order = Just((0..size).collect::<Vec<_>>()).prop_shuffle();
        (Just(size), edges, order).prop_map(|(size, edges, declaration_order)| Dag {
            size,
            edges,
            declaration_order,
        })
    })
}

fn node_name(index: usize) -> String {
    format!("n{index}")
}

/// Declare `dag`, returning the resolver and the entity of every logical index
fn declare(dag: &Dag) -> (Resolver, Vec<EntityRef>) {
    let mut resolver = Resolver::new("prop");
    let mut entities: Vec<Option<EntityRef>> = vec![None; dag.size];

    for &index in &dag.declaration_order {
        let mut args = ResourceArgs::new();
        for &(dependent, dependency) in &dag.edges {
            if dependent == index {
                if let Some(producer) = &entities[dependency] {
                    args = args.set_deferred(format!("dep_{dependency}"), &producer.id());
                }
            }
        }
        let entity = resolver
            .declare(
                Resource::new(node_name(index), ResourceKind::SecurityGroup, args),
                &[],
            )
            .unwrap();
        entities[index] = Some(entity);
    }

    let entities: Vec<EntityRef> = entities.into_iter().map(Option::unwrap).collect();
    for &(dependent, dependency) in &dag.edges {
        resolver
            .depends_on(&entities[dependent], &entities[dependency])
            .unwrap();
    }
    (resolver, entities)
}

fn position(order: &[String], index: usize) -> usize {
    let name = node_name(index);
    order.iter().position(|n| *n == name).unwrap()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Property: the plan places every dependency before its dependent
    #[test]
    fn prop_plan_respects_edges(dag in arb_dag()) {
        let (resolver, _) = declare(&dag);
        let plan = resolver.plan().unwrap();
        let order: Vec<String> = plan.names().into_iter().map(String::from).collect();

        prop_assert_eq!(order.len(), dag.size);
        for &(dependent, dependency) in &dag.edges {
            prop_assert!(position(&order, dependency) < position(&order, dependent));
        }
    }

    /// Property: entities in one wave share no edge
    #[test]
    fn prop_waves_are_independent(dag in arb_dag()) {
        let (resolver, _) = declare(&dag);
        let plan = resolver.plan().unwrap();

        for wave in &plan.waves {
            let names: Vec<&str> = wave.iter().map(EntityRef::name).collect();
            for &(dependent, dependency) in &dag.edges {
                let both = names.contains(&node_name(dependent).as_str())
                    && names.contains(&node_name(dependency).as_str());
                prop_assert!(!both);
            }
        }
    }

    /// Property: planning is deterministic
    #[test]
    fn prop_plan_is_deterministic(dag in arb_dag()) {
        let (first, _) = declare(&dag);
        let (second, _) = declare(&dag);
        let (a, b) = (first.plan().unwrap(), second.plan().unwrap());
        prop_assert_eq!(a.names(), b.names());
    }

    /// Property: concurrent materialization completes producers first
    #[test]
    fn prop_materialization_respects_edges(dag in arb_dag()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (resolver, entities) = declare(&dag);
        let provider = InMemoryProvider::new();

        let report = runtime.block_on(resolver.materialize_all(&provider)).unwrap();

        let mut created = provider.created_names();
        created.sort();
        let mut completed = report.order.clone();
        completed.sort();
        prop_assert_eq!(created, completed);
        for &(dependent, dependency) in &dag.edges {
            prop_assert!(position(&report.order, dependency) < position(&report.order, dependent));
        }
        prop_assert!(entities.iter().all(EntityRef::is_materialized));
    }

    /// Property: closing any path into a loop is reported as a cycle
    #[test]
    fn prop_back_edge_is_a_cycle(dag in arb_dag()) {
        prop_assume!(!dag.edges.is_empty());
        let (mut resolver, entities) = declare(&dag);
        let (dependent, dependency) = dag.edges[0];
        resolver.depends_on(&entities[dependency], &entities[dependent]).unwrap();

        match resolver.plan() {
            Err(DeclarationError::Cycle { path }) => {
                prop_assert!(path.len() >= 3);
                prop_assert_eq!(path.first(), path.last());
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other),
        }
    }
}
