// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dependency Graph Planning
//!
//! Computes a materialization order from the accumulated explicit and
//! implicit edges. Planning is where cycles are detected: edges accumulate
//! incrementally while declaring, so the graph is only known to be acyclic
//! once it is sorted.
//!
//! # Ordering
//!
//! Kahn's algorithm with declaration order as the tie-break, so the order
//! is deterministic. Each entity also gets a wave: one more than the
//! deepest of its dependencies. Entities in the same wave share no edge and
//! may be materialized concurrently.

use std::collections::{BTreeMap, BTreeSet};

use super::EntityRef;
use crate::errors::DeclarationError;

/// Materialization plan
#[derive(Debug, Clone)]
pub struct Plan {
    /// Topological order
    pub order: Vec<EntityRef>,

    /// Entities grouped by dependency depth
    pub waves: Vec<Vec<EntityRef>>,

    /// Direct dependencies (explicit and implicit) of every entity
    pub dependencies: BTreeMap<EntityRef, BTreeSet<EntityRef>>,
}

impl Plan {
    /// Position of `name` in the order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|entity| entity.name() == name)
    }

    /// Names in order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(EntityRef::name).collect()
    }

    /// Direct dependencies of `name`
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.dependencies
            .iter()
            .find(|(entity, _)| entity.name() == name)
            .map(|(_, deps)| deps.iter().map(EntityRef::name).collect())
            .unwrap_or_default()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Sort `entities` given `deps[i]`, the indices entity `i` depends on
pub(crate) fn topological_plan(
    entities: &[EntityRef],
    deps: &[BTreeSet<usize>],
) -> Result<Plan, DeclarationError> {
    let n = entities.len();
    let mut remaining: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, set) in deps.iter().enumerate() {
        for &j in set {
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
    let mut depth = vec![0usize; n];
    let mut order = Vec::with_capacity(n);
    let mut waves: Vec<Vec<EntityRef>> = Vec::new();

    while let Some(i) = ready.pop_first() {
        depth[i] = deps[i].iter().map(|&j| depth[j] + 1).max().unwrap_or(0);
        if waves.len() <= depth[i] {
            waves.resize_with(depth[i] + 1, Vec::new);
        }
        waves[depth[i]].push(entities[i].clone());
        order.push(i);

        for &k in &dependents[i] {
            remaining[k] -= 1;
            if remaining[k] == 0 {
                ready.insert(k);
            }
        }
    }

    if order.len() < n {
        return Err(DeclarationError::Cycle {
            path: find_cycle(entities, deps, &remaining),
        });
    }

    let dependencies = entities
        .iter()
        .enumerate()
        .map(|(i, entity)| {
            let set = deps[i].iter().map(|&j| entities[j].clone()).collect();
            (entity.clone(), set)
        })
        .collect();

    Ok(Plan {
        order: order.into_iter().map(|i| entities[i].clone()).collect(),
        waves,
        dependencies,
    })
}

/// Walk dependency edges among unsorted entities until one repeats
///
/// Every entity left over by Kahn's algorithm still has an unsorted
/// dependency, so the walk always continues and must close a cycle.
fn find_cycle(
    entities: &[EntityRef],
    deps: &[BTreeSet<usize>],
    remaining: &[usize],
) -> Vec<String> {
    let unsorted = |i: usize| remaining[i] > 0;
    let Some(start) = (0..entities.len()).find(|&i| unsorted(i)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = deps[current].iter().copied().find(|&j| unsorted(j)) else {
            break;
        };
        if let Some(pos) = path.iter().position(|&i| i == next) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|&i| entities[i].name().to_string())
                .collect();
            cycle.push(entities[next].name().to_string());
            return cycle;
        }
        path.push(next);
        current = next;
    }

    path.iter().map(|&i| entities[i].name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(names: &[&str]) -> Vec<EntityRef> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| EntityRef::new(i, name))
            .collect()
    }

    #[test]
    fn test_diamond_order_and_waves() {
        let e = entities(&["database", "messaging", "app", "edge"]);
        let deps = vec![
            BTreeSet::new(),
            BTreeSet::new(),
            BTreeSet::from([0, 1]),
            BTreeSet::from([2]),
        ];

        let plan = topological_plan(&e, &deps).unwrap();
        assert_eq!(plan.names(), vec!["database", "messaging", "app", "edge"]);
        assert_eq!(plan.waves.len(), 3);
        assert_eq!(plan.waves[0].len(), 2);
        assert_eq!(plan.dependencies_of("app"), vec!["database", "messaging"]);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let e = entities(&["late", "early"]);
        let deps = vec![BTreeSet::from([1]), BTreeSet::new()];
        let plan = topological_plan(&e, &deps).unwrap();
        assert_eq!(plan.names(), vec!["early", "late"]);
    }

    #[test]
    fn test_cycle_is_named() {
        let e = entities(&["root", "a", "b"]);
        let deps = vec![BTreeSet::new(), BTreeSet::from([0, 2]), BTreeSet::from([1])];

        match topological_plan(&e, &deps) {
            Err(DeclarationError::Cycle { path }) => {
                assert_eq!(path, vec!["a", "b", "a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_loop() {
        let e = entities(&["solo"]);
        let deps = vec![BTreeSet::from([0])];
        assert!(matches!(
            topological_plan(&e, &deps),
            Err(DeclarationError::Cycle { .. })
        ));
    }
}
