// Copyright (c) 2025 - Cowboy AI, Inc.
//! Materialization Engine
//!
//! Walks the planned graph and drives the provider.
//!
//! # Scheduling
//!
//! ```text
//! ready set ──▶ resolve args ──▶ provider call (≤ max_parallel in flight)
//!     ▲                                  │
//!     └──── dependents released ◀────────┘ outputs written to entity slot
//! ```
//!
//! An entity enters the ready set only once every explicit and implicit
//! predecessor has finished, so its deferred arguments are resolvable when
//! it is picked. Independent branches run concurrently.
//!
//! # Failure
//!
//! The first provider failure stops scheduling. Calls already in flight are
//! allowed to finish and are recorded; nothing is rolled back. The error
//! carries the partial [`StackState`]: what this run materialized, plus every
//! prior resource the run did not get to, or failed to change, since those
//! still exist at the provider.
//!
//! # Orphans
//!
//! Prior resources that are no longer declared are never deleted. They move
//! to [`StackState::orphans`] and stay there across runs until declared
//! again or removed by hand.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::{
    fingerprint, partial_fingerprint, ChangeAction, MaterializationReport, ResourceState,
    StackState,
};
use super::{Node, Resolver};
use crate::domain::ResourceKind;
use crate::errors::{ProviderError, ProvisionError};
use crate::events::{EventKind, EventSink, NullSink, ProvisioningEvent};
use crate::provider::{Provider, ProviderOutputs, ResourceRequest};
use crate::state_machine::{EntityStatus, LifecycleInput, Tracked};

/// Provider calls allowed in flight at once unless configured otherwise
pub const DEFAULT_MAX_PARALLEL: usize = 10;

/// Provider operation chosen for one entity
#[derive(Debug, Clone)]
enum Operation {
    Create,
    Update { id: String },
    Replace { kind: ResourceKind, id: String },
}

impl Operation {
    fn action(&self) -> ChangeAction {
        match self {
            Operation::Create => ChangeAction::Create,
            Operation::Update { .. } => ChangeAction::Update,
            Operation::Replace { .. } => ChangeAction::Replace,
        }
    }

    fn lifecycle_input(&self) -> LifecycleInput {
        match self {
            Operation::Create => LifecycleInput::Begin,
            Operation::Update { .. } => LifecycleInput::BeginUpdate,
            Operation::Replace { .. } => LifecycleInput::BeginReplace,
        }
    }
}

enum Decision {
    Reuse(ResourceState),
    Call(Operation),
}

/// Choose between reuse, create, update and replace
///
/// A resource is replaced when its kind changed or when one of its replace
/// triggers changed; any other argument change is an update.
fn decide(
    node: &Node,
    prior: Option<&ResourceState>,
    fingerprint: &str,
    replace_fingerprint: Option<&str>,
) -> Decision {
    let Some(prev) = prior else {
        return Decision::Call(Operation::Create);
    };

    if prev.fingerprint == fingerprint && prev.kind == node.resource.kind {
        return Decision::Reuse(prev.clone());
    }

    let triggered = replace_fingerprint.is_some()
        && prev.replace_fingerprint.as_deref() != replace_fingerprint;
    match prev.id() {
        None => Decision::Call(Operation::Create),
        Some(id) if triggered || prev.kind != node.resource.kind => {
            Decision::Call(Operation::Replace {
                kind: prev.kind,
                id: id.to_string(),
            })
        }
        Some(id) => Decision::Call(Operation::Update { id: id.to_string() }),
    }
}

/// Resolve every argument; `Err` names the first unresolved one
fn resolve_request(node: &Node) -> Result<ResourceRequest, String> {
    let mut properties = serde_json::Map::new();
    for (key, input) in node.resource.args.iter() {
        let value = input.try_get().ok_or_else(|| key.clone())?;
        properties.insert(key.clone(), value);
    }
    Ok(ResourceRequest {
        name: node.resource.name.clone(),
        kind: node.resource.kind,
        properties,
    })
}

/// Run `operation`; the flag is set once the previous resource is gone
async fn execute(
    provider: &dyn Provider,
    operation: &Operation,
    request: &ResourceRequest,
) -> (Result<ProviderOutputs, ProviderError>, bool) {
    match operation {
        Operation::Create => (provider.create(request).await, false),
        Operation::Update { id } => (provider.update(id, request).await, false),
        Operation::Replace { kind, id } => match provider.delete(*kind, id).await {
            Ok(()) => (provider.create(request).await, true),
            Err(e) => (Err(e), false),
        },
    }
}

struct Completion {
    index: usize,
    operation: Operation,
    request: ResourceRequest,
    fingerprint: String,
    replace_fingerprint: Option<String>,
    result: Result<ProviderOutputs, ProviderError>,
    prior_deleted: bool,
}

enum Failure {
    Provider { entity: String, source: ProviderError },
    Unresolved { entity: String, input: String },
}

impl Failure {
    fn into_error(self, partial: StackState) -> ProvisionError {
        match self {
            Failure::Provider { entity, source } => ProvisionError::Provider {
                entity,
                source,
                partial: Box::new(partial),
            },
            Failure::Unresolved { entity, input } => ProvisionError::UnresolvedInput {
                entity,
                input,
                partial: Box::new(partial),
            },
        }
    }

    fn entity(&self) -> &str {
        match self {
            Failure::Provider { entity, .. } | Failure::Unresolved { entity, .. } => entity,
        }
    }
}

/// Configurable materialization run over a resolver
pub struct Materializer<'a> {
    resolver: &'a Resolver,
    provider: &'a dyn Provider,
    sink: &'a dyn EventSink,
    prior: Option<&'a StackState>,
    max_parallel: usize,
}

impl<'a> Materializer<'a> {
    /// Create a run with no prior state, no event sink and default parallelism
    pub fn new(resolver: &'a Resolver, provider: &'a dyn Provider) -> Self {
        Self {
            resolver,
            provider,
            sink: &NullSink,
            prior: None,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    /// Publish provisioning events to `sink`
    pub fn with_sink(mut self, sink: &'a dyn EventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Reconcile against the state of a previous run
    pub fn with_prior(mut self, prior: &'a StackState) -> Self {
        self.prior = Some(prior);
        self
    }

    /// Bound the number of concurrent provider calls (minimum 1)
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Execute the run
    pub async fn run(self) -> Result<MaterializationReport, ProvisionError> {
        let plan = self.resolver.plan()?;
        self.resolver.begin_materialization()?;

        let run_id = Uuid::now_v7();
        let stack = self.resolver.stack().to_string();
        let nodes = self.resolver.nodes();
        let n = nodes.len();
        info!(
            "Materializing {} resources for stack {} in {} waves",
            n,
            stack,
            plan.waves.len()
        );

        let mut remaining = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (entity, deps) in &plan.dependencies {
            remaining[entity.seq()] = deps.len();
            for dep in deps {
                dependents[dep.seq()].push(entity.seq());
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut lifecycles: Vec<Tracked<EntityStatus>> = (0..n)
            .map(|_| Tracked::new(EntityStatus::Declared))
            .collect();
        let mut state = StackState::new(stack.as_str());
        let mut order: Vec<String> = Vec::with_capacity(n);
        let mut actions: BTreeMap<String, ChangeAction> = BTreeMap::new();
        let mut in_flight = FuturesUnordered::new();
        let mut failure: Option<Failure> = None;
        // Prior resources deleted by a replacement whose create then failed
        let mut deleted: BTreeSet<String> = BTreeSet::new();

        loop {
            while failure.is_none() && in_flight.len() < self.max_parallel {
                let Some(index) = ready.pop_first() else {
                    break;
                };
                let node = &nodes[index];
                let name = node.resource.name.clone();

                let request = match resolve_request(node) {
                    Ok(request) => request,
                    Err(input) => {
                        error!("Input {} of {} is unresolved", input, name);
                        failure = Some(Failure::Unresolved {
                            entity: name,
                            input,
                        });
                        break;
                    }
                };
                let fingerprint = fingerprint(&request);
                let replace_fingerprint =
                    partial_fingerprint(&request, &node.resource.replace_triggers);
                let prior = self.prior.and_then(|prior| prior.known(&name));

                match decide(node, prior, &fingerprint, replace_fingerprint.as_deref()) {
                    Decision::Reuse(prev) => {
                        advance(&mut lifecycles[index], LifecycleInput::Reuse, &name);
                        node.entity.fill(prev.outputs.clone());
                        let id = prev.id().unwrap_or_default().to_string();
                        state.insert(
                            name.as_str(),
                            ResourceState {
                                replace_fingerprint,
                                sequence: order.len(),
                                ..prev
                            },
                        );
                        order.push(name.clone());
                        actions.insert(name.clone(), ChangeAction::Unchanged);
                        debug!("{} unchanged ({})", name, id);
                        self.emit(
                            run_id,
                            EventKind::ResourceUnchanged {
                                name,
                                resource_kind: node.resource.kind,
                                id,
                            },
                        )
                        .await;
                        release(index, &dependents, &mut remaining, &mut ready);
                    }
                    Decision::Call(operation) => {
                        advance(
                            &mut lifecycles[index],
                            operation.lifecycle_input(),
                            &name,
                        );
                        self.emit(
                            run_id,
                            EventKind::ResourceCreating {
                                name,
                                resource_kind: node.resource.kind,
                                action: operation.action(),
                            },
                        )
                        .await;

                        let provider = self.provider;
                        in_flight.push(async move {
                            let (result, prior_deleted) =
                                execute(provider, &operation, &request).await;
                            Completion {
                                index,
                                operation,
                                request,
                                fingerprint,
                                replace_fingerprint,
                                result,
                                prior_deleted,
                            }
                        });
                    }
                }
            }

            let Some(done) = in_flight.next().await else {
                break;
            };
            let name = done.request.name.clone();
            let kind = done.request.kind;

            match done.result {
                Ok(outputs) => {
                    advance(&mut lifecycles[done.index], LifecycleInput::Succeed, &name);
                    let id = outputs.get(crate::provider::keys::ID).cloned().unwrap_or_default();
                    nodes[done.index].entity.fill(outputs.clone());
                    state.insert(
                        name.as_str(),
                        ResourceState {
                            kind,
                            outputs,
                            fingerprint: done.fingerprint,
                            replace_fingerprint: done.replace_fingerprint,
                            sequence: order.len(),
                        },
                    );
                    order.push(name.clone());
                    let action = done.operation.action();
                    actions.insert(name.clone(), action);
                    let elapsed = lifecycles[done.index]
                        .last_dwell()
                        .map(|d| d.num_milliseconds())
                        .unwrap_or_default();
                    debug!("{} {:?} complete ({}) in {}ms", name, action, id, elapsed);

                    let event = match action {
                        ChangeAction::Update => EventKind::ResourceUpdated {
                            name,
                            resource_kind: kind,
                            id,
                        },
                        ChangeAction::Replace => EventKind::ResourceReplaced {
                            name,
                            resource_kind: kind,
                            id,
                        },
                        _ => EventKind::ResourceCreated {
                            name,
                            resource_kind: kind,
                            id,
                        },
                    };
                    self.emit(run_id, event).await;
                    release(done.index, &dependents, &mut remaining, &mut ready);
                }
                Err(source) => {
                    advance(&mut lifecycles[done.index], LifecycleInput::Fail, &name);
                    error!("Provider failed for {}: {}", name, source);
                    if done.prior_deleted {
                        deleted.insert(name.clone());
                    }
                    self.emit(
                        run_id,
                        EventKind::ResourceFailed {
                            name: name.clone(),
                            resource_kind: kind,
                            error: source.to_string(),
                        },
                    )
                    .await;
                    if failure.is_none() {
                        failure = Some(Failure::Provider {
                            entity: name,
                            source,
                        });
                    }
                }
            }
        }

        if let Some(failure) = failure {
            let mut skipped = 0;
            for (index, tracker) in lifecycles.iter_mut().enumerate() {
                if *tracker.state() == EntityStatus::Declared {
                    advance(tracker, LifecycleInput::Skip, &nodes[index].resource.name);
                    skipped += 1;
                }
            }
            let materialized = order.len();
            let retained = self.retain_prior(&mut state, &deleted);
            self.carry_orphans(&mut state);
            warn!(
                "Run aborted at {}: {} materialized, {} skipped, {} prior resources retained",
                failure.entity(),
                materialized,
                skipped,
                retained
            );
            self.emit(
                run_id,
                EventKind::RunAborted {
                    failed: failure.entity().to_string(),
                    materialized,
                    skipped,
                },
            )
            .await;
            return Err(failure.into_error(state));
        }

        let orphaned = self.carry_orphans(&mut state);
        for name in &orphaned {
            warn!("{} is no longer declared and was left in place", name);
        }

        let mut outputs = BTreeMap::new();
        for (key, value) in self.resolver.exports() {
            match value.try_get() {
                Some(value) => {
                    outputs.insert(key.clone(), value);
                }
                None => {
                    return Err(Failure::Unresolved {
                        entity: "outputs".to_string(),
                        input: key.clone(),
                    }
                    .into_error(state));
                }
            }
        }

        let statuses = nodes
            .iter()
            .zip(&lifecycles)
            .map(|(node, tracker)| (node.resource.name.clone(), *tracker.state()))
            .collect();

        let unchanged = actions
            .values()
            .filter(|a| **a == ChangeAction::Unchanged)
            .count();
        info!(
            "Stack {} materialized: {} resources, {} unchanged",
            stack,
            order.len(),
            unchanged
        );
        self.emit(
            run_id,
            EventKind::RunCompleted {
                materialized: order.len(),
                unchanged,
            },
        )
        .await;

        Ok(MaterializationReport {
            order,
            actions,
            statuses,
            state,
            outputs,
            orphaned,
        })
    }

    /// Copy in the prior entry of every declared entity this run left
    /// unrecorded, except those whose resource was deleted; returns the count
    fn retain_prior(&self, state: &mut StackState, deleted: &BTreeSet<String>) -> usize {
        let Some(prior) = self.prior else {
            return 0;
        };
        let mut retained = 0;
        for node in self.resolver.nodes() {
            let name = &node.resource.name;
            if state.get(name).is_some() || deleted.contains(name) {
                continue;
            }
            if let Some(prev) = prior.known(name) {
                let sequence = state.len();
                state.insert(
                    name.as_str(),
                    ResourceState {
                        sequence,
                        ..prev.clone()
                    },
                );
                retained += 1;
            }
        }
        retained
    }

    /// Move prior resources that are no longer declared into `state.orphans`
    fn carry_orphans(&self, state: &mut StackState) -> Vec<String> {
        let Some(prior) = self.prior else {
            return Vec::new();
        };
        for (name, prev) in prior.resources.iter().chain(&prior.orphans) {
            if self.resolver.entity(name).is_none() {
                state.orphans.insert(name.clone(), prev.clone());
            }
        }
        state.orphans.keys().cloned().collect()
    }

    async fn emit(&self, run_id: Uuid, kind: EventKind) {
        let event = ProvisioningEvent::new(run_id, self.resolver.stack(), kind);
        if let Err(e) = self.sink.emit(&event).await {
            warn!("Failed to publish {}: {}", event.kind.operation(), e);
        }
    }
}

fn release(
    index: usize,
    dependents: &[Vec<usize>],
    remaining: &mut [usize],
    ready: &mut BTreeSet<usize>,
) {
    for &dependent in &dependents[index] {
        remaining[dependent] -= 1;
        if remaining[dependent] == 0 {
            ready.insert(dependent);
        }
    }
}

fn advance(
    tracker: &mut Tracked<EntityStatus>,
    input: LifecycleInput,
    name: &str,
) {
    match tracker.apply(input, Utc::now()) {
        Ok(output) => {
            for warning in output.warnings {
                if output.is_critical {
                    error!("{}: {}", name, warning);
                } else {
                    warn!("{}: {}", name, warning);
                }
            }
        }
        Err(e) => error!("Lifecycle violation for {}: {}", name, e),
    }
}
