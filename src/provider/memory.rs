// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-Memory Provider
//!
//! A simulated provider that keeps resources in memory. It assigns
//! identifiers the way a cloud API does, hands out private addresses from
//! the owning subnet's block and public addresses from `203.0.113.0/24`
//! (TEST-NET-3), and records every call it receives.
//!
//! Failure injection and artificial latency make it suitable for exercising
//! the resolver's ordering, concurrency and abort behavior.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{keys, Provider, ProviderOutputs, ResourceRequest};
use crate::domain::{CidrBlock, ResourceKind};
use crate::errors::ProviderError;

/// First host index handed out in a subnet; lower addresses are reserved
const FIRST_HOST_INDEX: u32 = 10;

/// Provider operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOp {
    Create,
    Update,
    Delete,
}

/// Record of one provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub op: CallOp,
    pub name: String,
    pub kind: ResourceKind,
}

#[derive(Debug, Clone)]
struct StoredResource {
    name: String,
    kind: ResourceKind,
    outputs: ProviderOutputs,
}

#[derive(Debug, Clone)]
struct SubnetAllocation {
    cidr: CidrBlock,
    next_host: u32,
    public: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    resources: BTreeMap<String, StoredResource>,
    subnets: HashMap<String, SubnetAllocation>,
    next_public: u32,
    calls: Vec<ProviderCall>,
}

/// Simulated provider backed by an in-memory resource table
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    state: Mutex<MemoryState>,
    latency: Duration,
    failures: Mutex<HashSet<String>>,
}

impl InMemoryProvider {
    /// Create an empty provider with no latency
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject create and update calls for the named resource
    pub fn fail_on(self, name: impl Into<String>) -> Self {
        self.inject_failure(name);
        self
    }

    /// Start rejecting create and update calls for the named resource
    pub fn inject_failure(&self, name: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(name.into());
        }
    }

    /// Stop rejecting calls
    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    /// Every call received so far, in arrival order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().map(|state| state.calls.clone()).unwrap_or_default()
    }

    /// Names of resources created so far, in creation order
    pub fn created_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.op == CallOp::Create)
            .map(|call| call.name)
            .collect()
    }

    /// Number of live resources
    pub fn resource_count(&self) -> usize {
        self.lock().map(|state| state.resources.len()).unwrap_or(0)
    }

    /// Current outputs of the live resource with the given logical name
    pub fn outputs_of(&self, name: &str) -> Option<ProviderOutputs> {
        let state = self.lock().ok()?;
        state
            .resources
            .values()
            .find(|resource| resource.name == name)
            .map(|resource| resource.outputs.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, ProviderError> {
        self.state
            .lock()
            .map_err(|_| ProviderError::Unavailable("provider state poisoned".to_string()))
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check_failure(&self, request: &ResourceRequest) -> Result<(), ProviderError> {
        let injected = self
            .failures
            .lock()
            .map(|failures| failures.contains(&request.name))
            .unwrap_or(false);
        if injected {
            return Err(ProviderError::Rejected {
                resource: request.name.clone(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl MemoryState {
    fn record(&mut self, op: CallOp, name: &str, kind: ResourceKind) {
        self.calls.push(ProviderCall {
            op,
            name: name.to_string(),
            kind,
        });
    }

    fn next_public_ip(&mut self) -> Result<String, ProviderError> {
        self.next_public += 1;
        let pool = CidrBlock::from_parts([203, 0, 113, 0].into(), 24)
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        pool.nth(self.next_public)
            .map(|ip| ip.to_string())
            .ok_or_else(|| ProviderError::Unavailable("public address pool exhausted".to_string()))
    }

    fn assign_outputs(
        &mut self,
        id: &str,
        request: &ResourceRequest,
    ) -> Result<ProviderOutputs, ProviderError> {
        let mut outputs = ProviderOutputs::new();
        outputs.insert(keys::ID.to_string(), id.to_string());

        let rejected = |reason: String| ProviderError::Rejected {
            resource: request.name.clone(),
            reason,
        };

        match request.kind {
            ResourceKind::Network => {
                if let Some(cidr) = request.str_property("cidr_block") {
                    outputs.insert(keys::CIDR_BLOCK.to_string(), cidr.to_string());
                }
            }
            ResourceKind::Subnet => {
                let cidr = request
                    .str_property("cidr_block")
                    .ok_or_else(|| rejected("missing cidr_block".to_string()))?;
                let cidr = CidrBlock::new(cidr).map_err(|e| rejected(e.to_string()))?;
                self.subnets.insert(
                    id.to_string(),
                    SubnetAllocation {
                        cidr,
                        next_host: FIRST_HOST_INDEX,
                        public: request.flag("map_public_ip_on_launch"),
                    },
                );
                outputs.insert(keys::CIDR_BLOCK.to_string(), cidr.to_string());
            }
            ResourceKind::ElasticIp => {
                outputs.insert(keys::PUBLIC_IP.to_string(), self.next_public_ip()?);
            }
            ResourceKind::Instance => {
                let subnet_id = request
                    .str_property("subnet_id")
                    .ok_or_else(|| rejected("missing subnet_id".to_string()))?;
                let allocation = self
                    .subnets
                    .get_mut(subnet_id)
                    .ok_or_else(|| ProviderError::NotFound(subnet_id.to_string()))?;
                let private_ip = allocation
                    .cidr
                    .nth(allocation.next_host)
                    .filter(|ip| *ip != allocation.cidr.broadcast())
                    .ok_or_else(|| rejected(format!("subnet {} exhausted", subnet_id)))?;
                allocation.next_host += 1;
                let public = allocation.public || request.flag("associate_public_ip_address");

                outputs.insert(keys::PRIVATE_IP.to_string(), private_ip.to_string());
                if public {
                    outputs.insert(keys::PUBLIC_IP.to_string(), self.next_public_ip()?);
                }
            }
            _ => {}
        }

        Ok(outputs)
    }
}

fn new_id(kind: ResourceKind) -> String {
    let raw = Uuid::now_v7().simple().to_string();
    format!("{}-{}", kind.id_prefix(), &raw[15..])
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn create(&self, request: &ResourceRequest) -> Result<ProviderOutputs, ProviderError> {
        self.simulate_latency().await;

        let mut state = self.lock()?;
        state.record(CallOp::Create, &request.name, request.kind);
        self.check_failure(request)?;

        let id = new_id(request.kind);
        let outputs = state.assign_outputs(&id, request)?;
        state.resources.insert(
            id.clone(),
            StoredResource {
                name: request.name.clone(),
                kind: request.kind,
                outputs: outputs.clone(),
            },
        );

        debug!("Created {} {} as {}", request.kind, request.name, id);
        Ok(outputs)
    }

    async fn update(
        &self,
        id: &str,
        request: &ResourceRequest,
    ) -> Result<ProviderOutputs, ProviderError> {
        self.simulate_latency().await;

        let mut state = self.lock()?;
        state.record(CallOp::Update, &request.name, request.kind);
        self.check_failure(request)?;

        let resource = state
            .resources
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        resource.name = request.name.clone();

        debug!("Updated {} {} ({})", request.kind, request.name, id);
        Ok(resource.outputs.clone())
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ProviderError> {
        self.simulate_latency().await;

        let mut state = self.lock()?;
        let resource = state
            .resources
            .remove(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        state.subnets.remove(id);
        state.record(CallOp::Delete, &resource.name, kind);

        debug!("Deleted {} {} ({})", kind, resource.name, id);
        Ok(())
    }
}
