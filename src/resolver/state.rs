// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack State and Run Reports
//!
//! [`StackState`] is the serializable record of what a run created. Passing
//! it to the next run lets unchanged resources be reused and changed ones be
//! updated or replaced, based on a fingerprint of their resolved arguments.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::ResourceKind;
use crate::provider::{keys, ProviderOutputs, ResourceRequest};
use crate::state_machine::EntityStatus;

/// SHA-256 over the canonical JSON of a resolved request
///
/// The name is excluded so the fingerprint only reflects what the provider
/// would be asked to build.
pub fn fingerprint(request: &ResourceRequest) -> String {
    // serde_json::Map is key-sorted, so the encoding is canonical
    digest(&serde_json::json!({
        "kind": request.kind,
        "properties": request.properties,
    }))
}

/// Fingerprint of the `keys` subset of a resolved request
///
/// `None` when `keys` is empty. A key absent from the request hashes as
/// `null`, so adding or removing a triggering argument counts as a change.
pub fn partial_fingerprint(request: &ResourceRequest, keys: &BTreeSet<String>) -> Option<String> {
    if keys.is_empty() {
        return None;
    }
    let subset: serde_json::Map<String, serde_json::Value> = keys
        .iter()
        .map(|key| {
            let value = request
                .properties
                .get(key)
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            (key.clone(), value)
        })
        .collect();
    Some(digest(&serde_json::json!({
        "kind": request.kind,
        "properties": subset,
    })))
}

fn digest(canonical: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Recorded state of one materialized resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub kind: ResourceKind,
    pub outputs: ProviderOutputs,
    pub fingerprint: String,
    /// Fingerprint of the arguments whose change forces a replacement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_fingerprint: Option<String>,
    /// Position in the run that produced it
    pub sequence: usize,
}

impl ResourceState {
    /// Provider identifier
    pub fn id(&self) -> Option<&str> {
        self.outputs.get(keys::ID).map(String::as_str)
    }
}

/// Everything a run has materialized, keyed by logical name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackState {
    pub stack: String,
    pub resources: BTreeMap<String, ResourceState>,
    /// Live resources that are no longer declared, kept until deleted
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub orphans: BTreeMap<String, ResourceState>,
}

impl StackState {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            resources: BTreeMap::new(),
            orphans: BTreeMap::new(),
        }
    }

    /// Look up a declared resource by logical name
    pub fn get(&self, name: &str) -> Option<&ResourceState> {
        self.resources.get(name)
    }

    /// Look up a live resource, declared or orphaned
    pub fn known(&self, name: &str) -> Option<&ResourceState> {
        self.resources.get(name).or_else(|| self.orphans.get(name))
    }

    /// Record a materialized resource
    pub fn insert(&mut self, name: impl Into<String>, state: ResourceState) {
        self.resources.insert(name.into(), state);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Names in the order they were materialized
    pub fn names_in_sequence(&self) -> Vec<&str> {
        let mut names: Vec<(&usize, &str)> = self
            .resources
            .iter()
            .map(|(name, state)| (&state.sequence, name.as_str()))
            .collect();
        names.sort();
        names.into_iter().map(|(_, name)| name).collect()
    }
}

/// Flat mapping of exported names to materialized values
pub type StackOutputs = BTreeMap<String, String>;

/// What happened to one entity during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Replace,
    Unchanged,
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializationReport {
    /// Names in the order their provider calls completed
    pub order: Vec<String>,

    /// Action taken per entity
    pub actions: BTreeMap<String, ChangeAction>,

    /// Final lifecycle status per entity
    pub statuses: BTreeMap<String, EntityStatus>,

    /// State to feed into the next run
    pub state: StackState,

    /// Exported values
    pub outputs: StackOutputs,

    /// Resources in the prior state that are no longer declared
    pub orphaned: Vec<String>,
}

impl MaterializationReport {
    /// Position of `name` in the completion order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    /// Names of entities that were destroyed and recreated
    pub fn replaced(&self) -> Vec<&str> {
        self.with_action(ChangeAction::Replace)
    }

    /// Names of entities that needed no provider call
    pub fn unchanged(&self) -> Vec<&str> {
        self.with_action(ChangeAction::Unchanged)
    }

    fn with_action(&self, action: ChangeAction) -> Vec<&str> {
        self.actions
            .iter()
            .filter(|(_, a)| **a == action)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(name: &str, user_data: &str) -> ResourceRequest {
        ResourceRequest {
            name: name.to_string(),
            kind: ResourceKind::Instance,
            properties: json!({"user_data": user_data, "ami": "ami-1"})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_ignores_name() {
        let a = fingerprint(&request("a", "echo hi"));
        let b = fingerprint(&request("b", "echo hi"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_properties() {
        assert_ne!(
            fingerprint(&request("a", "echo hi")),
            fingerprint(&request("a", "echo bye"))
        );
    }

    #[test]
    fn test_partial_fingerprint_ignores_other_keys() {
        let keys = BTreeSet::from(["user_data".to_string()]);
        let mut retagged = request("a", "echo hi");
        retagged.properties.insert("ami".to_string(), json!("ami-2"));

        assert_eq!(
            partial_fingerprint(&request("a", "echo hi"), &keys),
            partial_fingerprint(&retagged, &keys)
        );
        assert_ne!(
            partial_fingerprint(&request("a", "echo hi"), &keys),
            partial_fingerprint(&request("a", "echo bye"), &keys)
        );
        assert_eq!(partial_fingerprint(&retagged, &BTreeSet::new()), None);
    }

    #[test]
    fn test_state_roundtrip_and_sequence() {
        let mut state = StackState::new("ecommerce");
        for (seq, name) in ["subnet", "vpc"].iter().enumerate().rev() {
            state.insert(
                *name,
                ResourceState {
                    kind: ResourceKind::Network,
                    outputs: ProviderOutputs::from([("id".to_string(), format!("id-{}", seq))]),
                    fingerprint: String::new(),
                    replace_fingerprint: None,
                    sequence: seq,
                },
            );
        }

        assert_eq!(state.names_in_sequence(), vec!["subnet", "vpc"]);
        assert_eq!(state.get("vpc").and_then(ResourceState::id), Some("id-1"));

        state.orphans.insert(
            "retired".to_string(),
            ResourceState {
                kind: ResourceKind::Instance,
                outputs: ProviderOutputs::from([("id".to_string(), "i-old".to_string())]),
                fingerprint: String::new(),
                replace_fingerprint: Some("abc".to_string()),
                sequence: 0,
            },
        );
        assert!(state.get("retired").is_none());
        assert_eq!(state.known("retired").and_then(ResourceState::id), Some("i-old"));

        let json = serde_json::to_string(&state).unwrap();
        let back: StackState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
