// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provider Resource API
//!
//! The provider is the external collaborator that turns a fully resolved
//! resource request into a real resource. The resolver only ever talks to
//! it through the [`Provider`] trait.
//!
//! ```text
//! Resolver                       Provider
//! ────────                       ────────
//! ResourceRequest  ── create ──▶  (API call)
//!                  ◀─ outputs ──  {id, private_ip, ...}
//! ```
//!
//! Outputs are a flat string map. Every successful call returns at least
//! an `id`; instances also return `private_ip` and, when reachable from
//! outside, `public_ip`.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::ResourceKind;
use crate::errors::ProviderError;

pub use memory::{CallOp, InMemoryProvider, ProviderCall};

/// Attributes assigned by the provider
pub type ProviderOutputs = BTreeMap<String, String>;

/// Well-known output keys
pub mod keys {
    pub const ID: &str = "id";
    pub const PRIVATE_IP: &str = "private_ip";
    pub const PUBLIC_IP: &str = "public_ip";
    pub const CIDR_BLOCK: &str = "cidr_block";
}

/// A resource with every argument resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Logical name, unique within a stack
    pub name: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Resolved properties
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl ResourceRequest {
    /// Get a string property
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|value| value.as_str())
    }

    /// Get a boolean property, `false` when absent
    pub fn flag(&self, key: &str) -> bool {
        self.properties
            .get(key)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }
}

/// Create, update and delete provider resources
#[async_trait]
pub trait Provider: Send + Sync {
    /// Create a resource and return its assigned attributes
    async fn create(&self, request: &ResourceRequest) -> Result<ProviderOutputs, ProviderError>;

    /// Update an existing resource in place
    async fn update(
        &self,
        id: &str,
        request: &ResourceRequest,
    ) -> Result<ProviderOutputs, ProviderError>;

    /// Delete an existing resource
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ProviderError>;
}
