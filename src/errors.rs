//! Error types for provisioning operations
//!
//! Errors are split along the layers of a run:
//!
//! - [`DeclarationError`] - the declared graph is malformed. Always detected
//!   before any resource is created.
//! - [`ProviderError`] - the provider API rejected or failed a call.
//! - [`ProvisionError`] - what a run returns. Provider failures carry the
//!   partial [`StackState`] of everything created before the failure.
//! - [`InfrastructureError`] - messaging and serialization plumbing.

use thiserror::Error;

use crate::resolver::StackState;

/// Malformed or cyclic declarations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    /// The dependency graph contains a cycle
    #[error("Dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// A reference does not belong to this resolver
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Two resources were declared with the same name
    #[error("Duplicate resource name: {0}")]
    DuplicateName(String),

    /// Network topology invariant violated
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Access policy convention violated
    #[error("Invalid access policy: {0}")]
    InvalidPolicy(String),

    /// A bootstrap template placeholder has no binding
    #[error("Unbound placeholder: {{{0}}}")]
    UnboundPlaceholder(String),

    /// A bootstrap template or binding is malformed
    #[error("Invalid bootstrap template: {0}")]
    InvalidTemplate(String),

    /// The resolver already ran
    #[error("Resolver has already been materialized")]
    AlreadyMaterialized,
}

/// Provider API failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider refused the request
    #[error("{resource} rejected: {reason}")]
    Rejected { resource: String, reason: String },

    /// The referenced provider resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The provider could not be reached or is in a bad state
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Bootstrap script composition failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// Placeholder names are `[A-Za-z_][A-Za-z0-9_]*`
    #[error("Invalid placeholder name: {0:?}")]
    InvalidPlaceholder(String),

    /// The template uses a placeholder with no binding
    #[error("Unbound placeholder: {{{0}}}")]
    Unbound(String),

    /// The placeholder pattern failed to compile
    #[error("Placeholder pattern error: {0}")]
    Pattern(String),
}

impl From<BootstrapError> for DeclarationError {
    fn from(err: BootstrapError) -> Self {
        match err {
            BootstrapError::Unbound(name) => DeclarationError::UnboundPlaceholder(name),
            other => DeclarationError::InvalidTemplate(other.to_string()),
        }
    }
}

/// Errors returned by a materialization run
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Declaration problem, nothing was created
    #[error("Declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    /// Provider call failed; `partial` holds what was created before
    #[error("Provider error while materializing '{entity}': {source}")]
    Provider {
        entity: String,
        #[source]
        source: ProviderError,
        partial: Box<StackState>,
    },

    /// A consumed deferred value was still unresolved when its consumer was due
    #[error("Input '{input}' of '{entity}' is unresolved")]
    UnresolvedInput {
        entity: String,
        input: String,
        partial: Box<StackState>,
    },
}

impl ProvisionError {
    /// State of resources created before the run stopped, if any
    pub fn partial_state(&self) -> Option<&StackState> {
        match self {
            ProvisionError::Declaration(_) => None,
            ProvisionError::Provider { partial, .. } => Some(partial),
            ProvisionError::UnresolvedInput { partial, .. } => Some(partial),
        }
    }
}

/// Errors that can occur in messaging and serialization plumbing
#[derive(Debug, Error)]
pub enum InfrastructureError {
    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// NATS publish error
    #[error("NATS publish error: {0}")]
    NatsPublish(String),

    /// NATS subscribe error
    #[error("NATS subscribe error: {0}")]
    NatsSubscribe(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for messaging operations
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;

impl From<async_nats::Error> for InfrastructureError {
    fn from(err: async_nats::Error) -> Self {
        InfrastructureError::NatsConnection(err.to_string())
    }
}

impl From<serde_json::Error> for InfrastructureError {
    fn from(err: serde_json::Error) -> Self {
        InfrastructureError::Serialization(err.to_string())
    }
}
