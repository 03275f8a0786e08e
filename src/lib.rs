//! Ordered provisioning of multi-instance stacks
//!
//! Declares networks, access policies and compute instances whose bootstrap
//! scripts consume attributes (private IPs, identifiers) of resources that do
//! not exist yet, and materializes them against a provider in dependency
//! order.

pub mod bootstrap;
pub mod config;
pub mod deferred;
pub mod domain;
pub mod errors;
pub mod events;
pub mod nats;
pub mod provider;
pub mod resolver;
pub mod settings;
pub mod stack;
pub mod state_machine;
pub mod subjects;

// Re-export commonly used types
pub use bootstrap::{compose, Bindings, RenderedScript, ScriptTemplate};
pub use config::StackConfig;
pub use deferred::Deferred;
pub use errors::{
    BootstrapError, DeclarationError, InfrastructureError, InfrastructureResult, ProviderError,
    ProvisionError,
};
pub use events::{EventSink, ProvisioningEvent};
pub use nats::{NatsClient, NatsConfig};
pub use provider::{InMemoryProvider, Provider, ProviderOutputs, ResourceRequest};
pub use resolver::{EntityRef, MaterializationReport, Materializer, Resolver, StackState};
pub use settings::ServiceSettings;
