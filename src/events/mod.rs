// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Events
//!
//! Immutable facts emitted while a stack is materialized. Every event of a
//! run shares the run's correlation id, so consumers can reassemble a run
//! from the stream.
//!
//! # Event Flow
//!
//! ```text
//! ResourceCreating ──▶ ResourceCreated | ResourceUpdated | ResourceReplaced
//!                  └─▶ ResourceFailed ──▶ RunAborted
//! ResourceUnchanged (re-run, no provider call)
//! ... ──▶ RunCompleted
//! ```
//!
//! # Subjects
//!
//! Events are routed as `provisioning.{stack}.{resource|run}.{operation}`,
//! see [`crate::subjects`].

pub mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ResourceKind;
use crate::resolver::ChangeAction;
use crate::subjects::{Operation, SubjectBuilder};

pub use sink::{EventSink, NatsEventSink, NullSink, RecordingSink};

/// Envelope for every provisioning event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningEvent {
    /// Unique event id (UUID v7, time-ordered)
    pub event_id: Uuid,

    /// Correlation id shared by every event of one run
    pub run_id: Uuid,

    /// Stack the run materializes
    pub stack: String,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,

    /// Schema version
    pub event_version: u32,

    /// What happened
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ProvisioningEvent {
    pub fn new(run_id: Uuid, stack: impl Into<String>, kind: EventKind) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            run_id,
            stack: stack.into(),
            timestamp: Utc::now(),
            event_version: 1,
            kind,
        }
    }

    /// NATS subject this event is published on
    pub fn subject(&self) -> String {
        SubjectBuilder::new(&self.stack)
            .operation(self.kind.operation())
            .build()
    }
}

/// Provisioning event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    /// A provider call was started
    ResourceCreating {
        name: String,
        resource_kind: ResourceKind,
        action: ChangeAction,
    },

    /// A resource was created
    ResourceCreated {
        name: String,
        resource_kind: ResourceKind,
        id: String,
    },

    /// A resource was updated in place
    ResourceUpdated {
        name: String,
        resource_kind: ResourceKind,
        id: String,
    },

    /// A resource was destroyed and created again
    ResourceReplaced {
        name: String,
        resource_kind: ResourceKind,
        id: String,
    },

    /// A resource was reused from the prior state
    ResourceUnchanged {
        name: String,
        resource_kind: ResourceKind,
        id: String,
    },

    /// A provider call failed
    ResourceFailed {
        name: String,
        resource_kind: ResourceKind,
        error: String,
    },

    /// Every entity materialized
    RunCompleted { materialized: usize, unchanged: usize },

    /// The run stopped after a failure
    RunAborted {
        failed: String,
        materialized: usize,
        skipped: usize,
    },
}

impl EventKind {
    /// Subject operation for this payload
    pub fn operation(&self) -> Operation {
        match self {
            EventKind::ResourceCreating { .. } => Operation::Creating,
            EventKind::ResourceCreated { .. } => Operation::Created,
            EventKind::ResourceUpdated { .. } => Operation::Updated,
            EventKind::ResourceReplaced { .. } => Operation::Replaced,
            EventKind::ResourceUnchanged { .. } => Operation::Unchanged,
            EventKind::ResourceFailed { .. } => Operation::Failed,
            EventKind::RunCompleted { .. } => Operation::Completed,
            EventKind::RunAborted { .. } => Operation::Aborted,
        }
    }

    /// Logical resource name, for resource-scoped events
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            EventKind::ResourceCreating { name, .. }
            | EventKind::ResourceCreated { name, .. }
            | EventKind::ResourceUpdated { name, .. }
            | EventKind::ResourceReplaced { name, .. }
            | EventKind::ResourceUnchanged { name, .. }
            | EventKind::ResourceFailed { name, .. } => Some(name),
            EventKind::RunCompleted { .. } | EventKind::RunAborted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_serialization_is_flat() {
        let event = ProvisioningEvent::new(
            Uuid::now_v7(),
            "ecommerce",
            EventKind::ResourceCreated {
                name: "vpc".into(),
                resource_kind: ResourceKind::Network,
                id: "vpc-0abc".into(),
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "resource_created");
        assert_eq!(json["resource_kind"], "network");
        assert_eq!(json["name"], "vpc");

        let back: ProvisioningEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_subjects() {
        let run = Uuid::now_v7();
        let created = ProvisioningEvent::new(
            run,
            "ecommerce",
            EventKind::ResourceCreated {
                name: "vpc".into(),
                resource_kind: ResourceKind::Network,
                id: "vpc-1".into(),
            },
        );
        let aborted = ProvisioningEvent::new(
            run,
            "ecommerce",
            EventKind::RunAborted {
                failed: "vpc".into(),
                materialized: 0,
                skipped: 3,
            },
        );

        assert_eq!(created.subject(), "provisioning.ecommerce.resource.created");
        assert_eq!(aborted.subject(), "provisioning.ecommerce.run.aborted");
        assert_eq!(aborted.kind.resource_name(), None);
    }
}
