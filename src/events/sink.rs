// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Sinks
//!
//! Where provisioning events go. The materializer only logs sink failures;
//! an unavailable event bus never stops a run.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

use super::ProvisioningEvent;
use crate::errors::InfrastructureResult;
use crate::nats::NatsClient;

/// Destination for provisioning events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &ProvisioningEvent) -> InfrastructureResult<()>;
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: &ProvisioningEvent) -> InfrastructureResult<()> {
        Ok(())
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProvisioningEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events in emission order
    pub fn events(&self) -> Vec<ProvisioningEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Subjects of recorded events in emission order
    pub fn subjects(&self) -> Vec<String> {
        self.events().iter().map(ProvisioningEvent::subject).collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: &ProvisioningEvent) -> InfrastructureResult<()> {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
        Ok(())
    }
}

/// Publishes events as JSON on their NATS subject
#[derive(Clone)]
pub struct NatsEventSink {
    client: NatsClient,
}

impl NatsEventSink {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventSink for NatsEventSink {
    async fn emit(&self, event: &ProvisioningEvent) -> InfrastructureResult<()> {
        let subject = event.subject();
        self.client.publish(&subject, event).await?;
        debug!("Published {} to {}", event.event_id, subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        let run = Uuid::now_v7();
        for materialized in 0..3 {
            sink.emit(&ProvisioningEvent::new(
                run,
                "test",
                EventKind::RunCompleted {
                    materialized,
                    unchanged: 0,
                },
            ))
            .await
            .unwrap();
        }

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[2].kind,
            EventKind::RunCompleted { materialized: 2, .. }
        ));
        assert_eq!(sink.subjects()[0], "provisioning.test.run.completed");
    }

    #[tokio::test]
    async fn test_null_sink_accepts_everything() {
        let event = ProvisioningEvent::new(
            Uuid::now_v7(),
            "test",
            EventKind::RunCompleted {
                materialized: 0,
                unchanged: 0,
            },
        );
        assert!(NullSink.emit(&event).await.is_ok());
    }
}
