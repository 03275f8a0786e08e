//! NATS client for publishing provisioning events
//!
//! Thin wrapper over `async_nats` that serializes payloads as JSON and
//! bounds every publish by a timeout, so a stalled server slows a run down
//! by at most `publish_timeout` per event.

use async_nats::{Client, ConnectOptions, Subscriber};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{InfrastructureError, InfrastructureResult};

/// Connection settings
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Server URLs, tried in order
    pub servers: Vec<String>,
    /// Client name shown in server monitoring
    pub name: String,
    pub connect_timeout: Duration,
    /// Upper bound on one publish
    pub publish_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "stack-provision".to_string(),
            connect_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

impl NatsConfig {
    /// Settings for a comma-separated server list, other settings default
    pub fn for_url(urls: impl AsRef<str>) -> Self {
        let servers: Vec<String> = urls
            .as_ref()
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            servers,
            ..Self::default()
        }
    }
}

/// Connected NATS client
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    publish_timeout: Duration,
}

impl NatsClient {
    pub async fn new(config: NatsConfig) -> InfrastructureResult<Self> {
        if config.servers.is_empty() {
            return Err(InfrastructureError::Configuration(
                "no NATS servers configured".to_string(),
            ));
        }

        let options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout);
        let client = async_nats::connect_with_options(config.servers.join(","), options)
            .await
            .map_err(|e| InfrastructureError::NatsConnection(e.to_string()))?;

        info!("Connected to NATS at {:?}", config.servers);
        Ok(Self {
            client,
            publish_timeout: config.publish_timeout,
        })
    }

    /// Publish `message` as JSON on `subject`
    pub async fn publish<T>(&self, subject: &str, message: &T) -> InfrastructureResult<()>
    where
        T: Serialize,
    {
        let payload = serde_json::to_vec(message)?;
        let publish = self.client.publish(subject.to_string(), payload.into());

        tokio::time::timeout(self.publish_timeout, publish)
            .await
            .map_err(|_| {
                InfrastructureError::NatsPublish(format!(
                    "publish to {} timed out after {:?}",
                    subject, self.publish_timeout
                ))
            })?
            .map_err(|e| InfrastructureError::NatsPublish(e.to_string()))?;

        debug!("Published to {}", subject);
        Ok(())
    }

    pub async fn subscribe(&self, subject: &str) -> InfrastructureResult<Subscriber> {
        self.client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| InfrastructureError::NatsSubscribe(e.to_string()))
    }

    /// Wait until buffered publications reach the server
    pub async fn flush(&self) -> InfrastructureResult<()> {
        self.client
            .flush()
            .await
            .map_err(|e| InfrastructureError::NatsPublish(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_for_url_list() {
        let config = NatsConfig::for_url("nats://10.0.0.5:4222, nats://10.0.0.6:4222,");
        assert_eq!(
            config.servers,
            vec!["nats://10.0.0.5:4222", "nats://10.0.0.6:4222"]
        );
        assert_eq!(config.name, "stack-provision");
    }

    #[tokio::test]
    async fn test_empty_server_list_rejected() {
        let result = NatsClient::new(NatsConfig::for_url(" ")).await;
        assert!(matches!(result, Err(InfrastructureError::Configuration(_))));
    }
}
