use async_trait::async_trait;
use common::nats::{JetStreamConsumer, NatsClient, NatsConnectConfig};
use std::sync::Arc;

/// Opens the connection a drain session consumes from.
///
/// Each session gets a fresh connection, so a restart after a broker outage
/// never reuses a dead one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumerConnector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Arc<dyn JetStreamConsumer>>;
}

/// Dedicated NATS connection for the drain, separate from the publish path
pub struct NatsConsumerConnector {
    config: NatsConnectConfig,
}

impl NatsConsumerConnector {
    pub fn new(config: NatsConnectConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConsumerConnector for NatsConsumerConnector {
    async fn connect(&self) -> anyhow::Result<Arc<dyn JetStreamConsumer>> {
        let client = NatsClient::connect(&self.config).await?;
        Ok(client.create_consumer_client())
    }
}
