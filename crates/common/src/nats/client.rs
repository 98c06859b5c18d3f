use crate::nats::traits::{InboundMessage, JetStreamConsumer, JetStreamPublisher, PullConsumer};
use anyhow::{anyhow, Context, Result};
use async_nats::jetstream;
use async_nats::{HeaderMap, ServerAddr};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Settings for one NATS connection
#[derive(Debug, Clone)]
pub struct NatsConnectConfig {
    /// Comma-separated server list, e.g. `nats://a:4222,nats://b:4222`
    pub urls: String,
    /// Connection name reported to the server
    pub client_name: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

/// Split a comma-separated server list into addresses
pub fn parse_server_addrs(urls: &str) -> Result<Vec<ServerAddr>> {
    let addrs = urls
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| {
            url.parse::<ServerAddr>()
                .with_context(|| format!("Invalid NATS server address: {}", url))
        })
        .collect::<Result<Vec<_>>>()?;

    if addrs.is_empty() {
        return Err(anyhow!("No NATS server address configured"));
    }
    Ok(addrs)
}

pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(config: &NatsConnectConfig) -> Result<Self> {
        let addrs = parse_server_addrs(&config.urls)?;

        info!(
            urls = %config.urls,
            client_name = %config.client_name,
            connect_timeout_ms = config.connect_timeout.as_millis() as u64,
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            "Connecting to NATS"
        );

        let client = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout))
            .connect(addrs)
            .await
            .context("Failed to connect to NATS")?;

        let mut jetstream = jetstream::new(client.clone());
        jetstream.set_timeout(config.request_timeout);

        info!(client_name = %config.client_name, "Successfully connected to NATS");
        Ok(Self { client, jetstream })
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Create a JetStreamConsumer trait object from this client
    pub fn create_consumer_client(&self) -> Arc<dyn JetStreamConsumer> {
        Arc::new(NatsJetStreamConsumer::new(self.jetstream.clone()))
    }

    /// Create a JetStreamPublisher trait object from this client
    pub fn create_publisher_client(&self) -> Arc<dyn JetStreamPublisher> {
        Arc::new(NatsJetStreamPublisher::new(self.jetstream.clone()))
    }

    /// Flush pending publishes. The connection itself closes when the last
    /// handle is dropped.
    pub async fn close(self) -> Result<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }
}

/// Concrete implementation of JetStreamConsumer using async-nats
pub struct NatsJetStreamConsumer {
    context: jetstream::Context,
}

impl NatsJetStreamConsumer {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamConsumer for NatsJetStreamConsumer {
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>> {
        let consumer = self
            .context
            .create_consumer_on_stream(config, stream_name)
            .await
            .context("Failed to create consumer")?;

        Ok(Box::new(NatsPullConsumer { consumer }))
    }
}

/// Concrete implementation of PullConsumer using async-nats
pub struct NatsPullConsumer {
    consumer: jetstream::consumer::PullConsumer,
}

#[async_trait]
impl PullConsumer for NatsPullConsumer {
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: Duration,
    ) -> Result<Vec<Box<dyn InboundMessage>>> {
        use futures::StreamExt;

        let mut messages = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .context("Failed to fetch messages")?;

        let mut result: Vec<Box<dyn InboundMessage>> = Vec::new();
        while let Some(msg) = messages.next().await {
            match msg {
                Ok(message) => result.push(Box::new(JetStreamMessage::new(message))),
                Err(e) => {
                    error!(error = %e, "Error receiving message");
                }
            }
        }
        Ok(result)
    }
}

/// A JetStream message exposed through the `InboundMessage` trait
pub struct JetStreamMessage {
    message: jetstream::Message,
}

impl JetStreamMessage {
    pub fn new(message: jetstream::Message) -> Self {
        Self { message }
    }

    async fn acknowledge(&self, kind: jetstream::AckKind) -> Result<()> {
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("Failed to acknowledge message on {}", self.message.subject))
    }
}

#[async_trait]
impl InboundMessage for JetStreamMessage {
    fn subject(&self) -> String {
        self.message.subject.to_string()
    }

    fn payload(&self) -> Bytes {
        self.message.payload.clone()
    }

    fn headers(&self) -> Option<HeaderMap> {
        self.message.headers.clone()
    }

    async fn ack(&self) -> Result<()> {
        self.acknowledge(jetstream::AckKind::Ack).await
    }

    async fn nak(&self) -> Result<()> {
        self.acknowledge(jetstream::AckKind::Nak(None)).await
    }

    async fn term(&self) -> Result<()> {
        self.acknowledge(jetstream::AckKind::Term).await
    }
}

/// Concrete implementation of JetStreamPublisher using async-nats
pub struct NatsJetStreamPublisher {
    context: jetstream::Context,
}

impl NatsJetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamPublisher for NatsJetStreamPublisher {
    async fn get_stream(&self, stream_name: &str) -> Result<()> {
        self.context
            .get_stream(stream_name)
            .await
            .context("Failed to get stream")?;
        Ok(())
    }

    async fn create_stream(&self, config: jetstream::stream::Config) -> Result<()> {
        self.context
            .create_stream(config)
            .await
            .context("Failed to create stream")?;
        Ok(())
    }

    #[instrument(skip(self, headers, payload), fields(subject = %subject, payload_size = payload.len()))]
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<()> {
        let ack = self
            .context
            .publish_with_headers(subject, headers, payload)
            .await
            .context("Failed to publish message to JetStream")?;

        let ack = ack
            .await
            .context("Failed to receive JetStream acknowledgment")?;

        // Only a retry of an already stored message can hit the dedup window
        if ack.duplicate {
            debug!(
                stream = %ack.stream,
                sequence = ack.sequence,
                "duplicate publish ignored by stream"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_server() {
        let addrs = parse_server_addrs("nats://localhost:4222").unwrap();
        assert_eq!(addrs.len(), 1);
    }

    #[test]
    fn test_parse_comma_separated_servers() {
        let addrs = parse_server_addrs("nats://a:4222, nats://b:4222,").unwrap();
        assert_eq!(addrs.len(), 2);
    }

    #[test]
    fn test_parse_empty_list_fails() {
        assert!(parse_server_addrs(" , ").is_err());
    }
}
