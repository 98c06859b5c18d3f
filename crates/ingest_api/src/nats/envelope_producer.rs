use common::nats::{
    stream_subject, JetStreamPublisher, LayeredPublisher, NatsPublisherBuilder,
    PublishRequest, PublishRetryConfig, PublishTimeoutError,
};
use std::sync::Arc;
use tower::{Service, ServiceExt};
use tracing::debug;

/// Publishes envelopes onto the `identify` and `track` streams
pub struct EnvelopeLogProducer {
    publisher: LayeredPublisher,
}

impl EnvelopeLogProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, retry: PublishRetryConfig) -> Self {
        debug!(
            max_retries = retry.max_retries,
            "initialized EnvelopeLogProducer"
        );

        let publisher = NatsPublisherBuilder::new(jetstream)
            .with_service_name("envelope_producer")
            .with_retry(retry)
            .build();

        Self { publisher }
    }
}

/// A workspace id as a single subject token: wildcard, separator and
/// whitespace characters become `_`
fn subject_token(workspace_id: &str) -> String {
    workspace_id
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// JetStream dedup key. Scoped to the workspace so ids from different
/// tenants can never collide inside the duplicate window.
fn dedup_key(envelope: &Envelope) -> String {
    format!("{}:{}", envelope.workspace_id, envelope.message_id)
}

// Domain trait implementation

use common::domain::{DomainError, DomainResult, Envelope, EnvelopeProducer};

#[async_trait::async_trait]
impl EnvelopeProducer for EnvelopeLogProducer {
    async fn publish(&self, envelope: &Envelope) -> DomainResult<()> {
        let payload = envelope.encode()?;
        let subject = stream_subject(
            envelope.event_type.topic(),
            &subject_token(&envelope.workspace_id),
        );

        let request =
            PublishRequest::new(subject, payload).with_message_id(&dedup_key(envelope));

        let mut publisher = self.publisher.clone();
        publisher
            .ready()
            .await
            .map_err(|e| DomainError::PublishError(format!("{:#}", e)))?
            .call(request)
            .await
            .map_err(|e| {
                if e.downcast_ref::<PublishTimeoutError>().is_some() {
                    DomainError::Timeout(format!("{:#}", e))
                } else {
                    DomainError::PublishError(format!("{:#}", e))
                }
            })?;

        Ok(())
    }
}
