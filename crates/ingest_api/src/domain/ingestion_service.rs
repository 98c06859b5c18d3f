use crate::domain::{assemble, validate, CredentialResolver, DeliveryRouter};
use common::domain::{DomainError, DomainResult, EventType};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Request flow for the identify and track endpoints
///
/// Flow:
/// 1. Validate the body (400 on failure, before touching credentials)
/// 2. Resolve the write key to a workspace (401 when missing or unknown)
/// 3. Build the envelope
/// 4. Deliver it through the configured router
pub struct IngestionService {
    resolver: CredentialResolver,
    router: DeliveryRouter,
}

impl IngestionService {
    pub fn new(resolver: CredentialResolver, router: DeliveryRouter) -> Self {
        Self { resolver, router }
    }

    /// Returns the message id of the accepted envelope
    #[instrument(skip(self, body, write_key), fields(event_type = %kind, body_size = body.len()))]
    pub async fn ingest(
        &self,
        kind: EventType,
        body: &[u8],
        write_key: Option<&str>,
    ) -> DomainResult<Uuid> {
        let payload = validate(kind, body)?;

        let write_key = write_key.ok_or(DomainError::MissingWriteKey)?;
        let workspace_id = self
            .resolver
            .resolve(write_key)
            .await?
            .ok_or(DomainError::InvalidWriteKey)?;

        let envelope = assemble(&payload, &workspace_id)?;
        self.router.deliver(&envelope).await?;

        debug!(
            workspace_id = %envelope.workspace_id,
            message_id = %envelope.message_id,
            "event accepted"
        );

        Ok(envelope.message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{MockEnvelopeProducer, MockWriteKeyRepository};
    use std::sync::Arc;
    use std::time::Duration;

    fn service(repo: MockWriteKeyRepository, producer: MockEnvelopeProducer) -> IngestionService {
        IngestionService::new(
            CredentialResolver::new(Arc::new(repo), Duration::from_secs(1)),
            DeliveryRouter::buffered(Arc::new(producer)),
        )
    }

    fn known_key_repo() -> MockWriteKeyRepository {
        let mut mock_repo = MockWriteKeyRepository::new();
        mock_repo
            .expect_find_workspace_id()
            .withf(|key| key == "wk_live_123")
            .returning(|_| Ok(Some("ws-1".to_string())));
        mock_repo
    }

    #[tokio::test]
    async fn test_ingest_success() {
        let mut mock_producer = MockEnvelopeProducer::new();
        mock_producer
            .expect_publish()
            .withf(|e| {
                e.workspace_id == "ws-1"
                    && e.event_type == EventType::Track
                    && e.message_raw.contains(r#""event":"Purchase""#)
            })
            .times(1)
            .return_once(|_| Ok(()));

        let service = service(known_key_repo(), mock_producer);

        let result = service
            .ingest(
                EventType::Track,
                br#"{"userId":"u1","event":"Purchase"}"#,
                Some("wk_live_123"),
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_body_wins_over_missing_key() {
        let mut mock_repo = MockWriteKeyRepository::new();
        mock_repo.expect_find_workspace_id().never();
        let mut mock_producer = MockEnvelopeProducer::new();
        mock_producer.expect_publish().never();

        let service = service(mock_repo, mock_producer);

        let result = service
            .ingest(EventType::Identify, br#"{"traits":{}}"#, None)
            .await;

        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let mut mock_repo = MockWriteKeyRepository::new();
        mock_repo.expect_find_workspace_id().never();
        let mut mock_producer = MockEnvelopeProducer::new();
        mock_producer.expect_publish().never();

        let service = service(mock_repo, mock_producer);

        let result = service
            .ingest(EventType::Identify, br#"{"userId":"u1"}"#, None)
            .await;

        assert!(matches!(result, Err(DomainError::MissingWriteKey)));
    }

    #[tokio::test]
    async fn test_unknown_key_delivers_nothing() {
        let mut mock_repo = MockWriteKeyRepository::new();
        mock_repo
            .expect_find_workspace_id()
            .times(1)
            .return_once(|_| Ok(None));
        let mut mock_producer = MockEnvelopeProducer::new();
        mock_producer.expect_publish().never();

        let service = service(mock_repo, mock_producer);

        let result = service
            .ingest(EventType::Identify, br#"{"userId":"u1"}"#, Some("bad"))
            .await;

        assert!(matches!(result, Err(DomainError::InvalidWriteKey)));
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates() {
        let mut mock_producer = MockEnvelopeProducer::new();
        mock_producer
            .expect_publish()
            .times(1)
            .return_once(|_| Err(DomainError::PublishError("stream unavailable".to_string())));

        let service = service(known_key_repo(), mock_producer);

        let result = service
            .ingest(EventType::Identify, br#"{"userId":"u1"}"#, Some("wk_live_123"))
            .await;

        assert!(matches!(result, Err(DomainError::PublishError(_))));
    }
}
