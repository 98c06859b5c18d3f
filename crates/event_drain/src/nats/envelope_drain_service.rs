use common::domain::{Envelope, EnvelopeRepository, InsertEnvelopesInput, InsertMode};
use common::nats::{ConsumeRequest, ConsumeResponse};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, error};

/// Tower service that moves one envelope from the durable log into the store.
///
/// This service:
/// 1. Decodes the JSON envelope
/// 2. Inserts exactly that envelope, waiting for the write
/// 3. Acks on success, terminates on any failure
#[derive(Clone)]
pub struct EnvelopeDrainService {
    repository: Arc<dyn EnvelopeRepository>,
}

impl EnvelopeDrainService {
    pub fn new(repository: Arc<dyn EnvelopeRepository>) -> Self {
        Self { repository }
    }
}

impl Service<ConsumeRequest> for EnvelopeDrainService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let repository = Arc::clone(&self.repository);
        let subject = req.subject.clone();

        Box::pin(async move {
            let envelope = match Envelope::decode(&req.payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!(
                        error = %format!("{:#}", e),
                        subject = %subject,
                        "failed to decode envelope"
                    );
                    return Ok(ConsumeResponse::term(format!("Decode error: {:#}", e)));
                }
            };

            let message_id = envelope.message_id;
            let workspace_id = envelope.workspace_id.clone();

            let input = InsertEnvelopesInput {
                envelopes: vec![envelope],
                mode: InsertMode::Sync,
            };

            if let Err(e) = repository.insert_batch(input).await {
                error!(
                    error = %e,
                    message_id = %message_id,
                    workspace_id = %workspace_id,
                    "failed to insert envelope"
                );
                return Ok(ConsumeResponse::term(format!("Insert error: {}", e)));
            }

            debug!(message_id = %message_id, workspace_id = %workspace_id, "stored envelope");

            Ok(ConsumeResponse::ack())
        })
    }
}
