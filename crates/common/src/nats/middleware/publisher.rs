use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::types::{PublishRequest, PublishResponse};
use super::{
    NatsPublishLoggingLayer, NatsPublishLoggingService, NatsPublishRetryLayer,
    NatsPublishRetryService, NatsPublishTracingLayer, NatsPublishTracingService,
    PublishRetryConfig,
};
use crate::nats::JetStreamPublisher;
use anyhow::Result;
use tower::{Service, ServiceBuilder};

/// Inner service that performs the actual NATS publish
#[derive(Clone)]
pub struct NatsPublishService {
    publisher: Arc<dyn JetStreamPublisher>,
}

impl NatsPublishService {
    pub fn new(publisher: Arc<dyn JetStreamPublisher>) -> Self {
        Self { publisher }
    }
}

impl Service<PublishRequest> for NatsPublishService {
    type Response = PublishResponse;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let publisher = Arc::clone(&self.publisher);

        Box::pin(async move {
            publisher
                .publish_with_headers(req.subject.clone(), req.headers, req.payload)
                .await?;
            Ok(PublishResponse {
                subject: req.subject,
                attempts: 1,
            })
        })
    }
}

/// Full publish stack, outermost first: tracing, logging, retry, publish
pub type LayeredPublisher = NatsPublishTracingService<
    NatsPublishLoggingService<NatsPublishRetryService<NatsPublishService>>,
>;

/// Builder for the layered NATS publisher service
pub struct NatsPublisherBuilder {
    publisher: Arc<dyn JetStreamPublisher>,
    service_name: String,
    retry: PublishRetryConfig,
}

impl NatsPublisherBuilder {
    pub fn new(publisher: Arc<dyn JetStreamPublisher>) -> Self {
        Self {
            publisher,
            service_name: "beacon".to_string(),
            retry: PublishRetryConfig::default(),
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_retry(mut self, retry: PublishRetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The trace context is injected once, so every retry of a message
    /// carries the same parent.
    pub fn build(self) -> LayeredPublisher {
        ServiceBuilder::new()
            .layer(NatsPublishTracingLayer::new(self.service_name))
            .layer(NatsPublishLoggingLayer::new())
            .layer(NatsPublishRetryLayer::new(self.retry))
            .service(NatsPublishService::new(self.publisher))
    }
}
