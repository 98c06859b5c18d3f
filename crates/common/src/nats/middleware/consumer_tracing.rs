use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::consumer_types::{ConsumeRequest, ConsumeResponse};
use crate::nats::trace_context::link_span_to_headers;
use tower::{Layer, Service};
use tracing::{field, info_span, Instrument, Span};

/// Opens a `process` span per drained envelope. When the publisher injected
/// a trace context the span continues that trace, so an envelope's publish
/// and its insert show up under the same request.
#[derive(Clone, Default)]
pub struct NatsConsumeTracingLayer;

impl NatsConsumeTracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NatsConsumeTracingLayer {
    type Service = NatsConsumeTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeTracingService { inner: service }
    }
}

#[derive(Clone)]
pub struct NatsConsumeTracingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for NatsConsumeTracingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let span = info_span!(
            target: "nats",
            "nats_consume",
            otel.name = %format!("{} process", req.subject),
            otel.kind = "consumer",
            messaging.system = "nats",
            messaging.operation = "process",
            messaging.destination.name = %req.stream,
            messaging.destination.subject = %req.subject,
            messaging.message.id = req.message_id().unwrap_or_default(),
            messaging.message.body.size = req.payload.len(),
            messaging.outcome = field::Empty,
            otel.status_code = field::Empty,
        );
        link_span_to_headers(&span, req.headers.as_ref());

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let span = Span::current();
                match &result {
                    Ok(response) => {
                        span.record("messaging.outcome", response.outcome());
                        if !response.is_ack() {
                            span.record("otel.status_code", "ERROR");
                        }
                    }
                    Err(_) => {
                        span.record("otel.status_code", "ERROR");
                    }
                }
                result
            }
            .instrument(span),
        )
    }
}
