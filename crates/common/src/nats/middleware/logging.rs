use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use super::consumer_types::{ConsumeRequest, ConsumeResponse};
use super::types::{PublishRequest, PublishResponse};
use tower::{Layer, Service};
use tracing::{debug, error, warn, Instrument, Span};

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// Logs one line per publish, keyed by the envelope's message id
#[derive(Clone, Default)]
pub struct NatsPublishLoggingLayer;

impl NatsPublishLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NatsPublishLoggingLayer {
    type Service = NatsPublishLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsPublishLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct NatsPublishLoggingService<S> {
    inner: S,
}

impl<S> Service<PublishRequest> for NatsPublishLoggingService<S>
where
    S: Service<PublishRequest, Response = PublishResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let subject = req.subject.clone();
        let message_id = req.message_id().unwrap_or_default().to_string();
        let start = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match &result {
                    // Retried publishes are worth seeing at the default level
                    Ok(response) if response.attempts > 1 => warn!(
                        %subject,
                        %message_id,
                        attempts = response.attempts,
                        duration_ms,
                        "envelope published after {} attempts",
                        response.attempts
                    ),
                    Ok(_) => debug!(%subject, %message_id, duration_ms, "envelope published"),
                    Err(e) => error!(
                        %subject,
                        %message_id,
                        duration_ms,
                        error = %e,
                        "envelope publish failed"
                    ),
                }

                result
            }
            .instrument(Span::current()),
        )
    }
}

/// Logs the ack decision taken for each drained message
#[derive(Clone, Default)]
pub struct NatsConsumeLoggingLayer;

impl NatsConsumeLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NatsConsumeLoggingLayer {
    type Service = NatsConsumeLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct NatsConsumeLoggingService<S> {
    inner: S,
}

impl<S> Service<ConsumeRequest> for NatsConsumeLoggingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let stream = req.stream.clone();
        let subject = req.subject.clone();
        let message_id = req.message_id().unwrap_or_default().to_string();
        let start = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match &result {
                    Ok(ConsumeResponse::Ack) => {
                        debug!(%stream, %subject, %message_id, duration_ms, "envelope drained")
                    }
                    Ok(ConsumeResponse::Nak(reason)) => warn!(
                        %stream,
                        %subject,
                        %message_id,
                        duration_ms,
                        reason = reason.as_deref().unwrap_or_default(),
                        "envelope left for redelivery"
                    ),
                    // Terminated messages are gone for good
                    Ok(ConsumeResponse::Term(reason)) => error!(
                        %stream,
                        %subject,
                        %message_id,
                        duration_ms,
                        reason = reason.as_deref().unwrap_or_default(),
                        "envelope dropped"
                    ),
                    Err(e) => error!(
                        %stream,
                        %subject,
                        %message_id,
                        duration_ms,
                        error = %e,
                        "envelope drain failed"
                    ),
                }

                result
            }
            .instrument(Span::current()),
        )
    }
}
