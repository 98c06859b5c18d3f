use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use super::types::{PublishRequest, PublishResponse};
use anyhow::anyhow;
use tower::{Layer, Service, ServiceExt};
use tracing::warn;

/// Bounds for retrying a failed publish
#[derive(Debug, Clone)]
pub struct PublishRetryConfig {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound for a single attempt, acknowledgment included
    pub attempt_timeout: Duration,
}

impl PublishRetryConfig {
    /// Delay before retry number `retry` (0-based): doubles each time, capped
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_backoff)
    }
}

impl Default for PublishRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// A single publish attempt that did not complete in time
#[derive(Debug, thiserror::Error)]
#[error("publish to {subject} timed out after {timeout:?}")]
pub struct PublishTimeoutError {
    pub subject: String,
    pub timeout: Duration,
}

/// Tower layer that retries failed publishes with exponential backoff
#[derive(Clone)]
pub struct NatsPublishRetryLayer {
    config: PublishRetryConfig,
}

impl NatsPublishRetryLayer {
    pub fn new(config: PublishRetryConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for NatsPublishRetryLayer {
    type Service = NatsPublishRetryService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsPublishRetryService {
            inner: service,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct NatsPublishRetryService<S> {
    inner: S,
    config: PublishRetryConfig,
}

impl<S> Service<PublishRequest> for NatsPublishRetryService<S>
where
    S: Service<PublishRequest, Response = PublishResponse, Error = anyhow::Error>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = PublishResponse;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: PublishRequest) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;

                let attempt_result = tokio::time::timeout(config.attempt_timeout, async {
                    inner.ready().await?.call(req.clone()).await
                })
                .await
                .unwrap_or_else(|_| {
                    Err(anyhow!(PublishTimeoutError {
                        subject: req.subject.clone(),
                        timeout: config.attempt_timeout,
                    }))
                });

                match attempt_result {
                    Ok(mut response) => {
                        response.attempts = attempt;
                        return Ok(response);
                    }
                    Err(e) if attempt > config.max_retries => {
                        return Err(e.context(format!(
                            "publish to {} failed after {} attempts",
                            req.subject, attempt
                        )));
                    }
                    Err(e) => {
                        let backoff = config.backoff_for(attempt - 1);
                        warn!(
                            subject = %req.subject,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "publish attempt failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        })
    }
}
