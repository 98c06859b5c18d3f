use crate::nats::{ConsumeRequest, ConsumeResponse, InboundMessage, JetStreamConsumer, PullConsumer};
use anyhow::{Context, Result};
use async_nats::jetstream;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info};

/// One durable consumer to bind
#[derive(Debug, Clone)]
pub struct ConsumerSubscription {
    pub stream_name: String,
    pub consumer_name: String,
    pub filter_subject: String,
}

struct BoundConsumer {
    stream_name: String,
    consumer_name: String,
    consumer: Box<dyn PullConsumer>,
}

/// Pulls from one or more durable consumers in turn and feeds every message,
/// one at a time, through a Tower service stack.
///
/// The service decides ack, nak or term for each message. A service error is
/// treated as a nak.
pub struct TowerConsumer<S> {
    consumers: Vec<BoundConsumer>,
    batch_size: usize,
    max_wait: Duration,
    service: S,
}

impl<S> TowerConsumer<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    /// Bind every subscription. Fails if any consumer cannot be created.
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        subscriptions: &[ConsumerSubscription],
        batch_size: usize,
        max_wait: Duration,
        service: S,
    ) -> Result<Self> {
        let mut consumers = Vec::with_capacity(subscriptions.len());

        for subscription in subscriptions {
            debug!(
                stream = %subscription.stream_name,
                consumer = %subscription.consumer_name,
                filter_subject = %subscription.filter_subject,
                "creating durable pull consumer"
            );

            let config = jetstream::consumer::pull::Config {
                name: Some(subscription.consumer_name.clone()),
                durable_name: Some(subscription.consumer_name.clone()),
                filter_subject: subscription.filter_subject.clone(),
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                ..Default::default()
            };

            let consumer = jetstream
                .create_consumer(config, &subscription.stream_name)
                .await
                .with_context(|| {
                    format!(
                        "failed to create consumer {} on stream {}",
                        subscription.consumer_name, subscription.stream_name
                    )
                })?;

            consumers.push(BoundConsumer {
                stream_name: subscription.stream_name.clone(),
                consumer_name: subscription.consumer_name.clone(),
                consumer,
            });
        }

        Ok(Self {
            consumers,
            batch_size: batch_size.max(1),
            max_wait,
            service,
        })
    }

    /// Run until cancelled. A fetch failure ends the loop with an error so
    /// the caller can reconnect.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(consumers = self.consumers.len(), "starting tower nats consumer");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("received shutdown signal, stopping consumer");
                    break;
                }
                result = self.fetch_and_process_round() => {
                    result?;
                }
            }
        }

        debug!("consumer stopped gracefully");
        Ok(())
    }

    /// One fetch from each consumer in turn; returns how many messages were handled
    async fn fetch_and_process_round(&mut self) -> Result<usize> {
        let mut handled = 0;

        for index in 0..self.consumers.len() {
            let (stream_name, consumer_name) = {
                let bound = &self.consumers[index];
                (bound.stream_name.clone(), bound.consumer_name.clone())
            };

            let messages = self.consumers[index]
                .consumer
                .fetch_messages(self.batch_size, self.max_wait)
                .await
                .with_context(|| {
                    format!("failed to fetch from {} ({})", stream_name, consumer_name)
                })?;

            if messages.is_empty() {
                continue;
            }

            debug!(
                stream = %stream_name,
                message_count = messages.len(),
                "received message batch"
            );

            for msg in messages {
                self.process_message(&stream_name, msg.as_ref()).await;
                handled += 1;
            }
        }

        Ok(handled)
    }

    async fn process_message(&mut self, stream_name: &str, msg: &dyn InboundMessage) {
        let subject = msg.subject();
        let request = ConsumeRequest::new(stream_name, subject.clone(), msg.payload(), msg.headers());

        let response = match self.service.ready().await {
            Ok(service) => service.call(request).await,
            Err(e) => Err(e),
        }
        .unwrap_or_else(|e| {
            error!(subject = %subject, error = %e, "service error processing message");
            ConsumeResponse::nak(e.to_string())
        });

        let settled = match response {
            ConsumeResponse::Ack => msg.ack().await,
            ConsumeResponse::Nak(_) => msg.nak().await,
            ConsumeResponse::Term(_) => msg.term().await,
        };

        if let Err(e) = settled {
            error!(subject = %subject, error = %e, "failed to settle message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::traits::{MockInboundMessage, MockJetStreamConsumer, MockPullConsumer};
    use bytes::Bytes;
    use futures::future::BoxFuture;
    use std::task::{Context as TaskContext, Poll};

    /// Acks payloads equal to "ok", terminates anything else
    #[derive(Clone)]
    struct OkOrTermService;

    impl Service<ConsumeRequest> for OkOrTermService {
        type Response = ConsumeResponse;
        type Error = anyhow::Error;
        type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

        fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: ConsumeRequest) -> Self::Future {
            Box::pin(async move {
                if req.payload.as_ref() == b"ok" {
                    Ok(ConsumeResponse::Ack)
                } else {
                    Ok(ConsumeResponse::term("unreadable"))
                }
            })
        }
    }

    #[derive(Clone)]
    struct FailingService;

    impl Service<ConsumeRequest> for FailingService {
        type Response = ConsumeResponse;
        type Error = anyhow::Error;
        type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

        fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: ConsumeRequest) -> Self::Future {
            Box::pin(async move { Err(anyhow::anyhow!("boom")) })
        }
    }

    fn subscriptions() -> Vec<ConsumerSubscription> {
        ["identify", "track"]
            .iter()
            .map(|topic| ConsumerSubscription {
                stream_name: topic.to_string(),
                consumer_name: format!("drain-{}", topic),
                filter_subject: format!("{}.*", topic),
            })
            .collect()
    }

    fn message(payload: &'static [u8]) -> MockInboundMessage {
        let mut msg = MockInboundMessage::new();
        msg.expect_subject().return_const("track.ws-1".to_string());
        msg.expect_payload().return_const(Bytes::from_static(payload));
        msg.expect_headers().return_const(None::<async_nats::HeaderMap>);
        msg
    }

    fn pull_returning(batch: Vec<Box<dyn InboundMessage>>) -> MockPullConsumer {
        let mut pull = MockPullConsumer::new();
        pull.expect_fetch_messages()
            .times(1)
            .return_once(move |_, _| Ok(batch));
        pull
    }

    #[tokio::test]
    async fn test_creates_one_durable_consumer_per_subscription() {
        let mut mock_jetstream = MockJetStreamConsumer::new();
        mock_jetstream
            .expect_create_consumer()
            .withf(|config, stream_name| {
                config.durable_name.as_deref() == Some(&format!("drain-{}", stream_name)[..])
                    && config.filter_subject == format!("{}.*", stream_name)
                    && config.ack_policy == jetstream::consumer::AckPolicy::Explicit
            })
            .times(2)
            .returning(|_, _| Ok(Box::new(MockPullConsumer::new())));

        let consumer = TowerConsumer::new(
            Arc::new(mock_jetstream),
            &subscriptions(),
            10,
            Duration::from_millis(10),
            OkOrTermService,
        )
        .await
        .unwrap();

        assert_eq!(consumer.consumers.len(), 2);
    }

    #[tokio::test]
    async fn test_consumer_creation_failure() {
        let mut mock_jetstream = MockJetStreamConsumer::new();
        mock_jetstream
            .expect_create_consumer()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("stream not found")));

        let result = TowerConsumer::new(
            Arc::new(mock_jetstream),
            &subscriptions(),
            10,
            Duration::from_millis(10),
            OkOrTermService,
        )
        .await;

        let err = result.err().unwrap();
        assert!(err.to_string().contains("failed to create consumer drain-identify"));
    }

    #[tokio::test]
    async fn test_round_visits_every_topic_and_settles_messages() {
        let mut good = message(b"ok");
        good.expect_ack().times(1).returning(|| Ok(()));
        good.expect_term().never();

        let mut bad = message(b"garbage");
        bad.expect_term().times(1).returning(|| Ok(()));
        bad.expect_ack().never();

        let mut pulls = vec![
            pull_returning(vec![Box::new(good)]),
            pull_returning(vec![Box::new(bad)]),
        ]
        .into_iter();

        let mut mock_jetstream = MockJetStreamConsumer::new();
        mock_jetstream
            .expect_create_consumer()
            .times(2)
            .returning(move |_, _| Ok(Box::new(pulls.next().unwrap())));

        let mut consumer = TowerConsumer::new(
            Arc::new(mock_jetstream),
            &subscriptions(),
            10,
            Duration::from_millis(10),
            OkOrTermService,
        )
        .await
        .unwrap();

        let handled = consumer.fetch_and_process_round().await.unwrap();
        assert_eq!(handled, 2);
    }

    #[tokio::test]
    async fn test_service_error_naks() {
        let mut msg = message(b"ok");
        msg.expect_nak().times(1).returning(|| Ok(()));

        let mut mock_jetstream = MockJetStreamConsumer::new();
        let mut pull = Some(pull_returning(vec![Box::new(msg)]));
        mock_jetstream
            .expect_create_consumer()
            .times(1)
            .returning(move |_, _| Ok(Box::new(pull.take().unwrap())));

        let mut consumer = TowerConsumer::new(
            Arc::new(mock_jetstream),
            &subscriptions()[..1],
            10,
            Duration::from_millis(10),
            FailingService,
        )
        .await
        .unwrap();

        assert_eq!(consumer.fetch_and_process_round().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_ends_the_run() {
        let mut mock_jetstream = MockJetStreamConsumer::new();
        mock_jetstream.expect_create_consumer().times(1).returning(|_, _| {
            let mut pull = MockPullConsumer::new();
            pull.expect_fetch_messages()
                .returning(|_, _| Err(anyhow::anyhow!("connection closed")));
            Ok(Box::new(pull))
        });

        let consumer = TowerConsumer::new(
            Arc::new(mock_jetstream),
            &subscriptions()[..1],
            10,
            Duration::from_millis(10),
            OkOrTermService,
        )
        .await
        .unwrap();

        let result = consumer.run(CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let mut mock_jetstream = MockJetStreamConsumer::new();
        mock_jetstream.expect_create_consumer().times(1).returning(|_, _| {
            let mut pull = MockPullConsumer::new();
            pull.expect_fetch_messages().returning(|_, _| Ok(vec![]));
            Ok(Box::new(pull))
        });

        let consumer = TowerConsumer::new(
            Arc::new(mock_jetstream),
            &subscriptions()[..1],
            10,
            Duration::from_millis(10),
            OkOrTermService,
        )
        .await
        .unwrap();

        let ctx = CancellationToken::new();
        ctx.cancel();

        assert!(consumer.run(ctx).await.is_ok());
    }
}
