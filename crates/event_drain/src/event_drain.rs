use crate::domain::{DrainState, DrainStateHandle};
use crate::nats::{ConsumerConnector, EnvelopeDrainService};
use anyhow::Context;
use beacon_runner::{supervise, RestartPolicy};
use common::domain::{EnvelopeRepository, EventType};
use common::nats::{
    stream_subjects, ConsumerSubscription, NatsConsumeLoggingLayer, NatsConsumeTracingLayer,
    TowerConsumer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::{info, warn};

pub struct EventDrainConfig {
    /// Durable consumer names are `<consumer_group>-<topic>`
    pub consumer_group: String,
    pub batch_size: usize,
    pub max_wait: Duration,
    pub restart_policy: RestartPolicy,
}

/// Moves envelopes from the `identify` and `track` streams into the store
pub struct EventDrain {
    connector: Arc<dyn ConsumerConnector>,
    repository: Arc<dyn EnvelopeRepository>,
    config: EventDrainConfig,
    state: DrainStateHandle,
}

impl EventDrain {
    pub fn new(
        connector: Arc<dyn ConsumerConnector>,
        repository: Arc<dyn EnvelopeRepository>,
        config: EventDrainConfig,
    ) -> Self {
        info!(
            consumer_group = %config.consumer_group,
            batch_size = config.batch_size,
            "Initializing Event Drain module"
        );

        Self {
            connector,
            repository,
            config,
            state: DrainStateHandle::new(),
        }
    }

    /// Watch the drain's lifecycle
    pub fn state(&self) -> watch::Receiver<DrainState> {
        self.state.subscribe()
    }

    fn subscriptions(&self) -> Vec<ConsumerSubscription> {
        EventType::ALL
            .iter()
            .map(|event_type| ConsumerSubscription {
                stream_name: event_type.topic().to_string(),
                consumer_name: format!("{}-{}", self.config.consumer_group, event_type.topic()),
                filter_subject: stream_subjects(event_type.topic()),
            })
            .collect()
    }

    /// One connect, subscribe and consume cycle. Returns `Ok` only once
    /// cancelled; every failure ends the session with an error.
    pub async fn run_session(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        let result = self.consume(ctx).await;
        self.state.set(DrainState::Disconnected);

        if let Err(e) = &result {
            warn!(error = %format!("{:#}", e), "drain session ended");
        }
        result
    }

    async fn consume(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.state.set(DrainState::Connecting);
        let jetstream = self
            .connector
            .connect()
            .await
            .context("drain failed to connect")?;

        let service = ServiceBuilder::new()
            .layer(NatsConsumeTracingLayer::new())
            .layer(NatsConsumeLoggingLayer::new())
            .service(EnvelopeDrainService::new(Arc::clone(&self.repository)));

        let consumer = TowerConsumer::new(
            jetstream,
            &self.subscriptions(),
            self.config.batch_size,
            self.config.max_wait,
            service,
        )
        .await
        .context("drain failed to subscribe")?;
        self.state.set(DrainState::Subscribed);

        info!(consumer_group = %self.config.consumer_group, "drain subscribed");

        self.state.set(DrainState::Consuming);
        consumer.run(ctx).await
    }

    /// The drain as a runner process, restarted according to its policy
    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| {
            Box::pin(async move {
                let policy = self.config.restart_policy.clone();
                let drain = &self;
                supervise("event_drain", &policy, ctx, |ctx| drain.run_session(ctx)).await
            })
        }
    }
}
